use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use common::{
    AccountApi, Balance, Error, ExchangePosition, OpenOrder, OrderApi, OrderHandle, OrderSide,
    OrderType, PositionSide, Result,
};

/// Sizes below this are treated as zero.
const SIZE_EPSILON: f64 = 1e-9;

/// Net one-way position. Positive size is long, negative short.
#[derive(Debug, Clone, Copy, Default)]
struct NetPosition {
    size: f64,
    entry_price: f64,
}

impl NetPosition {
    fn side(&self) -> PositionSide {
        if self.size > SIZE_EPSILON {
            PositionSide::Long
        } else if self.size < -SIZE_EPSILON {
            PositionSide::Short
        } else {
            PositionSide::Flat
        }
    }

    /// Size an order on `side` can reduce.
    fn reducible_by(&self, side: OrderSide) -> f64 {
        match (self.side(), side) {
            (PositionSide::Long, OrderSide::Sell) | (PositionSide::Short, OrderSide::Buy) => {
                self.size.abs()
            }
            _ => 0.0,
        }
    }
}

#[derive(Debug, Default)]
struct PaperAccount {
    /// Deposited balance plus realized PnL, in USDC.
    cash: f64,
    leverage: u32,
    positions: HashMap<String, NetPosition>,
    orders: Vec<OpenOrder>,
    prices: HashMap<String, f64>,
}

impl PaperAccount {
    fn unrealized(&self) -> f64 {
        self.positions
            .iter()
            .map(|(symbol, p)| {
                let mark = self.prices.get(symbol).copied().unwrap_or(p.entry_price);
                p.size * (mark - p.entry_price)
            })
            .sum()
    }

    fn used_margin(&self) -> f64 {
        let leverage = self.leverage.max(1) as f64;
        let positions: f64 = self
            .positions
            .iter()
            .map(|(symbol, p)| {
                let mark = self.prices.get(symbol).copied().unwrap_or(p.entry_price);
                p.size.abs() * mark
            })
            .sum();
        let resting: f64 = self
            .orders
            .iter()
            .filter(|o| !o.reduce_only)
            .map(|o| o.size * o.price)
            .sum();
        (positions + resting) / leverage
    }

    fn balance(&self) -> Balance {
        let total = self.cash + self.unrealized();
        Balance {
            total,
            free: total - self.used_margin(),
        }
    }

    /// Apply a fill to the net position and realize PnL on the closed part.
    fn fill(&mut self, symbol: &str, side: OrderSide, size: f64, price: f64) -> f64 {
        let pos = self.positions.entry(symbol.to_string()).or_default();
        let signed = match side {
            OrderSide::Buy => size,
            OrderSide::Sell => -size,
        };

        let mut realized = 0.0;
        if pos.size == 0.0 || pos.size.signum() == signed.signum() {
            let new_size = pos.size + signed;
            pos.entry_price = (pos.size.abs() * pos.entry_price + size * price) / new_size.abs();
            pos.size = new_size;
        } else {
            let closing = size.min(pos.size.abs());
            realized = closing * (price - pos.entry_price) * pos.size.signum();
            let new_size = pos.size + signed;
            if new_size.abs() <= SIZE_EPSILON {
                pos.size = 0.0;
                pos.entry_price = 0.0;
            } else if new_size.signum() != pos.size.signum() {
                // Flipped through zero: the remainder opens at the fill price
                pos.size = new_size;
                pos.entry_price = price;
            } else {
                pos.size = new_size;
            }
        }

        if pos.size == 0.0 {
            self.positions.remove(symbol);
        }
        self.cash += realized;
        realized
    }
}

/// Simulated one-way perpetual account for paper trading.
///
/// Marketable limit orders fill immediately at the latest known price with
/// configurable slippage; the rest rest on the book and fill once the price
/// crosses them. No real orders are ever sent to the exchange.
pub struct PaperClient {
    account: Arc<RwLock<PaperAccount>>,
    /// Slippage in basis points applied to immediate fills.
    slippage_bps: f64,
}

impl PaperClient {
    pub fn new(initial_balance_usd: f64, slippage_bps: f64) -> Self {
        info!(
            balance = initial_balance_usd,
            slippage_bps = slippage_bps,
            "PaperClient initialized"
        );
        Self {
            account: Arc::new(RwLock::new(PaperAccount {
                cash: initial_balance_usd,
                leverage: 1,
                ..PaperAccount::default()
            })),
            slippage_bps,
        }
    }

    /// Update the latest price for a symbol and fill any resting orders it
    /// crosses. Called for every streamed trade.
    pub async fn update_price(&self, symbol: &str, price: f64) {
        if !(price > 0.0 && price.is_finite()) {
            return;
        }
        let mut account = self.account.write().await;
        account.prices.insert(symbol.to_string(), price);

        let crossed: Vec<OpenOrder> = account
            .orders
            .iter()
            .filter(|o| {
                o.symbol == symbol
                    && match o.side {
                        OrderSide::Buy => price <= o.price,
                        OrderSide::Sell => price >= o.price,
                    }
            })
            .cloned()
            .collect();
        if crossed.is_empty() {
            return;
        }
        account
            .orders
            .retain(|o| !crossed.iter().any(|c| c.id == o.id));

        for order in crossed {
            let mut size = order.size;
            if order.reduce_only {
                let reducible = account
                    .positions
                    .get(symbol)
                    .map(|p| p.reducible_by(order.side))
                    .unwrap_or(0.0);
                if reducible <= SIZE_EPSILON {
                    debug!(id = %order.id, "Dropping reduce-only order with nothing to reduce");
                    continue;
                }
                size = size.min(reducible);
            }
            let realized = account.fill(symbol, order.side, size, order.price);
            debug!(
                id = %order.id,
                side = %order.side,
                size,
                price = order.price,
                realized,
                "Paper resting order filled"
            );
        }
    }

    pub async fn last_price(&self, symbol: &str) -> Option<f64> {
        self.account.read().await.prices.get(symbol).copied()
    }

    fn slipped(&self, side: OrderSide, price: f64) -> f64 {
        match side {
            OrderSide::Buy => price * (1.0 + self.slippage_bps / 10_000.0),
            OrderSide::Sell => price * (1.0 - self.slippage_bps / 10_000.0),
        }
    }
}

#[async_trait]
impl AccountApi for PaperClient {
    async fn fetch_balance(&self) -> Result<Balance> {
        Ok(self.account.read().await.balance())
    }

    async fn fetch_positions(&self, symbol: &str) -> Result<Vec<ExchangePosition>> {
        let account = self.account.read().await;
        Ok(account
            .positions
            .get(symbol)
            .map(|p| ExchangePosition {
                id: Some(format!("paper-{symbol}")),
                side: p.side(),
                size: p.size.abs(),
                entry_price: p.entry_price,
            })
            .into_iter()
            .collect())
    }

    async fn set_leverage(&self, leverage: u32, symbol: &str) -> Result<()> {
        if leverage == 0 {
            return Err(Error::Exchange("leverage must be at least 1".into()));
        }
        self.account.write().await.leverage = leverage;
        debug!(leverage, symbol, "Paper leverage set");
        Ok(())
    }
}

#[async_trait]
impl OrderApi for PaperClient {
    async fn create_order(
        &self,
        symbol: &str,
        order_type: OrderType,
        side: OrderSide,
        size: f64,
        price: f64,
        reduce_only: bool,
    ) -> Result<OrderHandle> {
        if !(size > 0.0 && size.is_finite()) {
            return Err(Error::OrderSubmission(format!("invalid size {size}")));
        }
        let mut account = self.account.write().await;
        let last = account.prices.get(symbol).copied();

        let mut size = size;
        if reduce_only {
            let reducible = account
                .positions
                .get(symbol)
                .map(|p| p.reducible_by(side))
                .unwrap_or(0.0);
            if reducible <= SIZE_EPSILON {
                return Err(Error::OrderSubmission(format!(
                    "reduce-only {side} would not reduce a position on {symbol}"
                )));
            }
            size = size.min(reducible);
        } else {
            let required = size * price / account.leverage.max(1) as f64;
            let free = account.balance().free;
            if required > free {
                return Err(Error::OrderSubmission(format!(
                    "insufficient margin: need {required:.2}, free {free:.2}"
                )));
            }
        }

        let marketable = match (order_type, last) {
            (OrderType::Market, Some(_)) => true,
            (OrderType::Market, None) => {
                return Err(Error::OrderSubmission(format!("no market price for {symbol}")));
            }
            (OrderType::Limit, Some(last)) => match side {
                OrderSide::Buy => price >= last,
                OrderSide::Sell => price <= last,
            },
            (OrderType::Limit, None) => false,
        };

        let id = uuid::Uuid::new_v4().to_string();
        if let (true, Some(last)) = (marketable, last) {
            let slipped = self.slipped(side, last);
            // A limit never fills worse than its price
            let fill_price = match (order_type, side) {
                (OrderType::Limit, OrderSide::Buy) => slipped.min(price),
                (OrderType::Limit, OrderSide::Sell) => slipped.max(price),
                (OrderType::Market, _) => slipped,
            };
            let realized = account.fill(symbol, side, size, fill_price);
            debug!(
                symbol,
                side = %side,
                last,
                fill = fill_price,
                size,
                realized,
                "Paper fill simulated"
            );
        } else {
            account.orders.push(OpenOrder {
                id: id.clone(),
                symbol: symbol.to_string(),
                side,
                size,
                price,
                reduce_only,
            });
        }

        Ok(OrderHandle {
            id,
            symbol: symbol.to_string(),
            side,
            size,
            price,
            reduce_only,
            created_at: Utc::now(),
        })
    }

    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>> {
        Ok(self
            .account
            .read()
            .await
            .orders
            .iter()
            .filter(|o| o.symbol == symbol)
            .cloned()
            .collect())
    }

    async fn cancel_order(&self, id: &str, symbol: &str) -> Result<()> {
        let mut account = self.account.write().await;
        let before = account.orders.len();
        account.orders.retain(|o| !(o.id == id && o.symbol == symbol));
        if account.orders.len() == before {
            warn!(id, symbol, "Cancel for unknown paper order");
            return Err(Error::Exchange(format!("order {id} not found")));
        }
        Ok(())
    }
}
