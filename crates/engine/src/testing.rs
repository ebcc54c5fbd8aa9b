//! In-process exchange fake shared by the engine's unit tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use common::{
    AccountApi, Balance, Candle, Error, ExchangePosition, MarketDataApi, OpenOrder, OrderApi,
    OrderHandle, OrderSide, OrderType, PositionSide, Result, Trade,
};

use crate::feed::{apply_trade, SharedMarket};

pub struct FakeExchange {
    balance: Mutex<Balance>,
    positions: Mutex<Vec<ExchangePosition>>,
    orders: Mutex<Vec<OpenOrder>>,
    created: Mutex<Vec<OrderHandle>>,
    rejected_sides: Mutex<Vec<OrderSide>>,
    account_down: AtomicBool,
    leverage: Mutex<Option<u32>>,
    next_id: AtomicU64,
    trade_on_order: Mutex<Option<(SharedMarket, Trade)>>,
}

impl FakeExchange {
    pub fn new(free: f64) -> Self {
        Self {
            balance: Mutex::new(Balance { total: free, free }),
            positions: Mutex::new(Vec::new()),
            orders: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            rejected_sides: Mutex::new(Vec::new()),
            account_down: AtomicBool::new(false),
            leverage: Mutex::new(None),
            next_id: AtomicU64::new(1),
            trade_on_order: Mutex::new(None),
        }
    }

    pub fn reject_side(&self, side: OrderSide) {
        self.rejected_sides.lock().unwrap().push(side);
    }

    pub fn set_position(&self, side: PositionSide, size: f64, entry_price: f64) {
        *self.positions.lock().unwrap() = vec![ExchangePosition {
            id: None,
            side,
            size,
            entry_price,
        }];
    }

    /// Feed `trade` into `market` while the next order is being created.
    pub fn trade_during_next_order(&self, market: SharedMarket, trade: Trade) {
        *self.trade_on_order.lock().unwrap() = Some((market, trade));
    }

    pub fn set_account_down(&self, down: bool) {
        self.account_down.store(down, Ordering::SeqCst);
    }

    pub fn open_order_count(&self) -> usize {
        self.orders.lock().unwrap().len()
    }

    pub fn created(&self) -> Vec<OrderHandle> {
        self.created.lock().unwrap().clone()
    }

    pub fn leverage(&self) -> Option<u32> {
        *self.leverage.lock().unwrap()
    }

    fn check_account(&self) -> Result<()> {
        if self.account_down.load(Ordering::SeqCst) {
            return Err(Error::Exchange("account API unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AccountApi for FakeExchange {
    async fn fetch_balance(&self) -> Result<Balance> {
        self.check_account()?;
        Ok(*self.balance.lock().unwrap())
    }

    async fn fetch_positions(&self, _symbol: &str) -> Result<Vec<ExchangePosition>> {
        self.check_account()?;
        Ok(self.positions.lock().unwrap().clone())
    }

    async fn set_leverage(&self, leverage: u32, _symbol: &str) -> Result<()> {
        self.check_account()?;
        *self.leverage.lock().unwrap() = Some(leverage);
        Ok(())
    }
}

#[async_trait]
impl OrderApi for FakeExchange {
    async fn create_order(
        &self,
        symbol: &str,
        _order_type: OrderType,
        side: OrderSide,
        size: f64,
        price: f64,
        reduce_only: bool,
    ) -> Result<OrderHandle> {
        let pending = self.trade_on_order.lock().unwrap().take();
        if let Some((market, trade)) = pending {
            apply_trade(&market, &trade).await;
        }
        if self.rejected_sides.lock().unwrap().contains(&side) {
            return Err(Error::OrderSubmission(format!("{side} rejected")));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        self.orders.lock().unwrap().push(OpenOrder {
            id: id.clone(),
            symbol: symbol.to_string(),
            side,
            size,
            price,
            reduce_only,
        });
        let handle = OrderHandle {
            id,
            symbol: symbol.to_string(),
            side,
            size,
            price,
            reduce_only,
            created_at: Utc::now(),
        };
        self.created.lock().unwrap().push(handle.clone());
        Ok(handle)
    }

    async fn fetch_open_orders(&self, _symbol: &str) -> Result<Vec<OpenOrder>> {
        Ok(self.orders.lock().unwrap().clone())
    }

    async fn cancel_order(&self, id: &str, _symbol: &str) -> Result<()> {
        let mut orders = self.orders.lock().unwrap();
        let before = orders.len();
        orders.retain(|o| o.id != id);
        if orders.len() == before {
            return Err(Error::Exchange(format!("unknown order {id}")));
        }
        Ok(())
    }
}

/// Candle source serving a fixed history.
pub struct FakeMarketData {
    pub candles: Vec<Candle>,
}

#[async_trait]
impl MarketDataApi for FakeMarketData {
    async fn fetch_candles(
        &self,
        _coin: &str,
        _timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let skip = self.candles.len().saturating_sub(limit);
        Ok(self.candles[skip..].to_vec())
    }
}
