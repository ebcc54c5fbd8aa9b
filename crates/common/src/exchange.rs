use async_trait::async_trait;

use crate::{
    Balance, Candle, ExchangePosition, OpenOrder, OrderHandle, OrderSide, OrderType, Result,
};

/// Account queries and settings.
///
/// `PaperClient` implements this for simulation. The control loop is the
/// only caller once the engine is running.
#[async_trait]
pub trait AccountApi: Send + Sync {
    /// Total and free balance in the settlement currency.
    async fn fetch_balance(&self) -> Result<Balance>;

    /// Positions for `symbol`, including flat rows if the venue reports them.
    async fn fetch_positions(&self, symbol: &str) -> Result<Vec<ExchangePosition>>;

    async fn set_leverage(&self, leverage: u32, symbol: &str) -> Result<()>;
}

/// Order placement and cancellation.
///
/// Only `OrderExecutor` in `crates/engine` should call `create_order`.
#[async_trait]
pub trait OrderApi: Send + Sync {
    async fn create_order(
        &self,
        symbol: &str,
        order_type: OrderType,
        side: OrderSide,
        size: f64,
        price: f64,
        reduce_only: bool,
    ) -> Result<OrderHandle>;

    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>>;

    async fn cancel_order(&self, id: &str, symbol: &str) -> Result<()>;
}

/// Historical candles used to bootstrap the rolling buffer.
#[async_trait]
pub trait MarketDataApi: Send + Sync {
    /// The most recent `limit` candles for `coin`, oldest first.
    async fn fetch_candles(&self, coin: &str, timeframe: &str, limit: usize) -> Result<Vec<Candle>>;
}

/// A venue that supports both account queries and order flow.
pub trait ExchangeClient: AccountApi + OrderApi {}

impl<T: AccountApi + OrderApi> ExchangeClient for T {}
