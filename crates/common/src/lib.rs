pub mod config;
pub mod error;
pub mod exchange;
pub mod types;

pub use config::{timeframe_millis, Config};
pub use error::{Error, Result};
pub use exchange::{AccountApi, ExchangeClient, MarketDataApi, OrderApi};
pub use types::*;
