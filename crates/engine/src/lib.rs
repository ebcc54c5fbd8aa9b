pub mod close;
pub mod control;
pub mod executor;
pub mod feed;
pub mod hyperliquid;
pub mod lifecycle;

#[cfg(test)]
pub(crate) mod testing;

pub use close::{close_all_positions, CloseReport};
pub use control::{ControlLoop, ControlTiming};
pub use executor::OrderExecutor;
pub use feed::{apply_trade, FeedLoop, SharedMarket};
pub use hyperliquid::{HyperliquidInfo, HyperliquidStream};
pub use lifecycle::{Engine, EngineCommand, EngineHandle};
