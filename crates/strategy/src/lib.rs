pub mod candles;
pub mod config;
pub mod indicators;
pub mod trend;

pub use candles::{CandleAggregator, Ingest};
pub use config::TrendConfig;
pub use indicators::{AlmaIndicator, SlopeDetector, SlopeState};
pub use trend::TrendTracker;
