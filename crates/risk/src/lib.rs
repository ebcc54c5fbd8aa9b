pub mod policy;
pub mod tracker;

pub use policy::{
    Decision, DecisionEngine, HoldReason, OrderPolicy, TradeState, CLOSE_PRICE_OFFSET,
    LEVEL_SIZE_STEP, MAX_AFFORDABLE_LEVELS,
};
pub use tracker::{normalize_positions, AccountSnapshot, PositionTracker};
