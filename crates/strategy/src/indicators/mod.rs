pub mod alma;
pub mod slope;

pub use alma::{alma_weights, AlmaIndicator};
pub use slope::{SlopeDetector, SlopeState};
