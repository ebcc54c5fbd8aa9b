pub mod info;
pub mod stream;

pub use info::HyperliquidInfo;
pub use stream::HyperliquidStream;
