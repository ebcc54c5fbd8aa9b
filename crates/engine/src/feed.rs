use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

use common::Trade;
use strategy::TrendTracker;

/// Market state shared by the feed loop (writer) and control loop (reader).
pub type SharedMarket = Arc<Mutex<TrendTracker>>;

/// Pushes every streamed trade into the shared candle buffer.
pub struct FeedLoop {
    market: SharedMarket,
    trade_rx: broadcast::Receiver<Trade>,
}

impl FeedLoop {
    pub fn new(market: SharedMarket, trade_rx: broadcast::Receiver<Trade>) -> Self {
        Self { market, trade_rx }
    }

    /// Run until the trade channel closes. Call from `tokio::spawn`.
    pub async fn run(mut self) {
        loop {
            match self.trade_rx.recv().await {
                Ok(trade) => apply_trade(&self.market, &trade).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Feed loop lagging, trades dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    warn!("Trade channel closed, feed loop exiting");
                    break;
                }
            }
        }
    }
}

/// Update price and candles with one trade; recomputes the slope when the
/// trade opens a new candle.
pub async fn apply_trade(market: &SharedMarket, trade: &Trade) {
    let mut market = market.lock().await;
    match market.on_trade(trade) {
        Some(Err(e)) if e.is_insufficient_data() => debug!(error = %e, "Slope not available yet"),
        Some(Err(e)) => warn!(error = %e, "Slope recompute failed"),
        Some(Ok(_)) | None => {}
    }
}
