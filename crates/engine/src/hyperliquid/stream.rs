use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};
use url::Url;

use common::{Error, Result, Trade};

/// Fixed wait between reconnect attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Hyperliquid `trades` WebSocket subscription for a single coin.
///
/// Parses trade prints into `Trade` and publishes them on a broadcast
/// channel. Reconnects forever with a fixed delay.
pub struct HyperliquidStream {
    url: String,
    coin: String,
    trade_tx: broadcast::Sender<Trade>,
}

impl HyperliquidStream {
    pub fn new(
        url: impl Into<String>,
        coin: impl Into<String>,
        trade_tx: broadcast::Sender<Trade>,
    ) -> Self {
        Self {
            url: url.into(),
            coin: coin.into(),
            trade_tx,
        }
    }

    /// Run the stream loop forever. Call this inside a `tokio::spawn`.
    pub async fn run(self) {
        loop {
            info!(coin = %self.coin, url = %self.url, "Connecting to Hyperliquid trade stream");
            match self.connect_once().await {
                Ok(()) => info!(coin = %self.coin, "Trade stream closed"),
                Err(e) => warn!(coin = %self.coin, error = %e, "Trade stream error"),
            }
            info!(delay = ?RECONNECT_DELAY, "Reconnecting trade stream");
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    async fn connect_once(&self) -> Result<()> {
        let url = Url::parse(&self.url).map_err(|e| Error::WebSocket(e.to_string()))?;
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();

        write
            .send(Message::Text(subscription(&self.coin)))
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;
        info!(coin = %self.coin, "Subscribed to trade updates");

        while let Some(msg) = read.next().await {
            let msg = msg.map_err(|e| Error::WebSocket(e.to_string()))?;

            match msg {
                Message::Text(text) => match parse_trades(&self.coin, &text) {
                    Ok(trades) => {
                        for trade in trades {
                            // No receivers is fine: nothing is listening yet
                            let _ = self.trade_tx.send(trade);
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to parse trade message"),
                },
                Message::Close(frame) => {
                    info!(?frame, "Trade stream close frame received");
                    break;
                }
                _ => {}
            }
        }

        Ok(())
    }
}

fn subscription(coin: &str) -> String {
    json!({
        "method": "subscribe",
        "subscription": { "type": "trades", "coin": coin },
    })
    .to_string()
}

// ─── Hyperliquid trade JSON parsing ──────────────────────────────────────────

#[derive(Deserialize)]
struct TradesMessage {
    channel: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct WsTrade {
    coin: String,
    px: String,
    sz: String,
    time: i64,
}

/// Parse one stream message. Non-trade channels (subscription acks, pongs)
/// yield no trades; trades for other coins are dropped.
pub fn parse_trades(coin: &str, text: &str) -> Result<Vec<Trade>> {
    let msg: TradesMessage = serde_json::from_str(text)?;
    if msg.channel != "trades" {
        return Ok(Vec::new());
    }

    let rows: Vec<WsTrade> = serde_json::from_value(msg.data)?;
    rows.into_iter()
        .filter(|t| t.coin == coin)
        .map(|t| {
            let price = t
                .px
                .parse::<f64>()
                .map_err(|e| Error::WebSocket(format!("bad trade price '{}': {e}", t.px)))?;
            let size = t
                .sz
                .parse::<f64>()
                .map_err(|e| Error::WebSocket(format!("bad trade size '{}': {e}", t.sz)))?;
            let timestamp = Utc
                .timestamp_millis_opt(t.time)
                .single()
                .ok_or_else(|| Error::WebSocket(format!("bad trade time {}", t.time)))?;
            Ok(Trade {
                coin: t.coin,
                price,
                size,
                timestamp,
            })
        })
        .collect()
}
