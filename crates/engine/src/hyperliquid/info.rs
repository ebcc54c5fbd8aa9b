use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use common::{timeframe_millis, Candle, Error, MarketDataApi, Result};

/// Public REST client for the Hyperliquid `info` endpoint.
///
/// Only unauthenticated market data is used here: historical candles to seed
/// the candle buffer before the trade stream takes over.
pub struct HyperliquidInfo {
    base_url: String,
    http: Client,
}

impl HyperliquidInfo {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn post_info(&self, body: serde_json::Value) -> Result<String> {
        let url = format!("{}/info", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {text}")));
        }
        Ok(text)
    }
}

#[async_trait]
impl MarketDataApi for HyperliquidInfo {
    async fn fetch_candles(
        &self,
        coin: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let bucket_ms = timeframe_millis(timeframe)
            .ok_or_else(|| Error::Config(format!("unknown timeframe '{timeframe}'")))?;
        let end = Utc::now().timestamp_millis();
        let start = end - bucket_ms * limit as i64;

        debug!(coin, timeframe, limit, "Fetching candle snapshot");
        let body = self
            .post_info(json!({
                "type": "candleSnapshot",
                "req": {
                    "coin": coin,
                    "interval": timeframe,
                    "startTime": start,
                    "endTime": end,
                },
            }))
            .await?;

        let mut candles = parse_candles(&body)?;
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }
        Ok(candles)
    }
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CandleRow {
    /// Bucket open time in ms.
    t: i64,
    o: String,
    h: String,
    l: String,
    c: String,
    v: String,
}

fn price(field: &str, raw: &str) -> Result<f64> {
    raw.parse::<f64>()
        .map_err(|e| Error::Exchange(format!("bad candle {field} '{raw}': {e}")))
}

/// Parse a `candleSnapshot` response, sorted oldest first.
pub fn parse_candles(body: &str) -> Result<Vec<Candle>> {
    let rows: Vec<CandleRow> = serde_json::from_str(body)?;
    let mut candles = rows
        .into_iter()
        .map(|row| {
            let timestamp = Utc
                .timestamp_millis_opt(row.t)
                .single()
                .ok_or_else(|| Error::Exchange(format!("bad candle time {}", row.t)))?;
            Ok(Candle {
                timestamp,
                open: price("open", &row.o)?,
                high: price("high", &row.h)?,
                low: price("low", &row.l)?,
                close: price("close", &row.c)?,
                volume: price("volume", &row.v)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    candles.sort_by_key(|c| c.timestamp);
    Ok(candles)
}
