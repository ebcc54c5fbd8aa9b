use serde::{Deserialize, Serialize};

use common::{timeframe_millis, Config, Error, Result};

/// Indicator and candle-buffer parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrendConfig {
    /// ALMA window `W`.
    pub window: usize,
    /// Gaussian offset in (0, 1).
    pub offset: f64,
    pub sigma: f64,
    /// Slope lookback `K` in candles.
    pub slope_lookback: usize,
    /// Candle buffer length `L`.
    pub lookback_periods: usize,
    /// Candle timeframe, e.g. "1m".
    pub timeframe: String,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            window: 9,
            offset: 0.85,
            sigma: 6.0,
            slope_lookback: 2,
            lookback_periods: 20,
            timeframe: "1m".to_string(),
        }
    }
}

impl TrendConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            window: cfg.alma_window,
            offset: cfg.alma_offset,
            sigma: cfg.alma_sigma,
            slope_lookback: cfg.slope_lookback,
            lookback_periods: cfg.lookback_periods,
            timeframe: cfg.timeframe.clone(),
        }
    }

    /// Minimum number of candles before a slope can be produced.
    pub fn min_candles(&self) -> usize {
        self.window + self.slope_lookback
    }

    pub fn bucket_ms(&self) -> Result<i64> {
        timeframe_millis(&self.timeframe)
            .ok_or_else(|| Error::Config(format!("unknown timeframe '{}'", self.timeframe)))
    }
}
