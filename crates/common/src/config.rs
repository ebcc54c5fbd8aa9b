use std::str::FromStr;

use crate::{Error, Result};

/// All configuration loaded from environment variables at startup.
/// Every key is optional; a missing or unparsable value falls back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    // Market
    pub symbol: String,
    pub coin: String,
    pub timeframe: String,
    pub lookback_periods: usize,

    // Indicator
    pub alma_window: usize,
    pub alma_offset: f64,
    pub alma_sigma: f64,
    pub slope_lookback: usize,

    // Orders
    pub leverage: u32,
    pub base_order_size: f64,
    pub level_spacing_percent: f64,
    pub num_levels: usize,
    pub min_order_size: f64,
    pub min_order_value: f64,
    pub margin_safety_factor: f64,

    // Scheduling (seconds unless noted)
    pub position_check_interval: u64,
    pub slope_check_interval: u64,
    pub control_tick_ms: u64,

    // Endpoints
    pub hyperliquid_api_url: String,
    pub hyperliquid_ws_url: String,

    // Simulated account
    pub paper_balance_usd: f64,
    pub paper_slippage_bps: f64,

    pub log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbol: "HYPE/USDC:USDC".to_string(),
            coin: "HYPE".to_string(),
            timeframe: "1m".to_string(),
            lookback_periods: 20,
            alma_window: 9,
            alma_offset: 0.85,
            alma_sigma: 6.0,
            slope_lookback: 2,
            leverage: 3,
            base_order_size: 0.65,
            level_spacing_percent: 0.0005,
            num_levels: 5,
            min_order_size: 0.1,
            min_order_value: 10.0,
            margin_safety_factor: 0.7,
            position_check_interval: 5,
            slope_check_interval: 10,
            control_tick_ms: 1000,
            hyperliquid_api_url: "https://api.hyperliquid.xyz".to_string(),
            hyperliquid_ws_url: "wss://api.hyperliquid.xyz/ws".to_string(),
            paper_balance_usd: 1000.0,
            paper_slippage_bps: 0.0,
            log_file: "alma_slope_strategy.log".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the environment. Loads `.env` if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Config::default();
        let string = |key: &str, default: String| lookup(key).unwrap_or(default);

        Config {
            symbol: string("SYMBOL", d.symbol),
            coin: string("COIN", d.coin),
            timeframe: string("TIMEFRAME", d.timeframe),
            lookback_periods: parsed(&lookup, "LOOKBACK_PERIODS", d.lookback_periods),
            alma_window: parsed(&lookup, "ALMA_WINDOW", d.alma_window),
            alma_offset: parsed(&lookup, "ALMA_OFFSET", d.alma_offset),
            alma_sigma: parsed(&lookup, "ALMA_SIGMA", d.alma_sigma),
            slope_lookback: parsed(&lookup, "SLOPE_LOOKBACK", d.slope_lookback),
            leverage: parsed(&lookup, "LEVERAGE", d.leverage),
            base_order_size: parsed(&lookup, "BASE_ORDER_SIZE", d.base_order_size),
            level_spacing_percent: parsed(
                &lookup,
                "LEVEL_SPACING_PERCENT",
                d.level_spacing_percent,
            ),
            num_levels: parsed(&lookup, "NUM_LEVELS", d.num_levels),
            min_order_size: parsed(&lookup, "MIN_ORDER_SIZE", d.min_order_size),
            min_order_value: parsed(&lookup, "MIN_ORDER_VALUE", d.min_order_value),
            margin_safety_factor: parsed(
                &lookup,
                "MARGIN_SAFETY_FACTOR",
                d.margin_safety_factor,
            ),
            position_check_interval: parsed(
                &lookup,
                "POSITION_CHECK_INTERVAL",
                d.position_check_interval,
            ),
            slope_check_interval: parsed(
                &lookup,
                "SLOPE_CHECK_INTERVAL",
                d.slope_check_interval,
            ),
            control_tick_ms: parsed(&lookup, "CONTROL_TICK_MS", d.control_tick_ms),
            hyperliquid_api_url: string("HYPERLIQUID_API_URL", d.hyperliquid_api_url),
            hyperliquid_ws_url: string("HYPERLIQUID_WS_URL", d.hyperliquid_ws_url),
            paper_balance_usd: parsed(&lookup, "PAPER_BALANCE_USD", d.paper_balance_usd),
            paper_slippage_bps: parsed(&lookup, "PAPER_SLIPPAGE_BPS", d.paper_slippage_bps),
            log_file: string("LOG_FILE", d.log_file),
        }
    }

    /// Reject parameter combinations the indicator or order logic cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.alma_window < 2 {
            return Err(Error::Config(format!(
                "ALMA_WINDOW must be >= 2, got {}",
                self.alma_window
            )));
        }
        if !(self.alma_offset > 0.0 && self.alma_offset < 1.0) {
            return Err(Error::Config(format!(
                "ALMA_OFFSET must be in (0, 1), got {}",
                self.alma_offset
            )));
        }
        if !(self.alma_sigma > 0.0 && self.alma_sigma.is_finite()) {
            return Err(Error::Config(format!(
                "ALMA_SIGMA must be > 0, got {}",
                self.alma_sigma
            )));
        }
        if self.slope_lookback == 0 {
            return Err(Error::Config("SLOPE_LOOKBACK must be >= 1".into()));
        }
        let needed = self.alma_window + self.slope_lookback;
        if self.lookback_periods < needed {
            return Err(Error::Config(format!(
                "LOOKBACK_PERIODS ({}) must be at least ALMA_WINDOW + SLOPE_LOOKBACK ({needed})",
                self.lookback_periods
            )));
        }
        if self.leverage == 0 {
            return Err(Error::Config("LEVERAGE must be >= 1".into()));
        }
        if !(self.margin_safety_factor > 0.0 && self.margin_safety_factor <= 1.0) {
            return Err(Error::Config(format!(
                "MARGIN_SAFETY_FACTOR must be in (0, 1], got {}",
                self.margin_safety_factor
            )));
        }
        if timeframe_millis(&self.timeframe).is_none() {
            return Err(Error::Config(format!(
                "TIMEFRAME '{}' is not one of 1m, 3m, 5m, 15m, 30m, 1h, 2h, 4h, 8h, 12h, 1d",
                self.timeframe
            )));
        }
        Ok(())
    }
}

/// Bucket width in milliseconds for a timeframe string such as `1m` or `4h`.
pub fn timeframe_millis(timeframe: &str) -> Option<i64> {
    let ms = match timeframe {
        "1m" => 60_000,
        "3m" => 3 * 60_000,
        "5m" => 5 * 60_000,
        "15m" => 15 * 60_000,
        "30m" => 30 * 60_000,
        "1h" => 3_600_000,
        "2h" => 2 * 3_600_000,
        "4h" => 4 * 3_600_000,
        "8h" => 8 * 3_600_000,
        "12h" => 12 * 3_600_000,
        "1d" => 86_400_000,
        _ => return None,
    };
    Some(ms)
}

fn parsed<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let cfg = Config::from_lookup(|_| None);
        assert_eq!(cfg.alma_window, 9);
        assert_eq!(cfg.slope_lookback, 2);
        assert_eq!(cfg.num_levels, 5);
        assert_eq!(cfg.symbol, "HYPE/USDC:USDC");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn values_override_defaults() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("ALMA_WINDOW", "12"),
            ("LEVERAGE", "5"),
            ("MIN_ORDER_VALUE", "25.5"),
            ("COIN", "ETH"),
        ]));
        assert_eq!(cfg.alma_window, 12);
        assert_eq!(cfg.leverage, 5);
        assert!((cfg.min_order_value - 25.5).abs() < 1e-12);
        assert_eq!(cfg.coin, "ETH");
    }

    #[test]
    fn unparsable_value_falls_back_to_default() {
        let cfg = Config::from_lookup(lookup_from(&[("NUM_LEVELS", "many")]));
        assert_eq!(cfg.num_levels, 5);
    }

    #[test]
    fn validate_rejects_short_lookback() {
        let cfg = Config::from_lookup(lookup_from(&[("LOOKBACK_PERIODS", "10")]));
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn validate_rejects_offset_out_of_range() {
        let cfg = Config::from_lookup(lookup_from(&[("ALMA_OFFSET", "1.0")]));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_nan_sigma() {
        let cfg = Config::from_lookup(lookup_from(&[("ALMA_SIGMA", "NaN")]));
        assert!(cfg.alma_sigma.is_nan());
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn validate_bounds_margin_safety_factor() {
        for bad in ["0", "-0.5", "1.5", "NaN"] {
            let cfg = Config::from_lookup(lookup_from(&[("MARGIN_SAFETY_FACTOR", bad)]));
            assert!(cfg.validate().is_err(), "accepted {bad}");
        }
        let cfg = Config::from_lookup(lookup_from(&[("MARGIN_SAFETY_FACTOR", "1")]));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_unknown_timeframe() {
        let cfg = Config::from_lookup(lookup_from(&[("TIMEFRAME", "7m")]));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn timeframe_widths() {
        assert_eq!(timeframe_millis("1m"), Some(60_000));
        assert_eq!(timeframe_millis("1h"), Some(3_600_000));
        assert_eq!(timeframe_millis("1w"), None);
    }
}
