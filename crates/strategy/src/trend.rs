use tracing::{info, warn};

use common::{Candle, Error, Result, SlopeReading, Trade};

use crate::candles::{CandleAggregator, Ingest};
use crate::config::TrendConfig;
use crate::indicators::{AlmaIndicator, SlopeDetector, SlopeState};

/// Candle buffer, indicator and slope state for one market.
///
/// This is the shared market state: the feed loop pushes trades in, the
/// control loop reads the latest slope and price out.
#[derive(Debug, Clone)]
pub struct TrendTracker {
    candles: CandleAggregator,
    alma: AlmaIndicator,
    slope: SlopeDetector,
    latest_price: f64,
    min_candles: usize,
}

impl TrendTracker {
    pub fn new(cfg: &TrendConfig) -> Result<Self> {
        Ok(Self {
            candles: CandleAggregator::new(cfg.lookback_periods, cfg.bucket_ms()?),
            alma: AlmaIndicator::new(cfg.window, cfg.offset, cfg.sigma),
            slope: SlopeDetector::new(cfg.slope_lookback),
            latest_price: 0.0,
            min_candles: cfg.min_candles(),
        })
    }

    /// Seed the buffer with historical candles and compute the first slope.
    pub fn bootstrap(&mut self, history: Vec<Candle>) -> Result<SlopeState> {
        self.candles.seed(history);
        if let Some(last) = self.candles.last() {
            self.latest_price = last.close;
        }
        info!(
            candles = self.candles.len(),
            price = self.latest_price,
            "Candle buffer seeded"
        );
        self.recompute()
    }

    /// Feed one trade. Returns the recomputed slope when the trade opened a
    /// new candle.
    pub fn on_trade(&mut self, trade: &Trade) -> Option<Result<SlopeState>> {
        if trade.price > 0.0 && trade.price.is_finite() {
            self.latest_price = trade.price;
        }
        match self.candles.ingest(trade) {
            Ingest::Appended => Some(self.recompute()),
            Ingest::Updated | Ingest::Ignored => None,
        }
    }

    /// Recompute the ALMA series over the whole buffer and update the slope.
    pub fn recompute(&mut self) -> Result<SlopeState> {
        let have = self.candles.len();
        if have < self.min_candles {
            warn!(
                have,
                need = self.min_candles,
                "Not enough candles to calculate ALMA slope"
            );
            return Err(Error::InsufficientData {
                have,
                need: self.min_candles,
            });
        }

        let series = self.alma.compute(&self.candles.closes());
        let state = self.slope.update(&series)?;

        if state.flipped {
            info!(
                to = %state.direction,
                previous_slope = state.previous_slope,
                "ALMA slope direction changed"
            );
        }
        info!(
            alma = state.alma,
            slope_pct = state.slope * 100.0,
            direction = %state.direction,
            "ALMA slope updated"
        );
        Ok(state)
    }

    /// Latest slope reading, if one has been computed.
    pub fn reading(&self) -> Option<SlopeReading> {
        self.slope.state().map(SlopeState::reading)
    }

    /// Clear the flip flag if no newer flip arrived since `reading`.
    pub fn acknowledge_flip(&mut self, reading: &SlopeReading) -> bool {
        self.slope.acknowledge_flip(reading.flip_seq)
    }

    pub fn latest_price(&self) -> f64 {
        self.latest_price
    }

    pub fn candles(&self) -> &CandleAggregator {
        &self.candles
    }
}
