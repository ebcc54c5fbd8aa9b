use std::collections::VecDeque;

use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

use common::{Candle, Trade};

/// What `CandleAggregator::ingest` did with a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// Dropped: empty buffer, non-positive price/size, or a stale bucket.
    Ignored,
    /// Folded into the newest candle.
    Updated,
    /// Opened a new candle (the indicator must be recomputed).
    Appended,
}

/// Rolling OHLCV buffer built from trade ticks.
///
/// Holds at most `capacity` candles, newest last. Needs to be seeded with
/// history before it accepts ticks.
#[derive(Debug, Clone)]
pub struct CandleAggregator {
    candles: VecDeque<Candle>,
    capacity: usize,
    bucket_ms: i64,
}

impl CandleAggregator {
    pub fn new(capacity: usize, bucket_ms: i64) -> Self {
        assert!(capacity >= 1, "candle capacity must be >= 1");
        assert!(bucket_ms > 0, "bucket width must be positive");
        Self {
            candles: VecDeque::with_capacity(capacity + 1),
            capacity,
            bucket_ms,
        }
    }

    /// Replace the buffer with `history` (oldest first), keeping the newest
    /// `capacity` candles.
    pub fn seed(&mut self, history: Vec<Candle>) {
        self.candles.clear();
        let skip = history.len().saturating_sub(self.capacity);
        self.candles.extend(history.into_iter().skip(skip));
    }

    /// Start of the bucket containing `ts`.
    pub fn bucket_of(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let ms = ts.timestamp_millis();
        let start = ms - ms.rem_euclid(self.bucket_ms);
        Utc.timestamp_millis_opt(start).single().unwrap_or(ts)
    }

    pub fn ingest(&mut self, trade: &Trade) -> Ingest {
        if trade.price <= 0.0 || trade.size <= 0.0 || !trade.price.is_finite() {
            return Ingest::Ignored;
        }
        let bucket = self.bucket_of(trade.timestamp);

        let Some(last) = self.candles.back_mut() else {
            return Ingest::Ignored;
        };
        let last_bucket = last.timestamp.timestamp_millis()
            - last.timestamp.timestamp_millis().rem_euclid(self.bucket_ms);

        match bucket.timestamp_millis().cmp(&last_bucket) {
            std::cmp::Ordering::Equal => {
                last.high = last.high.max(trade.price);
                last.low = last.low.min(trade.price);
                last.close = trade.price;
                last.volume += trade.size;
                Ingest::Updated
            }
            std::cmp::Ordering::Greater => {
                self.candles
                    .push_back(Candle::opened_by(bucket, trade.price, trade.size));
                while self.candles.len() > self.capacity {
                    self.candles.pop_front();
                }
                Ingest::Appended
            }
            std::cmp::Ordering::Less => {
                debug!(ts = %trade.timestamp, "Dropping trade from a closed candle bucket");
                Ingest::Ignored
            }
        }
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.back()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: i64 = 60_000;
    const T0: i64 = 1_700_000_040_000; // aligned to a minute

    fn ts(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn trade(ms: i64, price: f64, size: f64) -> Trade {
        Trade {
            coin: "HYPE".into(),
            price,
            size,
            timestamp: ts(ms),
        }
    }

    fn seeded(capacity: usize) -> CandleAggregator {
        let mut agg = CandleAggregator::new(capacity, MINUTE);
        agg.seed(vec![Candle::opened_by(ts(T0), 10.0, 1.0)]);
        agg
    }

    #[test]
    fn empty_buffer_ignores_ticks() {
        let mut agg = CandleAggregator::new(5, MINUTE);
        assert_eq!(agg.ingest(&trade(T0, 10.0, 1.0)), Ingest::Ignored);
        assert!(agg.is_empty());
    }

    #[test]
    fn non_positive_values_are_ignored() {
        let mut agg = seeded(5);
        assert_eq!(agg.ingest(&trade(T0 + 1, 0.0, 1.0)), Ingest::Ignored);
        assert_eq!(agg.ingest(&trade(T0 + 1, 11.0, 0.0)), Ingest::Ignored);
        assert_eq!(agg.ingest(&trade(T0 + 1, -3.0, 1.0)), Ingest::Ignored);
        assert_eq!(agg.last().unwrap().close, 10.0);
    }

    #[test]
    fn same_bucket_folds_into_one_candle_then_next_bucket_opens() {
        let mut agg = seeded(5);
        assert_eq!(agg.ingest(&trade(T0 + 1_000, 12.0, 0.5)), Ingest::Updated);
        assert_eq!(agg.ingest(&trade(T0 + 20_000, 9.0, 0.25)), Ingest::Updated);
        assert_eq!(agg.ingest(&trade(T0 + 59_999, 11.0, 0.25)), Ingest::Updated);
        assert_eq!(agg.len(), 1);

        let c = agg.last().unwrap().clone();
        assert_eq!(c.open, 10.0);
        assert_eq!(c.high, 12.0);
        assert_eq!(c.low, 9.0);
        assert_eq!(c.close, 11.0);
        assert!((c.volume - 2.0).abs() < 1e-12);

        assert_eq!(agg.ingest(&trade(T0 + MINUTE + 5, 13.0, 1.0)), Ingest::Appended);
        assert_eq!(agg.len(), 2);
        let newest = agg.last().unwrap();
        assert_eq!(newest.timestamp, ts(T0 + MINUTE));
        assert_eq!(newest.open, 13.0);
        assert_eq!(newest.volume, 1.0);
        assert_eq!(agg.closes(), vec![11.0, 13.0]);
    }

    #[test]
    fn stale_bucket_is_dropped() {
        let mut agg = seeded(5);
        assert_eq!(agg.ingest(&trade(T0 - 1, 50.0, 1.0)), Ingest::Ignored);
        assert_eq!(agg.len(), 1);
        assert_eq!(agg.last().unwrap().high, 10.0);
    }

    #[test]
    fn buffer_never_exceeds_capacity() {
        let mut agg = seeded(3);
        for i in 1..=10 {
            agg.ingest(&trade(T0 + i * MINUTE, 10.0 + i as f64, 1.0));
            assert!(agg.len() <= 3);
        }
        assert_eq!(agg.closes(), vec![18.0, 19.0, 20.0]);
    }

    #[test]
    fn seed_keeps_newest() {
        let mut agg = CandleAggregator::new(2, MINUTE);
        agg.seed(
            (0..5)
                .map(|i| Candle::opened_by(ts(T0 + i * MINUTE), i as f64 + 1.0, 1.0))
                .collect(),
        );
        assert_eq!(agg.closes(), vec![4.0, 5.0]);
    }

    #[test]
    fn bucket_truncates_to_timeframe() {
        let agg = CandleAggregator::new(2, 5 * MINUTE);
        let b = agg.bucket_of(ts(T0 + 7 * MINUTE + 123));
        assert_eq!(b.timestamp_millis() % (5 * MINUTE), 0);
        assert!(b <= ts(T0 + 7 * MINUTE + 123));
    }
}
