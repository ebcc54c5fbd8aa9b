use chrono::{DateTime, Utc};
use tracing::debug;

use common::{AccountApi, ExchangePosition, OrderSide, Position, PositionSide, Result};

/// One authoritative view of the account: positions and margin fetched
/// together and installed together.
#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    pub positions: Vec<Position>,
    /// Free balance × safety factor.
    pub available_margin: f64,
    /// Increments on every installed refresh.
    pub generation: u64,
    pub taken_at: DateTime<Utc>,
}

impl AccountSnapshot {
    pub fn empty() -> Self {
        Self {
            positions: Vec::new(),
            available_margin: 0.0,
            generation: 0,
            taken_at: Utc::now(),
        }
    }

    pub fn has_position(&self) -> bool {
        !self.positions.is_empty()
    }

    /// Side of the first tracked position. With several simultaneous
    /// positions only the first one is reported.
    pub fn position_side(&self) -> Option<PositionSide> {
        self.positions.first().map(|p| p.side)
    }

    /// Total size that orders on `side` can reduce.
    pub fn size_to_reduce_for(&self, side: OrderSide) -> f64 {
        self.positions
            .iter()
            .filter(|p| p.side.closing_side() == Some(side))
            .map(|p| p.size)
            .sum()
    }
}

/// In-memory view of positions and available margin for one symbol.
///
/// Every refresh replaces the previous snapshot wholesale; nothing from an
/// older refresh survives into the next decision.
#[derive(Debug, Clone)]
pub struct PositionTracker {
    symbol: String,
    margin_safety_factor: f64,
    snapshot: AccountSnapshot,
}

impl PositionTracker {
    pub fn new(symbol: impl Into<String>, margin_safety_factor: f64) -> Self {
        Self {
            symbol: symbol.into(),
            margin_safety_factor,
            snapshot: AccountSnapshot::empty(),
        }
    }

    /// Fetch non-flat positions for the tracked symbol.
    pub async fn refresh_positions<A>(&self, api: &A) -> Result<Vec<Position>>
    where
        A: AccountApi + ?Sized,
    {
        let raw = api.fetch_positions(&self.symbol).await?;
        Ok(normalize_positions(raw))
    }

    /// Fetch free balance and apply the safety factor.
    pub async fn refresh_margin<A>(&self, api: &A) -> Result<f64>
    where
        A: AccountApi + ?Sized,
    {
        let balance = api.fetch_balance().await?;
        Ok(balance.free.max(0.0) * self.margin_safety_factor)
    }

    /// Fetch margin and positions, then replace the snapshot. If either
    /// fetch fails the previous snapshot is kept as-is.
    pub async fn refresh<A>(&mut self, api: &A) -> Result<&AccountSnapshot>
    where
        A: AccountApi + ?Sized,
    {
        let available_margin = self.refresh_margin(api).await?;
        let positions = self.refresh_positions(api).await?;
        Ok(self.install(positions, available_margin))
    }

    /// Replace the snapshot with already-fetched data.
    pub fn install(&mut self, positions: Vec<Position>, available_margin: f64) -> &AccountSnapshot {
        if positions.is_empty() {
            debug!("No current positions");
        }
        for p in &positions {
            debug!(
                side = %p.side,
                size = p.size,
                entry_price = p.entry_price,
                value = p.entry_value,
                symbol = %self.symbol,
                "Position"
            );
        }
        debug!(available_margin, "Available margin");

        self.snapshot = AccountSnapshot {
            positions,
            available_margin,
            generation: self.snapshot.generation + 1,
            taken_at: Utc::now(),
        };
        &self.snapshot
    }

    pub fn snapshot(&self) -> &AccountSnapshot {
        &self.snapshot
    }

    pub fn has_position(&self) -> bool {
        self.snapshot.has_position()
    }

    pub fn position_side(&self) -> Option<PositionSide> {
        self.snapshot.position_side()
    }

    pub fn size_to_reduce_for(&self, side: OrderSide) -> f64 {
        self.snapshot.size_to_reduce_for(side)
    }
}

/// Drop flat rows and fill in derived fields.
pub fn normalize_positions(raw: Vec<ExchangePosition>) -> Vec<Position> {
    let now = Utc::now();
    raw.into_iter()
        .filter(|p| p.side != PositionSide::Flat && p.size != 0.0)
        .map(|p| {
            let size = p.size.abs();
            Position {
                id: p.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                side: p.side,
                size,
                entry_price: p.entry_price,
                entry_value: size * p.entry_price,
                entry_time: now,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::{Balance, Error};
    use std::sync::Mutex;

    struct FakeAccount {
        balance: Mutex<Result<Balance>>,
        positions: Mutex<Vec<ExchangePosition>>,
    }

    impl FakeAccount {
        fn new(free: f64, positions: Vec<ExchangePosition>) -> Self {
            Self {
                balance: Mutex::new(Ok(Balance { total: free, free })),
                positions: Mutex::new(positions),
            }
        }
    }

    #[async_trait]
    impl AccountApi for FakeAccount {
        async fn fetch_balance(&self) -> Result<Balance> {
            match &*self.balance.lock().unwrap() {
                Ok(b) => Ok(*b),
                Err(e) => Err(Error::Exchange(e.to_string())),
            }
        }

        async fn fetch_positions(&self, _symbol: &str) -> Result<Vec<ExchangePosition>> {
            Ok(self.positions.lock().unwrap().clone())
        }

        async fn set_leverage(&self, _leverage: u32, _symbol: &str) -> Result<()> {
            Ok(())
        }
    }

    fn raw(side: PositionSide, size: f64, entry: f64) -> ExchangePosition {
        ExchangePosition {
            id: None,
            side,
            size,
            entry_price: entry,
        }
    }

    #[tokio::test]
    async fn refresh_filters_flat_and_applies_safety_factor() {
        let api = FakeAccount::new(
            100.0,
            vec![
                raw(PositionSide::Long, 2.0, 10.0),
                raw(PositionSide::Flat, 1.0, 10.0),
                raw(PositionSide::Short, 0.0, 10.0),
            ],
        );
        let mut tracker = PositionTracker::new("HYPE/USDC:USDC", 0.7);
        let snap = tracker.refresh(&api).await.unwrap();

        assert_eq!(snap.positions.len(), 1);
        assert!((snap.available_margin - 70.0).abs() < 1e-9);
        assert_eq!(snap.generation, 1);
        assert_eq!(snap.positions[0].entry_value, 20.0);
        assert_eq!(tracker.position_side(), Some(PositionSide::Long));
    }

    #[tokio::test]
    async fn refresh_replaces_rather_than_merges() {
        let api = FakeAccount::new(50.0, vec![raw(PositionSide::Long, 1.0, 10.0)]);
        let mut tracker = PositionTracker::new("X", 1.0);
        tracker.refresh(&api).await.unwrap();
        assert!(tracker.has_position());

        api.positions.lock().unwrap().clear();
        tracker.refresh(&api).await.unwrap();
        assert!(!tracker.has_position());
        assert_eq!(tracker.snapshot().generation, 2);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot() {
        let api = FakeAccount::new(50.0, vec![raw(PositionSide::Short, 3.0, 10.0)]);
        let mut tracker = PositionTracker::new("X", 1.0);
        tracker.refresh(&api).await.unwrap();

        *api.balance.lock().unwrap() = Err(Error::Exchange("down".into()));
        api.positions.lock().unwrap().clear();
        assert!(tracker.refresh(&api).await.is_err());

        let snap = tracker.snapshot();
        assert_eq!(snap.generation, 1);
        assert_eq!(snap.positions.len(), 1);
        assert_eq!(snap.available_margin, 50.0);
    }

    #[test]
    fn size_to_reduce_counts_only_reducible_positions() {
        let mut tracker = PositionTracker::new("X", 1.0);
        tracker.install(
            normalize_positions(vec![
                raw(PositionSide::Long, 1.5, 10.0),
                raw(PositionSide::Long, 0.5, 11.0),
                raw(PositionSide::Short, 4.0, 12.0),
            ]),
            10.0,
        );
        assert_eq!(tracker.size_to_reduce_for(OrderSide::Sell), 2.0);
        assert_eq!(tracker.size_to_reduce_for(OrderSide::Buy), 4.0);
    }

    #[test]
    fn negative_sizes_are_normalized() {
        let positions = normalize_positions(vec![raw(PositionSide::Short, -2.0, 5.0)]);
        assert_eq!(positions[0].size, 2.0);
        assert_eq!(positions[0].entry_value, 10.0);
    }
}
