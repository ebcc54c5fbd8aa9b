use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use common::{Config, ExchangeClient, OrderHandle, Result, SlopeReading};
use risk::{Decision, DecisionEngine, HoldReason, OrderPolicy, PositionTracker};

use crate::executor::OrderExecutor;
use crate::feed::SharedMarket;

/// Control loop cadence.
#[derive(Debug, Clone, Copy)]
pub struct ControlTiming {
    pub tick: Duration,
    /// Periodic account refresh, on top of the per-minute refresh.
    pub position_check: Duration,
    pub slope_check: Duration,
}

impl Default for ControlTiming {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            position_check: Duration::from_secs(5),
            slope_check: Duration::from_secs(10),
        }
    }
}

impl ControlTiming {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            tick: Duration::from_millis(cfg.control_tick_ms.max(1)),
            position_check: Duration::from_secs(cfg.position_check_interval),
            slope_check: Duration::from_secs(cfg.slope_check_interval),
        }
    }
}

/// Fires at most once per period. The first check is always due.
#[derive(Debug)]
struct Every {
    period: Duration,
    last: Option<Instant>,
}

impl Every {
    fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    fn due(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.period => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Periodic decide-and-place loop.
///
/// Owns the account snapshot, the decision engine and the handles of the
/// orders it placed. Reads slope and price from the shared market state,
/// holding the lock only long enough to copy them.
pub struct ControlLoop {
    market: SharedMarket,
    client: Arc<dyn ExchangeClient>,
    symbol: String,
    leverage: u32,
    tracker: PositionTracker,
    decisions: DecisionEngine,
    executor: OrderExecutor,
    active_orders: Vec<OrderHandle>,
    timing: ControlTiming,
    account_timer: Every,
    slope_timer: Every,
    last_refresh_minute: Option<i64>,
}

impl ControlLoop {
    pub fn new(cfg: &Config, market: SharedMarket, client: Arc<dyn ExchangeClient>) -> Self {
        let timing = ControlTiming::from_config(cfg);
        Self {
            executor: OrderExecutor::new(client.clone(), cfg.symbol.clone()),
            tracker: PositionTracker::new(cfg.symbol.clone(), cfg.margin_safety_factor),
            decisions: DecisionEngine::new(OrderPolicy::from_config(cfg)),
            market,
            client,
            symbol: cfg.symbol.clone(),
            leverage: cfg.leverage,
            active_orders: Vec::new(),
            timing,
            account_timer: Every::new(timing.position_check),
            slope_timer: Every::new(timing.slope_check),
            last_refresh_minute: None,
        }
    }

    /// Account side of the bootstrap: leverage, balance, positions, and a
    /// clean order book. Any error here is fatal to startup.
    pub async fn prepare(&mut self) -> Result<()> {
        self.client.set_leverage(self.leverage, &self.symbol).await?;
        info!(leverage = self.leverage, symbol = %self.symbol, "Leverage set");

        let balance = self.client.fetch_balance().await?;
        info!(total = balance.total, free = balance.free, "Initial balance");

        let snapshot = self.tracker.refresh(&*self.client).await?;
        info!(
            positions = snapshot.positions.len(),
            available_margin = snapshot.available_margin,
            "Account loaded"
        );

        self.executor.cancel_all().await?;
        self.active_orders.clear();
        Ok(())
    }

    /// Run forever. Call from `tokio::spawn`; the engine aborts the task on
    /// shutdown.
    pub async fn run(mut self) {
        info!(tick = ?self.timing.tick, "Starting order management loop");
        let mut ticker = tokio::time::interval(self.timing.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.tick(Instant::now()).await {
                error!(error = %e, "Control tick failed");
            }
        }
    }

    /// One control step: scheduled refreshes, the standalone critical
    /// check, then a full cycle.
    pub async fn tick(&mut self, now: Instant) -> Result<Decision> {
        if self.account_refresh_due(now) {
            match self.tracker.refresh(&*self.client).await {
                Ok(snapshot) => info!(
                    positions = snapshot.positions.len(),
                    available_margin = snapshot.available_margin,
                    generation = snapshot.generation,
                    "Account refreshed"
                ),
                Err(e) => warn!(error = %e, "Scheduled account refresh failed"),
            }
        }

        if self.slope_timer.due(now) {
            let mut market = self.market.lock().await;
            match market.recompute() {
                Ok(_) => {}
                Err(e) if e.is_insufficient_data() => debug!(error = %e, "Slope not available yet"),
                Err(e) => warn!(error = %e, "Slope recompute failed"),
            }
        }

        self.check_critical().await?;
        self.run_cycle().await
    }

    fn account_refresh_due(&mut self, now: Instant) -> bool {
        let minute = Utc::now().timestamp() / 60;
        let due = self.account_timer.due(now) || self.last_refresh_minute != Some(minute);
        if due {
            self.last_refresh_minute = Some(minute);
        }
        due
    }

    /// Close opposed positions against the current snapshot, without
    /// waiting for a fresh refresh. Returns the number of orders placed.
    pub async fn check_critical(&mut self) -> Result<usize> {
        let (reading, price) = self.market_view().await;
        let Some(reading) = reading else {
            return Ok(0);
        };
        if price <= 0.0 {
            return Ok(0);
        }
        let Some(intents) = self
            .decisions
            .critical_override(reading.slope, price, self.tracker.snapshot())
        else {
            return Ok(0);
        };

        self.cancel_active().await?;
        let placed = self.executor.submit(&intents).await;
        let count = placed.len();
        self.active_orders = placed;
        Ok(count)
    }

    /// Cancel, refresh, decide, submit.
    pub async fn run_cycle(&mut self) -> Result<Decision> {
        let (reading, price) = self.market_view().await;

        self.cancel_active().await?;
        self.tracker.refresh(&*self.client).await?;

        let snapshot = self.tracker.snapshot();
        let state = DecisionEngine::classify(reading.as_ref(), snapshot);
        let decision = self.decisions.decide(reading.as_ref(), price, snapshot);

        match &decision {
            Decision::Hold(reason @ HoldReason::MarginTooLow { .. }) => {
                info!(%state, %reason, "Not placing orders")
            }
            Decision::Hold(reason) => debug!(%state, %reason, "Not placing orders"),
            Decision::CloseOpposed(intents) | Decision::Reduce(intents) => {
                info!(%state, orders = intents.len(), "Placing reduce-only orders");
                self.active_orders = self.executor.submit(intents).await;
            }
            Decision::Open { side, intents } => {
                let placed = self.executor.submit(intents).await;
                info!(
                    %state,
                    %side,
                    placed = placed.len(),
                    requested = intents.len(),
                    "Placed tiered orders"
                );
                if !placed.is_empty() {
                    if let Some(reading) = &reading {
                        // A flip detected while submitting stays flagged
                        self.market.lock().await.acknowledge_flip(reading);
                    }
                }
                self.active_orders = placed;
            }
        }

        Ok(decision)
    }

    /// Best-effort cancel of every resting order for the symbol.
    pub async fn cancel_active(&mut self) -> Result<usize> {
        let cancelled = self.executor.cancel_all().await?;
        self.active_orders.clear();
        Ok(cancelled)
    }

    pub fn active_orders(&self) -> &[OrderHandle] {
        &self.active_orders
    }

    pub fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    async fn market_view(&self) -> (Option<SlopeReading>, f64) {
        let market = self.market.lock().await;
        (market.reading(), market.latest_price())
    }
}
