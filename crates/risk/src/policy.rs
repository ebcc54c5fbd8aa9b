use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use common::{Config, OrderIntent, OrderSide, PositionSide, SlopeReading};

use crate::tracker::AccountSnapshot;

/// Hard cap on tiered levels per cycle, regardless of `num_levels` or margin.
/// Compiled-in so a bad config cannot over-leverage the account.
pub const MAX_AFFORDABLE_LEVELS: usize = 3;

/// Reduce-only closes are priced this far through the market so they fill.
pub const CLOSE_PRICE_OFFSET: f64 = 0.001;

/// Each level out from the first is this much larger than the base size.
pub const LEVEL_SIZE_STEP: f64 = 0.5;

/// User-configurable order sizing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPolicy {
    pub leverage: f64,
    /// Fractional spacing between levels (0.0005 = 0.05%).
    pub level_spacing: f64,
    pub num_levels: usize,
    pub min_order_size: f64,
    /// Minimum notional per order in USDC.
    pub min_order_value: f64,
}

impl Default for OrderPolicy {
    fn default() -> Self {
        Self {
            leverage: 3.0,
            level_spacing: 0.0005,
            num_levels: 5,
            min_order_size: 0.1,
            min_order_value: 10.0,
        }
    }
}

impl OrderPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            leverage: cfg.leverage as f64,
            level_spacing: cfg.level_spacing_percent,
            num_levels: cfg.num_levels,
            min_order_size: cfg.min_order_size,
            min_order_value: cfg.min_order_value,
        }
    }
}

/// Relationship between the current position and the slope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeState {
    /// No slope available yet.
    Idle,
    /// Positions agree with the slope direction.
    Aligned,
    /// At least one position conflicts with the slope direction.
    Opposed,
    /// No position.
    Flat,
}

impl std::fmt::Display for TradeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeState::Idle => write!(f, "idle"),
            TradeState::Aligned => write!(f, "aligned"),
            TradeState::Opposed => write!(f, "opposed"),
            TradeState::Flat => write!(f, "flat"),
        }
    }
}

/// Why a cycle placed nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HoldReason {
    InsufficientData,
    NoPrice,
    MarginTooLow { available: f64, minimum: f64 },
    NothingToReduce { side: OrderSide },
    NoAffordableLevels,
}

impl std::fmt::Display for HoldReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HoldReason::InsufficientData => write!(f, "insufficient indicator data"),
            HoldReason::NoPrice => write!(f, "no market price yet"),
            HoldReason::MarginTooLow { available, minimum } => {
                write!(f, "available margin ${available:.2} below minimum ${minimum:.2}")
            }
            HoldReason::NothingToReduce { side } => {
                write!(f, "no positions can be reduced with {side} orders")
            }
            HoldReason::NoAffordableLevels => {
                write!(f, "no level fits the margin and minimum order value")
            }
        }
    }
}

/// Outcome of one decision cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Hold(HoldReason),
    /// Positions opposed to the slope, closed in full with reduce-only orders.
    CloseOpposed(Vec<OrderIntent>),
    /// Reduce-only orders instead of new exposure.
    Reduce(Vec<OrderIntent>),
    /// Tiered orders opening exposure on `side`.
    Open { side: OrderSide, intents: Vec<OrderIntent> },
}

impl Decision {
    pub fn intents(&self) -> &[OrderIntent] {
        match self {
            Decision::Hold(_) => &[],
            Decision::CloseOpposed(i) | Decision::Reduce(i) => i,
            Decision::Open { intents, .. } => intents,
        }
    }

    pub fn is_hold(&self) -> bool {
        matches!(self, Decision::Hold(_))
    }
}

/// Turns slope, price and an account snapshot into order intents.
///
/// Pure: it never talks to the exchange. The control loop owns refreshing,
/// cancelling and submitting.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    policy: OrderPolicy,
}

impl DecisionEngine {
    pub fn new(policy: OrderPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &OrderPolicy {
        &self.policy
    }

    pub fn classify(reading: Option<&SlopeReading>, snapshot: &AccountSnapshot) -> TradeState {
        let Some(reading) = reading else {
            return TradeState::Idle;
        };
        if !snapshot.has_position() {
            return TradeState::Flat;
        }
        if snapshot
            .positions
            .iter()
            .any(|p| conflicts(p.side, reading.slope))
        {
            TradeState::Opposed
        } else {
            TradeState::Aligned
        }
    }

    /// Reduce-only closes for every position opposed to the slope, at full
    /// size. Needs no margin. `None` when nothing is opposed.
    pub fn critical_override(
        &self,
        slope: f64,
        price: f64,
        snapshot: &AccountSnapshot,
    ) -> Option<Vec<OrderIntent>> {
        let intents: Vec<OrderIntent> = snapshot
            .positions
            .iter()
            .filter(|p| conflicts(p.side, slope))
            .filter_map(|p| {
                let side = p.side.closing_side()?;
                warn!(
                    position = %p.side,
                    size = p.size,
                    slope_pct = slope * 100.0,
                    "CRITICAL: position opposite to slope direction, closing with reduce-only order"
                );
                Some(OrderIntent::reduce_only(side, p.size, close_price(side, price)))
            })
            .collect();

        if intents.is_empty() {
            None
        } else {
            Some(intents)
        }
    }

    /// Run the full policy for one cycle.
    pub fn decide(
        &self,
        reading: Option<&SlopeReading>,
        price: f64,
        snapshot: &AccountSnapshot,
    ) -> Decision {
        let Some(reading) = reading else {
            return Decision::Hold(HoldReason::InsufficientData);
        };
        if !(price > 0.0 && price.is_finite()) {
            return Decision::Hold(HoldReason::NoPrice);
        }

        if let Some(intents) = self.critical_override(reading.slope, price, snapshot) {
            return Decision::CloseOpposed(intents);
        }

        let margin = snapshot.available_margin;
        if margin < self.policy.min_order_value {
            return Decision::Hold(HoldReason::MarginTooLow {
                available: margin,
                minimum: self.policy.min_order_value,
            });
        }

        // Zero slope falls on the sell side.
        let side = if reading.slope > 0.0 {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        };

        if self.should_reduce_only(side, reading, snapshot) {
            let intents = self.reduce_only_orders(side, price, snapshot);
            if intents.is_empty() {
                return Decision::Hold(HoldReason::NothingToReduce { side });
            }
            return Decision::Reduce(intents);
        }

        let intents = self.tiered_orders(side, price, margin);
        if intents.is_empty() {
            return Decision::Hold(HoldReason::NoAffordableLevels);
        }
        Decision::Open { side, intents }
    }

    fn should_reduce_only(
        &self,
        side: OrderSide,
        reading: &SlopeReading,
        snapshot: &AccountSnapshot,
    ) -> bool {
        if snapshot
            .positions
            .iter()
            .any(|p| p.side.closing_side() == Some(side))
        {
            info!(%side, "Using reduce-only because opposite position exists");
            return true;
        }
        if reading.direction_changed && snapshot.has_position() {
            info!("Using reduce-only because slope direction changed with existing position");
            return true;
        }
        false
    }

    fn reduce_only_orders(
        &self,
        side: OrderSide,
        price: f64,
        snapshot: &AccountSnapshot,
    ) -> Vec<OrderIntent> {
        snapshot
            .positions
            .iter()
            .filter(|p| p.side.closing_side() == Some(side))
            .map(|p| OrderIntent::reduce_only(side, p.size, close_price(side, price)))
            .collect()
    }

    /// Base level size from margin × leverage, floored by the minimum order
    /// value and minimum order size.
    pub fn base_order_size(&self, margin: f64, price: f64) -> f64 {
        let p = &self.policy;
        let min_size_for_value = p.min_order_value / price;
        let mut size = (margin * p.leverage / price).max(min_size_for_value);
        if size < p.min_order_size {
            debug!(size, minimum = p.min_order_size, "Position size below minimum, using minimum");
            size = p.min_order_size;
        }
        if size * price < p.min_order_value {
            size = min_size_for_value;
        }
        size
    }

    /// Level prices are marketable: buys above the price, sells below.
    pub fn level_prices(&self, side: OrderSide, price: f64) -> Vec<f64> {
        (0..self.policy.num_levels)
            .map(|i| {
                let offset = (i + 1) as f64 * self.policy.level_spacing;
                match side {
                    OrderSide::Buy => price * (1.0 + offset),
                    OrderSide::Sell => price * (1.0 - offset),
                }
            })
            .collect()
    }

    fn tiered_orders(&self, side: OrderSide, price: f64, margin: f64) -> Vec<OrderIntent> {
        let p = &self.policy;
        let base = self.base_order_size(margin, price);
        let max_order_value = margin * p.leverage;
        let level_value = base * price;
        // The epsilon keeps an exact fit (base sized from the full margin)
        // from flooring to zero after the divide/multiply round trip.
        let affordable =
            ((max_order_value / level_value + 1e-9).floor() as usize).min(MAX_AFFORDABLE_LEVELS);
        let levels = p.num_levels.min(affordable);

        info!(
            affordable,
            levels,
            base_size = base,
            available_margin = margin,
            "Sizing tiered orders"
        );

        self.level_prices(side, price)
            .into_iter()
            .take(levels)
            .enumerate()
            .filter_map(|(i, level_price)| {
                let size = base * (1.0 + i as f64 * LEVEL_SIZE_STEP);
                let value = size * level_price;
                if value < p.min_order_value {
                    debug!(
                        level = i + 1,
                        value,
                        minimum = p.min_order_value,
                        "Skipping level below minimum order value"
                    );
                    return None;
                }
                Some(OrderIntent::limit(side, size, level_price))
            })
            .collect()
    }
}

fn conflicts(side: PositionSide, slope: f64) -> bool {
    (side == PositionSide::Long && slope < 0.0) || (side == PositionSide::Short && slope > 0.0)
}

fn close_price(side: OrderSide, price: f64) -> f64 {
    match side {
        OrderSide::Sell => price * (1.0 - CLOSE_PRICE_OFFSET),
        OrderSide::Buy => price * (1.0 + CLOSE_PRICE_OFFSET),
    }
}
