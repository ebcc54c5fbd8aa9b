use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single trade print from the exchange stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub coin: String,
    pub price: f64,
    pub size: f64,
    pub timestamp: DateTime<Utc>,
}

/// One OHLCV bar. `timestamp` is the start of the time bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// A fresh bar opened by a single trade.
    pub fn opened_by(bucket: DateTime<Utc>, price: f64, size: f64) -> Self {
        Self {
            timestamp: bucket,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: size,
        }
    }
}

/// Side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Direction of an exchange position. `Flat` only ever appears in raw
/// exchange payloads; the tracker filters it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
    Flat,
}

impl PositionSide {
    /// The order side that reduces a position on this side.
    pub fn closing_side(self) -> Option<OrderSide> {
        match self {
            PositionSide::Long => Some(OrderSide::Sell),
            PositionSide::Short => Some(OrderSide::Buy),
            PositionSide::Flat => None,
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionSide::Long => write!(f, "LONG"),
            PositionSide::Short => write!(f, "SHORT"),
            PositionSide::Flat => write!(f, "FLAT"),
        }
    }
}

/// Raw position row as reported by the account API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangePosition {
    pub id: Option<String>,
    pub side: PositionSide,
    pub size: f64,
    pub entry_price: f64,
}

/// A tracked, non-flat position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub side: PositionSide,
    pub size: f64,
    pub entry_price: f64,
    pub entry_value: f64,
    pub entry_time: DateTime<Utc>,
}

/// Account balance in the settlement currency (USDC).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub total: f64,
    pub free: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

/// An order the decision engine wants placed. Consumed once by the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub side: OrderSide,
    pub size: f64,
    pub price: f64,
    pub reduce_only: bool,
}

impl OrderIntent {
    pub fn limit(side: OrderSide, size: f64, price: f64) -> Self {
        Self {
            side,
            size,
            price,
            reduce_only: false,
        }
    }

    pub fn reduce_only(side: OrderSide, size: f64, price: f64) -> Self {
        Self {
            side,
            size,
            price,
            reduce_only: true,
        }
    }

    pub fn notional(&self) -> f64 {
        self.size * self.price
    }
}

/// Exchange acknowledgement of an accepted order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderHandle {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub size: f64,
    pub price: f64,
    pub reduce_only: bool,
    pub created_at: DateTime<Utc>,
}

/// A resting order as listed by the order API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOrder {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub size: f64,
    pub price: f64,
    pub reduce_only: bool,
}

/// Sign of the indicator slope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlopeDirection {
    Positive,
    Negative,
    Flat,
}

impl SlopeDirection {
    pub fn of(slope: f64) -> Self {
        if slope > 0.0 {
            SlopeDirection::Positive
        } else if slope < 0.0 {
            SlopeDirection::Negative
        } else {
            SlopeDirection::Flat
        }
    }

    pub fn is_flat(self) -> bool {
        self == SlopeDirection::Flat
    }
}

impl std::fmt::Display for SlopeDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlopeDirection::Positive => write!(f, "POSITIVE"),
            SlopeDirection::Negative => write!(f, "NEGATIVE"),
            SlopeDirection::Flat => write!(f, "FLAT"),
        }
    }
}

/// Slope and flip state as seen by the decision engine for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlopeReading {
    pub alma: f64,
    pub slope: f64,
    pub direction: SlopeDirection,
    pub direction_changed: bool,
    /// Number of flips the detector has seen when this reading was taken.
    pub flip_seq: u64,
}

/// Lifecycle state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Stopped,
    Bootstrapping,
    Running,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Bootstrapping => write!(f, "bootstrapping"),
            EngineState::Running => write!(f, "running"),
        }
    }
}
