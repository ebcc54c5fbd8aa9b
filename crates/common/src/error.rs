use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Insufficient data: have {have}, need {need}")]
    InsufficientData { have: usize, need: usize },

    #[error("Division by zero in slope: reference indicator value is 0")]
    DivisionByZero,

    #[error("Exchange API error: {0}")]
    Exchange(String),

    #[error("Order submission failed: {0}")]
    OrderSubmission(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Errors that mean "not enough history yet, skip this cycle".
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, Error::InsufficientData { .. } | Error::DivisionByZero)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
