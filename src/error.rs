//! Domain errors with stable machine-readable kinds.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors returned by engine operations.
///
/// Every variant maps to a stable kind string so callers can branch without
/// parsing the human-readable message.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("Insufficient balance: need ${required}, have ${available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("{0}")]
    InvalidValue(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Strategy {0} is already running")]
    AlreadyRunning(String),
}

impl SimError {
    /// Stable machine-readable kind for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            SimError::InsufficientBalance { .. } => "insufficient_balance",
            SimError::MissingField(_) => "missing_field",
            SimError::InvalidValue(_) => "invalid_value",
            SimError::NotFound(_) => "not_found",
            SimError::AlreadyRunning(_) => "already_running",
        }
    }
}
