//! Error kinds and core error type.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of every error surfaced on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Missing symbol, bad credentials, malformed numeric bounds.
    Config,
    /// HTTP 401/403, signature mismatch.
    Auth,
    /// HTTP 429 or 418 (IP ban).
    RateLimit,
    /// Precision/notional/minimum rejected pre-flight.
    Validation,
    /// Order rejected by the venue (trigger-immediately, reduce-only
    /// conflict, position-mode mismatch, insufficient balance).
    ExchangeReject,
    /// Socket or HTTP timeouts, DNS, unreachable.
    Transport,
    /// Drift detected during reconciliation.
    State,
    /// Programmer error, invariant violation.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "CONFIG",
            Self::Auth => "AUTH",
            Self::RateLimit => "RATE_LIMIT",
            Self::Validation => "VALIDATION",
            Self::ExchangeReject => "EXCHANGE_REJECT",
            Self::Transport => "TRANSPORT",
            Self::State => "STATE",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
