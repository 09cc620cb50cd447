//! REST error types.
//!
//! Errors are `Clone` so deduplicated requests can fan one outcome out
//! to every waiter; transport failures are therefore carried as strings.

use liq_core::ErrorKind;
use thiserror::Error;

/// Errors produced by the REST stack.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RestError {
    /// Rejected pre-flight, before any wire traffic.
    #[error("validation failed: {0}")]
    Validation(String),

    /// HTTP 401/403 or signature mismatch.
    #[error("authentication failed (HTTP {status}): {message}")]
    Auth { status: u16, message: String },

    /// HTTP 429 or 418; the circuit breaker has opened.
    #[error("rate limited (HTTP {status}), backing off {backoff_secs}s")]
    RateLimited { status: u16, backoff_secs: u64 },

    /// Non-2xx response with a venue error body.
    #[error("exchange rejected request (HTTP {status}, code {code}): {message}")]
    Exchange {
        status: u16,
        code: i64,
        message: String,
    },

    /// Socket/DNS/timeout failures below HTTP.
    #[error("transport error: {0}")]
    Transport(String),

    /// The request exceeded its queue deadline without being sent.
    #[error("request timed out in queue after {waited_ms}ms")]
    QueueTimeout { waited_ms: u64 },

    /// A response arrived but did not parse as the expected shape.
    #[error("response parse error: {0}")]
    Parse(String),
}

impl RestError {
    /// Map onto the surfaced error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::RateLimited { .. } => ErrorKind::RateLimit,
            Self::Exchange { .. } => ErrorKind::ExchangeReject,
            Self::Transport(_) | Self::QueueTimeout { .. } => ErrorKind::Transport,
            Self::Parse(_) => ErrorKind::Internal,
        }
    }

    /// Venue error code, when the venue supplied one.
    pub fn exchange_code(&self) -> Option<i64> {
        match self {
            Self::Exchange { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Result type alias for REST operations.
pub type RestResult<T> = std::result::Result<T, RestError>;
