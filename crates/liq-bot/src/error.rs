//! Application-level errors.

use thiserror::Error;

/// Errors fatal to the host process.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] liq_core::CoreError),

    #[error(transparent)]
    Rest(#[from] liq_rest::RestError),

    #[error(transparent)]
    Registry(#[from] liq_registry::RegistryError),

    #[error("Stream failure: {0}")]
    Stream(#[from] liq_ws::WsError),
}

/// Result type alias for application operations.
pub type AppResult<T> = std::result::Result<T, AppError>;
