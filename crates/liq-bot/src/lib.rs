//! Host binary for the liquidation-hunting daemon.
//!
//! Wires the core components together: rate-limited REST, precision
//! registry, market and user-data streams, the hunter, and the
//! position manager. Owns configuration loading, logging, and
//! shutdown choreography.

pub mod app;
pub mod config;
pub mod error;
pub mod logging;

pub use app::Application;
pub use config::{ApiConfig, BotConfig};
pub use error::{AppError, AppResult};
