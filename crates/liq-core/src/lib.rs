//! Core domain types for the liquidation-hunting daemon.
//!
//! This crate provides the fundamental types shared across the system:
//! - `Price`, `Qty`: precision-safe numeric types
//! - `Side`, `TradeDirection`, `PositionSide`, `PositionMode`: trading enums
//! - `PositionKey`: identity of a tracked position
//! - Stream payloads: `LiquidationEvent`, `MarkPrice`, `AccountUpdate`,
//!   `OrderUpdate`
//! - `SymbolConfig` / `GlobalConfig`: loaded configuration
//! - `ErrorKind`: the error taxonomy surfaced on the event bus

pub mod config;
pub mod decimal;
pub mod error;
pub mod stream;
pub mod types;

pub use config::{GlobalConfig, RateLimitConfig, SymbolConfig};
pub use decimal::{Price, Qty};
pub use error::{CoreError, ErrorKind, Result};
pub use stream::{
    AccountUpdate, BalanceDelta, LiquidationEvent, MarkPrice, OrderUpdate, PositionDelta,
};
pub use types::{
    ClientOrderId, OrderStatus, OrderType, PositionKey, PositionMode, PositionSide, Priority, Side,
    TimeInForce, TradeDirection,
};
