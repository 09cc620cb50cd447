//! Position manager: reconciliation, protective-order pairing, and
//! auto-close policy.
//!
//! A single actor task owns the position and protective-order maps;
//! everything else observes through the read-only [`PositionBook`]
//! mirror. Each open position is kept paired with exactly one stop-loss
//! and one take-profit order on the exchange, re-issued whenever a
//! reconciliation pass finds them missing.

pub mod book;
pub mod manager;
pub mod protective;

pub use book::{PositionBook, TrackedPosition};
pub use manager::{PositionEvent, PositionManager};
pub use protective::ProtectiveOrders;
