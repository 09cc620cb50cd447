//! Liquidation hunter.
//!
//! Consumes the public liquidation feed and, where configured
//! thresholds and guards allow, opens counter-directed entries. The
//! pending-entry ledger enforces at most one in-flight entry per
//! `(symbol, side)` and a 30s reaper removes stale records.

pub mod hunter;
pub mod pending;
pub mod vwap;

pub use hunter::{Hunter, MarkPrices};
pub use pending::{PendingEntries, PendingEntry};
pub use vwap::{rolling_vwap, vwap_allows};
