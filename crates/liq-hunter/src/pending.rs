//! Pending-entry ledger.
//!
//! One record per `(symbol, direction)` at most. A record starts under
//! a temporary key, is rebound to the server order id on placement
//! success, and is removed on fill, reject, or staleness (5 minutes).

use liq_core::TradeDirection;
use std::collections::HashMap;

/// Records older than this are stale and reaped.
pub const PENDING_TTL_MS: i64 = 5 * 60 * 1000;

/// One in-flight entry attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    /// `temp_<ts>_<symbol>_<side>` or the server order id.
    pub key: String,
    pub symbol: String,
    pub direction: TradeDirection,
    pub created_at_ms: i64,
}

/// Ledger of in-flight entries, owned by the hunter task.
#[derive(Debug, Default)]
pub struct PendingEntries {
    entries: HashMap<(String, TradeDirection), PendingEntry>,
}

impl PendingEntries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has(&self, symbol: &str, direction: TradeDirection) -> bool {
        self.entries
            .contains_key(&(symbol.to_string(), direction))
    }

    /// Register a temporary record; returns its key, or `None` if one
    /// already exists for the pair.
    pub fn register_temp(
        &mut self,
        symbol: &str,
        direction: TradeDirection,
        now_ms: i64,
    ) -> Option<String> {
        let slot = (symbol.to_string(), direction);
        if self.entries.contains_key(&slot) {
            return None;
        }
        let key = format!("temp_{now_ms}_{symbol}_{}", direction.entry_side());
        self.entries.insert(
            slot,
            PendingEntry {
                key: key.clone(),
                symbol: symbol.to_string(),
                direction,
                created_at_ms: now_ms,
            },
        );
        Some(key)
    }

    /// Rebind a temporary record to the server order id.
    pub fn confirm(&mut self, symbol: &str, direction: TradeDirection, order_id: u64) {
        if let Some(entry) = self.entries.get_mut(&(symbol.to_string(), direction)) {
            entry.key = order_id.to_string();
        }
    }

    /// Drop the record for a pair.
    pub fn remove(&mut self, symbol: &str, direction: TradeDirection) -> Option<PendingEntry> {
        self.entries.remove(&(symbol.to_string(), direction))
    }

    /// Drop a record bound to the given server order id.
    pub fn remove_by_order_id(&mut self, symbol: &str, order_id: u64) -> Option<PendingEntry> {
        let id = order_id.to_string();
        let slot = self
            .entries
            .iter()
            .find(|((s, _), entry)| s == symbol && entry.key == id)
            .map(|(slot, _)| slot.clone())?;
        self.entries.remove(&slot)
    }

    /// Remove and return records older than the TTL.
    pub fn reap_stale(&mut self, now_ms: i64) -> Vec<PendingEntry> {
        let stale: Vec<(String, TradeDirection)> = self
            .entries
            .iter()
            .filter(|(_, entry)| now_ms - entry.created_at_ms >= PENDING_TTL_MS)
            .map(|(slot, _)| slot.clone())
            .collect();
        stale
            .into_iter()
            .filter_map(|slot| self.entries.remove(&slot))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_record_per_pair() {
        let mut pending = PendingEntries::new();
        let key = pending
            .register_temp("BTCUSDT", TradeDirection::Long, 1_000)
            .expect("first registration");
        assert_eq!(key, "temp_1000_BTCUSDT_BUY");
        // Second registration for the same pair is refused.
        assert!(pending
            .register_temp("BTCUSDT", TradeDirection::Long, 1_100)
            .is_none());
        // Other direction is independent.
        assert!(pending
            .register_temp("BTCUSDT", TradeDirection::Short, 1_100)
            .is_some());
        assert_eq!(pending.len(), 2);
    }

    #[test]
    fn test_confirm_rebinds_to_order_id() {
        let mut pending = PendingEntries::new();
        pending.register_temp("BTCUSDT", TradeDirection::Long, 1_000);
        pending.confirm("BTCUSDT", TradeDirection::Long, 42);
        assert!(pending.remove_by_order_id("BTCUSDT", 42).is_some());
        assert!(pending.is_empty());
    }

    #[test]
    fn test_reaper_removes_only_stale() {
        let mut pending = PendingEntries::new();
        pending.register_temp("BTCUSDT", TradeDirection::Long, 0);
        pending.register_temp("ETHUSDT", TradeDirection::Short, 200_000);

        let reaped = pending.reap_stale(PENDING_TTL_MS);
        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].symbol, "BTCUSDT");
        assert!(pending.has("ETHUSDT", TradeDirection::Short));
    }
}
