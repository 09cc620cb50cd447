//! Read-only position mirror for observers.
//!
//! The manager actor is the only writer; the hunter and the status
//! surface read through this handle without touching actor state.

use dashmap::DashMap;
use liq_core::{PositionKey, Price, Qty, TradeDirection};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An open position as tracked by the manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedPosition {
    pub key: PositionKey,
    /// Signed amount; negative for short in one-way mode.
    pub amount: Decimal,
    pub entry_price: Price,
    pub mark_price: Price,
    pub unrealized_pnl: Decimal,
    pub updated_at_ms: i64,
}

impl TrackedPosition {
    /// Unsigned position quantity.
    pub fn qty(&self) -> Qty {
        Qty::new(self.amount.abs())
    }

    /// Notional value at the last known mark.
    pub fn notional_usdt(&self) -> Decimal {
        self.amount.abs() * self.mark_price.inner()
    }

    /// Profit relative to entry, percent, signed by direction.
    ///
    /// Returns None when the entry price is zero.
    pub fn pnl_percent(&self) -> Option<Decimal> {
        let raw = self.mark_price.pct_from(self.entry_price)?;
        Some(match self.key.direction {
            TradeDirection::Long => raw,
            TradeDirection::Short => -raw,
        })
    }
}

/// Copy-on-read mirror of the manager's position map.
#[derive(Debug, Clone, Default)]
pub struct PositionBook {
    inner: Arc<DashMap<PositionKey, TrackedPosition>>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.inner.len()
    }

    /// Total notional exposure for one symbol across directions.
    pub fn notional_usdt(&self, symbol: &str) -> Decimal {
        self.inner
            .iter()
            .filter(|entry| entry.key().symbol == symbol)
            .map(|entry| entry.value().notional_usdt())
            .sum()
    }

    pub fn get(&self, key: &PositionKey) -> Option<TrackedPosition> {
        self.inner.get(key).map(|entry| entry.value().clone())
    }

    pub fn snapshot(&self) -> Vec<TrackedPosition> {
        self.inner.iter().map(|entry| entry.value().clone()).collect()
    }

    pub(crate) fn upsert(&self, position: TrackedPosition) {
        self.inner.insert(position.key.clone(), position);
    }

    pub(crate) fn remove(&self, key: &PositionKey) {
        self.inner.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liq_core::PositionMode;
    use rust_decimal_macros::dec;

    fn position(symbol: &str, direction: TradeDirection, amount: Decimal) -> TrackedPosition {
        TrackedPosition {
            key: PositionKey::new(symbol, direction, PositionMode::OneWay),
            amount,
            entry_price: Price::new(dec!(100)),
            mark_price: Price::new(dec!(101)),
            unrealized_pnl: Decimal::ZERO,
            updated_at_ms: 0,
        }
    }

    #[test]
    fn test_pnl_percent_signed_by_direction() {
        let long = position("BTCUSDT", TradeDirection::Long, dec!(1));
        assert_eq!(long.pnl_percent().unwrap(), dec!(1));

        let short = position("BTCUSDT", TradeDirection::Short, dec!(-1));
        assert_eq!(short.pnl_percent().unwrap(), dec!(-1));
    }

    #[test]
    fn test_book_notional_sums_per_symbol() {
        let book = PositionBook::new();
        book.upsert(position("BTCUSDT", TradeDirection::Long, dec!(2)));
        book.upsert(position("ETHUSDT", TradeDirection::Long, dec!(5)));
        assert_eq!(book.notional_usdt("BTCUSDT"), dec!(202));
        assert_eq!(book.count(), 2);
    }
}
