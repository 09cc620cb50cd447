//! Protective-order arithmetic and preservation rules.
//!
//! Pure functions: target computation, near-mark adjustment, and the
//! rule deciding whether a live open order still protects a position.

use crate::book::TrackedPosition;
use liq_core::{PositionKey, PositionMode, Price, Qty, SymbolConfig, TradeDirection};
use liq_registry::PrecisionRegistry;
use liq_rest::model::OpenOrder;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A TP closer to mark than this fraction is adjusted outward.
const TP_MIN_GAP: Decimal = Decimal::from_parts(3, 0, 0, false, 3); // 0.003

/// Tracked protective order ids for one position key.
///
/// At most one active stop-loss and one take-profit per key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectiveOrders {
    pub sl_order_id: Option<u64>,
    pub tp_order_id: Option<u64>,
}

impl ProtectiveOrders {
    pub fn is_complete(&self) -> bool {
        self.sl_order_id.is_some() && self.tp_order_id.is_some()
    }

    /// Ids still present, for cancellation.
    pub fn ids(&self) -> impl Iterator<Item = u64> {
        self.sl_order_id.into_iter().chain(self.tp_order_id)
    }
}

/// Snapped SL/TP trigger prices for a position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProtectionTargets {
    pub sl: Price,
    pub tp: Price,
}

/// Compute tick-snapped protective targets from the entry price.
///
/// Long: `SL = entry x (1 - sl%/100)`, `TP = entry x (1 + tp%/100)`;
/// mirrored for short.
pub fn protection_targets(
    registry: &PrecisionRegistry,
    symbol: &str,
    direction: TradeDirection,
    entry: Price,
    config: &SymbolConfig,
) -> ProtectionTargets {
    let hundred = Decimal::ONE_HUNDRED;
    let (sl_factor, tp_factor) = match direction {
        TradeDirection::Long => (
            Decimal::ONE - config.sl_percent / hundred,
            Decimal::ONE + config.tp_percent / hundred,
        ),
        TradeDirection::Short => (
            Decimal::ONE + config.sl_percent / hundred,
            Decimal::ONE - config.tp_percent / hundred,
        ),
    };
    ProtectionTargets {
        sl: registry.format_price(symbol, entry * sl_factor),
        tp: registry.format_price(symbol, entry * tp_factor),
    }
}

/// Pull a feasible-but-too-close TP out to `mark +- 0.3%` (sign by
/// side), snapped.
pub fn adjust_tp_near_mark(
    registry: &PrecisionRegistry,
    symbol: &str,
    direction: TradeDirection,
    tp: Price,
    mark: Price,
) -> Price {
    if mark.is_zero() {
        return tp;
    }
    let gap = ((tp.inner() - mark.inner()) / mark.inner()).abs();
    if gap >= TP_MIN_GAP {
        return tp;
    }
    let adjusted = match direction {
        TradeDirection::Long => mark * (Decimal::ONE + TP_MIN_GAP),
        TradeDirection::Short => mark * (Decimal::ONE - TP_MIN_GAP),
    };
    registry.format_price(symbol, adjusted)
}

/// Whether the position has sailed past its TP far enough for the
/// periodic sweep to close it at market.
pub fn past_runaway_tp(position: &TrackedPosition, config: &SymbolConfig) -> bool {
    match position.pnl_percent() {
        Some(pnl) => pnl >= config.tp_percent * Decimal::new(15, 1),
        None => false,
    }
}

/// Whether the TP would trigger immediately if posted now.
pub fn past_tp_at_placement(position: &TrackedPosition, config: &SymbolConfig) -> bool {
    match position.pnl_percent() {
        Some(pnl) => pnl >= config.tp_percent,
        None => false,
    }
}

/// Preservation rule for a tracked protective order id.
///
/// The id survives a reconciliation pass iff a live open order with
/// that id exists, sits on the closing side of the position, carries a
/// reduce-only flag appropriate for the account mode, and covers at
/// least the position quantity.
pub fn order_preserves(open: &OpenOrder, key: &PositionKey, position_qty: Qty) -> bool {
    if open.symbol != key.symbol {
        return false;
    }
    if open.side != key.direction.closing_side() {
        return false;
    }
    match key.mode {
        PositionMode::OneWay => {
            if !open.reduce_only {
                return false;
            }
        }
        PositionMode::Hedge => {
            if open.position_side != key.position_side() {
                return false;
            }
        }
    }
    open.orig_qty >= position_qty.inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use liq_core::{OrderStatus, OrderType, Side};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn registry() -> PrecisionRegistry {
        let mut symbols = HashMap::new();
        symbols.insert(
            "BTCUSDT".to_string(),
            liq_registry::SymbolFilters {
                tick_size: dec!(0.10),
                step_size: dec!(0.001),
                min_qty: dec!(0.001),
                max_qty: dec!(1000),
                min_notional: dec!(5),
                price_decimals: 1,
                qty_decimals: 3,
            },
        );
        PrecisionRegistry::from_filters(symbols)
    }

    fn config(tp: Decimal, sl: Decimal) -> SymbolConfig {
        let raw = serde_json::json!({
            "long_volume_threshold_usdt": "10000",
            "short_volume_threshold_usdt": "10000",
            "trade_size": "0.001",
            "tp_percent": tp.to_string(),
            "sl_percent": sl.to_string(),
        });
        serde_json::from_value(raw).unwrap()
    }

    fn long_position(entry: Decimal, mark: Decimal) -> TrackedPosition {
        TrackedPosition {
            key: PositionKey::new("BTCUSDT", TradeDirection::Long, PositionMode::OneWay),
            amount: dec!(0.001),
            entry_price: Price::new(entry),
            mark_price: Price::new(mark),
            unrealized_pnl: Decimal::ZERO,
            updated_at_ms: 0,
        }
    }

    #[test]
    fn test_targets_for_long_entry() {
        // Entry at 49975 with 2% SL and 1% TP.
        let targets = protection_targets(
            &registry(),
            "BTCUSDT",
            TradeDirection::Long,
            Price::new(dec!(49975)),
            &config(dec!(1), dec!(2)),
        );
        assert_eq!(targets.sl, Price::new(dec!(48975.5)));
        assert_eq!(targets.tp, Price::new(dec!(50474.8)));
    }

    #[test]
    fn test_targets_mirrored_for_short() {
        let targets = protection_targets(
            &registry(),
            "BTCUSDT",
            TradeDirection::Short,
            Price::new(dec!(50000)),
            &config(dec!(1), dec!(2)),
        );
        assert_eq!(targets.sl, Price::new(dec!(51000)));
        assert_eq!(targets.tp, Price::new(dec!(49500)));
    }

    #[test]
    fn test_past_tp_at_placement() {
        // 1% profit against a 0.5% TP target.
        let position = long_position(dec!(100), dec!(101));
        assert!(past_tp_at_placement(&position, &config(dec!(0.5), dec!(2))));
        assert!(!past_tp_at_placement(&position, &config(dec!(2), dec!(2))));
    }

    #[test]
    fn test_runaway_sweep_threshold_is_one_and_a_half_tp() {
        let config = config(dec!(1), dec!(2));
        assert!(!past_runaway_tp(&long_position(dec!(100), dec!(101.4)), &config));
        assert!(past_runaway_tp(&long_position(dec!(100), dec!(101.5)), &config));
    }

    #[test]
    fn test_tp_near_mark_adjusted_outward() {
        let registry = registry();
        // TP within 0.3% of mark gets pushed to mark * 1.003.
        let adjusted = adjust_tp_near_mark(
            &registry,
            "BTCUSDT",
            TradeDirection::Long,
            Price::new(dec!(50010)),
            Price::new(dec!(50000)),
        );
        assert_eq!(adjusted, Price::new(dec!(50150)));

        // A comfortable TP is untouched.
        let untouched = adjust_tp_near_mark(
            &registry,
            "BTCUSDT",
            TradeDirection::Long,
            Price::new(dec!(50500)),
            Price::new(dec!(50000)),
        );
        assert_eq!(untouched, Price::new(dec!(50500)));
    }

    fn open_order(side: Side, reduce_only: bool, qty: Decimal) -> OpenOrder {
        serde_json::from_value(serde_json::json!({
            "orderId": 1001,
            "symbol": "BTCUSDT",
            "status": "NEW",
            "clientOrderId": "liq_1_ab",
            "side": side,
            "type": "STOP_MARKET",
            "price": "0",
            "origQty": qty.to_string(),
            "executedQty": "0",
            "reduceOnly": reduce_only,
            "positionSide": "BOTH"
        }))
        .unwrap()
    }

    #[test]
    fn test_order_preserved_when_matching() {
        let key = PositionKey::new("BTCUSDT", TradeDirection::Long, PositionMode::OneWay);
        let order = open_order(Side::Sell, true, dec!(0.001));
        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.order_type, OrderType::StopMarket);
        assert!(order_preserves(&order, &key, Qty::new(dec!(0.001))));
    }

    #[test]
    fn test_order_cleared_on_wrong_side_or_short_qty() {
        let key = PositionKey::new("BTCUSDT", TradeDirection::Long, PositionMode::OneWay);
        assert!(!order_preserves(
            &open_order(Side::Buy, true, dec!(0.001)),
            &key,
            Qty::new(dec!(0.001))
        ));
        assert!(!order_preserves(
            &open_order(Side::Sell, false, dec!(0.001)),
            &key,
            Qty::new(dec!(0.001))
        ));
        assert!(!order_preserves(
            &open_order(Side::Sell, true, dec!(0.0005)),
            &key,
            Qty::new(dec!(0.001))
        ));
    }
}
