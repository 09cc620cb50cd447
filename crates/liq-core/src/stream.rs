//! Parsed stream payloads.
//!
//! These are the typed forms the rest of the system consumes; raw wire
//! frames are parsed at the websocket edge and never travel further.

use crate::{OrderStatus, OrderType, PositionSide, Price, Qty, Side, TimeInForce};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A forced-liquidation order observed on the public stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidationEvent {
    pub symbol: String,
    /// Side of the liquidation order itself. SELL means longs were
    /// liquidated; BUY means shorts were.
    pub side: Side,
    pub order_type: OrderType,
    pub price: Price,
    pub avg_price: Price,
    pub filled_qty: Qty,
    pub event_time_ms: i64,
}

impl LiquidationEvent {
    /// Notional volume of the liquidation in quote units.
    pub fn volume_usdt(&self) -> Decimal {
        self.filled_qty.notional(self.price)
    }
}

/// Mark-price update from the public stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkPrice {
    pub symbol: String,
    pub mark_price: Price,
    pub event_time_ms: i64,
}

/// Per-asset balance change within an `ACCOUNT_UPDATE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceDelta {
    pub asset: String,
    pub wallet_balance: Decimal,
    pub cross_wallet_balance: Decimal,
    pub balance_change: Decimal,
}

/// Per-symbol position change within an `ACCOUNT_UPDATE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionDelta {
    pub symbol: String,
    /// Signed position amount; negative for net short.
    pub amount: Decimal,
    pub entry_price: Price,
    pub accumulated_realized: Decimal,
    pub unrealized_pnl: Decimal,
    pub margin_type: String,
    pub isolated_wallet: Decimal,
    pub position_side: PositionSide,
}

/// Authoritative account state change from the user-data stream.
///
/// The frame may carry only a subset of positions; absence of a symbol
/// says nothing about that symbol's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountUpdate {
    pub event_time_ms: i64,
    pub balances: Vec<BalanceDelta>,
    pub positions: Vec<PositionDelta>,
}

/// Normalized order record from an `ORDER_TRADE_UPDATE` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub symbol: String,
    pub order_id: u64,
    pub client_order_id: String,
    pub side: Side,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub qty: Qty,
    pub price: Price,
    pub avg_price: Price,
    pub stop_price: Price,
    pub status: OrderStatus,
    pub last_filled_qty: Qty,
    pub last_filled_price: Price,
    pub reduce_only: bool,
    pub position_side: PositionSide,
    pub event_time_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_liquidation_volume() {
        let event = LiquidationEvent {
            symbol: "BTCUSDT".to_string(),
            side: Side::Sell,
            order_type: OrderType::Limit,
            price: Price::new(dec!(50000)),
            avg_price: Price::new(dec!(50000)),
            filled_qty: Qty::new(dec!(0.3)),
            event_time_ms: 0,
        };
        assert_eq!(event.volume_usdt(), dec!(15000.0));
    }
}
