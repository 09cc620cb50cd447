//! Raw venue frames and their translation into typed payloads.
//!
//! The venue sends numeric values as strings and uses single-letter
//! field names; everything is renamed and parsed here, at the edge.

use crate::error::WsResult;
use liq_core::{
    AccountUpdate, BalanceDelta, LiquidationEvent, MarkPrice, OrderStatus, OrderType, OrderUpdate,
    PositionDelta, PositionSide, Price, Qty, Side, TimeInForce,
};
use rust_decimal::Decimal;
use serde::Deserialize;

/// A frame demultiplexed by its `e` event-type tag.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "e")]
pub enum RawFrame {
    #[serde(rename = "forceOrder")]
    ForceOrder(RawForceOrder),
    #[serde(rename = "markPriceUpdate")]
    MarkPrice(RawMarkPrice),
    #[serde(rename = "ACCOUNT_UPDATE")]
    AccountUpdate(RawAccountUpdate),
    #[serde(rename = "ORDER_TRADE_UPDATE")]
    OrderTradeUpdate(RawOrderTradeUpdate),
    #[serde(rename = "listenKeyExpired")]
    ListenKeyExpired(RawListenKeyExpired),
}

/// Market feeds deliver either a single frame or an array of frames
/// (`@arr` streams batch one frame per symbol).
pub fn parse_market_frames(text: &str) -> WsResult<Vec<RawFrame>> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        Ok(serde_json::from_str(text)?)
    } else {
        Ok(vec![serde_json::from_str(text)?])
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawForceOrder {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "o")]
    pub order: RawForceOrderDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawForceOrderDetail {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "S")]
    pub side: Side,
    #[serde(rename = "o")]
    pub order_type: OrderType,
    #[serde(rename = "q")]
    pub qty: Decimal,
    #[serde(rename = "p")]
    pub price: Decimal,
    #[serde(rename = "ap")]
    pub avg_price: Decimal,
    #[serde(rename = "X", default)]
    pub status: Option<OrderStatus>,
    /// Cumulative filled quantity.
    #[serde(rename = "z", default)]
    pub filled_qty: Option<Decimal>,
    #[serde(rename = "T", default)]
    pub trade_time: Option<i64>,
}

impl RawForceOrder {
    pub fn into_event(self) -> LiquidationEvent {
        let filled = self.order.filled_qty.unwrap_or(self.order.qty);
        LiquidationEvent {
            symbol: self.order.symbol,
            side: self.order.side,
            order_type: self.order.order_type,
            price: Price::new(self.order.price),
            avg_price: Price::new(self.order.avg_price),
            filled_qty: Qty::new(filled),
            event_time_ms: self.event_time,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMarkPrice {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub mark_price: Decimal,
}

impl RawMarkPrice {
    pub fn into_event(self) -> MarkPrice {
        MarkPrice {
            symbol: self.symbol,
            mark_price: Price::new(self.mark_price),
            event_time_ms: self.event_time,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAccountUpdate {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "a")]
    pub data: RawAccountData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAccountData {
    #[serde(rename = "B", default)]
    pub balances: Vec<RawBalance>,
    #[serde(rename = "P", default)]
    pub positions: Vec<RawPosition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBalance {
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "wb")]
    pub wallet_balance: Decimal,
    #[serde(rename = "cw")]
    pub cross_wallet_balance: Decimal,
    #[serde(rename = "bc", default)]
    pub balance_change: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPosition {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "pa")]
    pub position_amount: Decimal,
    #[serde(rename = "ep")]
    pub entry_price: Decimal,
    #[serde(rename = "cr", default)]
    pub accumulated_realized: Decimal,
    #[serde(rename = "up")]
    pub unrealized_pnl: Decimal,
    #[serde(rename = "mt", default)]
    pub margin_type: String,
    #[serde(rename = "iw", default)]
    pub isolated_wallet: Decimal,
    #[serde(rename = "ps")]
    pub position_side: PositionSide,
}

impl RawAccountUpdate {
    pub fn into_event(self) -> AccountUpdate {
        AccountUpdate {
            event_time_ms: self.event_time,
            balances: self
                .data
                .balances
                .into_iter()
                .map(|b| BalanceDelta {
                    asset: b.asset,
                    wallet_balance: b.wallet_balance,
                    cross_wallet_balance: b.cross_wallet_balance,
                    balance_change: b.balance_change,
                })
                .collect(),
            positions: self
                .data
                .positions
                .into_iter()
                .map(|p| PositionDelta {
                    symbol: p.symbol,
                    amount: p.position_amount,
                    entry_price: Price::new(p.entry_price),
                    accumulated_realized: p.accumulated_realized,
                    unrealized_pnl: p.unrealized_pnl,
                    margin_type: p.margin_type,
                    isolated_wallet: p.isolated_wallet,
                    position_side: p.position_side,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawOrderTradeUpdate {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "o")]
    pub order: RawOrderDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawOrderDetail {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c", default)]
    pub client_order_id: String,
    #[serde(rename = "S")]
    pub side: Side,
    #[serde(rename = "o")]
    pub order_type: OrderType,
    #[serde(rename = "f", default)]
    pub time_in_force: Option<TimeInForce>,
    #[serde(rename = "q")]
    pub qty: Decimal,
    #[serde(rename = "p")]
    pub price: Decimal,
    #[serde(rename = "ap", default)]
    pub avg_price: Decimal,
    #[serde(rename = "sp", default)]
    pub stop_price: Decimal,
    #[serde(rename = "X")]
    pub status: OrderStatus,
    #[serde(rename = "i")]
    pub order_id: u64,
    #[serde(rename = "l", default)]
    pub last_filled_qty: Decimal,
    #[serde(rename = "L", default)]
    pub last_filled_price: Decimal,
    #[serde(rename = "R", default)]
    pub reduce_only: bool,
    #[serde(rename = "ps", default = "default_position_side")]
    pub position_side: PositionSide,
}

fn default_position_side() -> PositionSide {
    PositionSide::Both
}

impl RawOrderTradeUpdate {
    pub fn into_event(self) -> OrderUpdate {
        OrderUpdate {
            symbol: self.order.symbol,
            order_id: self.order.order_id,
            client_order_id: self.order.client_order_id,
            side: self.order.side,
            order_type: self.order.order_type,
            time_in_force: self.order.time_in_force.unwrap_or_default(),
            qty: Qty::new(self.order.qty),
            price: Price::new(self.order.price),
            avg_price: Price::new(self.order.avg_price),
            stop_price: Price::new(self.order.stop_price),
            status: self.order.status,
            last_filled_qty: Qty::new(self.order.last_filled_qty),
            last_filled_price: Price::new(self.order.last_filled_price),
            reduce_only: self.order.reduce_only,
            position_side: self.order.position_side,
            event_time_ms: self.event_time,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawListenKeyExpired {
    #[serde(rename = "E", default)]
    pub event_time: i64,
}
