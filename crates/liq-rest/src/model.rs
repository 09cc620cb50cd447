//! Wire DTOs for the venue's REST responses.
//!
//! Numeric fields arrive as strings; `rust_decimal` deserializes them
//! losslessly.

use liq_core::{OrderStatus, OrderType, PositionSide, Side, TimeInForce};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Venue error body, `{"code": -4061, "msg": "..."}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub msg: String,
}

/// Acknowledgement for a placed or cancelled order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAck {
    pub order_id: u64,
    pub symbol: String,
    pub status: OrderStatus,
    pub client_order_id: String,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub avg_price: Option<Decimal>,
    #[serde(default)]
    pub orig_qty: Option<Decimal>,
    #[serde(default)]
    pub executed_qty: Option<Decimal>,
    #[serde(default)]
    pub stop_price: Option<Decimal>,
    #[serde(default)]
    pub reduce_only: Option<bool>,
    #[serde(default)]
    pub position_side: Option<PositionSide>,
}

/// One row of `GET /fapi/v2/positionRisk`.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionRisk {
    pub symbol: String,
    #[serde(rename = "positionAmt")]
    pub position_amt: Decimal,
    #[serde(rename = "entryPrice")]
    pub entry_price: Decimal,
    #[serde(rename = "markPrice")]
    pub mark_price: Decimal,
    #[serde(rename = "unRealizedProfit")]
    pub unrealized_profit: Decimal,
    #[serde(rename = "liquidationPrice", default)]
    pub liquidation_price: Option<Decimal>,
    #[serde(rename = "leverage")]
    pub leverage: Decimal,
    #[serde(rename = "positionSide")]
    pub position_side: PositionSide,
}

/// One row of `GET /fapi/v2/balance`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    pub asset: String,
    pub balance: Decimal,
    pub cross_wallet_balance: Decimal,
    pub available_balance: Decimal,
}

/// Summary slice of `GET /fapi/v4/account`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub total_wallet_balance: Decimal,
    pub total_unrealized_profit: Decimal,
    pub available_balance: Decimal,
}

/// One row of `GET /fapi/v1/openOrders`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrder {
    pub order_id: u64,
    pub symbol: String,
    pub status: OrderStatus,
    pub client_order_id: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub price: Decimal,
    pub orig_qty: Decimal,
    pub executed_qty: Decimal,
    #[serde(default)]
    pub stop_price: Option<Decimal>,
    #[serde(default)]
    pub reduce_only: bool,
    pub position_side: PositionSide,
    #[serde(default)]
    pub time_in_force: Option<TimeInForce>,
}

/// `GET /fapi/v1/ticker/bookTicker` for one symbol.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookTicker {
    pub symbol: String,
    pub bid_price: Decimal,
    pub bid_qty: Decimal,
    pub ask_price: Decimal,
    pub ask_qty: Decimal,
}

/// A kline reduced to the fields the VWAP guard consumes.
///
/// The venue serializes klines as positional arrays; parsing happens in
/// `ExchangeApi::klines`.
#[derive(Debug, Clone, PartialEq)]
pub struct Kline {
    pub open_time_ms: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// `GET /fapi/v1/depth` snapshot.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthSnapshot {
    pub last_update_id: u64,
    /// `(price, qty)` best-first.
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
}

/// `GET /fapi/v1/exchangeInfo`, reduced to what the precision registry
/// consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub filters: Vec<RawFilter>,
}

/// Flat catch-all for the venue's filter objects. Unknown filter types
/// deserialize with every optional field absent.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFilter {
    #[serde(rename = "filterType")]
    pub filter_type: String,
    #[serde(rename = "tickSize", default)]
    pub tick_size: Option<Decimal>,
    #[serde(rename = "stepSize", default)]
    pub step_size: Option<Decimal>,
    #[serde(rename = "minQty", default)]
    pub min_qty: Option<Decimal>,
    #[serde(rename = "maxQty", default)]
    pub max_qty: Option<Decimal>,
    #[serde(rename = "minNotional", alias = "notional", default)]
    pub min_notional: Option<Decimal>,
}

/// `POST /fapi/v1/listenKey` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenKeyResponse {
    pub listen_key: String,
}

/// `GET /fapi/v1/positionSide/dual` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionModeResponse {
    pub dual_side_position: bool,
}
