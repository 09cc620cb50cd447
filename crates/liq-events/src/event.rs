//! Event union published by the core.

use liq_core::{
    ErrorKind, LiquidationEvent, PositionSide, Price, Qty, Side, TradeDirection,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Toast severity for host notification surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastLevel {
    Info,
    Warning,
    Error,
}

/// A surfaced error, `{kind, component, symbol?, code?, message, timestamp}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub component: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    pub message: String,
    pub timestamp_ms: i64,
}

/// Structured outbound event.
///
/// Serialized with a `type` tag matching the host-facing event names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BotEvent {
    #[serde(rename_all = "camelCase")]
    LiquidationDetected {
        event: LiquidationEvent,
        volume_usdt: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    TradeOpportunity {
        symbol: String,
        side: Side,
        direction: TradeDirection,
        volume_usdt: Decimal,
        liquidation_price: Price,
        paper: bool,
        timestamp_ms: i64,
    },
    #[serde(rename_all = "camelCase")]
    PositionOpened {
        symbol: String,
        side: Side,
        direction: TradeDirection,
        position_side: PositionSide,
        qty: Qty,
        price: Price,
        #[serde(skip_serializing_if = "Option::is_none")]
        order_id: Option<u64>,
        paper: bool,
        timestamp_ms: i64,
    },
    #[serde(rename_all = "camelCase")]
    PositionUpdate {
        symbol: String,
        direction: TradeDirection,
        amount: Decimal,
        entry_price: Price,
        mark_price: Price,
        unrealized_pnl: Decimal,
        timestamp_ms: i64,
    },
    #[serde(rename_all = "camelCase")]
    PositionClosed {
        symbol: String,
        direction: TradeDirection,
        reason: String,
        paper: bool,
        timestamp_ms: i64,
    },
    #[serde(rename_all = "camelCase")]
    BalanceUpdate {
        asset: String,
        wallet_balance: Decimal,
        cross_wallet_balance: Decimal,
        balance_change: Decimal,
        timestamp_ms: i64,
    },
    #[serde(rename_all = "camelCase")]
    MarkPriceUpdate {
        symbol: String,
        mark_price: Price,
        timestamp_ms: i64,
    },
    Error(ErrorEvent),
    #[serde(rename_all = "camelCase")]
    Toast {
        level: ToastLevel,
        title: String,
        message: String,
    },
}

impl BotEvent {
    /// Host-facing tag, matching the serialized `type` field.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::LiquidationDetected { .. } => "liquidationDetected",
            Self::TradeOpportunity { .. } => "tradeOpportunity",
            Self::PositionOpened { .. } => "positionOpened",
            Self::PositionUpdate { .. } => "positionUpdate",
            Self::PositionClosed { .. } => "positionClosed",
            Self::BalanceUpdate { .. } => "balanceUpdate",
            Self::MarkPriceUpdate { .. } => "markPriceUpdate",
            Self::Error(_) => "error",
            Self::Toast { .. } => "toast",
        }
    }
}
