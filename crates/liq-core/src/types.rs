//! Trading enums and position identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a position: long or short.
///
/// Distinct from `Side`: an entry order for a long is a BUY, the
/// closing order is a SELL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeDirection {
    Long,
    Short,
}

impl TradeDirection {
    /// The order side that opens a position in this direction.
    pub fn entry_side(&self) -> Side {
        match self {
            Self::Long => Side::Buy,
            Self::Short => Side::Sell,
        }
    }

    /// The order side that reduces or closes a position in this direction.
    pub fn closing_side(&self) -> Side {
        self.entry_side().opposite()
    }

    /// Direction opened by the given entry side.
    pub fn from_entry_side(side: Side) -> Self {
        match side {
            Side::Buy => Self::Long,
            Side::Sell => Self::Short,
        }
    }

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "LONG",
            Self::Short => "SHORT",
        }
    }
}

impl fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position side tag carried on orders and positions.
///
/// `BOTH` in one-way mode; `LONG`/`SHORT` in hedge mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionSide {
    Both,
    Long,
    Short,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Both => "BOTH",
            Self::Long => "LONG",
            Self::Short => "SHORT",
        }
    }

    /// Tag for an order in the given account mode and direction.
    pub fn for_order(mode: PositionMode, direction: TradeDirection) -> Self {
        match mode {
            PositionMode::OneWay => Self::Both,
            PositionMode::Hedge => match direction {
                TradeDirection::Long => Self::Long,
                TradeDirection::Short => Self::Short,
            },
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account-wide position mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionMode {
    #[default]
    OneWay,
    Hedge,
}

impl PositionMode {
    /// Suffix used in position keys.
    pub fn key_tag(&self) -> &'static str {
        match self {
            Self::OneWay => "BOTH",
            Self::Hedge => "HEDGE",
        }
    }

    /// Value of the venue's `dualSidePosition` flag for this mode.
    pub fn dual_side(&self) -> bool {
        matches!(self, Self::Hedge)
    }

    pub fn from_dual_side(dual: bool) -> Self {
        if dual {
            Self::Hedge
        } else {
            Self::OneWay
        }
    }
}

/// Order type on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Limit,
    Market,
    Stop,
    StopMarket,
    TakeProfit,
    TakeProfitMarket,
    TrailingStopMarket,
    Liquidation,
    #[serde(other)]
    Other,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Limit => "LIMIT",
            Self::Market => "MARKET",
            Self::Stop => "STOP",
            Self::StopMarket => "STOP_MARKET",
            Self::TakeProfit => "TAKE_PROFIT",
            Self::TakeProfitMarket => "TAKE_PROFIT_MARKET",
            Self::TrailingStopMarket => "TRAILING_STOP_MARKET",
            Self::Liquidation => "LIQUIDATION",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order status on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
    #[serde(other)]
    Other,
}

impl OrderStatus {
    /// Whether the order can no longer fill.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Canceled | Self::Rejected | Self::Expired
        )
    }
}

/// Time-in-force for orders.
///
/// `Gtx` is the venue's post-only flavor: the order is rejected if it
/// would take liquidity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    #[default]
    Gtc,
    Ioc,
    Fok,
    Gtx,
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gtc => "GTC",
            Self::Ioc => "IOC",
            Self::Fok => "FOK",
            Self::Gtx => "GTX",
        }
    }
}

/// Dispatch priority for outbound REST requests.
///
/// Lower numeric value dispatches earlier. CRITICAL is reserved for
/// order placement and cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Critical = 0,
    High = 1,
    Medium = 2,
    Low = 3,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Self::Critical, Self::High, Self::Medium, Self::Low];

    #[inline]
    pub fn index(&self) -> usize {
        *self as usize
    }

    #[inline]
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Critical)
    }
}

/// Identity of a tracked position.
///
/// A position is identified by its symbol, its direction, and the
/// account mode it was opened under. At most one stop-loss and one
/// take-profit order is active per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    pub symbol: String,
    pub direction: TradeDirection,
    pub mode: PositionMode,
}

impl PositionKey {
    pub fn new(symbol: impl Into<String>, direction: TradeDirection, mode: PositionMode) -> Self {
        Self {
            symbol: symbol.into(),
            direction,
            mode,
        }
    }

    /// Position-side tag carried on orders for this key.
    pub fn position_side(&self) -> PositionSide {
        PositionSide::for_order(self.mode, self.direction)
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.symbol, self.direction, self.mode.key_tag())
    }
}

/// Client order ID attached to every order we place.
///
/// Unique per attempt so retries never collide on the venue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientOrderId(String);

impl ClientOrderId {
    /// Create a new unique client order ID.
    ///
    /// Format: `liq_{timestamp_ms}_{uuid_short}` — within the venue's
    /// `^[\.A-Z\:/a-z0-9_-]{1,36}$` charset and length limit.
    pub fn new() -> Self {
        let ts = chrono::Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().simple().to_string()[..8];
        Self(format!("liq_{ts}_{uuid_short}"))
    }

    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientOrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_direction_sides() {
        assert_eq!(TradeDirection::Long.entry_side(), Side::Buy);
        assert_eq!(TradeDirection::Long.closing_side(), Side::Sell);
        assert_eq!(TradeDirection::Short.entry_side(), Side::Sell);
        assert_eq!(TradeDirection::from_entry_side(Side::Sell), TradeDirection::Short);
    }

    #[test]
    fn test_position_side_for_order() {
        assert_eq!(
            PositionSide::for_order(PositionMode::OneWay, TradeDirection::Long),
            PositionSide::Both
        );
        assert_eq!(
            PositionSide::for_order(PositionMode::Hedge, TradeDirection::Short),
            PositionSide::Short
        );
    }

    #[test]
    fn test_position_key_display() {
        let key = PositionKey::new("BTCUSDT", TradeDirection::Long, PositionMode::OneWay);
        assert_eq!(key.to_string(), "BTCUSDT_LONG_BOTH");

        let key = PositionKey::new("ETHUSDT", TradeDirection::Short, PositionMode::Hedge);
        assert_eq!(key.to_string(), "ETHUSDT_SHORT_HEDGE");
    }

    #[test]
    fn test_order_status_terminal() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(!OrderStatus::New.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Critical < Priority::High);
        assert!(Priority::High < Priority::Medium);
        assert_eq!(Priority::Low.index(), 3);
    }

    #[test]
    fn test_wire_enum_round_trip() {
        let status: OrderStatus = serde_json::from_str("\"PARTIALLY_FILLED\"").unwrap();
        assert_eq!(status, OrderStatus::PartiallyFilled);

        let ty: OrderType = serde_json::from_str("\"TAKE_PROFIT_MARKET\"").unwrap();
        assert_eq!(ty, OrderType::TakeProfitMarket);

        // Unknown tags must not fail the frame.
        let ty: OrderType = serde_json::from_str("\"SOMETHING_NEW\"").unwrap();
        assert_eq!(ty, OrderType::Other);
    }
}
