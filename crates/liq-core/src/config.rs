//! Loaded configuration structures.
//!
//! The host loads and merges configuration; the core consumes these
//! structures read-only. Defaults follow the venue's published limits.

use crate::error::{CoreError, Result};
use crate::PositionMode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-symbol hunting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolConfig {
    /// Minimum liquidation volume (USDT) to trigger a LONG entry
    /// (longs being liquidated, i.e. SELL liquidation orders).
    pub long_volume_threshold_usdt: Decimal,
    /// Minimum liquidation volume (USDT) to trigger a SHORT entry.
    pub short_volume_threshold_usdt: Decimal,
    /// Base trade size in base-asset units.
    pub trade_size: Decimal,
    /// Optional per-direction size overrides.
    #[serde(default)]
    pub long_trade_size: Option<Decimal>,
    #[serde(default)]
    pub short_trade_size: Option<Decimal>,
    /// Leverage applied at startup.
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    /// Take-profit distance from entry, percent.
    #[serde(default = "default_tp_percent")]
    pub tp_percent: Decimal,
    /// Stop-loss distance from entry, percent.
    #[serde(default = "default_sl_percent")]
    pub sl_percent: Decimal,
    /// Offset from best bid/ask for LIMIT entries, basis points.
    #[serde(default = "default_price_offset_bps")]
    pub price_offset_bps: Decimal,
    /// Maximum tolerated distance from mid, basis points.
    #[serde(default = "default_max_slippage_bps")]
    pub max_slippage_bps: Decimal,
    /// Entry order type.
    #[serde(default)]
    pub order_type: EntryOrderType,
    /// Reject entries that would take liquidity.
    #[serde(default)]
    pub post_only: bool,
    /// Reject entries on the wrong side of rolling VWAP.
    #[serde(default)]
    pub vwap_protection: bool,
    /// Kline timeframe for the VWAP window (venue interval string).
    #[serde(default = "default_vwap_timeframe")]
    pub vwap_timeframe: String,
    /// Number of klines in the VWAP window.
    #[serde(default = "default_vwap_lookback")]
    pub vwap_lookback: u32,
    /// VWAP tolerance band, basis points.
    #[serde(default = "default_vwap_band_bps")]
    pub vwap_band_bps: Decimal,
    /// Maximum notional margin exposure for this symbol (USDT).
    #[serde(default = "default_max_position_margin_usdt")]
    pub max_position_margin_usdt: Decimal,
}

/// Entry order type (protective orders are always market-triggered).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryOrderType {
    #[default]
    Limit,
    Market,
}

fn default_leverage() -> u32 {
    5
}

fn default_tp_percent() -> Decimal {
    Decimal::ONE
}

fn default_sl_percent() -> Decimal {
    Decimal::TWO
}

fn default_price_offset_bps() -> Decimal {
    Decimal::from(5)
}

fn default_max_slippage_bps() -> Decimal {
    Decimal::from(50)
}

fn default_vwap_timeframe() -> String {
    "1m".to_string()
}

fn default_vwap_lookback() -> u32 {
    20
}

fn default_vwap_band_bps() -> Decimal {
    Decimal::from(10)
}

fn default_max_position_margin_usdt() -> Decimal {
    Decimal::from(200)
}

impl SymbolConfig {
    /// Effective trade size for the given direction.
    pub fn trade_size_for(&self, direction: crate::TradeDirection) -> Decimal {
        match direction {
            crate::TradeDirection::Long => self.long_trade_size.unwrap_or(self.trade_size),
            crate::TradeDirection::Short => self.short_trade_size.unwrap_or(self.trade_size),
        }
    }

    /// Validate numeric bounds. Violations are fatal at startup.
    pub fn validate(&self, symbol: &str) -> Result<()> {
        if self.long_volume_threshold_usdt < Decimal::ZERO
            || self.short_volume_threshold_usdt < Decimal::ZERO
        {
            return Err(CoreError::InvalidConfig(format!(
                "{symbol}: volume thresholds must be non-negative"
            )));
        }
        if self.trade_size <= Decimal::ZERO {
            return Err(CoreError::InvalidConfig(format!(
                "{symbol}: trade_size must be positive"
            )));
        }
        if self.leverage == 0 || self.leverage > 125 {
            return Err(CoreError::InvalidConfig(format!(
                "{symbol}: leverage must be in 1..=125"
            )));
        }
        if self.tp_percent <= Decimal::ZERO || self.sl_percent <= Decimal::ZERO {
            return Err(CoreError::InvalidConfig(format!(
                "{symbol}: tp_percent and sl_percent must be positive"
            )));
        }
        if self.max_slippage_bps < Decimal::ZERO || self.price_offset_bps < Decimal::ZERO {
            return Err(CoreError::InvalidConfig(format!(
                "{symbol}: bps offsets must be non-negative"
            )));
        }
        if self.vwap_protection && self.vwap_lookback == 0 {
            return Err(CoreError::InvalidConfig(format!(
                "{symbol}: vwap_lookback must be positive when vwap_protection is on"
            )));
        }
        Ok(())
    }
}

/// Rate-limit manager tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Weight budget per sliding 60s window.
    #[serde(default = "default_max_weight")]
    pub max_weight: u32,
    /// Order-count budget per sliding 60s window.
    #[serde(default = "default_max_order_count")]
    pub max_order_count: u32,
    /// Percent of each budget reserved for CRITICAL requests.
    #[serde(default = "default_reserve_percent")]
    pub reserve_percent: u32,
    /// Queue deadline per request (ms).
    #[serde(default = "default_queue_timeout_ms")]
    pub queue_timeout_ms: u64,
    /// Window in which identical keyed requests share one outcome (ms).
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,
    /// Enable request coalescing.
    #[serde(default = "default_dedup_enabled")]
    pub dedup_enabled: bool,
    /// Maximum concurrently in-flight requests.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_max_weight() -> u32 {
    2400
}

fn default_max_order_count() -> u32 {
    1200
}

fn default_reserve_percent() -> u32 {
    30
}

fn default_queue_timeout_ms() -> u64 {
    30_000
}

fn default_dedup_window_ms() -> u64 {
    1_000
}

fn default_dedup_enabled() -> bool {
    true
}

fn default_max_concurrent() -> usize {
    3
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_weight: default_max_weight(),
            max_order_count: default_max_order_count(),
            reserve_percent: default_reserve_percent(),
            queue_timeout_ms: default_queue_timeout_ms(),
            dedup_window_ms: default_dedup_window_ms(),
            dedup_enabled: default_dedup_enabled(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_weight == 0 || self.max_order_count == 0 {
            return Err(CoreError::InvalidConfig(
                "rate limit budgets must be positive".to_string(),
            ));
        }
        if self.reserve_percent >= 100 {
            return Err(CoreError::InvalidConfig(
                "reserve_percent must be below 100".to_string(),
            ));
        }
        if self.max_concurrent == 0 {
            return Err(CoreError::InvalidConfig(
                "max_concurrent must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Global trading configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Fraction of account balance risked per trade, percent.
    #[serde(default = "default_risk_percent")]
    pub risk_percent: Decimal,
    /// Suppress external order placement; events still flow.
    #[serde(default = "default_paper_mode")]
    pub paper_mode: bool,
    /// Account-wide position mode.
    #[serde(default)]
    pub position_mode: PositionMode,
    /// Maximum number of concurrently open positions.
    #[serde(default = "default_max_open_positions")]
    pub max_open_positions: usize,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

fn default_risk_percent() -> Decimal {
    Decimal::ONE
}

fn default_paper_mode() -> bool {
    true
}

fn default_max_open_positions() -> usize {
    5
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            risk_percent: default_risk_percent(),
            paper_mode: default_paper_mode(),
            position_mode: PositionMode::default(),
            max_open_positions: default_max_open_positions(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl GlobalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.risk_percent <= Decimal::ZERO || self.risk_percent > Decimal::from(100) {
            return Err(CoreError::InvalidConfig(
                "risk_percent must be in (0, 100]".to_string(),
            ));
        }
        if self.max_open_positions == 0 {
            return Err(CoreError::InvalidConfig(
                "max_open_positions must be positive".to_string(),
            ));
        }
        self.rate_limit.validate()
    }
}
