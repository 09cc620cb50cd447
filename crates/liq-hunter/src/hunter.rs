//! Liquidation-driven entry logic.
//!
//! Per event: threshold check by liquidation side, VWAP guard,
//! pending/exposure/position-count gates, then intent-to-order
//! translation and placement. Paper mode emits the same events without
//! touching the order endpoints.

use crate::pending::PendingEntries;
use crate::vwap::{rolling_vwap, vwap_allows};
use dashmap::DashMap;
use liq_core::{
    ErrorKind, GlobalConfig, LiquidationEvent, OrderType, OrderUpdate, PositionMode, PositionSide,
    Price, Qty, Side, SymbolConfig, TimeInForce, TradeDirection,
};
use liq_events::{BotEvent, EventBus};
use liq_position::PositionBook;
use liq_registry::PrecisionRegistry;
use liq_rest::{ExchangeApi, NewOrder, RestError};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Stale-pending reaper cadence.
const REAPER_INTERVAL: Duration = Duration::from_secs(30);

/// Venue code for a position-side/mode mismatch on order placement.
const POSITION_MODE_MISMATCH_CODE: i64 = -4061;

const COMPONENT: &str = "hunter";

/// Shared mark-price cache fed by the mark-price stream.
pub type MarkPrices = Arc<DashMap<String, Price>>;

/// The liquidation hunter task.
pub struct Hunter {
    symbols: HashMap<String, SymbolConfig>,
    global: GlobalConfig,
    api: ExchangeApi,
    registry: Arc<PrecisionRegistry>,
    events: EventBus,
    book: PositionBook,
    marks: MarkPrices,
    pending: PendingEntries,
    /// Persistent account mode; written only by the startup probe.
    position_mode: PositionMode,
}

impl Hunter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbols: HashMap<String, SymbolConfig>,
        global: GlobalConfig,
        api: ExchangeApi,
        registry: Arc<PrecisionRegistry>,
        events: EventBus,
        book: PositionBook,
        marks: MarkPrices,
        position_mode: PositionMode,
    ) -> Self {
        Self {
            symbols,
            global,
            api,
            registry,
            events,
            book,
            marks,
            pending: PendingEntries::new(),
            position_mode,
        }
    }

    /// Run until cancelled, consuming liquidations and our own order
    /// updates (to clear pending records).
    pub async fn run(
        mut self,
        mut liquidations: mpsc::Receiver<LiquidationEvent>,
        mut order_updates: mpsc::Receiver<OrderUpdate>,
        cancel: CancellationToken,
    ) {
        let mut reaper = tokio::time::interval(REAPER_INTERVAL);
        reaper.tick().await;

        info!(
            symbols = self.symbols.len(),
            paper = self.global.paper_mode,
            "hunter started"
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                event = liquidations.recv() => match event {
                    Some(event) => self.on_liquidation(event).await,
                    None => break,
                },

                update = order_updates.recv() => {
                    if let Some(update) = update {
                        self.on_order_update(&update);
                    }
                }

                _ = reaper.tick() => self.reap(),
            }
        }
        info!("hunter stopped");
    }

    /// Evaluate one liquidation event.
    pub(crate) async fn on_liquidation(&mut self, event: LiquidationEvent) {
        let volume = event.volume_usdt();
        self.events.publish(BotEvent::LiquidationDetected {
            event: event.clone(),
            volume_usdt: volume,
        });

        let Some(config) = self.symbols.get(&event.symbol).cloned() else {
            return;
        };
        let Some(direction) = trigger_direction(&config, &event) else {
            debug!(symbol = %event.symbol, volume = %volume, "below volume threshold");
            return;
        };

        // De-duplication and capacity gates.
        if self.pending.has(&event.symbol, direction) {
            debug!(symbol = %event.symbol, %direction, "entry already pending");
            return;
        }
        if self.book.count() >= self.global.max_open_positions {
            debug!(open = self.book.count(), "max open positions reached");
            return;
        }

        let qty = match self.sized_qty(&event, &config, direction) {
            Some(qty) => qty,
            None => return,
        };

        let exposure_cap = config.max_position_margin_usdt * Decimal::from(config.leverage);
        let projected = self.book.notional_usdt(&event.symbol) + qty.notional(event.price);
        if projected > exposure_cap {
            debug!(symbol = %event.symbol, %projected, %exposure_cap, "exposure cap reached");
            return;
        }

        if config.vwap_protection && !self.vwap_permits(&event, &config, direction).await {
            debug!(symbol = %event.symbol, %direction, "rejected by VWAP guard");
            return;
        }

        self.events.publish(BotEvent::TradeOpportunity {
            symbol: event.symbol.clone(),
            side: direction.entry_side(),
            direction,
            volume_usdt: volume,
            liquidation_price: event.price,
            paper: self.global.paper_mode,
            timestamp_ms: event.event_time_ms,
        });

        self.execute_entry(&event, &config, direction, qty).await;
    }

    /// Size the entry and snap it through the precision registry.
    fn sized_qty(
        &self,
        event: &LiquidationEvent,
        config: &SymbolConfig,
        direction: TradeDirection,
    ) -> Option<Qty> {
        let raw = Qty::new(config.trade_size_for(direction));
        match self
            .registry
            .validate_and_adjust_qty(&event.symbol, raw, event.price)
        {
            Ok(adjusted) => {
                if adjusted.capped_at_max {
                    self.events.publish_error(
                        ErrorKind::Validation,
                        COMPONENT,
                        Some(event.symbol.clone()),
                        None,
                        format!("trade size capped at symbol maximum: {}", adjusted.qty),
                    );
                }
                Some(adjusted.qty)
            }
            Err(e) => {
                self.events.publish_error(
                    ErrorKind::Validation,
                    COMPONENT,
                    Some(event.symbol.clone()),
                    None,
                    e.to_string(),
                );
                None
            }
        }
    }

    async fn vwap_permits(
        &self,
        event: &LiquidationEvent,
        config: &SymbolConfig,
        direction: TradeDirection,
    ) -> bool {
        let klines = match self
            .api
            .klines(&event.symbol, &config.vwap_timeframe, config.vwap_lookback)
            .await
        {
            Ok(klines) => klines,
            Err(e) => {
                // Guard unavailable: fail open, the volume gate already
                // passed.
                warn!(symbol = %event.symbol, error = %e, "kline fetch failed, skipping VWAP guard");
                return true;
            }
        };
        let Some(vwap) = rolling_vwap(&klines) else {
            return true;
        };
        let mark = self
            .marks
            .get(&event.symbol)
            .map(|entry| *entry.value())
            .unwrap_or(event.price);
        vwap_allows(direction, mark, vwap, config.vwap_band_bps)
    }

    /// Translate the intent into an order and place it, maintaining
    /// the pending-entry record across every outcome.
    async fn execute_entry(
        &mut self,
        event: &LiquidationEvent,
        config: &SymbolConfig,
        direction: TradeDirection,
        qty: Qty,
    ) {
        // Reference prices: the book ticker in live mode, the
        // liquidation fill price in paper mode.
        let (bid, ask) = if self.global.paper_mode {
            (event.price, event.price)
        } else {
            match self.api.book_ticker(&event.symbol).await {
                Ok(ticker) => (Price::new(ticker.bid_price), Price::new(ticker.ask_price)),
                Err(e) => {
                    debug!(symbol = %event.symbol, error = %e, "book ticker unavailable, using event price");
                    (event.price, event.price)
                }
            }
        };

        let (price, tif) = match config.order_type {
            liq_core::config::EntryOrderType::Market => (None, None),
            liq_core::config::EntryOrderType::Limit => {
                match derive_limit_price(&self.registry, &event.symbol, config, direction, bid, ask)
                {
                    Ok(price) => {
                        let tif = if config.post_only {
                            TimeInForce::Gtx
                        } else {
                            TimeInForce::Gtc
                        };
                        (Some(price), Some(tif))
                    }
                    Err(reason) => {
                        self.events.publish_error(
                            ErrorKind::Validation,
                            COMPONENT,
                            Some(event.symbol.clone()),
                            None,
                            reason,
                        );
                        return;
                    }
                }
            }
        };

        let now_ms = chrono::Utc::now().timestamp_millis();
        if self
            .pending
            .register_temp(&event.symbol, direction, now_ms)
            .is_none()
        {
            return;
        }

        let fill_price = price.unwrap_or(event.price);
        if self.global.paper_mode {
            info!(symbol = %event.symbol, %direction, %qty, price = %fill_price, "paper entry");
            self.publish_opened(event, direction, qty, fill_price, None);
            return;
        }

        let order = self.build_entry(event, config, direction, qty, price, tif, self.position_mode);
        match self.place_with_mode_retry(event, config, direction, qty, price, tif, order).await {
            Ok(ack) => {
                self.pending.confirm(&event.symbol, direction, ack.order_id);
                let opened_price = price
                    .or(ack.avg_price.map(Price::new))
                    .unwrap_or(event.price);
                info!(symbol = %event.symbol, %direction, order_id = ack.order_id, "entry placed");
                self.publish_opened(event, direction, qty, opened_price, Some(ack.order_id));
            }
            Err(e) => {
                // Failed attempts never leave a pending record behind.
                self.pending.remove(&event.symbol, direction);
                self.events.publish_error(
                    e.kind(),
                    COMPONENT,
                    Some(event.symbol.clone()),
                    e.exchange_code(),
                    e.to_string(),
                );
            }
        }
    }

    /// Place the entry; on a position-mode mismatch, retry exactly once
    /// with the opposite mode. The inferred mode lives only in this
    /// retry scope; the persistent field is written by the startup
    /// probe alone.
    #[allow(clippy::too_many_arguments)]
    async fn place_with_mode_retry(
        &self,
        event: &LiquidationEvent,
        config: &SymbolConfig,
        direction: TradeDirection,
        qty: Qty,
        price: Option<Price>,
        tif: Option<TimeInForce>,
        order: NewOrder,
    ) -> Result<liq_rest::model::OrderAck, RestError> {
        match self.api.place_order(&order).await {
            Err(e) if e.exchange_code() == Some(POSITION_MODE_MISMATCH_CODE) => {
                let inferred = match self.position_mode {
                    PositionMode::OneWay => PositionMode::Hedge,
                    PositionMode::Hedge => PositionMode::OneWay,
                };
                warn!(symbol = %event.symbol, ?inferred, "position-mode mismatch, retrying once");
                let retry = self.build_entry(event, config, direction, qty, price, tif, inferred);
                self.api.place_order(&retry).await
            }
            other => other,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_entry(
        &self,
        event: &LiquidationEvent,
        config: &SymbolConfig,
        direction: TradeDirection,
        qty: Qty,
        price: Option<Price>,
        tif: Option<TimeInForce>,
        mode: PositionMode,
    ) -> NewOrder {
        let order_type = match config.order_type {
            liq_core::config::EntryOrderType::Limit => OrderType::Limit,
            liq_core::config::EntryOrderType::Market => OrderType::Market,
        };
        let mut order = NewOrder::new(event.symbol.clone(), direction.entry_side(), order_type)
            .position_side(PositionSide::for_order(mode, direction))
            .qty(qty);
        if let Some(price) = price {
            order = order.price(price);
        }
        if let Some(tif) = tif {
            order = order.time_in_force(tif);
        }
        order
    }

    fn publish_opened(
        &self,
        event: &LiquidationEvent,
        direction: TradeDirection,
        qty: Qty,
        price: Price,
        order_id: Option<u64>,
    ) {
        self.events.publish(BotEvent::PositionOpened {
            symbol: event.symbol.clone(),
            side: direction.entry_side(),
            direction,
            position_side: PositionSide::for_order(self.position_mode, direction),
            qty,
            price,
            order_id,
            paper: self.global.paper_mode,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        });
    }

    /// Clear pending records when our entry orders reach a terminal
    /// state.
    pub(crate) fn on_order_update(&mut self, update: &OrderUpdate) {
        if !update.status.is_terminal() {
            return;
        }
        if self
            .pending
            .remove_by_order_id(&update.symbol, update.order_id)
            .is_some()
        {
            debug!(
                symbol = %update.symbol,
                order_id = update.order_id,
                status = ?update.status,
                "pending entry resolved"
            );
        }
    }

    fn reap(&mut self) {
        let now_ms = chrono::Utc::now().timestamp_millis();
        for entry in self.pending.reap_stale(now_ms) {
            warn!(symbol = %entry.symbol, key = %entry.key, "reaped stale pending entry");
        }
    }
}

/// Direction triggered by a liquidation event, if its volume clears
/// the per-side threshold.
///
/// SELL liquidations (longs being flushed) bias LONG; BUY liquidations
/// bias SHORT.
pub fn trigger_direction(
    config: &SymbolConfig,
    event: &LiquidationEvent,
) -> Option<TradeDirection> {
    let volume = event.volume_usdt();
    match event.side {
        Side::Sell => {
            (volume >= config.long_volume_threshold_usdt).then_some(TradeDirection::Long)
        }
        Side::Buy => {
            (volume >= config.short_volume_threshold_usdt).then_some(TradeDirection::Short)
        }
    }
}

/// Derive the LIMIT entry price from the best bid/ask.
///
/// BUY rests `offset_bps` under the best bid, SELL above the best ask.
/// Rejects when the price strays past `max_slippage_bps` from mid, or
/// when post-only would cross the book.
pub fn derive_limit_price(
    registry: &PrecisionRegistry,
    symbol: &str,
    config: &SymbolConfig,
    direction: TradeDirection,
    bid: Price,
    ask: Price,
) -> Result<Price, String> {
    let offset = config.price_offset_bps / Decimal::from(10_000);
    let raw = match direction {
        TradeDirection::Long => bid * (Decimal::ONE - offset),
        TradeDirection::Short => ask * (Decimal::ONE + offset),
    };
    let price = registry.format_price(symbol, raw);

    let mid = (bid.inner() + ask.inner()) / Decimal::TWO;
    if mid.is_zero() {
        return Err("no reference price for slippage check".to_string());
    }
    let drift = ((price.inner() - mid) / mid).abs() * Decimal::from(10_000);
    if drift > config.max_slippage_bps {
        return Err(format!(
            "price {price} drifts {drift:.2} bps from mid, above {} bps cap",
            config.max_slippage_bps
        ));
    }

    if config.post_only {
        let maker = match direction {
            TradeDirection::Long => price.inner() < ask.inner(),
            TradeDirection::Short => price.inner() > bid.inner(),
        };
        if !maker {
            return Err(format!("post-only price {price} would take liquidity"));
        }
    }

    Ok(price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use liq_registry::SymbolFilters;
    use rust_decimal_macros::dec;

    fn config(json: serde_json::Value) -> SymbolConfig {
        serde_json::from_value(json).unwrap()
    }

    fn base_config() -> SymbolConfig {
        config(serde_json::json!({
            "long_volume_threshold_usdt": "10000",
            "short_volume_threshold_usdt": "20000",
            "trade_size": "0.001",
            "price_offset_bps": "5",
            "max_slippage_bps": "50",
        }))
    }

    fn liquidation(side: Side, price: Decimal, qty: Decimal) -> LiquidationEvent {
        LiquidationEvent {
            symbol: "BTCUSDT".to_string(),
            side,
            order_type: OrderType::Limit,
            price: Price::new(price),
            avg_price: Price::new(price),
            filled_qty: Qty::new(qty),
            event_time_ms: 1_700_000_000_000,
        }
    }

    fn registry() -> PrecisionRegistry {
        let mut symbols = std::collections::HashMap::new();
        symbols.insert(
            "BTCUSDT".to_string(),
            SymbolFilters {
                tick_size: dec!(0.1),
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

    #[test]
    fn test_sell_liquidation_biases_long_over_threshold() {
        // 0.3 BTC at 50000 = 15000 USDT >= 10000.
        let event = liquidation(Side::Sell, dec!(50000), dec!(0.3));
        assert_eq!(
            trigger_direction(&base_config(), &event),
            Some(TradeDirection::Long)
        );
    }

    #[test]
    fn test_below_threshold_is_ignored() {
        let event = liquidation(Side::Sell, dec!(50000), dec!(0.1)); // 5000 USDT
        assert_eq!(trigger_direction(&base_config(), &event), None);
    }

    #[test]
    fn test_buy_liquidation_uses_short_threshold() {
        // 15000 USDT clears the long threshold but not the short one.
        let event = liquidation(Side::Buy, dec!(50000), dec!(0.3));
        assert_eq!(trigger_direction(&base_config(), &event), None);

        let event = liquidation(Side::Buy, dec!(50000), dec!(0.5));
        assert_eq!(
            trigger_direction(&base_config(), &event),
            Some(TradeDirection::Short)
        );
    }

    #[test]
    fn test_limit_price_five_bps_under_bid() {
        let price = derive_limit_price(
            &registry(),
            "BTCUSDT",
            &base_config(),
            TradeDirection::Long,
            Price::new(dec!(50000)),
            Price::new(dec!(50000)),
        )
        .unwrap();
        assert_eq!(price, Price::new(dec!(49975)));
    }

    #[test]
    fn test_limit_price_above_ask_for_short() {
        let price = derive_limit_price(
            &registry(),
            "BTCUSDT",
            &base_config(),
            TradeDirection::Short,
            Price::new(dec!(50000)),
            Price::new(dec!(50000)),
        )
        .unwrap();
        assert_eq!(price, Price::new(dec!(50025)));
    }

    #[test]
    fn test_slippage_cap_rejects() {
        let mut config = base_config();
        config.price_offset_bps = dec!(100); // 1% offset
        config.max_slippage_bps = dec!(50);
        let result = derive_limit_price(
            &registry(),
            "BTCUSDT",
            &config,
            TradeDirection::Long,
            Price::new(dec!(50000)),
            Price::new(dec!(50000)),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_post_only_rejects_crossing_price() {
        let mut config = base_config();
        config.post_only = true;
        config.price_offset_bps = Decimal::ZERO;
        // Zero offset on a touched book: BUY at bid == ask would take.
        let result = derive_limit_price(
            &registry(),
            "BTCUSDT",
            &config,
            TradeDirection::Long,
            Price::new(dec!(50000)),
            Price::new(dec!(50000)),
        );
        assert!(result.is_err());

        // With a real spread the resting price is maker-safe.
        let price = derive_limit_price(
            &registry(),
            "BTCUSDT",
            &config,
            TradeDirection::Long,
            Price::new(dec!(49999.9)),
            Price::new(dec!(50000.1)),
        )
        .unwrap();
        assert_eq!(price, Price::new(dec!(49999.9)));
    }
}
