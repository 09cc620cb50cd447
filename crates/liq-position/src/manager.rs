//! Position-manager actor.
//!
//! Owns the position and protective-order maps. Inputs: user-data
//! events, a 30s full reconciliation tick, and a 30s auto-close sweep.
//! ACCOUNT_UPDATE frames may carry only a subset of positions, so
//! per-frame edits never clear tracked order ids for keys outside the
//! frame; only a full reconciliation pass against authoritative venue
//! state may delete tracked orders.

use crate::book::{PositionBook, TrackedPosition};
use crate::protective::{
    adjust_tp_near_mark, order_preserves, past_runaway_tp, past_tp_at_placement,
    protection_targets, ProtectiveOrders,
};
use liq_core::{
    AccountUpdate, ErrorKind, GlobalConfig, OrderType, OrderUpdate, PositionKey, PositionMode,
    PositionSide, Price, Qty, SymbolConfig, TradeDirection,
};
use liq_events::{BotEvent, EventBus};
use liq_rest::model::{OpenOrder, PositionRisk};
use liq_rest::{ExchangeApi, NewOrder, RestError};
use liq_registry::PrecisionRegistry;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Full reconciliation cadence.
const RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

/// Runaway-profit sweep cadence.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Venue code for "order would immediately trigger".
const TRIGGER_IMMEDIATELY_CODE: i64 = -2021;

const COMPONENT: &str = "position-manager";

/// User-data input to the actor.
#[derive(Debug, Clone)]
pub enum PositionEvent {
    Account(AccountUpdate),
    Order(OrderUpdate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Sl,
    Tp,
}

/// The reconciling position controller.
pub struct PositionManager {
    api: ExchangeApi,
    registry: Arc<PrecisionRegistry>,
    events: EventBus,
    symbols: HashMap<String, SymbolConfig>,
    mode: PositionMode,
    paper: bool,
    positions: HashMap<PositionKey, TrackedPosition>,
    protective: HashMap<PositionKey, ProtectiveOrders>,
    book: PositionBook,
    next_paper_id: u64,
}

impl PositionManager {
    pub fn new(
        api: ExchangeApi,
        registry: Arc<PrecisionRegistry>,
        events: EventBus,
        symbols: HashMap<String, SymbolConfig>,
        global: &GlobalConfig,
        mode: PositionMode,
    ) -> (Self, PositionBook) {
        let book = PositionBook::new();
        let manager = Self {
            api,
            registry,
            events,
            symbols,
            mode,
            paper: global.paper_mode,
            positions: HashMap::new(),
            protective: HashMap::new(),
            book: book.clone(),
            next_paper_id: 0,
        };
        (manager, book)
    }

    /// Run the actor until cancelled.
    pub async fn run(mut self, mut inputs: mpsc::Receiver<PositionEvent>, cancel: CancellationToken) {
        let mut reconcile = tokio::time::interval(RECONCILE_INTERVAL);
        let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
        sweep.tick().await;

        info!(paper = self.paper, "position manager started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                event = inputs.recv() => match event {
                    Some(PositionEvent::Account(update)) => {
                        self.on_account_update(update).await;
                        self.reconcile().await;
                    }
                    Some(PositionEvent::Order(update)) => {
                        self.on_order_update(update).await;
                        self.reconcile().await;
                    }
                    None => break,
                },

                _ = reconcile.tick() => self.reconcile().await,

                _ = sweep.tick() => self.auto_close_sweep().await,
            }
        }
        info!("position manager stopped");
    }

    // ------------------------------------------------------------------
    // Event-driven edits
    // ------------------------------------------------------------------

    /// Apply an ACCOUNT_UPDATE frame. Edits touch only the keys the
    /// frame names.
    pub(crate) async fn on_account_update(&mut self, update: AccountUpdate) {
        for balance in &update.balances {
            self.events.publish(BotEvent::BalanceUpdate {
                asset: balance.asset.clone(),
                wallet_balance: balance.wallet_balance,
                cross_wallet_balance: balance.cross_wallet_balance,
                balance_change: balance.balance_change,
                timestamp_ms: update.event_time_ms,
            });
        }

        for delta in update.positions {
            if delta.amount.is_zero() {
                let gone: Vec<PositionKey> = self
                    .positions
                    .keys()
                    .filter(|key| {
                        key.symbol == delta.symbol
                            && (self.mode == PositionMode::OneWay
                                || key.position_side() == delta.position_side)
                    })
                    .cloned()
                    .collect();
                for key in gone {
                    self.close_tracked(&key, "position flat").await;
                }
                continue;
            }

            let Some(key) = self.key_for(&delta.symbol, delta.amount, delta.position_side) else {
                continue;
            };
            let mark = self
                .positions
                .get(&key)
                .map(|p| p.mark_price)
                .filter(|m| !m.is_zero())
                .unwrap_or(delta.entry_price);
            let is_new = !self.positions.contains_key(&key);
            let tracked = TrackedPosition {
                key: key.clone(),
                amount: delta.amount,
                entry_price: delta.entry_price,
                mark_price: mark,
                unrealized_pnl: delta.unrealized_pnl,
                updated_at_ms: update.event_time_ms,
            };
            self.book.upsert(tracked.clone());
            self.positions.insert(key.clone(), tracked);
            self.publish_position_update(&key, update.event_time_ms);
            if is_new {
                self.ensure_protection(&key).await;
            }
        }
    }

    /// Apply an ORDER_TRADE_UPDATE frame.
    pub(crate) async fn on_order_update(&mut self, update: OrderUpdate) {
        if let Some((key, slot)) = self.find_protective(update.order_id) {
            match update.status {
                s if s == liq_core::OrderStatus::Filled => {
                    debug!(%key, ?slot, "protective order filled");
                    self.clear_slot(&key, slot);
                    // The sibling is cancelled when the flat position is
                    // observed; clearing here keeps the record honest.
                }
                s if s.is_terminal() => {
                    debug!(%key, ?slot, status = ?s, "protective order gone, re-issuing");
                    self.clear_slot(&key, slot);
                    if self.positions.contains_key(&key) {
                        self.ensure_protection(&key).await;
                    }
                }
                _ => {}
            }
            return;
        }

        // Positions are created on the first fill notification for an
        // entry order.
        let is_entry = update.status == liq_core::OrderStatus::Filled
            && !update.reduce_only
            && matches!(update.order_type, OrderType::Limit | OrderType::Market);
        if !is_entry {
            return;
        }

        let direction = TradeDirection::from_entry_side(update.side);
        let key = PositionKey::new(update.symbol.clone(), direction, self.mode);
        if self.positions.contains_key(&key) {
            return;
        }

        let fill_price = if update.last_filled_price.is_zero() {
            update.avg_price
        } else {
            update.last_filled_price
        };
        let signed = match direction {
            TradeDirection::Long => update.qty.inner(),
            TradeDirection::Short => -update.qty.inner(),
        };
        let tracked = TrackedPosition {
            key: key.clone(),
            amount: signed,
            entry_price: fill_price,
            mark_price: fill_price,
            unrealized_pnl: Decimal::ZERO,
            updated_at_ms: update.event_time_ms,
        };
        info!(%key, qty = %update.qty, price = %fill_price, "entry filled, tracking position");
        self.book.upsert(tracked.clone());
        self.positions.insert(key.clone(), tracked);
        self.publish_position_update(&key, update.event_time_ms);
        self.ensure_protection(&key).await;
    }

    // ------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------

    /// Full reconciliation against authoritative venue state.
    pub(crate) async fn reconcile(&mut self) {
        if self.paper {
            return;
        }

        let risks = match self.api.position_risk().await {
            Ok(risks) => risks,
            Err(e) => {
                self.surface_rest_error(&e, None);
                return;
            }
        };
        let open_orders = match self.api.open_orders(None).await {
            Ok(orders) => orders,
            Err(e) => {
                self.surface_rest_error(&e, None);
                return;
            }
        };

        let now_ms = chrono::Utc::now().timestamp_millis();
        let mut live: HashMap<PositionKey, TrackedPosition> = HashMap::new();
        for row in &risks {
            if row.position_amt.is_zero() {
                continue;
            }
            let Some(key) = self.key_for(&row.symbol, row.position_amt, row.position_side) else {
                continue;
            };
            live.insert(key.clone(), tracked_from_risk(key, row, now_ms));
        }

        // Disappeared positions: cancel their stored protection.
        let gone: Vec<PositionKey> = self
            .positions
            .keys()
            .filter(|key| !live.contains_key(key))
            .cloned()
            .collect();
        for key in gone {
            self.close_tracked(&key, "reconciled flat").await;
        }

        for (key, tracked) in live {
            self.book.upsert(tracked.clone());
            self.positions.insert(key, tracked);
        }

        // Validate tracked order ids against the live order book.
        let open_by_id: HashMap<u64, &OpenOrder> =
            open_orders.iter().map(|o| (o.order_id, o)).collect();
        let snapshot: Vec<(PositionKey, Qty)> = self
            .positions
            .iter()
            .map(|(key, pos)| (key.clone(), pos.qty()))
            .collect();
        for (key, qty) in &snapshot {
            let mut orders = self.protective.get(key).copied().unwrap_or_default();
            if let Some(id) = orders.sl_order_id {
                let preserved = open_by_id
                    .get(&id)
                    .is_some_and(|open| order_preserves(open, key, *qty));
                if !preserved {
                    debug!(%key, id, "stop-loss no longer live, clearing");
                    orders.sl_order_id = None;
                }
            }
            if let Some(id) = orders.tp_order_id {
                let preserved = open_by_id
                    .get(&id)
                    .is_some_and(|open| order_preserves(open, key, *qty));
                if !preserved {
                    debug!(%key, id, "take-profit no longer live, clearing");
                    orders.tp_order_id = None;
                }
            }
            self.protective.insert(key.clone(), orders);
        }

        // Re-issue anything missing.
        for (key, _) in snapshot {
            self.ensure_protection(&key).await;
        }
    }

    /// Close every position whose profit ran past 1.5x its TP target.
    pub(crate) async fn auto_close_sweep(&mut self) {
        let candidates: Vec<PositionKey> = self
            .positions
            .iter()
            .filter(|(key, position)| {
                self.symbols
                    .get(&key.symbol)
                    .is_some_and(|cfg| past_runaway_tp(position, cfg))
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in candidates {
            info!(%key, "position past runaway threshold, closing at market");
            self.market_close(&key, "runaway profit").await;
        }
    }

    // ------------------------------------------------------------------
    // Protection
    // ------------------------------------------------------------------

    /// Place whatever protective orders the key is missing.
    pub(crate) async fn ensure_protection(&mut self, key: &PositionKey) {
        let Some(position) = self.positions.get(key).cloned() else {
            return;
        };
        let Some(config) = self.symbols.get(&key.symbol).cloned() else {
            warn!(%key, "no symbol config, cannot place protection");
            return;
        };
        let mut orders = self.protective.get(key).copied().unwrap_or_default();
        if orders.is_complete() {
            return;
        }

        // Past the TP target already: a TP would trigger immediately,
        // close at market instead.
        if orders.tp_order_id.is_none() && past_tp_at_placement(&position, &config) {
            self.protective.insert(key.clone(), orders);
            self.market_close(key, "take-profit already exceeded").await;
            return;
        }

        let targets = protection_targets(
            &self.registry,
            &key.symbol,
            key.direction,
            position.entry_price,
            &config,
        );
        let tp_price = adjust_tp_near_mark(
            &self.registry,
            &key.symbol,
            key.direction,
            targets.tp,
            position.mark_price,
        );

        let mut batch: Vec<(Slot, NewOrder)> = Vec::new();
        if orders.sl_order_id.is_none() {
            batch.push((
                Slot::Sl,
                self.protective_order(key, OrderType::StopMarket, targets.sl, position.qty()),
            ));
        }
        if orders.tp_order_id.is_none() {
            batch.push((
                Slot::Tp,
                self.protective_order(key, OrderType::TakeProfitMarket, tp_price, position.qty()),
            ));
        }
        if batch.is_empty() {
            return;
        }

        if self.paper {
            for (slot, _) in &batch {
                let id = self.paper_order_id();
                match slot {
                    Slot::Sl => orders.sl_order_id = Some(id),
                    Slot::Tp => orders.tp_order_id = Some(id),
                }
            }
            self.protective.insert(key.clone(), orders);
            debug!(%key, "paper protection recorded");
            return;
        }

        let specs: Vec<NewOrder> = batch.iter().map(|(_, order)| order.clone()).collect();
        let results = match self.api.place_batch_orders(&specs).await {
            Ok(results) => results,
            Err(e) => {
                self.surface_rest_error(&e, Some(key.symbol.clone()));
                self.missing_protection(key);
                self.protective.insert(key.clone(), orders);
                return;
            }
        };

        let mut close_instead = false;
        for ((slot, order), result) in batch.iter().zip(results) {
            match result {
                Ok(ack) => match slot {
                    Slot::Sl => orders.sl_order_id = Some(ack.order_id),
                    Slot::Tp => orders.tp_order_id = Some(ack.order_id),
                },
                Err(err) => match slot {
                    Slot::Sl => {
                        // One retry with a broader tick-aligned stop.
                        match self.retry_wider_sl(key, order).await {
                            Some(id) => orders.sl_order_id = Some(id),
                            None => self.missing_protection(key),
                        }
                    }
                    Slot::Tp => {
                        if err.exchange_code() == Some(TRIGGER_IMMEDIATELY_CODE) {
                            close_instead = true;
                        } else {
                            self.surface_rest_error(&err, Some(key.symbol.clone()));
                            self.missing_protection(key);
                        }
                    }
                },
            }
        }
        self.protective.insert(key.clone(), orders);

        if close_instead {
            self.market_close(key, "take-profit would trigger immediately")
                .await;
        }
    }

    async fn retry_wider_sl(&mut self, key: &PositionKey, order: &NewOrder) -> Option<u64> {
        let tick = self.registry.filters(&key.symbol).tick_size;
        let stop = order.stop_price?;
        let wider = match key.direction {
            TradeDirection::Long => Price::new(stop.inner() - tick),
            TradeDirection::Short => Price::new(stop.inner() + tick),
        };
        let retry = order.clone().stop_price(self.registry.format_price(&key.symbol, wider));
        match self.api.place_order(&retry).await {
            Ok(ack) => {
                debug!(%key, stop = %wider, "stop-loss placed on retry");
                Some(ack.order_id)
            }
            Err(e) => {
                self.surface_rest_error(&e, Some(key.symbol.clone()));
                None
            }
        }
    }

    fn protective_order(
        &self,
        key: &PositionKey,
        order_type: OrderType,
        stop_price: Price,
        qty: Qty,
    ) -> NewOrder {
        let mut order = NewOrder::new(key.symbol.clone(), key.direction.closing_side(), order_type)
            .position_side(key.position_side())
            .qty(qty)
            .stop_price(stop_price)
            .mark_price_trigger();
        // Reduce-only cannot be sent in hedge mode; the venue derives
        // it from the position side there.
        if key.mode == PositionMode::OneWay {
            order = order.reduce_only(true);
        }
        order
    }

    /// Close the full position at market and drop its records.
    pub(crate) async fn market_close(&mut self, key: &PositionKey, reason: &str) {
        let Some(position) = self.positions.get(key).cloned() else {
            return;
        };

        if !self.paper {
            let mut order = NewOrder::new(
                key.symbol.clone(),
                key.direction.closing_side(),
                OrderType::Market,
            )
            .position_side(key.position_side())
            .qty(position.qty());
            if key.mode == PositionMode::OneWay {
                order = order.reduce_only(true);
            }
            if let Err(e) = self.api.place_order(&order).await {
                self.surface_rest_error(&e, Some(key.symbol.clone()));
                return;
            }
        }

        self.close_tracked(key, reason).await;
    }

    /// Cancel stored protection and drop the record.
    async fn close_tracked(&mut self, key: &PositionKey, reason: &str) {
        if let Some(orders) = self.protective.remove(key) {
            if !self.paper {
                for id in orders.ids() {
                    if let Err(e) = self.api.cancel_order(&key.symbol, id).await {
                        debug!(%key, id, error = %e, "protective cancel failed");
                    }
                }
            }
        }
        if self.positions.remove(key).is_some() {
            self.book.remove(key);
            info!(%key, reason, "position closed");
            self.events.publish(BotEvent::PositionClosed {
                symbol: key.symbol.clone(),
                direction: key.direction,
                reason: reason.to_string(),
                paper: self.paper,
                timestamp_ms: chrono::Utc::now().timestamp_millis(),
            });
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn key_for(
        &self,
        symbol: &str,
        amount: Decimal,
        position_side: PositionSide,
    ) -> Option<PositionKey> {
        let direction = match (self.mode, position_side) {
            (PositionMode::Hedge, PositionSide::Long) => TradeDirection::Long,
            (PositionMode::Hedge, PositionSide::Short) => TradeDirection::Short,
            _ => {
                if amount > Decimal::ZERO {
                    TradeDirection::Long
                } else if amount < Decimal::ZERO {
                    TradeDirection::Short
                } else {
                    return None;
                }
            }
        };
        Some(PositionKey::new(symbol, direction, self.mode))
    }

    fn find_protective(&self, order_id: u64) -> Option<(PositionKey, Slot)> {
        for (key, orders) in &self.protective {
            if orders.sl_order_id == Some(order_id) {
                return Some((key.clone(), Slot::Sl));
            }
            if orders.tp_order_id == Some(order_id) {
                return Some((key.clone(), Slot::Tp));
            }
        }
        None
    }

    fn clear_slot(&mut self, key: &PositionKey, slot: Slot) {
        if let Some(orders) = self.protective.get_mut(key) {
            match slot {
                Slot::Sl => orders.sl_order_id = None,
                Slot::Tp => orders.tp_order_id = None,
            }
        }
    }

    fn publish_position_update(&self, key: &PositionKey, timestamp_ms: i64) {
        if let Some(position) = self.positions.get(key) {
            self.events.publish(BotEvent::PositionUpdate {
                symbol: key.symbol.clone(),
                direction: key.direction,
                amount: position.amount,
                entry_price: position.entry_price,
                mark_price: position.mark_price,
                unrealized_pnl: position.unrealized_pnl,
                timestamp_ms,
            });
        }
    }

    fn missing_protection(&self, key: &PositionKey) {
        self.events.publish_error(
            ErrorKind::State,
            COMPONENT,
            Some(key.symbol.clone()),
            None,
            format!("MISSING_PROTECTION for {key}"),
        );
    }

    fn surface_rest_error(&self, error: &RestError, symbol: Option<String>) {
        self.events.publish_error(
            error.kind(),
            COMPONENT,
            symbol,
            error.exchange_code(),
            error.to_string(),
        );
    }

    fn paper_order_id(&mut self) -> u64 {
        self.next_paper_id += 1;
        900_000_000_000 + self.next_paper_id
    }

    #[cfg(test)]
    fn seed(&mut self, position: TrackedPosition, orders: ProtectiveOrders) {
        let key = position.key.clone();
        self.book.upsert(position.clone());
        self.positions.insert(key.clone(), position);
        self.protective.insert(key, orders);
    }

    #[cfg(test)]
    fn protective_for(&self, key: &PositionKey) -> Option<ProtectiveOrders> {
        self.protective.get(key).copied()
    }
}

fn tracked_from_risk(key: PositionKey, row: &PositionRisk, now_ms: i64) -> TrackedPosition {
    TrackedPosition {
        key,
        amount: row.position_amt,
        entry_price: Price::new(row.entry_price),
        mark_price: Price::new(row.mark_price),
        unrealized_pnl: row.unrealized_profit,
        updated_at_ms: now_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::BoxFuture;
    use liq_core::{BalanceDelta, OrderStatus, PositionDelta, Side, TimeInForce};
    use liq_events::EventBus;
    use liq_rest::client::{RawResponse, RequestSpec};
    use liq_rest::{RateLimiter, RestResult, Transport};
    use liq_registry::SymbolFilters;
    use rust_decimal_macros::dec;

    /// Transport that must never be reached (paper-mode tests).
    struct UnreachableTransport;

    impl Transport for UnreachableTransport {
        fn execute(&self, spec: RequestSpec) -> BoxFuture<'static, RestResult<RawResponse>> {
            panic!("paper mode must not touch the wire: {}", spec.path);
        }
    }

    fn registry() -> Arc<PrecisionRegistry> {
        let mut symbols = HashMap::new();
        for symbol in ["BTCUSDT", "ETHUSDT"] {
            symbols.insert(
                symbol.to_string(),
                SymbolFilters {
                    tick_size: dec!(0.10),
                    step_size: dec!(0.001),
                    min_qty: dec!(0.001),
                    max_qty: dec!(1000),
                    min_notional: dec!(5),
                    price_decimals: 1,
                    qty_decimals: 3,
                },
            );
        }
        Arc::new(PrecisionRegistry::from_filters(symbols))
    }

    fn symbol_config() -> SymbolConfig {
        serde_json::from_value(serde_json::json!({
            "long_volume_threshold_usdt": "10000",
            "short_volume_threshold_usdt": "10000",
            "trade_size": "0.001",
            "tp_percent": "1",
            "sl_percent": "2",
        }))
        .unwrap()
    }

    fn paper_manager() -> (PositionManager, PositionBook, EventBus) {
        let events = EventBus::new(256);
        let limiter = RateLimiter::new(
            liq_core::RateLimitConfig::default(),
            Arc::new(UnreachableTransport),
            events.clone(),
        );
        let api = ExchangeApi::new(limiter);
        let mut symbols = HashMap::new();
        symbols.insert("BTCUSDT".to_string(), symbol_config());
        symbols.insert("ETHUSDT".to_string(), symbol_config());
        let global = GlobalConfig {
            paper_mode: true,
            ..GlobalConfig::default()
        };
        let (manager, book) = PositionManager::new(
            api,
            registry(),
            events.clone(),
            symbols,
            &global,
            PositionMode::OneWay,
        );
        (manager, book, events)
    }

    fn btc_key() -> PositionKey {
        PositionKey::new("BTCUSDT", TradeDirection::Long, PositionMode::OneWay)
    }

    fn btc_position() -> TrackedPosition {
        TrackedPosition {
            key: btc_key(),
            amount: dec!(0.001),
            entry_price: Price::new(dec!(49975)),
            mark_price: Price::new(dec!(49975)),
            unrealized_pnl: Decimal::ZERO,
            updated_at_ms: 0,
        }
    }

    fn account_update_with(positions: Vec<PositionDelta>) -> AccountUpdate {
        AccountUpdate {
            event_time_ms: 1_700_000_000_000,
            balances: vec![BalanceDelta {
                asset: "USDT".to_string(),
                wallet_balance: dec!(1000),
                cross_wallet_balance: dec!(1000),
                balance_change: Decimal::ZERO,
            }],
            positions,
        }
    }

    fn eth_delta(amount: Decimal) -> PositionDelta {
        PositionDelta {
            symbol: "ETHUSDT".to_string(),
            amount,
            entry_price: Price::new(dec!(3000)),
            accumulated_realized: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            margin_type: "cross".to_string(),
            isolated_wallet: Decimal::ZERO,
            position_side: PositionSide::Both,
        }
    }

    #[tokio::test]
    async fn test_partial_account_update_preserves_other_symbols() {
        let (mut manager, book, _events) = paper_manager();
        manager.seed(
            btc_position(),
            ProtectiveOrders {
                sl_order_id: Some(1001),
                tp_order_id: Some(1002),
            },
        );

        // Frame names only ETHUSDT: BTC protection must stay intact.
        manager
            .on_account_update(account_update_with(vec![eth_delta(dec!(1))]))
            .await;

        assert_eq!(
            manager.protective_for(&btc_key()),
            Some(ProtectiveOrders {
                sl_order_id: Some(1001),
                tp_order_id: Some(1002),
            })
        );

        // ETH was added and protection scheduled.
        let eth_key = PositionKey::new("ETHUSDT", TradeDirection::Long, PositionMode::OneWay);
        assert!(book.get(&eth_key).is_some());
        let eth_orders = manager.protective_for(&eth_key).unwrap();
        assert!(eth_orders.is_complete());
    }

    #[tokio::test]
    async fn test_flat_position_in_frame_is_dropped() {
        let (mut manager, book, events) = paper_manager();
        let mut rx = events.subscribe();
        manager.seed(
            btc_position(),
            ProtectiveOrders {
                sl_order_id: Some(1001),
                tp_order_id: Some(1002),
            },
        );

        let flat = PositionDelta {
            symbol: "BTCUSDT".to_string(),
            amount: Decimal::ZERO,
            entry_price: Price::ZERO,
            accumulated_realized: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            margin_type: "cross".to_string(),
            isolated_wallet: Decimal::ZERO,
            position_side: PositionSide::Both,
        };
        manager
            .on_account_update(account_update_with(vec![flat]))
            .await;

        assert!(book.get(&btc_key()).is_none());
        assert!(manager.protective_for(&btc_key()).is_none());

        let mut saw_closed = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, BotEvent::PositionClosed { ref symbol, .. } if symbol == "BTCUSDT") {
                saw_closed = true;
            }
        }
        assert!(saw_closed, "positionClosed must be published");
    }

    fn entry_fill() -> OrderUpdate {
        OrderUpdate {
            symbol: "BTCUSDT".to_string(),
            order_id: 555,
            client_order_id: "liq_1_entry".to_string(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::Gtc,
            qty: Qty::new(dec!(0.001)),
            price: Price::new(dec!(49975)),
            avg_price: Price::new(dec!(49975)),
            stop_price: Price::ZERO,
            status: OrderStatus::Filled,
            last_filled_qty: Qty::new(dec!(0.001)),
            last_filled_price: Price::new(dec!(49975)),
            reduce_only: false,
            position_side: PositionSide::Both,
            event_time_ms: 1_700_000_000_000,
        }
    }

    #[tokio::test]
    async fn test_entry_fill_creates_position_and_protection() {
        let (mut manager, book, _events) = paper_manager();

        manager.on_order_update(entry_fill()).await;

        let position = book.get(&btc_key()).expect("position tracked");
        assert_eq!(position.amount, dec!(0.001));
        assert_eq!(position.entry_price, Price::new(dec!(49975)));

        let orders = manager.protective_for(&btc_key()).unwrap();
        assert!(orders.is_complete(), "SL and TP both recorded");
    }

    #[tokio::test]
    async fn test_terminal_protective_update_reissues() {
        let (mut manager, _book, _events) = paper_manager();
        manager.seed(
            btc_position(),
            ProtectiveOrders {
                sl_order_id: Some(1001),
                tp_order_id: Some(1002),
            },
        );

        let mut cancel = entry_fill();
        cancel.order_id = 1001;
        cancel.side = Side::Sell;
        cancel.order_type = OrderType::StopMarket;
        cancel.status = OrderStatus::Canceled;
        cancel.reduce_only = true;
        manager.on_order_update(cancel).await;

        let orders = manager.protective_for(&btc_key()).unwrap();
        // Cancelled SL replaced (paper id), TP untouched.
        assert!(orders.sl_order_id.is_some());
        assert_ne!(orders.sl_order_id, Some(1001));
        assert_eq!(orders.tp_order_id, Some(1002));
    }

    #[tokio::test]
    async fn test_past_tp_auto_close_on_protection_attempt() {
        let (mut manager, book, events) = paper_manager();
        let mut rx = events.subscribe();
        // 1% profit against... config tp is 1%, so use a deeper profit.
        let mut position = btc_position();
        position.mark_price = Price::new(dec!(50600)); // +1.25%
        manager.seed(position, ProtectiveOrders::default());

        manager.ensure_protection(&btc_key()).await;

        assert!(book.get(&btc_key()).is_none(), "position closed at market");
        let mut saw_closed = false;
        while let Ok(event) = rx.try_recv() {
            if let BotEvent::PositionClosed { reason, paper, .. } = event {
                assert!(paper);
                assert!(reason.contains("take-profit"));
                saw_closed = true;
            }
        }
        assert!(saw_closed);
    }

    #[tokio::test]
    async fn test_runaway_sweep_closes_position() {
        let (mut manager, book, _events) = paper_manager();
        let mut position = btc_position();
        position.mark_price = Price::new(dec!(50750)); // about +1.55%
        manager.seed(
            position,
            ProtectiveOrders {
                sl_order_id: Some(1),
                tp_order_id: Some(2),
            },
        );

        manager.auto_close_sweep().await;
        assert!(book.get(&btc_key()).is_none());
    }
}
