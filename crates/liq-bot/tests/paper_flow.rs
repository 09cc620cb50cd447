//! Paper-mode flow tests: a seeded liquidation stream must produce the
//! documented event sequence without any wire traffic.

use futures_util::future::BoxFuture;
use liq_core::{
    GlobalConfig, LiquidationEvent, OrderType, Price, Qty, RateLimitConfig, Side, SymbolConfig,
};
use liq_events::{BotEvent, EventBus};
use liq_hunter::{Hunter, MarkPrices};
use liq_position::PositionBook;
use liq_registry::{PrecisionRegistry, SymbolFilters};
use liq_rest::client::{RawResponse, RequestSpec};
use liq_rest::{ExchangeApi, RateLimiter, RestResult, Transport};
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Paper mode must never reach the wire.
struct UnreachableTransport;

impl Transport for UnreachableTransport {
    fn execute(&self, spec: RequestSpec) -> BoxFuture<'static, RestResult<RawResponse>> {
        panic!("paper mode must not place orders: {}", spec.path);
    }
}

fn btc_config() -> SymbolConfig {
    let raw = serde_json::json!({
        "long_volume_threshold_usdt": "10000",
        "short_volume_threshold_usdt": "10000",
        "trade_size": "0.001",
        "tp_percent": "1",
        "sl_percent": "2",
        "price_offset_bps": "5",
        "order_type": "LIMIT",
    });
    serde_json::from_value(raw).unwrap()
}

fn registry() -> Arc<PrecisionRegistry> {
    let mut symbols = HashMap::new();
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
    Arc::new(PrecisionRegistry::from_filters(symbols))
}

struct Harness {
    events: EventBus,
    liquidations: mpsc::Sender<LiquidationEvent>,
    cancel: CancellationToken,
    /// Held open so the hunter's order-update branch stays alive.
    _order_updates: mpsc::Sender<liq_core::OrderUpdate>,
}

fn spawn_paper_hunter() -> Harness {
    let events = EventBus::new(256);
    let limiter = RateLimiter::new(
        RateLimitConfig::default(),
        Arc::new(UnreachableTransport),
        events.clone(),
    );
    let api = ExchangeApi::new(limiter);

    let mut symbols = HashMap::new();
    symbols.insert("BTCUSDT".to_string(), btc_config());
    let global = GlobalConfig {
        paper_mode: true,
        ..GlobalConfig::default()
    };

    let marks: MarkPrices = Arc::new(dashmap::DashMap::new());
    let hunter = Hunter::new(
        symbols,
        global,
        api,
        registry(),
        events.clone(),
        PositionBook::new(),
        marks,
        liq_core::PositionMode::OneWay,
    );

    let (liq_tx, liq_rx) = mpsc::channel(16);
    let (order_tx, order_rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    tokio::spawn(hunter.run(liq_rx, order_rx, cancel.clone()));

    Harness {
        events,
        liquidations: liq_tx,
        cancel,
        _order_updates: order_tx,
    }
}

fn seed_liquidation() -> LiquidationEvent {
    LiquidationEvent {
        symbol: "BTCUSDT".to_string(),
        side: Side::Sell,
        order_type: OrderType::Limit,
        price: Price::new(dec!(50000)),
        avg_price: Price::new(dec!(50000)),
        filled_qty: Qty::new(dec!(0.3)),
        event_time_ms: 1_700_000_000_000,
    }
}

async fn drain_events(rx: &mut liq_events::EventReceiver) -> Vec<BotEvent> {
    let mut collected = Vec::new();
    while let Ok(Ok(event)) = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await {
        collected.push(event);
    }
    collected
}

#[tokio::test]
async fn test_liquidation_triggers_paper_long_entry() {
    let harness = spawn_paper_hunter();
    let mut rx = harness.events.subscribe();

    harness.liquidations.send(seed_liquidation()).await.unwrap();

    let events = drain_events(&mut rx).await;
    harness.cancel.cancel();

    assert!(events
        .iter()
        .any(|e| matches!(e, BotEvent::LiquidationDetected { .. })));

    let opportunity = events
        .iter()
        .find_map(|e| match e {
            BotEvent::TradeOpportunity { side, volume_usdt, paper, .. } => {
                Some((*side, *volume_usdt, *paper))
            }
            _ => None,
        })
        .expect("tradeOpportunity emitted");
    assert_eq!(opportunity.0, Side::Buy);
    assert_eq!(opportunity.1, dec!(15000));
    assert!(opportunity.2, "paper marker set");

    let opened = events
        .iter()
        .find_map(|e| match e {
            BotEvent::PositionOpened { symbol, side, qty, price, paper, order_id, .. } => {
                Some((symbol.clone(), *side, *qty, *price, *paper, *order_id))
            }
            _ => None,
        })
        .expect("positionOpened emitted");
    assert_eq!(opened.0, "BTCUSDT");
    assert_eq!(opened.1, Side::Buy);
    assert_eq!(opened.2, Qty::new(dec!(0.001)));
    // 50000 x (1 - 0.0005) = 49975, already tick-aligned.
    assert_eq!(opened.3, Price::new(dec!(49975)));
    assert!(opened.4);
    assert!(opened.5.is_none(), "no server order id in paper mode");
}

#[tokio::test]
async fn test_duplicate_liquidation_suppressed() {
    let harness = spawn_paper_hunter();
    let mut rx = harness.events.subscribe();

    // Two identical frames within 100ms.
    harness.liquidations.send(seed_liquidation()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.liquidations.send(seed_liquidation()).await.unwrap();

    let events = drain_events(&mut rx).await;
    harness.cancel.cancel();

    let opened_count = events
        .iter()
        .filter(|e| matches!(e, BotEvent::PositionOpened { .. }))
        .count();
    assert_eq!(opened_count, 1, "pending entry suppresses the duplicate");

    // Both frames are still observed as liquidations.
    let detected_count = events
        .iter()
        .filter(|e| matches!(e, BotEvent::LiquidationDetected { .. }))
        .count();
    assert_eq!(detected_count, 2);
}
