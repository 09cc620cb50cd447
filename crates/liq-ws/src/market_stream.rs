//! Public market streams: forced liquidations and mark prices.
//!
//! Frames are filtered in-process by the configured symbol set; an
//! empty set passes everything through. Reconnection mirrors the
//! user-data stream: five exponential attempts, then fatal.

use crate::backoff::ReconnectPolicy;
use crate::error::{WsError, WsResult};
use crate::message::{parse_market_frames, RawFrame};
use futures_util::{SinkExt, StreamExt};
use liq_core::{ErrorKind, LiquidationEvent, MarkPrice};
use liq_events::EventBus;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Messages without traffic for this long refresh the socket.
const STALE_AFTER: Duration = Duration::from_secs(60);

const WATCHDOG_INTERVAL: Duration = Duration::from_secs(30);

/// Public websocket path for the liquidation feed.
pub fn force_order_url(ws_base: &str) -> String {
    format!("{ws_base}/ws/!forceOrder@arr")
}

/// Public websocket path for the 1s mark-price feed.
pub fn mark_price_url(ws_base: &str) -> String {
    format!("{ws_base}/ws/!markPrice@arr@1s")
}

/// Typed market event surfaced to the core.
#[derive(Debug, Clone)]
pub enum MarketEvent {
    Liquidation(LiquidationEvent),
    Mark(MarkPrice),
}

/// One public stream reader.
pub struct MarketStream {
    url: String,
    /// Symbols to pass through; empty means all.
    symbols: HashSet<String>,
    events: EventBus,
    tx: mpsc::Sender<MarketEvent>,
}

impl MarketStream {
    pub fn new(
        url: impl Into<String>,
        symbols: HashSet<String>,
        events: EventBus,
        tx: mpsc::Sender<MarketEvent>,
    ) -> Self {
        Self {
            url: url.into(),
            symbols,
            events,
            tx,
        }
    }

    fn passes_filter(&self, symbol: &str) -> bool {
        self.symbols.is_empty() || self.symbols.contains(symbol)
    }

    /// Run until cancelled or reconnects are exhausted.
    pub async fn run(&self, cancel: CancellationToken) -> WsResult<()> {
        let policy = ReconnectPolicy::default();
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            match self.session(&cancel).await {
                Ok(true) => return Ok(()), // cancelled
                Ok(false) => {
                    // The session reached OPEN: the backoff sequence
                    // restarts.
                    warn!(url = %self.url, "market stream disconnected");
                    attempt = 1;
                }
                Err(e) => {
                    warn!(url = %self.url, error = %e, "market stream error");
                    attempt += 1;
                }
            }

            match policy.delay(attempt) {
                Some(delay) => {
                    warn!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting market stream");
                    tokio::time::sleep(delay).await;
                }
                None => {
                    error!(url = %self.url, attempt, "market stream reconnects exhausted");
                    self.events.publish_error(
                        ErrorKind::Transport,
                        "market-stream",
                        None,
                        None,
                        format!("reconnect attempts exhausted after {attempt}"),
                    );
                    return Err(WsError::ReconnectExhausted { attempts: attempt });
                }
            }
        }
    }

    /// Returns `Ok(true)` when stopped by cancellation.
    async fn session(&self, cancel: &CancellationToken) -> WsResult<bool> {
        info!(url = %self.url, "connecting market stream");
        let (ws, _response) = connect_async(&self.url).await?;
        let (mut write, mut read) = ws.split();
        info!(url = %self.url, "market stream open");

        let mut watchdog = tokio::time::interval(WATCHDOG_INTERVAL);
        watchdog.tick().await;
        let mut last_activity = std::time::Instant::now();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(true);
                }

                _ = watchdog.tick() => {
                    if last_activity.elapsed() > STALE_AFTER {
                        warn!(url = %self.url, "market stream stale");
                        return Ok(false);
                    }
                }

                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            last_activity = std::time::Instant::now();
                            self.handle_text(&text).await?;
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            last_activity = std::time::Instant::now();
                            write.send(Message::Pong(payload)).await?;
                        }
                        Some(Ok(Message::Close(_))) => return Ok(false),
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(false),
                        _ => {}
                    }
                }
            }
        }
    }

    async fn handle_text(&self, text: &str) -> WsResult<()> {
        let frames = match parse_market_frames(text) {
            Ok(frames) => frames,
            Err(e) => {
                debug!(error = %e, "unparseable market frame");
                return Ok(());
            }
        };

        for frame in frames {
            let event = match frame {
                RawFrame::ForceOrder(raw) => {
                    let event = raw.into_event();
                    if !self.passes_filter(&event.symbol) {
                        continue;
                    }
                    MarketEvent::Liquidation(event)
                }
                RawFrame::MarkPrice(raw) => {
                    let event = raw.into_event();
                    if !self.passes_filter(&event.symbol) {
                        continue;
                    }
                    MarketEvent::Mark(event)
                }
                other => {
                    debug!(?other, "unexpected frame on market stream");
                    continue;
                }
            };
            if self.tx.send(event).await.is_err() {
                return Err(WsError::ReceiverDropped);
            }
        }
        Ok(())
    }
}
