//! Authenticated user-data stream.
//!
//! Lifecycle: DISCONNECTED -> OBTAINING_KEY -> CONNECTING -> OPEN ->
//! CLOSED. A listen key obtained over REST keys the socket; the key is
//! refreshed every 50 minutes and DELETEd on graceful stop. A watchdog
//! refreshes connections that have gone 60 seconds without traffic.
//! Reconnects back off exponentially and give up (fatally) after five
//! attempts.

use crate::backoff::ReconnectPolicy;
use crate::error::{WsError, WsResult};
use crate::message::RawFrame;
use futures_util::{SinkExt, StreamExt};
use liq_core::{AccountUpdate, ErrorKind, OrderUpdate};
use liq_events::EventBus;
use liq_rest::ExchangeApi;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Keep-alive PUT cadence; listen keys expire after ~60 minutes.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(50 * 60);

/// Watchdog cadence.
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(30);

/// A connection without traffic for this long is refreshed.
const STALE_AFTER: Duration = Duration::from_secs(60);

/// Stream connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Disconnected,
    ObtainingKey,
    Connecting,
    Open,
    Closed,
}

/// Typed event surfaced to the core.
#[derive(Debug, Clone)]
pub enum UserEvent {
    Account(AccountUpdate),
    Order(OrderUpdate),
}

/// Why a session ended.
enum SessionEnd {
    Cancelled,
    KeyExpired,
    Disconnected,
    Stale,
}

/// Authenticated user-data websocket.
pub struct UserDataStream {
    api: ExchangeApi,
    ws_base: String,
    events: EventBus,
    tx: mpsc::Sender<UserEvent>,
    state: Arc<RwLock<StreamState>>,
}

impl UserDataStream {
    pub fn new(
        api: ExchangeApi,
        ws_base: impl Into<String>,
        events: EventBus,
        tx: mpsc::Sender<UserEvent>,
    ) -> Self {
        Self {
            api,
            ws_base: ws_base.into(),
            events,
            tx,
            state: Arc::new(RwLock::new(StreamState::Disconnected)),
        }
    }

    pub fn state(&self) -> StreamState {
        *self.state.read()
    }

    /// Run until cancelled or reconnects are exhausted.
    pub async fn run(&self, cancel: CancellationToken) -> WsResult<()> {
        let policy = ReconnectPolicy::default();
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                *self.state.write() = StreamState::Closed;
                return Ok(());
            }

            *self.state.write() = StreamState::ObtainingKey;
            let listen_key = match self.api.create_listen_key().await {
                Ok(key) => key,
                Err(e) => {
                    warn!(error = %e, "listen key request failed");
                    attempt += 1;
                    match policy.delay(attempt) {
                        Some(delay) => {
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        None => {
                            self.fatal(attempt);
                            return Err(WsError::ReconnectExhausted { attempts: attempt });
                        }
                    }
                }
            };

            *self.state.write() = StreamState::Connecting;
            match self.session(&listen_key, &cancel).await {
                Ok(SessionEnd::Cancelled) => {
                    *self.state.write() = StreamState::Closed;
                    // Graceful stop releases the key.
                    if let Err(e) = self.api.close_listen_key().await {
                        debug!(error = %e, "listen key close failed on shutdown");
                    }
                    info!("user-data stream closed");
                    return Ok(());
                }
                // The session reached OPEN: the backoff sequence
                // restarts.
                Ok(SessionEnd::KeyExpired) => {
                    warn!("listen key expired, refreshing");
                    attempt = 1;
                }
                Ok(SessionEnd::Disconnected) => {
                    warn!("user-data socket closed by peer");
                    attempt = 1;
                }
                Ok(SessionEnd::Stale) => {
                    warn!("user-data socket stale, refreshing");
                    attempt = 1;
                }
                Err(e) => {
                    warn!(error = %e, "user-data session error");
                    attempt += 1;
                }
            }

            match policy.delay(attempt) {
                Some(delay) => {
                    *self.state.write() = StreamState::Disconnected;
                    warn!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting user-data stream");
                    tokio::time::sleep(delay).await;
                }
                None => {
                    self.fatal(attempt);
                    return Err(WsError::ReconnectExhausted { attempts: attempt });
                }
            }
        }
    }

    fn fatal(&self, attempts: u32) {
        error!(attempts, "user-data stream reconnects exhausted");
        self.events.publish_error(
            ErrorKind::Transport,
            "user-data-stream",
            None,
            None,
            format!("reconnect attempts exhausted after {attempts}"),
        );
    }

    async fn session(&self, listen_key: &str, cancel: &CancellationToken) -> WsResult<SessionEnd> {
        let url = format!("{}/ws/{}", self.ws_base, listen_key);
        info!("connecting user-data stream");
        let (ws, _response) = connect_async(&url).await?;
        let (mut write, mut read) = ws.split();

        *self.state.write() = StreamState::Open;
        info!("user-data stream open");

        let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
        keepalive.tick().await; // intervals fire immediately once
        let mut watchdog = tokio::time::interval(WATCHDOG_INTERVAL);
        watchdog.tick().await;
        let mut last_activity = Instant::now();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Cancelled);
                }

                _ = keepalive.tick() => {
                    // Refresh failure alone does not tear the session
                    // down; an expiry event will if it follows.
                    if let Err(e) = self.api.keepalive_listen_key().await {
                        warn!(error = %e, "listen key keep-alive failed");
                    } else {
                        debug!("listen key refreshed");
                    }
                }

                _ = watchdog.tick() => {
                    if last_activity.elapsed() > STALE_AFTER {
                        return Ok(SessionEnd::Stale);
                    }
                }

                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            last_activity = Instant::now();
                            if self.handle_frame(&text).await? {
                                return Ok(SessionEnd::KeyExpired);
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            last_activity = Instant::now();
                            write.send(Message::Pong(payload)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "user-data close frame");
                            return Ok(SessionEnd::Disconnected);
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(SessionEnd::Disconnected),
                        _ => {}
                    }
                }
            }
        }
    }

    /// Returns true when the frame announced listen-key expiry.
    async fn handle_frame(&self, text: &str) -> WsResult<bool> {
        let frame: RawFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                // Unknown event tags are expected as the venue evolves.
                debug!(error = %e, "unhandled user-data frame");
                return Ok(false);
            }
        };

        match frame {
            RawFrame::AccountUpdate(raw) => {
                let update = raw.into_event();
                if self.tx.send(UserEvent::Account(update)).await.is_err() {
                    return Err(WsError::ReceiverDropped);
                }
            }
            RawFrame::OrderTradeUpdate(raw) => {
                let update = raw.into_event();
                if self.tx.send(UserEvent::Order(update)).await.is_err() {
                    return Err(WsError::ReceiverDropped);
                }
            }
            RawFrame::ListenKeyExpired(_) => return Ok(true),
            other => {
                debug!(?other, "unexpected frame on user-data stream");
            }
        }
        Ok(false)
    }
}
