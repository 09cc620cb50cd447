//! Broadcast-based event bus.

use crate::event::{BotEvent, ErrorEvent, ToastLevel};
use liq_core::ErrorKind;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Receiver half handed to hosts.
pub type EventReceiver = broadcast::Receiver<BotEvent>;

/// Pub/sub handle shared by every component.
///
/// Publishing never blocks; events sent with no subscribers attached
/// are dropped silently, matching fire-and-forget broadcast semantics.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BotEvent>,
}

impl EventBus {
    /// Create a bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> EventReceiver {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: BotEvent) {
        // No receivers is normal when the host hasn't attached yet.
        let _ = self.tx.send(event);
    }

    /// Publish a surfaced error.
    pub fn publish_error(
        &self,
        kind: ErrorKind,
        component: &str,
        symbol: Option<String>,
        code: Option<i64>,
        message: impl Into<String>,
    ) {
        let message = message.into();
        warn!(%kind, component, ?symbol, ?code, %message, "surfaced error");
        self.publish(BotEvent::Error(ErrorEvent {
            kind,
            component: component.to_string(),
            symbol,
            code,
            message,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }));
    }

    /// Publish a toast notification.
    pub fn publish_toast(
        &self,
        level: ToastLevel,
        title: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.publish(BotEvent::Toast {
            level,
            title: title.into(),
            message: message.into(),
        });
    }

    /// Spawn a sink that mirrors every event into the structured log.
    ///
    /// Keeps the bus drained even when no host broadcaster is attached.
    pub fn spawn_log_sink(&self) -> tokio::task::JoinHandle<()> {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => match &event {
                        BotEvent::Error(err) => {
                            warn!(tag = event.tag(), kind = %err.kind, message = %err.message, "event");
                        }
                        BotEvent::MarkPriceUpdate { .. } => {
                            // Too chatty for info.
                            debug!(tag = event.tag(), "event");
                        }
                        _ => {
                            info!(tag = event.tag(), "event");
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "log sink lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish_toast(ToastLevel::Info, "hello", "world");

        match rx.recv().await.unwrap() {
            BotEvent::Toast { level, title, .. } => {
                assert_eq!(level, ToastLevel::Info);
                assert_eq!(title, "hello");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new(16);
        // Must not panic or block.
        bus.publish_error(ErrorKind::Transport, "test", None, None, "boom");
    }
}
