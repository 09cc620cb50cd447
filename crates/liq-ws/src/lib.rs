//! Websocket connectivity for the trading daemon.
//!
//! Two stream families:
//! - User data: an authenticated, listen-key-bound socket delivering
//!   account, balance, and order-trade updates, with keep-alive and a
//!   staleness watchdog.
//! - Market data: public force-order (liquidation) and mark-price
//!   feeds with an in-process symbol filter.
//!
//! Raw venue frames are parsed into typed payloads at this edge;
//! string event tags never travel further into the system.

pub mod backoff;
pub mod error;
pub mod market_stream;
pub mod message;
pub mod user_stream;

pub use backoff::ReconnectPolicy;
pub use error::{WsError, WsResult};
pub use market_stream::{force_order_url, mark_price_url, MarketEvent, MarketStream};
pub use message::{parse_market_frames, RawFrame};
pub use user_stream::{StreamState, UserDataStream, UserEvent};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
