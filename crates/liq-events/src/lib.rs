//! Typed outbound events and the bus they travel on.
//!
//! The core publishes structured events; hosts (websocket fan-out, log
//! sink, test sink) subscribe. String event tags exist only in the
//! serialized form — inside the process everything is a `BotEvent`
//! variant.

pub mod bus;
pub mod event;

pub use bus::{EventBus, EventReceiver};
pub use event::{BotEvent, ErrorEvent, ToastLevel};
