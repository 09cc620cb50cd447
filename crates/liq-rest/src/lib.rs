//! Signed REST client and rate-limit manager.
//!
//! Every outbound REST call is funneled through [`RateLimiter`]: a
//! weighted, priority-aware scheduler with sliding-window accounting,
//! a circuit breaker, and request coalescing. [`HttpClient`] builds,
//! signs, and transmits the requests the limiter admits; [`ExchangeApi`]
//! is the typed endpoint surface the rest of the system calls.

pub mod api;
pub mod client;
pub mod error;
pub mod limiter;
pub mod model;
pub mod sign;

pub use api::{ExchangeApi, NewOrder, BASE_URL};
pub use client::{Credentials, HttpClient, RawResponse, RequestSpec, Security};
pub use error::{RestError, RestResult};
pub use limiter::{RateLimiter, Transport};
pub use sign::Params;
