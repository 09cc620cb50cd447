//! Signed HTTP transport.
//!
//! Builds the exact byte string to sign, attaches the signature as the
//! final parameter, and transmits those same bytes. GET/DELETE carry
//! parameters in the query string; POST/PUT as a form-encoded body.
//! Rate-limit bookkeeping lives in the limiter; this client only
//! harvests the response headers the limiter consumes.

use crate::error::{RestError, RestResult};
use crate::limiter::Transport;
use crate::sign::Params;
use futures_util::future::BoxFuture;
use liq_core::Priority;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Request timeout below the limiter's queue deadline.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Milliseconds the venue tolerates between our timestamp and receipt.
const RECV_WINDOW_MS: u64 = 5_000;

const HEADER_API_KEY: &str = "X-MBX-APIKEY";
const HEADER_USED_WEIGHT: &str = "x-mbx-used-weight-1m";
const HEADER_ORDER_COUNT: &str = "x-mbx-order-count-1m";

/// Authentication required by an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    /// No key, no signature.
    Public,
    /// API-key header only (listen-key endpoints).
    ApiKey,
    /// API-key header plus HMAC signature.
    Signed,
}

/// One outbound REST request, as submitted to the rate limiter.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub params: Params,
    pub security: Security,
    /// Cost units against the weight budget.
    pub weight: u32,
    /// Counts against the separate order budget.
    pub is_order: bool,
    pub priority: Priority,
    /// Requests sharing a key within the dedup window share one outcome.
    pub dedup_key: Option<String>,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>, security: Security) -> Self {
        Self {
            method,
            path: path.into(),
            params: Params::new(),
            security,
            weight: 1,
            is_order: false,
            priority: Priority::Low,
            dedup_key: None,
        }
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn order(mut self) -> Self {
        self.is_order = true;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn dedup(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }
}

/// API credentials. The secret zeroizes on drop.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: String,
    secret: SecretKey,
}

#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
struct SecretKey(String);

impl Credentials {
    pub fn new(api_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: SecretKey(secret_key.into()),
        }
    }

    fn secret(&self) -> &str {
        &self.secret.0
    }
}

/// An HTTP response before classification.
///
/// Any HTTP status lands here; the limiter maps non-2xx statuses to
/// typed errors and consumes the usage headers.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    pub used_weight_1m: Option<u32>,
    pub order_count_1m: Option<u32>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Signing HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> RestResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| RestError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            credentials,
        })
    }

    /// Final parameter string for the wire, signature included when the
    /// endpoint requires one. Exposed for signing tests.
    pub fn wire_params(&self, spec: &RequestSpec) -> String {
        let mut params = spec.params.clone();
        match spec.security {
            Security::Signed => {
                params.push("timestamp", chrono::Utc::now().timestamp_millis());
                params.push("recvWindow", RECV_WINDOW_MS);
                params.signed_query(self.credentials.secret())
            }
            _ => params.serialize(),
        }
    }

    async fn send(&self, spec: RequestSpec) -> RestResult<RawResponse> {
        let wire = self.wire_params(&spec);
        let in_body = spec.method == Method::POST || spec.method == Method::PUT;

        let url = if in_body || wire.is_empty() {
            format!("{}{}", self.base_url, spec.path)
        } else {
            format!("{}{}?{}", self.base_url, spec.path, wire)
        };

        let mut request = self.http.request(spec.method.clone(), &url);
        if spec.security != Security::Public {
            request = request.header(HEADER_API_KEY, &self.credentials.api_key);
        }
        if in_body {
            request = request
                .header(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/x-www-form-urlencoded"),
                )
                .body(wire);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RestError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let used_weight_1m = parse_header(response.headers().get(HEADER_USED_WEIGHT));
        let order_count_1m = parse_header(response.headers().get(HEADER_ORDER_COUNT));
        let body = response
            .text()
            .await
            .map_err(|e| RestError::Transport(e.to_string()))?;

        Ok(RawResponse {
            status,
            body,
            used_weight_1m,
            order_count_1m,
        })
    }
}

fn parse_header(value: Option<&HeaderValue>) -> Option<u32> {
    value.and_then(|v| v.to_str().ok()).and_then(|v| v.parse().ok())
}

impl Transport for HttpClient {
    fn execute(&self, spec: RequestSpec) -> BoxFuture<'static, RestResult<RawResponse>> {
        let client = self.clone();
        Box::pin(async move { client.send(spec).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sign::sign_hmac_sha256_hex;

    fn client() -> HttpClient {
        HttpClient::new(
            "https://fapi.example.test",
            Credentials::new("key", "secret"),
        )
        .unwrap()
    }

    #[test]
    fn test_wire_params_public_has_no_signature() {
        let mut params = Params::new();
        params.push("symbol", "BTCUSDT");
        let spec = RequestSpec::new(Method::GET, "/fapi/v1/depth", Security::Public).params(params);
        let wire = client().wire_params(&spec);
        assert_eq!(wire, "symbol=BTCUSDT");
    }

    #[test]
    fn test_wire_params_signed_bytes_match_signature() {
        let mut params = Params::new();
        params.push("symbol", "BTCUSDT").push("side", "BUY");
        let spec = RequestSpec::new(Method::POST, "/fapi/v1/order", Security::Signed).params(params);
        let wire = client().wire_params(&spec);

        // signature is the final parameter; the bytes before it are the
        // bytes that were signed.
        let idx = wire.rfind("&signature=").expect("signature present");
        let (payload, sig) = wire.split_at(idx);
        assert!(payload.starts_with("symbol=BTCUSDT&side=BUY&timestamp="));
        assert!(payload.contains("&recvWindow=5000"));
        let expected = sign_hmac_sha256_hex(payload.as_bytes(), "secret");
        assert_eq!(&sig["&signature=".len()..], expected);
    }
}
