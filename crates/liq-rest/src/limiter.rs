//! Weighted, priority-aware rate-limit manager.
//!
//! All outbound REST traffic is admitted here. Accounting is a sliding
//! 60s window of sent weights and order counts; a configurable fraction
//! of each budget is reserved for CRITICAL requests. Authoritative
//! usage headers harvested from responses override the computed window
//! while fresh. A 429/418 opens a circuit breaker that blocks
//! everything but CRITICAL for `min(16, 2^k)` seconds.
//!
//! The limiter clock is `tokio::time::Instant` so paused-clock tests
//! drive deadlines and the breaker deterministically.

use crate::client::{RawResponse, RequestSpec};
use crate::error::{RestError, RestResult};
use crate::model::ApiErrorBody;
use futures_util::future::BoxFuture;
use liq_core::{Priority, RateLimitConfig};
use liq_events::{EventBus, ToastLevel};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Sliding accounting window.
const WINDOW: Duration = Duration::from_secs(60);

/// How long a harvested usage header stays authoritative.
const HEADER_TTL: Duration = Duration::from_secs(5);

/// Dispatcher tick when idle.
const TICK_IDLE: Duration = Duration::from_millis(100);

/// Dispatcher tick while the queue is non-empty, smoothing bursts.
const TICK_BUSY: Duration = Duration::from_millis(50);

/// Usage percentage that raises the high-usage warning.
const HIGH_USAGE_PCT: u64 = 80;

/// Executes admitted requests on the wire.
///
/// Returns `Ok` for any HTTP status; `Err` only for failures below
/// HTTP. Classification of statuses happens in the limiter so breaker
/// and header bookkeeping stay in one place.
pub trait Transport: Send + Sync + 'static {
    fn execute(&self, spec: RequestSpec) -> BoxFuture<'static, RestResult<RawResponse>>;
}

struct UsageRecord {
    sent_at: Instant,
    weight: u32,
    is_order: bool,
}

struct QueuedRequest {
    spec: RequestSpec,
    enqueued_at: Instant,
    deadline: Instant,
    respond_to: oneshot::Sender<RestResult<RawResponse>>,
}

#[derive(Default)]
struct DedupState {
    /// Waiters piggybacking on an in-flight request, by key.
    in_flight: HashMap<String, Vec<oneshot::Sender<RestResult<RawResponse>>>>,
    /// Completed outcomes still inside the dedup window.
    done: HashMap<String, (RestResult<RawResponse>, Instant)>,
}

struct State {
    queues: [VecDeque<QueuedRequest>; 4],
    window: VecDeque<UsageRecord>,
    header_weight: Option<(u32, Instant)>,
    header_orders: Option<(u32, Instant)>,
    breaker_failures: u32,
    breaker_open_until: Option<Instant>,
    dedup: DedupState,
    high_usage_flagged: bool,
}

impl State {
    fn new() -> Self {
        Self {
            queues: [
                VecDeque::new(),
                VecDeque::new(),
                VecDeque::new(),
                VecDeque::new(),
            ],
            window: VecDeque::new(),
            header_weight: None,
            header_orders: None,
            breaker_failures: 0,
            breaker_open_until: None,
            dedup: DedupState::default(),
            high_usage_flagged: false,
        }
    }

    fn prune(&mut self, now: Instant, dedup_window: Duration) {
        while let Some(front) = self.window.front() {
            if now.duration_since(front.sent_at) >= WINDOW {
                self.window.pop_front();
            } else {
                break;
            }
        }
        self.dedup
            .done
            .retain(|_, (_, at)| now.duration_since(*at) < dedup_window);
    }

    /// Current usage: authoritative headers while fresh, otherwise the
    /// computed window.
    fn usage(&self, now: Instant) -> (u32, u32) {
        let weight = match self.header_weight {
            Some((w, at)) if now.duration_since(at) < HEADER_TTL => w,
            _ => self.window.iter().map(|r| r.weight).sum(),
        };
        let orders = match self.header_orders {
            Some((c, at)) if now.duration_since(at) < HEADER_TTL => c,
            _ => self.window.iter().filter(|r| r.is_order).count() as u32,
        };
        (weight, orders)
    }

    fn queue_non_empty(&self) -> bool {
        self.queues.iter().any(|q| !q.is_empty())
    }
}

struct Shared {
    config: RateLimitConfig,
    transport: Arc<dyn Transport>,
    events: EventBus,
    state: Mutex<State>,
    in_flight: AtomicUsize,
    critical_in_flight: AtomicUsize,
    wake: Notify,
}

/// The rate-limit manager. Cheap to clone.
#[derive(Clone)]
pub struct RateLimiter {
    shared: Arc<Shared>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, transport: Arc<dyn Transport>, events: EventBus) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                events,
                state: Mutex::new(State::new()),
                in_flight: AtomicUsize::new(0),
                critical_in_flight: AtomicUsize::new(0),
                wake: Notify::new(),
            }),
        }
    }

    /// Submit a request and await its outcome.
    ///
    /// Suspends until the request is admitted, sent, and answered — or
    /// until its queue deadline passes.
    pub async fn submit(&self, spec: RequestSpec) -> RestResult<RawResponse> {
        let shared = &self.shared;
        if spec.weight > shared.config.max_weight {
            return Err(RestError::Validation(format!(
                "request weight {} exceeds window budget {}",
                spec.weight, shared.config.max_weight
            )));
        }

        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        let coalesced_onto_in_flight = {
            let now = Instant::now();
            let mut st = shared.state.lock();
            st.prune(now, Duration::from_millis(shared.config.dedup_window_ms));

            if shared.config.dedup_enabled {
                if let Some(key) = spec.dedup_key.clone() {
                    if let Some((outcome, _)) = st.dedup.done.get(&key) {
                        trace!(%key, "request coalesced onto completed outcome");
                        return outcome.clone();
                    }
                    if let Some(waiters) = st.dedup.in_flight.get_mut(&key) {
                        trace!(%key, "request coalesced onto in-flight request");
                        waiters.push(tx.take().expect("tx present"));
                        true
                    } else {
                        st.dedup.in_flight.insert(key, Vec::new());
                        false
                    }
                } else {
                    false
                }
            } else {
                false
            }
        };

        if coalesced_onto_in_flight {
            return await_outcome(rx).await;
        }

        {
            let now = Instant::now();
            let mut st = shared.state.lock();
            let deadline = now + Duration::from_millis(shared.config.queue_timeout_ms);
            st.queues[spec.priority.index()].push_back(QueuedRequest {
                spec,
                enqueued_at: now,
                deadline,
                respond_to: tx.take().expect("tx present"),
            });
        }
        shared.wake.notify_one();
        await_outcome(rx).await
    }

    /// Spawn the dispatcher task. One per limiter.
    pub fn spawn_dispatcher(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            debug!("rate-limit dispatcher started");
            loop {
                let pause = dispatch_once(&shared);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(pause) => {}
                    _ = shared.wake.notified() => {}
                }
            }
            debug!("rate-limit dispatcher stopped");
        })
    }

    /// Outstanding CRITICAL work: queued plus in-flight.
    pub fn critical_pending(&self) -> usize {
        let queued = self.shared.state.lock().queues[Priority::Critical.index()].len();
        queued + self.shared.critical_in_flight.load(Ordering::Acquire)
    }

    /// Wait for outstanding CRITICAL requests to finish, bounded by
    /// `timeout`. Used during shutdown.
    pub async fn drain_critical(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while self.critical_pending() > 0 {
            if Instant::now() >= deadline {
                warn!("shutdown drain deadline reached with CRITICAL requests outstanding");
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

async fn await_outcome(
    rx: oneshot::Receiver<RestResult<RawResponse>>,
) -> RestResult<RawResponse> {
    rx.await
        .unwrap_or_else(|_| Err(RestError::Transport("rate limiter dropped request".into())))
}

/// One admission pass. Returns how long the dispatcher should sleep.
fn dispatch_once(shared: &Arc<Shared>) -> Duration {
    let now = Instant::now();
    let mut admitted = Vec::new();
    let busy;
    {
        let mut st = shared.state.lock();
        st.prune(now, Duration::from_millis(shared.config.dedup_window_ms));
        expire_deadlines(shared, &mut st, now);

        // Breaker auto-reset after the backoff interval elapses.
        if let Some(until) = st.breaker_open_until {
            if now >= until {
                st.breaker_open_until = None;
                st.breaker_failures = 0;
                shared.events.publish_toast(
                    ToastLevel::Info,
                    "Rate limit",
                    "circuit breaker reset, traffic resumed",
                );
            }
        }
        let breaker_open = st.breaker_open_until.is_some();

        let (mut weight_used, mut orders_used) = st.usage(now);
        check_high_usage(shared, &mut st, weight_used, orders_used);

        let cfg = &shared.config;
        let reserved_weight = cfg.max_weight * cfg.reserve_percent / 100;
        let reserved_orders = cfg.max_order_count * cfg.reserve_percent / 100;

        'priorities: for priority in Priority::ALL {
            if breaker_open && !priority.is_critical() {
                continue;
            }
            let weight_budget = if priority.is_critical() {
                cfg.max_weight
            } else {
                cfg.max_weight - reserved_weight
            };
            let order_budget = if priority.is_critical() {
                cfg.max_order_count
            } else {
                cfg.max_order_count - reserved_orders
            };

            while let Some(front) = st.queues[priority.index()].front() {
                if shared.in_flight.load(Ordering::Acquire) + admitted.len()
                    >= shared.config.max_concurrent
                {
                    break 'priorities;
                }
                if weight_used + front.spec.weight > weight_budget {
                    break;
                }
                if front.spec.is_order && orders_used + 1 > order_budget {
                    break;
                }
                let request = st.queues[priority.index()]
                    .pop_front()
                    .unwrap_or_else(|| unreachable!("front checked above"));
                weight_used += request.spec.weight;
                if request.spec.is_order {
                    orders_used += 1;
                }
                st.window.push_back(UsageRecord {
                    sent_at: now,
                    weight: request.spec.weight,
                    is_order: request.spec.is_order,
                });
                admitted.push(request);
            }
        }
        busy = st.queue_non_empty();
    }

    for request in admitted {
        shared.in_flight.fetch_add(1, Ordering::AcqRel);
        if request.spec.priority.is_critical() {
            shared.critical_in_flight.fetch_add(1, Ordering::AcqRel);
        }
        let shared = shared.clone();
        tokio::spawn(execute_request(shared, request));
    }

    if busy {
        TICK_BUSY
    } else {
        TICK_IDLE
    }
}

fn expire_deadlines(shared: &Arc<Shared>, st: &mut State, now: Instant) {
    for priority in Priority::ALL {
        while let Some(front) = st.queues[priority.index()].front() {
            if front.deadline > now {
                break;
            }
            let request = st.queues[priority.index()]
                .pop_front()
                .unwrap_or_else(|| unreachable!("front checked above"));
            let waited_ms = now.duration_since(request.enqueued_at).as_millis() as u64;
            warn!(path = %request.spec.path, waited_ms, "request expired in queue");
            let outcome = Err(RestError::QueueTimeout { waited_ms });
            resolve_dedup(shared, st, &request.spec, &outcome, now, false);
            let _ = request.respond_to.send(outcome);
        }
    }
}

fn check_high_usage(shared: &Arc<Shared>, st: &mut State, weight_used: u32, orders_used: u32) {
    let cfg = &shared.config;
    let weight_pct = weight_used as u64 * 100 / cfg.max_weight as u64;
    let order_pct = orders_used as u64 * 100 / cfg.max_order_count as u64;
    let high = weight_pct > HIGH_USAGE_PCT || order_pct > HIGH_USAGE_PCT;
    if high && !st.high_usage_flagged {
        st.high_usage_flagged = true;
        shared.events.publish_toast(
            ToastLevel::Warning,
            "Rate limit",
            format!("high usage: weight {weight_pct}%, orders {order_pct}%"),
        );
    } else if !high {
        st.high_usage_flagged = false;
    }
}

async fn execute_request(shared: Arc<Shared>, request: QueuedRequest) {
    let spec = request.spec.clone();
    let is_critical = spec.priority.is_critical();

    let raw = shared.transport.execute(request.spec).await;
    let outcome = classify(&shared, raw);

    {
        let now = Instant::now();
        let mut st = shared.state.lock();
        resolve_dedup(&shared, &mut st, &spec, &outcome, now, true);
    }
    let _ = request.respond_to.send(outcome);

    shared.in_flight.fetch_sub(1, Ordering::AcqRel);
    if is_critical {
        shared.critical_in_flight.fetch_sub(1, Ordering::AcqRel);
    }
    shared.wake.notify_one();
}

/// Fan an outcome out to coalesced waiters and, for completed wire
/// sends, cache it for the remainder of the dedup window.
fn resolve_dedup(
    shared: &Arc<Shared>,
    st: &mut State,
    spec: &RequestSpec,
    outcome: &RestResult<RawResponse>,
    now: Instant,
    cache: bool,
) {
    if !shared.config.dedup_enabled {
        return;
    }
    let Some(key) = &spec.dedup_key else {
        return;
    };
    if let Some(waiters) = st.dedup.in_flight.remove(key) {
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
    if cache {
        st.dedup.done.insert(key.clone(), (outcome.clone(), now));
    }
}

/// Map an HTTP response to a typed outcome, harvesting usage headers
/// and driving the circuit breaker.
fn classify(shared: &Arc<Shared>, raw: RestResult<RawResponse>) -> RestResult<RawResponse> {
    let response = match raw {
        Ok(response) => response,
        Err(e) => return Err(e),
    };

    let now = Instant::now();
    let mut st = shared.state.lock();
    if let Some(weight) = response.used_weight_1m {
        st.header_weight = Some((weight, now));
    }
    if let Some(count) = response.order_count_1m {
        st.header_orders = Some((count, now));
    }

    if response.is_success() {
        st.breaker_failures = 0;
        return Ok(response);
    }

    match response.status {
        429 | 418 => {
            st.breaker_failures += 1;
            let backoff_secs = 1u64 << st.breaker_failures.min(4);
            st.breaker_open_until = Some(now + Duration::from_secs(backoff_secs));
            let status = response.status;
            drop(st);
            shared.events.publish_error(
                liq_core::ErrorKind::RateLimit,
                "rate-limit",
                None,
                None,
                format!("HTTP {status}; circuit breaker open for {backoff_secs}s"),
            );
            Err(RestError::RateLimited {
                status,
                backoff_secs,
            })
        }
        401 | 403 => Err(RestError::Auth {
            status: response.status,
            message: response.body.clone(),
        }),
        status => {
            let (code, message) = match serde_json::from_str::<ApiErrorBody>(&response.body) {
                Ok(body) => (body.code, body.msg),
                Err(_) => (-1, response.body.clone()),
            };
            Err(RestError::Exchange {
                status,
                code,
                message,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Security;
    use reqwest::Method;

    fn ok_response() -> RawResponse {
        RawResponse {
            status: 200,
            body: "{}".to_string(),
            used_weight_1m: None,
            order_count_1m: None,
        }
    }

    /// Programmable transport recording the instant of every call.
    struct FakeTransport {
        calls: Mutex<Vec<(Instant, Priority, String)>>,
        replies: Mutex<VecDeque<RawResponse>>,
    }

    impl FakeTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                replies: Mutex::new(VecDeque::new()),
            })
        }

        fn push_reply(&self, response: RawResponse) {
            self.replies.lock().push_back(response);
        }

        fn call_count(&self) -> usize {
            self.calls.lock().len()
        }

        fn call_at(&self, idx: usize) -> Instant {
            self.calls.lock()[idx].0
        }
    }

    impl Transport for FakeTransport {
        fn execute(&self, spec: RequestSpec) -> BoxFuture<'static, RestResult<RawResponse>> {
            self.calls
                .lock()
                .push((Instant::now(), spec.priority, spec.path.clone()));
            let reply = self.replies.lock().pop_front().unwrap_or_else(ok_response);
            Box::pin(async move { Ok(reply) })
        }
    }

    fn spec(priority: Priority, weight: u32) -> RequestSpec {
        RequestSpec::new(Method::GET, "/test", Security::Public)
            .priority(priority)
            .weight(weight)
    }

    fn limiter_with(config: RateLimitConfig, transport: Arc<FakeTransport>) -> (RateLimiter, CancellationToken) {
        let limiter = RateLimiter::new(config, transport, EventBus::new(64));
        let cancel = CancellationToken::new();
        limiter.spawn_dispatcher(cancel.clone());
        (limiter, cancel)
    }

    #[tokio::test(start_paused = true)]
    async fn test_overweight_request_rejected_synchronously() {
        let transport = FakeTransport::new();
        let (limiter, _cancel) = limiter_with(RateLimitConfig::default(), transport.clone());

        let err = limiter
            .submit(spec(Priority::Low, 5000))
            .await
            .expect_err("must reject");
        assert!(matches!(err, RestError::Validation(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reserve_blocks_non_critical() {
        let transport = FakeTransport::new();
        let config = RateLimitConfig {
            max_weight: 10,
            reserve_percent: 30,
            // Long enough to outlive the 60s window slide.
            queue_timeout_ms: 120_000,
            ..RateLimitConfig::default()
        };
        let (limiter, _cancel) = limiter_with(config, transport.clone());

        // Budget for non-CRITICAL is 7: the first w=5 fits, the second
        // must wait for the window to slide.
        let first = limiter.submit(spec(Priority::Medium, 5));
        let second = limiter.submit(spec(Priority::Medium, 5));
        let (a, b) = tokio::join!(first, second);
        assert!(a.is_ok());
        assert!(b.is_ok());

        assert_eq!(transport.call_count(), 2);
        let gap = transport.call_at(1).duration_since(transport.call_at(0));
        assert!(gap >= WINDOW, "second send must wait out the window, gap {gap:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_critical_may_use_reserve() {
        let transport = FakeTransport::new();
        let config = RateLimitConfig {
            max_weight: 10,
            reserve_percent: 30,
            ..RateLimitConfig::default()
        };
        let (limiter, _cancel) = limiter_with(config, transport.clone());

        assert!(limiter.submit(spec(Priority::Medium, 5)).await.is_ok());
        // 5 + 5 exceeds the non-critical budget of 7, but CRITICAL sees
        // the full budget of 10.
        assert!(limiter.submit(spec(Priority::Critical, 5)).await.is_ok());
        let gap = transport.call_at(1).duration_since(transport.call_at(0));
        assert!(gap < WINDOW, "critical must not wait for the window");
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_timeout() {
        let transport = FakeTransport::new();
        let config = RateLimitConfig {
            max_weight: 10,
            reserve_percent: 0,
            queue_timeout_ms: 30_000,
            ..RateLimitConfig::default()
        };
        let (limiter, _cancel) = limiter_with(config, transport.clone());

        // Exhaust the window, then queue a request that can never be
        // admitted before its 30s deadline (window slides at 60s).
        assert!(limiter.submit(spec(Priority::Low, 10)).await.is_ok());
        let err = limiter
            .submit(spec(Priority::Low, 10))
            .await
            .expect_err("must time out");
        assert!(matches!(err, RestError::QueueTimeout { .. }), "got {err:?}");
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dedup_single_wire_send() {
        let transport = FakeTransport::new();
        let (limiter, _cancel) = limiter_with(RateLimitConfig::default(), transport.clone());

        let keyed = || {
            RequestSpec::new(Method::GET, "/fapi/v2/balance", Security::Public)
                .priority(Priority::Medium)
                .dedup("balance")
        };
        let (a, b, c) = tokio::join!(
            limiter.submit(keyed()),
            limiter.submit(keyed()),
            limiter.submit(keyed())
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(transport.call_count(), 1, "identical requests share one send");
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_opens_breaker_for_two_seconds() {
        let transport = FakeTransport::new();
        transport.push_reply(RawResponse {
            status: 429,
            body: String::new(),
            used_weight_1m: None,
            order_count_1m: None,
        });
        let (limiter, _cancel) = limiter_with(RateLimitConfig::default(), transport.clone());

        let err = limiter
            .submit(spec(Priority::Medium, 1))
            .await
            .expect_err("429 surfaces");
        assert!(matches!(err, RestError::RateLimited { backoff_secs: 2, .. }));

        // Non-critical traffic pauses for the 2s backoff; CRITICAL runs.
        let t429 = transport.call_at(0);
        let (critical, medium) = tokio::join!(
            limiter.submit(spec(Priority::Critical, 1)),
            limiter.submit(spec(Priority::Medium, 1))
        );
        assert!(critical.is_ok());
        assert!(medium.is_ok());

        let mut gaps: Vec<(Priority, Duration)> = {
            let calls = transport.calls.lock();
            calls[1..]
                .iter()
                .map(|(at, priority, _)| (*priority, at.duration_since(t429)))
                .collect()
        };
        gaps.sort_by_key(|(_, gap)| *gap);
        assert_eq!(gaps[0].0, Priority::Critical);
        assert!(gaps[0].1 < Duration::from_secs(2));
        assert_eq!(gaps[1].0, Priority::Medium);
        assert!(gaps[1].1 >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_header_override_is_authoritative_while_fresh() {
        let transport = FakeTransport::new();
        transport.push_reply(RawResponse {
            status: 200,
            body: "{}".to_string(),
            used_weight_1m: Some(9_999),
            order_count_1m: None,
        });
        let config = RateLimitConfig {
            max_weight: 10_000,
            reserve_percent: 10,
            ..RateLimitConfig::default()
        };
        let (limiter, _cancel) = limiter_with(config, transport.clone());

        assert!(limiter.submit(spec(Priority::Medium, 1)).await.is_ok());
        // Header says 9999 of 10000 used: non-critical budget (9000) is
        // exhausted until the header goes stale after 5s.
        assert!(limiter.submit(spec(Priority::Medium, 1)).await.is_ok());
        let gap = transport.call_at(1).duration_since(transport.call_at(0));
        assert!(gap >= HEADER_TTL, "second send waited for header staleness, gap {gap:?}");
    }
}
