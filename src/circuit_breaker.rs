//! Circuit breaker with closed/open/half-open admission control.
//!
//! Unlike a lock-free design, admission here is guarded by a single
//! per-breaker mutex. That is deliberate: the half-open admission contract
//! requires an atomic *increment-then-check* (increment `half_open_in_flight`
//! under the lock, reject and roll back if it now exceeds `max_requests`).
//! A check-then-increment design — tempting as a "faster" lock-free path —
//! admits more than `max_requests` concurrent callers under contention,
//! because the check and the increment are observed by other threads as two
//! separate events. The lock is held only for state inspection and counter
//! updates; the wrapped operation always runs off-lock.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, MonotonicClock};
use crate::error::ResilienceError;

/// Bounds enforced on [`CircuitBreakerConfig`]; out-of-range values are
/// clamped with a `tracing::warn!` rather than rejected.
pub const MIN_NAME_LEN: usize = 1;
pub const MAX_NAME_LEN: usize = 100;
pub const MIN_MAX_FAILURES: usize = 1;
pub const MAX_MAX_FAILURES: usize = 1000;
pub const MIN_TIMEOUT: Duration = Duration::from_millis(100);
pub const MAX_TIMEOUT: Duration = Duration::from_secs(600);
pub const MIN_MAX_REQUESTS: usize = 1;
pub const MAX_MAX_REQUESTS: usize = 100;

const CALLBACK_WORKERS: usize = 2;
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(5);
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        write!(f, "{s}")
    }
}

/// Tunables for a named breaker. Construct via [`CircuitBreakerConfig::new`]
/// and the builder methods; every setter re-clamps to the documented bounds.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub name: String,
    pub max_failures: usize,
    pub timeout: Duration,
    pub max_requests: usize,
}

impl CircuitBreakerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), max_failures: 5, timeout: Duration::from_secs(30), max_requests: 1 }.clamped()
    }

    #[must_use]
    pub fn max_failures(mut self, n: usize) -> Self {
        self.max_failures = n;
        self.clamped()
    }

    #[must_use]
    pub fn timeout(mut self, d: Duration) -> Self {
        self.timeout = d;
        self.clamped()
    }

    #[must_use]
    pub fn max_requests(mut self, n: usize) -> Self {
        self.max_requests = n;
        self.clamped()
    }

    fn clamped(mut self) -> Self {
        if self.name.trim().is_empty() || self.name.len() > MAX_NAME_LEN {
            tracing::warn!(requested = %self.name, "circuit breaker name out of bounds, defaulting to 'unnamed'");
            self.name = "unnamed".to_string();
        }
        let clamped_failures = self.max_failures.clamp(MIN_MAX_FAILURES, MAX_MAX_FAILURES);
        if clamped_failures != self.max_failures {
            tracing::warn!(name = %self.name, requested = self.max_failures, clamped = clamped_failures, "max_failures out of bounds, clamped");
            self.max_failures = clamped_failures;
        }
        let clamped_timeout = self.timeout.clamp(MIN_TIMEOUT, MAX_TIMEOUT);
        if clamped_timeout != self.timeout {
            tracing::warn!(name = %self.name, requested_ms = self.timeout.as_millis() as u64, clamped_ms = clamped_timeout.as_millis() as u64, "timeout out of bounds, clamped");
            self.timeout = clamped_timeout;
        }
        let clamped_requests = self.max_requests.clamp(MIN_MAX_REQUESTS, MAX_MAX_REQUESTS);
        if clamped_requests != self.max_requests {
            tracing::warn!(name = %self.name, requested = self.max_requests, clamped = clamped_requests, "max_requests out of bounds, clamped");
            self.max_requests = clamped_requests;
        }
        if self.max_requests > self.max_failures {
            tracing::info!(name = %self.name, max_requests = self.max_requests, max_failures = self.max_failures, "max_requests exceeds max_failures; permitted but unusual");
        }
        self
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::new("unnamed")
    }
}

/// Read-locked snapshot of a breaker's counters, formatted for direct
/// serialization by an HTTP health/metrics layer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CircuitBreakerMetrics {
    pub name: String,
    pub state: String,
    pub failures: usize,
    pub requests: usize,
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub state_changes: u64,
    pub max_failures: usize,
    pub timeout_seconds: f64,
    pub max_requests: usize,
    pub last_failure: String,
    pub last_state_change: String,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: usize,
    half_open_in_flight: usize,
    opened_at_millis: Option<u64>,
    total_requests: u64,
    total_successes: u64,
    total_failures: u64,
    state_changes: u64,
    last_failure_wall: Option<chrono::DateTime<chrono::Utc>>,
    last_state_change_wall: Option<chrono::DateTime<chrono::Utc>>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_in_flight: 0,
            opened_at_millis: None,
            total_requests: 0,
            total_successes: 0,
            total_failures: 0,
            state_changes: 0,
            last_failure_wall: None,
            last_state_change_wall: None,
        }
    }
}

struct StateChangeEvent {
    name: String,
    from: CircuitState,
    to: CircuitState,
}

type StateChangeCallback = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

/// Bounded, non-blocking worker pool that delivers state-change callbacks.
/// Notification is best-effort: a full buffer drops the event with a
/// warning rather than blocking the state machine that produced it.
struct Notifier {
    tx: Mutex<Option<mpsc::Sender<StateChangeEvent>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Notifier {
    fn spawn(callback: StateChangeCallback) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(CALLBACK_WORKERS * 2);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let mut workers = Vec::with_capacity(CALLBACK_WORKERS);
        for _ in 0..CALLBACK_WORKERS {
            let rx = rx.clone();
            let callback = callback.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    let event = { rx.lock().await.recv().await };
                    let Some(event) = event else { break };
                    let callback = callback.clone();
                    let task = tokio::task::spawn_blocking(move || {
                        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                            (callback)(&event.name, event.from, event.to);
                        }))
                    });
                    match tokio::time::timeout(CALLBACK_TIMEOUT, task).await {
                        Ok(Ok(Ok(()))) => {}
                        Ok(Ok(Err(_panic))) => {
                            tracing::error!("circuit breaker state-change callback panicked");
                        }
                        Ok(Err(_join_err)) => {
                            tracing::error!("circuit breaker state-change callback task failed");
                        }
                        Err(_timeout) => {
                            tracing::warn!("circuit breaker state-change callback timed out");
                        }
                    }
                }
            }));
        }
        Arc::new(Self { tx: Mutex::new(Some(tx)), workers: Mutex::new(workers) })
    }

    fn notify(&self, event: StateChangeEvent) {
        let guard = self.tx.lock().unwrap();
        if let Some(tx) = guard.as_ref() {
            if tx.try_send(event).is_err() {
                tracing::warn!("circuit breaker state-change notification dropped: buffer full");
            }
        }
    }

    async fn shutdown(&self) {
        self.tx.lock().unwrap().take();
        let handles = std::mem::take(&mut *self.workers.lock().unwrap());
        let drain = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_DRAIN, drain).await.is_err() {
            tracing::warn!("circuit breaker callback pool did not drain within shutdown deadline");
        }
    }
}

struct Admission {
    was_half_open: bool,
}

/// A named circuit breaker. Cheap to clone; clones share the same state and
/// callback pool.
#[derive(Clone)]
pub struct CircuitBreakerPolicy {
    inner: Arc<Mutex<Inner>>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    notifier: Option<Arc<Notifier>>,
}

impl CircuitBreakerPolicy {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(MonotonicClock::default()))
    }

    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self { inner: Arc::new(Mutex::new(Inner::new())), config, clock, notifier: None }
    }

    /// Attach a state-change callback, backed by the bounded notification pool.
    #[must_use]
    pub fn on_state_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.notifier = Some(Notifier::spawn(Arc::new(callback)));
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Execute `operation`, with no cancellation surface. Equivalent to the
    /// admission contract's steps 2-6 and 8 (step 1 and 7 do not apply
    /// without a token to observe).
    pub async fn execute<T, E, Fut, Op>(&self, operation: Op) -> Result<T, ResilienceError<E>>
    where
        T: Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send + 'static,
        Op: FnOnce() -> Fut + Send,
    {
        self.execute_cancellable(&CancellationToken::new(), operation).await
    }

    /// Execute `operation`, honoring `token` for precheck (step 1) and
    /// mid-flight cancellation (step 7).
    pub async fn execute_cancellable<T, E, Fut, Op>(
        &self,
        token: &CancellationToken,
        operation: Op,
    ) -> Result<T, ResilienceError<E>>
    where
        T: Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send + 'static,
        Op: FnOnce() -> Fut + Send,
    {
        if token.is_cancelled() {
            return Err(ResilienceError::Cancelled);
        }

        let admission = self.admit()?;

        let mut handle = tokio::spawn(operation());
        tokio::select! {
            _ = token.cancelled() => {
                handle.abort();
                self.on_cancel(admission);
                Err(ResilienceError::Cancelled)
            }
            joined = &mut handle => {
                match joined {
                    Ok(Ok(value)) => {
                        self.on_success(admission);
                        Ok(value)
                    }
                    Ok(Err(ResilienceError::Cancelled)) => {
                        self.on_cancel(admission);
                        Err(ResilienceError::Cancelled)
                    }
                    Ok(Err(err)) => {
                        self.on_failure(admission);
                        Err(err)
                    }
                    Err(join_err) => {
                        self.on_failure(admission);
                        Err(ResilienceError::Panicked(join_err.to_string()))
                    }
                }
            }
        }
    }

    fn admit<E>(&self) -> Result<Admission, ResilienceError<E>> {
        let mut inner = self.inner.lock().unwrap();
        let now = self.clock.now_millis();

        if inner.state == CircuitState::Open {
            let opened_at = inner.opened_at_millis.unwrap_or(now);
            let elapsed = now.saturating_sub(opened_at);
            if elapsed < self.config.timeout.as_millis() as u64 {
                return Err(ResilienceError::CircuitOpen {
                    failure_count: inner.consecutive_failures,
                    open_duration: Duration::from_millis(elapsed),
                });
            }
            self.transition(&mut inner, CircuitState::HalfOpen);
            inner.half_open_in_flight = 0;
        }

        // Step 4: atomic increment-then-check. Incrementing before checking
        // (rather than checking then incrementing) is what keeps concurrent
        // half-open admissions bounded by max_requests under contention.
        let was_half_open = inner.state == CircuitState::HalfOpen;
        if was_half_open {
            inner.half_open_in_flight += 1;
            if inner.half_open_in_flight > self.config.max_requests {
                inner.half_open_in_flight -= 1;
                return Err(ResilienceError::CircuitOpen {
                    failure_count: inner.consecutive_failures,
                    open_duration: Duration::from_millis(0),
                });
            }
        }

        inner.total_requests += 1;
        Ok(Admission { was_half_open })
    }

    fn on_success(&self, admission: Admission) {
        let mut inner = self.inner.lock().unwrap();
        inner.total_successes += 1;
        inner.consecutive_failures = 0;
        if admission.was_half_open {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
            if inner.state == CircuitState::HalfOpen {
                self.transition(&mut inner, CircuitState::Closed);
                inner.half_open_in_flight = 0;
            }
        }
    }

    fn on_failure(&self, admission: Admission) {
        let mut inner = self.inner.lock().unwrap();
        inner.total_failures += 1;
        inner.consecutive_failures += 1;
        inner.last_failure_wall = Some(chrono::Utc::now());

        if admission.was_half_open {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
            if inner.state == CircuitState::HalfOpen {
                inner.opened_at_millis = Some(self.clock.now_millis());
                self.transition(&mut inner, CircuitState::Open);
            }
        } else if inner.state == CircuitState::Closed && inner.consecutive_failures >= self.config.max_failures {
            inner.opened_at_millis = Some(self.clock.now_millis());
            self.transition(&mut inner, CircuitState::Open);
        }
    }

    fn on_cancel(&self, admission: Admission) {
        let mut inner = self.inner.lock().unwrap();
        // Step 7: a cancelled call counts as neither success nor failure.
        inner.total_requests = inner.total_requests.saturating_sub(1);
        if admission.was_half_open {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        inner.state_changes += 1;
        inner.last_state_change_wall = Some(chrono::Utc::now());
        tracing::info!(breaker = %self.config.name, from = %from, to = %to, "circuit breaker state change");
        if let Some(notifier) = &self.notifier {
            notifier.notify(StateChangeEvent { name: self.config.name.clone(), from, to });
        }
    }

    /// Force Closed, clearing `consecutive_failures`, `half_open_in_flight`,
    /// `last_fail_time`, and the open-since marker. `total_requests`/
    /// `total_successes`/`total_failures`/`state_changes` are preserved:
    /// Reset is "recover", not "forget".
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_failures = 0;
        inner.half_open_in_flight = 0;
        inner.opened_at_millis = None;
        inner.last_failure_wall = None;
        self.transition(&mut inner, CircuitState::Closed);
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock().unwrap();
        CircuitBreakerMetrics {
            name: self.config.name.clone(),
            state: inner.state.to_string(),
            failures: inner.consecutive_failures,
            requests: inner.half_open_in_flight,
            total_requests: inner.total_requests,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            state_changes: inner.state_changes,
            max_failures: self.config.max_failures,
            timeout_seconds: self.config.timeout.as_secs_f64(),
            max_requests: self.config.max_requests,
            last_failure: inner.last_failure_wall.map(|t| t.to_rfc3339()).unwrap_or_else(|| "never".to_string()),
            last_state_change: inner
                .last_state_change_wall
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string()),
        }
    }

    /// Drain the callback pool, waiting up to 5s for workers to exit.
    pub async fn shutdown(&self) {
        if let Some(notifier) = &self.notifier {
            notifier.shutdown().await;
        }
    }
}
