//! Resilience governor for connector operations.
//!
//! Every provider call is admitted through a [`ResilienceGovernor`], which
//! keeps a token bucket and a circuit breaker per (provider, operation) key.
//! The governor never retries; [`RetryExecutor`] is a separate caller-side
//! helper for operations that want backoff.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{ConnectorError, ConnectorResult};
use crate::ids::{OperationKey, ProviderId};
use crate::types::CircuitState;

// ── Clock ──

/// Source of monotonic time for governor decisions.
///
/// Production uses [`SystemClock`]; tests use [`ManualClock`] to step through
/// refills, cooldowns, and queue waits without wall-clock sleeps.
#[async_trait]
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Sleep until the given duration has passed on this clock.
    async fn sleep(&self, duration: Duration);
}

/// Clock backed by [`Instant::now`] and the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Manually advanced clock for tests.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Advance the clock by the given duration.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.base + *offset
    }

    /// Advances the clock immediately and yields once so concurrent tasks
    /// interleave.
    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

// ── Keys and policies ──

/// Identity of one governed operation: a provider plus an operation key.
///
/// All rate limit and circuit state is scoped to this pair, so one
/// misbehaving operation never throttles or trips its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GovernorKey {
    /// Provider the operation targets.
    pub provider: ProviderId,
    /// Operation within that provider.
    pub operation: OperationKey,
}

impl GovernorKey {
    /// Create a key for the given provider and operation.
    #[must_use]
    pub fn new(provider: ProviderId, operation: OperationKey) -> Self {
        Self {
            provider,
            operation,
        }
    }
}

impl fmt::Display for GovernorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.operation)
    }
}

/// What to do when the token bucket is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RatePolicy {
    /// Reject immediately with a retry-after hint. Suits sync passes,
    /// which reschedule themselves.
    #[default]
    FailFast,
    /// Wait for a token up to the configured bound, then reject. Suits
    /// single-item writes that should not be dropped.
    Queue,
}

impl RatePolicy {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RatePolicy::FailFast => "fail_fast",
            RatePolicy::Queue => "queue",
        }
    }
}

impl fmt::Display for RatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Configuration ──

/// Governor tuning, shared by every key the governor tracks.
#[derive(Debug, Clone)]
pub struct GovernorConfig {
    /// Consecutive counted failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long an open circuit waits before allowing a probe.
    pub open_cooldown: Duration,
    /// Probe successes required to close a half-open circuit.
    pub success_threshold: u32,
    /// Maximum tokens in each key's bucket.
    pub bucket_capacity: u64,
    /// Tokens added per refill interval.
    pub refill_rate: u64,
    /// How often tokens are added.
    pub refill_interval: Duration,
    /// Longest a queued operation waits for a token before rejection.
    pub max_queue_wait: Duration,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_cooldown: Duration::from_secs(30),
            success_threshold: 1,
            bucket_capacity: 60,
            refill_rate: 1,
            refill_interval: Duration::from_secs(1),
            max_queue_wait: Duration::from_secs(5),
        }
    }
}

impl GovernorConfig {
    /// Set the failure threshold.
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the open-circuit cooldown.
    #[must_use]
    pub fn with_open_cooldown(mut self, cooldown: Duration) -> Self {
        self.open_cooldown = cooldown;
        self
    }

    /// Set the probe successes required to close the circuit.
    #[must_use]
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Set the token bucket shape.
    #[must_use]
    pub fn with_rate(mut self, capacity: u64, refill_rate: u64, refill_interval: Duration) -> Self {
        self.bucket_capacity = capacity;
        self.refill_rate = refill_rate;
        self.refill_interval = refill_interval;
        self
    }

    /// Set the queue wait bound.
    #[must_use]
    pub fn with_max_queue_wait(mut self, wait: Duration) -> Self {
        self.max_queue_wait = wait;
        self
    }
}

// ── Per-key state ──

enum Admission {
    Granted { probe: bool },
    CircuitOpen { retry_after_secs: u64 },
    RateLimited { retry_after_secs: u64 },
}

/// Combined bucket and breaker state for one governor key.
#[derive(Debug)]
struct KeyState {
    key: GovernorKey,
    circuit: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
    /// Set while a half-open probe is executing. At most one probe runs
    /// at a time.
    probe_in_flight: bool,
    tokens: u64,
    last_refill: Instant,
}

impl KeyState {
    fn new(key: GovernorKey, now: Instant, config: &GovernorConfig) -> Self {
        Self {
            key,
            circuit: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            opened_at: None,
            probe_in_flight: false,
            tokens: config.bucket_capacity,
            last_refill: now,
        }
    }

    /// Add tokens for the intervals that elapsed since the last refill.
    fn refill(&mut self, now: Instant, config: &GovernorConfig) {
        let elapsed = now.duration_since(self.last_refill);
        if elapsed < config.refill_interval {
            return;
        }

        let intervals = elapsed.as_secs_f64() / config.refill_interval.as_secs_f64();
        let new_tokens = (intervals as u64) * config.refill_rate;
        if new_tokens > 0 {
            self.tokens = (self.tokens + new_tokens).min(config.bucket_capacity);
            self.last_refill = now;
        }
    }

    /// Seconds until the next refill grants a token. Only meaningful when
    /// the bucket is empty; always at least 1.
    fn seconds_until_token(&self, now: Instant, config: &GovernorConfig) -> u64 {
        let elapsed = now.duration_since(self.last_refill);
        let remaining = config.refill_interval.saturating_sub(elapsed);
        (remaining.as_millis().div_ceil(1000) as u64).max(1)
    }

    /// Seconds until the open circuit allows a probe. Always at least 1.
    fn seconds_until_probe(&self, now: Instant, config: &GovernorConfig) -> u64 {
        let Some(opened_at) = self.opened_at else {
            return 1;
        };
        let elapsed = now.duration_since(opened_at);
        let remaining = config.open_cooldown.saturating_sub(elapsed);
        (remaining.as_millis().div_ceil(1000) as u64).max(1)
    }

    /// Decide whether one operation may run now, taking a token and the
    /// probe slot as needed.
    fn admit(&mut self, now: Instant, config: &GovernorConfig) -> Admission {
        if self.circuit == CircuitState::Open {
            let elapsed = self
                .opened_at
                .map(|at| now.duration_since(at))
                .unwrap_or(Duration::ZERO);
            if elapsed >= config.open_cooldown {
                debug!(operation = %self.key, "circuit transitioning to half-open");
                self.circuit = CircuitState::HalfOpen;
                self.success_count = 0;
                self.probe_in_flight = false;
            } else {
                return Admission::CircuitOpen {
                    retry_after_secs: self.seconds_until_probe(now, config),
                };
            }
        }

        if self.circuit == CircuitState::HalfOpen && self.probe_in_flight {
            return Admission::CircuitOpen {
                retry_after_secs: 1,
            };
        }

        self.refill(now, config);
        if self.tokens == 0 {
            return Admission::RateLimited {
                retry_after_secs: self.seconds_until_token(now, config),
            };
        }
        self.tokens -= 1;

        let probe = self.circuit == CircuitState::HalfOpen;
        if probe {
            self.probe_in_flight = true;
        }
        Admission::Granted { probe }
    }

    fn record_success(&mut self, probe: bool, config: &GovernorConfig) {
        match self.circuit {
            CircuitState::Closed => {
                self.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                if probe {
                    self.probe_in_flight = false;
                    self.success_count += 1;
                    if self.success_count >= config.success_threshold {
                        debug!(
                            operation = %self.key,
                            successes = self.success_count,
                            "circuit closed after successful probe"
                        );
                        self.circuit = CircuitState::Closed;
                        self.failure_count = 0;
                        self.success_count = 0;
                    }
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&mut self, now: Instant, probe: bool, config: &GovernorConfig) {
        match self.circuit {
            CircuitState::Closed => {
                self.failure_count += 1;
                if self.failure_count >= config.failure_threshold {
                    warn!(
                        operation = %self.key,
                        failures = self.failure_count,
                        "circuit opened after consecutive failures"
                    );
                    self.circuit = CircuitState::Open;
                    self.opened_at = Some(now);
                }
            }
            CircuitState::HalfOpen => {
                if probe {
                    warn!(operation = %self.key, "circuit reopened after probe failure");
                    self.probe_in_flight = false;
                } else {
                    warn!(
                        operation = %self.key,
                        "circuit reopened, straggler failed during half-open window"
                    );
                }
                self.circuit = CircuitState::Open;
                self.opened_at = Some(now);
                self.success_count = 0;
            }
            CircuitState::Open => {
                if probe {
                    self.probe_in_flight = false;
                }
                self.opened_at = Some(now);
            }
        }
    }

    /// Give back the probe slot without judging the service, for outcomes
    /// that say nothing about provider health.
    fn release_probe(&mut self, probe: bool) {
        if probe {
            self.probe_in_flight = false;
        }
    }

    fn status(&self, now: Instant, config: &GovernorConfig) -> GovernorStatus {
        let cooldown_remaining_secs = match (self.circuit, self.opened_at) {
            (CircuitState::Open, Some(opened_at)) => Some(
                config
                    .open_cooldown
                    .saturating_sub(now.duration_since(opened_at))
                    .as_secs(),
            ),
            _ => None,
        };
        GovernorStatus {
            key: self.key.clone(),
            circuit: self.circuit,
            failure_count: self.failure_count,
            tokens_available: self.tokens,
            probe_in_flight: self.probe_in_flight,
            cooldown_remaining_secs,
        }
    }
}

// ── Status snapshot ──

/// Point-in-time view of one key's governor state.
#[derive(Debug, Clone, Serialize)]
pub struct GovernorStatus {
    /// Key the state belongs to.
    pub key: GovernorKey,
    /// Circuit state.
    pub circuit: CircuitState,
    /// Consecutive counted failures.
    pub failure_count: u32,
    /// Tokens currently available.
    pub tokens_available: u64,
    /// Whether a half-open probe is executing.
    pub probe_in_flight: bool,
    /// Seconds left on an open circuit's cooldown. `None` unless open.
    pub cooldown_remaining_secs: Option<u64>,
}

// ── Governor ──

/// Process-wide admission control for provider operations.
///
/// State lives in one map keyed by [`GovernorKey`]; every decision is a
/// single read-modify-write under the map's write lock, so concurrent
/// callers of the same key never race the bucket or the breaker.
#[derive(Debug)]
pub struct ResilienceGovernor {
    config: GovernorConfig,
    clock: Arc<dyn Clock>,
    keys: RwLock<HashMap<GovernorKey, KeyState>>,
}

impl ResilienceGovernor {
    /// Create a governor on the system clock.
    #[must_use]
    pub fn new(config: GovernorConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a governor with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(GovernorConfig::default())
    }

    /// Create a governor on an injected clock.
    #[must_use]
    pub fn with_clock(config: GovernorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Get the governor configuration.
    #[must_use]
    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    /// Run one operation under this governor's admission control.
    ///
    /// Rejections surface as [`ConnectorError::RateLimited`] or
    /// [`ConnectorError::CircuitOpen`], both carrying a retry-after hint.
    /// The operation itself is never retried here.
    pub async fn execute<F, Fut, T>(
        &self,
        key: &GovernorKey,
        policy: RatePolicy,
        operation: F,
    ) -> ConnectorResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = ConnectorResult<T>>,
    {
        let probe = self.admit(key, policy).await?;

        let started = self.clock.now();
        let result = operation().await;
        let latency_ms = self.clock.now().duration_since(started).as_millis() as u64;

        let mut keys = self.keys.write().await;
        if let Some(state) = keys.get_mut(key) {
            let now = self.clock.now();
            match &result {
                Ok(_) => state.record_success(probe, &self.config),
                Err(err) if Self::counts_toward_circuit(err) => {
                    state.record_failure(now, probe, &self.config);
                }
                Err(_) => state.release_probe(probe),
            }
        }
        drop(keys);

        match &result {
            Ok(_) => {
                debug!(operation = %key, latency_ms, outcome = "success", "operation completed");
            }
            Err(err) => {
                warn!(
                    operation = %key,
                    latency_ms,
                    outcome = "failure",
                    error = %err,
                    "operation failed"
                );
            }
        }

        result
    }

    /// Wait for admission per the policy. Returns whether the granted slot
    /// is the half-open probe.
    async fn admit(&self, key: &GovernorKey, policy: RatePolicy) -> ConnectorResult<bool> {
        let deadline = match policy {
            RatePolicy::FailFast => None,
            RatePolicy::Queue => Some(self.clock.now() + self.config.max_queue_wait),
        };

        loop {
            let admission = {
                let mut keys = self.keys.write().await;
                let now = self.clock.now();
                let state = keys
                    .entry(key.clone())
                    .or_insert_with(|| KeyState::new(key.clone(), now, &self.config));
                state.admit(now, &self.config)
            };

            match admission {
                Admission::Granted { probe } => return Ok(probe),
                Admission::CircuitOpen { retry_after_secs } => {
                    warn!(
                        operation = %key,
                        retry_after_secs,
                        outcome = "rejected",
                        "circuit open, call rejected"
                    );
                    return Err(ConnectorError::circuit_open(
                        key.operation.clone(),
                        retry_after_secs,
                    ));
                }
                Admission::RateLimited { retry_after_secs } => {
                    let remaining = match deadline {
                        None => Duration::ZERO,
                        Some(deadline) => deadline.saturating_duration_since(self.clock.now()),
                    };
                    if remaining.is_zero() {
                        warn!(
                            operation = %key,
                            retry_after_secs,
                            outcome = "rejected",
                            "rate limit exceeded, call rejected"
                        );
                        return Err(ConnectorError::rate_limited(
                            key.operation.clone(),
                            retry_after_secs,
                        ));
                    }
                    debug!(
                        operation = %key,
                        retry_after_secs,
                        "queued waiting for rate limit capacity"
                    );
                    let slice = (self.config.refill_interval / 10)
                        .min(remaining)
                        .max(Duration::from_millis(1));
                    self.clock.sleep(slice).await;
                }
            }
        }
    }

    /// Rate limit rejections are back-pressure, not provider faults, so
    /// they never count toward the circuit. Other transient errors do.
    fn counts_toward_circuit(err: &ConnectorError) -> bool {
        err.is_transient()
            && !matches!(
                err,
                ConnectorError::RateLimited { .. } | ConnectorError::CircuitOpen { .. }
            )
    }

    /// Snapshot one key's state, if the governor has seen it.
    pub async fn status(&self, key: &GovernorKey) -> Option<GovernorStatus> {
        let keys = self.keys.read().await;
        let now = self.clock.now();
        keys.get(key).map(|state| state.status(now, &self.config))
    }

    /// Snapshot every tracked key.
    pub async fn statuses(&self) -> Vec<GovernorStatus> {
        let keys = self.keys.read().await;
        let now = self.clock.now();
        keys.values()
            .map(|state| state.status(now, &self.config))
            .collect()
    }

    /// Close one key's circuit and refill its bucket. Returns whether the
    /// key was tracked.
    pub async fn reset(&self, key: &GovernorKey) -> bool {
        let mut keys = self.keys.write().await;
        let now = self.clock.now();
        match keys.get_mut(key) {
            Some(state) => {
                *state = KeyState::new(key.clone(), now, &self.config);
                true
            }
            None => false,
        }
    }

    /// Drop all tracked key state.
    pub async fn clear(&self) {
        self.keys.write().await.clear();
    }
}

// ── Retry helper ──

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Initial delay before first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Caller-side retry with exponential backoff.
///
/// Sits outside the governor: wrap the governed call, not the other way
/// around. Circuit-open rejections are returned immediately, and rate
/// limit rejections wait out their retry-after hint when it fits under
/// `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a retry executor with the given configuration.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Create a retry executor with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Delay for a given attempt (0-indexed).
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.initial_delay.as_millis() as f64
            * self.config.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.config.max_delay.as_millis() as f64);

        let final_ms = if self.config.jitter {
            // Up to 25% jitter
            capped * (1.0 + jitter_fraction() * 0.25)
        } else {
            capped
        };

        Duration::from_millis(final_ms as u64)
    }

    /// Execute an operation, retrying transient failures.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> ConnectorResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ConnectorResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if matches!(err, ConnectorError::CircuitOpen { .. }) {
                        return Err(err);
                    }
                    if !err.is_transient() || attempt >= self.config.max_retries {
                        return Err(err);
                    }

                    let delay = match err.retry_after_secs() {
                        Some(hint) => {
                            let hinted = Duration::from_secs(hint);
                            if hinted > self.config.max_delay {
                                return Err(err);
                            }
                            hinted.max(self.backoff_delay(attempt))
                        }
                        None => self.backoff_delay(attempt),
                    };

                    debug!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Pseudo-random fraction in [0, 1) for jitter. Not cryptographic.
fn jitter_fraction() -> f64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let state = RandomState::new();
    let mut hasher = state.build_hasher();
    hasher.write_u64(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64,
    );
    (hasher.finish() as f64) / (u64::MAX as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;
    use tracing::field::{Field, Visit};
    use tracing::{span, Event, Metadata, Subscriber};

    fn key(provider: &str, operation: &str) -> GovernorKey {
        GovernorKey::new(provider.parse().unwrap(), operation.parse().unwrap())
    }

    fn governor_with_manual_clock(config: GovernorConfig) -> (ResilienceGovernor, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let governor = ResilienceGovernor::with_clock(config, clock.clone());
        (governor, clock)
    }

    async fn fail_transient(
        governor: &ResilienceGovernor,
        key: &GovernorKey,
    ) -> ConnectorResult<()> {
        governor
            .execute(key, RatePolicy::FailFast, || async {
                Err::<(), _>(ConnectorError::unavailable("503"))
            })
            .await
    }

    /// Collects every emitted log line as `name=value` text for assertions.
    #[derive(Clone)]
    struct LogCapture {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl LogCapture {
        fn new() -> Self {
            Self {
                events: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn lines(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    #[derive(Default)]
    struct LineVisitor {
        line: String,
    }

    impl Visit for LineVisitor {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            use std::fmt::Write as _;
            let _ = write!(self.line, " {}={:?}", field.name(), value);
        }
    }

    impl Subscriber for LogCapture {
        fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
            true
        }

        fn new_span(&self, _attrs: &span::Attributes<'_>) -> span::Id {
            span::Id::from_u64(1)
        }

        fn record(&self, _span: &span::Id, _values: &span::Record<'_>) {}

        fn record_follows_from(&self, _span: &span::Id, _follows: &span::Id) {}

        fn event(&self, event: &Event<'_>) {
            let mut visitor = LineVisitor::default();
            event.record(&mut visitor);
            self.events.lock().unwrap().push(visitor.line);
        }

        fn enter(&self, _span: &span::Id) {}

        fn exit(&self, _span: &span::Id) {}
    }

    #[tokio::test]
    async fn test_admits_within_capacity() {
        let config = GovernorConfig::default().with_rate(3, 1, Duration::from_secs(60));
        let (governor, _clock) = governor_with_manual_clock(config);
        let key = key("acme", "sync.contacts");

        for _ in 0..3 {
            let result = governor
                .execute(&key, RatePolicy::FailFast, || async { Ok(()) })
                .await;
            assert!(result.is_ok());
        }
    }

    #[tokio::test]
    async fn test_fail_fast_rejects_with_retry_hint_when_exhausted() {
        let config = GovernorConfig::default().with_rate(1, 1, Duration::from_secs(30));
        let (governor, _clock) = governor_with_manual_clock(config);
        let key = key("acme", "sync.contacts");

        governor
            .execute(&key, RatePolicy::FailFast, || async { Ok(()) })
            .await
            .unwrap();

        let err = governor
            .execute(&key, RatePolicy::FailFast, || async { Ok(()) })
            .await
            .unwrap_err();

        match err {
            ConnectorError::RateLimited {
                retry_after_secs, ..
            } => {
                assert!(retry_after_secs >= 1);
                assert!(retry_after_secs <= 30);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_tokens_refill_after_interval() {
        let config = GovernorConfig::default().with_rate(1, 1, Duration::from_secs(10));
        let (governor, clock) = governor_with_manual_clock(config);
        let key = key("acme", "sync.contacts");

        governor
            .execute(&key, RatePolicy::FailFast, || async { Ok(()) })
            .await
            .unwrap();
        assert!(fail_fast_rejected(&governor, &key).await);

        clock.advance(Duration::from_secs(10));
        let result = governor
            .execute(&key, RatePolicy::FailFast, || async { Ok(()) })
            .await;
        assert!(result.is_ok());
    }

    async fn fail_fast_rejected(governor: &ResilienceGovernor, key: &GovernorKey) -> bool {
        matches!(
            governor
                .execute(key, RatePolicy::FailFast, || async { Ok(()) })
                .await,
            Err(ConnectorError::RateLimited { .. })
        )
    }

    #[tokio::test]
    async fn test_queue_policy_waits_for_refill() {
        let config = GovernorConfig::default()
            .with_rate(1, 1, Duration::from_secs(10))
            .with_max_queue_wait(Duration::from_secs(60));
        let (governor, _clock) = governor_with_manual_clock(config);
        let key = key("acme", "contacts.update");

        governor
            .execute(&key, RatePolicy::Queue, || async { Ok(()) })
            .await
            .unwrap();

        // Bucket is now empty; the queued call sleeps on the manual clock
        // until the refill grants a token instead of dropping.
        let result = governor
            .execute(&key, RatePolicy::Queue, || async { Ok(()) })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_queue_policy_gives_up_after_bound() {
        let config = GovernorConfig::default()
            .with_rate(1, 1, Duration::from_secs(3600))
            .with_max_queue_wait(Duration::from_secs(5));
        let (governor, _clock) = governor_with_manual_clock(config);
        let key = key("acme", "contacts.update");

        governor
            .execute(&key, RatePolicy::Queue, || async { Ok(()) })
            .await
            .unwrap();

        let err = governor
            .execute(&key, RatePolicy::Queue, || async { Ok(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_circuit_opens_after_threshold_failures() {
        let config = GovernorConfig::default().with_failure_threshold(5);
        let (governor, _clock) = governor_with_manual_clock(config);
        let key = key("acme", "sync.contacts");

        for _ in 0..5 {
            fail_transient(&governor, &key).await.unwrap_err();
        }

        let status = governor.status(&key).await.unwrap();
        assert_eq!(status.circuit, CircuitState::Open);

        let err = governor
            .execute(&key, RatePolicy::FailFast, || async { Ok(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::CircuitOpen { .. }));
    }

    #[tokio::test]
    async fn test_permanent_errors_do_not_trip_circuit() {
        let config = GovernorConfig::default().with_failure_threshold(2);
        let (governor, _clock) = governor_with_manual_clock(config);
        let key = key("acme", "sync.contacts");

        for _ in 0..10 {
            let result = governor
                .execute(&key, RatePolicy::FailFast, || async {
                    Err::<(), _>(ConnectorError::auth("bad token"))
                })
                .await;
            assert!(result.is_err());
        }

        let status = governor.status(&key).await.unwrap();
        assert_eq!(status.circuit, CircuitState::Closed);
        assert_eq!(status.failure_count, 0);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let config = GovernorConfig::default().with_failure_threshold(3);
        let (governor, _clock) = governor_with_manual_clock(config);
        let key = key("acme", "sync.contacts");

        fail_transient(&governor, &key).await.unwrap_err();
        fail_transient(&governor, &key).await.unwrap_err();
        governor
            .execute(&key, RatePolicy::FailFast, || async { Ok(()) })
            .await
            .unwrap();

        fail_transient(&governor, &key).await.unwrap_err();
        fail_transient(&governor, &key).await.unwrap_err();

        let status = governor.status(&key).await.unwrap();
        assert_eq!(status.circuit, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_probe_allowed_after_cooldown_and_success_closes() {
        let config = GovernorConfig::default()
            .with_failure_threshold(1)
            .with_open_cooldown(Duration::from_secs(30));
        let (governor, clock) = governor_with_manual_clock(config);
        let key = key("acme", "sync.contacts");

        fail_transient(&governor, &key).await.unwrap_err();
        assert_eq!(
            governor.status(&key).await.unwrap().circuit,
            CircuitState::Open
        );

        clock.advance(Duration::from_secs(30));
        governor
            .execute(&key, RatePolicy::FailFast, || async { Ok(()) })
            .await
            .unwrap();

        assert_eq!(
            governor.status(&key).await.unwrap().circuit,
            CircuitState::Closed
        );
    }

    #[tokio::test]
    async fn test_probe_failure_reopens_circuit() {
        let config = GovernorConfig::default()
            .with_failure_threshold(1)
            .with_open_cooldown(Duration::from_secs(30));
        let (governor, clock) = governor_with_manual_clock(config);
        let key = key("acme", "sync.contacts");

        fail_transient(&governor, &key).await.unwrap_err();
        clock.advance(Duration::from_secs(30));
        fail_transient(&governor, &key).await.unwrap_err();

        let status = governor.status(&key).await.unwrap();
        assert_eq!(status.circuit, CircuitState::Open);

        // Reopened circuit rejects again until another cooldown passes.
        let err = governor
            .execute(&key, RatePolicy::FailFast, || async { Ok(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::CircuitOpen { .. }));
    }

    #[test]
    fn test_straggler_failure_during_half_open_reopens_circuit() {
        let config = GovernorConfig::default()
            .with_failure_threshold(1)
            .with_open_cooldown(Duration::from_secs(30));
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.clone());

        let now = Instant::now();
        let mut state = KeyState::new(key("acme", "sync.contacts"), now, &config);

        // A call admitted while the circuit is still closed stays in flight.
        assert!(matches!(
            state.admit(now, &config),
            Admission::Granted { probe: false }
        ));
        state.record_failure(now, false, &config);
        assert_eq!(state.circuit, CircuitState::Open);

        // Cooldown elapses and the next admission becomes the probe.
        let later = now + Duration::from_secs(30);
        assert!(matches!(
            state.admit(later, &config),
            Admission::Granted { probe: true }
        ));

        // The straggler settles with a failure while the probe is out: the
        // circuit reopens but the probe slot stays taken.
        state.record_failure(later, false, &config);
        assert_eq!(state.circuit, CircuitState::Open);
        assert!(state.probe_in_flight);

        let reopened: Vec<String> = capture
            .lines()
            .into_iter()
            .filter(|line| line.contains("circuit reopened"))
            .collect();
        assert_eq!(reopened.len(), 1);
        assert!(!reopened[0].contains("probe failure"));
        assert!(reopened[0].contains("straggler"));
    }

    #[tokio::test]
    async fn test_exactly_one_probe_at_a_time() {
        let config = GovernorConfig::default()
            .with_failure_threshold(1)
            .with_open_cooldown(Duration::from_secs(10));
        let (governor, clock) = governor_with_manual_clock(config);
        let governor = Arc::new(governor);
        let key = key("acme", "sync.contacts");

        fail_transient(&governor, &key).await.unwrap_err();
        clock.advance(Duration::from_secs(10));

        let gate = Arc::new(Notify::new());
        let probe_governor = governor.clone();
        let probe_key = key.clone();
        let probe_gate = gate.clone();
        let probe = tokio::spawn(async move {
            probe_governor
                .execute(&probe_key, RatePolicy::FailFast, || async move {
                    probe_gate.notified().await;
                    Ok(())
                })
                .await
        });

        // Give the probe a chance to claim the half-open slot.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let err = governor
            .execute(&key, RatePolicy::FailFast, || async { Ok(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::CircuitOpen { .. }));

        gate.notify_one();
        probe.await.unwrap().unwrap();
        assert_eq!(
            governor.status(&key).await.unwrap().circuit,
            CircuitState::Closed
        );
    }

    #[tokio::test]
    async fn test_keys_are_isolated() {
        let config = GovernorConfig::default()
            .with_failure_threshold(1)
            .with_rate(1, 1, Duration::from_secs(60));
        let (governor, _clock) = governor_with_manual_clock(config);
        let contacts = key("acme", "sync.contacts");
        let deals = key("acme", "sync.deals");
        let other_provider = key("globex", "sync.contacts");

        fail_transient(&governor, &contacts).await.unwrap_err();
        assert_eq!(
            governor.status(&contacts).await.unwrap().circuit,
            CircuitState::Open
        );

        governor
            .execute(&deals, RatePolicy::FailFast, || async { Ok(()) })
            .await
            .unwrap();
        governor
            .execute(&other_provider, RatePolicy::FailFast, || async { Ok(()) })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rejected_calls_log_operation_and_outcome() {
        let config = GovernorConfig::default()
            .with_rate(1, 1, Duration::from_secs(60))
            .with_failure_threshold(1);
        let (governor, clock) = governor_with_manual_clock(config);
        let key = key("acme", "sync.contacts");
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.clone());

        governor
            .execute(&key, RatePolicy::FailFast, || async { Ok(()) })
            .await
            .unwrap();
        assert!(fail_fast_rejected(&governor, &key).await);

        clock.advance(Duration::from_secs(60));
        fail_transient(&governor, &key).await.unwrap_err();
        let err = governor
            .execute(&key, RatePolicy::FailFast, || async { Ok(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::CircuitOpen { .. }));

        let lines = capture.lines();
        assert!(lines.iter().any(|line| {
            line.contains("rate limit exceeded")
                && line.contains("operation=acme:sync.contacts")
                && line.contains("outcome=\"rejected\"")
        }));
        assert!(lines.iter().any(|line| {
            line.contains("circuit open, call rejected")
                && line.contains("operation=acme:sync.contacts")
                && line.contains("outcome=\"rejected\"")
        }));
    }

    #[tokio::test]
    async fn test_reset_restores_closed_circuit_and_full_bucket() {
        let config = GovernorConfig::default()
            .with_failure_threshold(1)
            .with_rate(1, 1, Duration::from_secs(3600));
        let (governor, _clock) = governor_with_manual_clock(config);
        let key = key("acme", "sync.contacts");

        fail_transient(&governor, &key).await.unwrap_err();
        assert!(governor.reset(&key).await);

        let status = governor.status(&key).await.unwrap();
        assert_eq!(status.circuit, CircuitState::Closed);
        assert_eq!(status.tokens_available, 1);

        assert!(!governor.reset(&self::key("acme", "sync.unknown")).await);
    }

    #[tokio::test]
    async fn test_status_reports_unknown_key_as_none() {
        let governor = ResilienceGovernor::with_defaults();
        assert!(governor.status(&key("acme", "sync.contacts")).await.is_none());
    }

    #[tokio::test]
    async fn test_retry_executor_succeeds_first_try() {
        let executor = RetryExecutor::with_defaults();
        let calls = AtomicUsize::new(0);

        let result = executor
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, ConnectorError>(7) }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_executor_retries_transient_then_succeeds() {
        let config = RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            jitter: false,
        };
        let executor = RetryExecutor::new(config);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result = executor
            .execute(move || {
                let attempt = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(ConnectorError::unavailable("temporarily unavailable"))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_executor_stops_on_permanent_error() {
        let executor = RetryExecutor::with_defaults();
        let calls = AtomicUsize::new(0);

        let result: ConnectorResult<()> = executor
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ConnectorError::auth("bad token")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_executor_never_retries_circuit_open() {
        let executor = RetryExecutor::with_defaults();
        let calls = AtomicUsize::new(0);

        let result: ConnectorResult<()> = executor
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ConnectorError::circuit_open(
                        "sync.contacts".parse().unwrap(),
                        30,
                    ))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_executor_rejects_oversized_rate_limit_hint() {
        let config = RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(50),
            backoff_multiplier: 2.0,
            jitter: false,
        };
        let executor = RetryExecutor::new(config);
        let calls = AtomicUsize::new(0);

        let result: ConnectorResult<()> = executor
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ConnectorError::rate_limited(
                        "sync.contacts".parse().unwrap(),
                        120,
                    ))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
