//! Reliability envelope: timeout, circuit breaker, and retry combinators
//! around a uniform `Operation` trait, plus the metrics and health-check
//! plumbing that let a caller reason about degraded operation.
//!
//! Grounded on the circuit-breaker state machine in
//! `storage/circuit_breaker/states.rs` and the retry/backoff policy in
//! `retry/mod.rs` of the self-learning-memory example, re-expressed with
//! the teacher's `tokio`+`tracing` idiom and without introducing the
//! `rand` crate the teacher's stack doesn't carry.

use crate::error::{PampaxError, Result};
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A unit of work the envelope can wrap: timeout it, circuit-break it,
/// retry it. Implementors do the actual work in `call`; combinators below
/// wrap an `Operation` to add one concern at a time.
#[async_trait]
pub trait Operation<I, O>: Send + Sync {
    async fn call(&self, input: I) -> Result<O>;
}

/// Wraps an `Operation` so that `call` is cancelled and returns
/// `PampaxError::Timeout` if it doesn't finish within `duration`.
pub struct Timeout<Op> {
    inner: Op,
    duration: Duration,
}

impl<Op> Timeout<Op> {
    pub fn new(inner: Op, duration: Duration) -> Self {
        Self { inner, duration }
    }
}

#[async_trait]
impl<Op, I, O> Operation<I, O> for Timeout<Op>
where
    Op: Operation<I, O>,
    I: Send + 'static,
    O: Send + 'static,
{
    async fn call(&self, input: I) -> Result<O> {
        match tokio::time::timeout(self.duration, self.inner.call(input)).await {
            Ok(result) => result,
            Err(_) => Err(PampaxError::Timeout(self.duration)),
        }
    }
}

/// Circuit breaker state, following the classic three-state machine:
/// Closed (pass through) -> Open (fail fast) -> HalfOpen (probe) -> Closed
/// or back to Open on a failed probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long the circuit stays open before a half-open probe is allowed.
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default)]
struct CircuitBreakerInner {
    state: Mutex<CircuitState>,
    consecutive_failures: AtomicU64,
    opened_at: Mutex<Option<Instant>>,
}

impl Default for CircuitState {
    fn default() -> Self {
        CircuitState::Closed
    }
}

/// Wraps an `Operation` with a shared circuit breaker. `name` identifies
/// the operation class in logs (e.g. `"hybrid_search"`, `"embed"`).
pub struct CircuitBreaker<Op> {
    inner: Op,
    name: &'static str,
    config: CircuitBreakerConfig,
    state: Arc<CircuitBreakerInner>,
}

impl<Op> CircuitBreaker<Op> {
    pub fn new(inner: Op, name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            inner,
            name,
            config,
            state: Arc::new(CircuitBreakerInner::default()),
        }
    }

    fn should_allow(&self) -> bool {
        let mut state = self.state.state.lock().unwrap();
        match *state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let opened_at = *self.state.opened_at.lock().unwrap();
                let elapsed = opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.config.recovery_timeout {
                    *state = CircuitState::HalfOpen;
                    info!(circuit = self.name, "circuit entering half-open probe");
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_success(&self) {
        self.state.consecutive_failures.store(0, Ordering::SeqCst);
        let mut state = self.state.state.lock().unwrap();
        if *state != CircuitState::Closed {
            info!(circuit = self.name, "circuit closing after successful probe");
        }
        *state = CircuitState::Closed;
    }

    fn record_failure(&self) {
        let failures = self.state.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.state.lock().unwrap();
        let was_half_open = *state == CircuitState::HalfOpen;
        if was_half_open || failures >= self.config.failure_threshold as u64 {
            *state = CircuitState::Open;
            *self.state.opened_at.lock().unwrap() = Some(Instant::now());
            warn!(circuit = self.name, failures, "circuit opened");
        }
    }
}

#[async_trait]
impl<Op, I, O> Operation<I, O> for CircuitBreaker<Op>
where
    Op: Operation<I, O>,
    I: Send + 'static,
    O: Send + 'static,
{
    async fn call(&self, input: I) -> Result<O> {
        if !self.should_allow() {
            return Err(PampaxError::CircuitOpen(self.name));
        }
        match self.inner.call(input).await {
            Ok(out) => {
                self.record_success();
                Ok(out)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            jitter_fraction: 0.2,
        }
    }
}

/// Cheap, dependency-free jitter source: mixes the wall clock's
/// sub-millisecond bits with a seed rather than pulling in a `rand`
/// dependency the rest of the crate doesn't need.
fn jitter_unit(seed: u32) -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0)
        .wrapping_add(seed.wrapping_mul(2_654_435_761));
    (nanos % 1000) as f64 / 1000.0
}

fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = config.base_delay.saturating_mul(1u32 << attempt.min(16));
    let capped = exp.min(config.max_delay);
    if config.jitter_fraction <= 0.0 {
        return capped;
    }
    let jitter_range = capped.as_millis() as f64 * config.jitter_fraction;
    let offset = (jitter_unit(attempt) - 0.5) * 2.0 * jitter_range;
    let adjusted = (capped.as_millis() as f64 + offset).max(0.0);
    Duration::from_millis(adjusted as u64)
}

/// Wraps an `Operation` so transient failures (`PampaxError::is_retryable`)
/// are retried with exponential backoff and jitter. `I` must be `Clone`
/// since the same input is replayed across attempts.
pub struct Retry<Op> {
    inner: Op,
    config: RetryConfig,
}

impl<Op> Retry<Op> {
    pub fn new(inner: Op, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl<Op, I, O> Operation<I, O> for Retry<Op>
where
    Op: Operation<I, O>,
    I: Clone + Send + 'static,
    O: Send + 'static,
{
    async fn call(&self, input: I) -> Result<O> {
        let mut attempt = 0;
        loop {
            match self.inner.call(input.clone()).await {
                Ok(out) => return Ok(out),
                Err(err) if err.is_retryable() && attempt + 1 < self.config.max_attempts => {
                    let delay = backoff_delay(&self.config, attempt);
                    warn!(attempt, ?delay, error = %err, "retrying transient failure");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Metric kinds supported by the sink; mirrors the counter/gauge/histogram
/// vocabulary of statsd-style metrics libraries without depending on one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricEvent {
    pub name: String,
    pub kind: MetricKindSerde,
    pub value: f64,
    pub tags: Vec<(String, String)>,
    pub corr_id: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Serializable mirror of `MetricKind` (kept separate so `MetricKind`
/// itself stays a plain `Copy` enum for hot-path matching).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKindSerde {
    Counter,
    Gauge,
    Histogram,
}

impl From<MetricKind> for MetricKindSerde {
    fn from(k: MetricKind) -> Self {
        match k {
            MetricKind::Counter => MetricKindSerde::Counter,
            MetricKind::Gauge => MetricKindSerde::Gauge,
            MetricKind::Histogram => MetricKindSerde::Histogram,
        }
    }
}

/// A metrics registry backed by an unbounded async channel to keep
/// `counter`/`gauge`/`histogram` calls off the hot path; a background
/// task drains the channel into a `MetricsSink`.
#[derive(Clone)]
pub struct MetricsRegistry {
    sender: mpsc::UnboundedSender<MetricEvent>,
    sample_rate: f64,
}

impl MetricsRegistry {
    /// Spawns the background drain task writing to `sink`. `sample_rate`
    /// in `[0,1]` is applied to histogram emissions, the highest-volume
    /// kind; counters and gauges are always emitted.
    pub fn spawn(sink: Arc<dyn MetricsSink>, sample_rate: f64) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<MetricEvent>();
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                sink.emit(event);
            }
        });
        Self {
            sender,
            sample_rate: sample_rate.clamp(0.0, 1.0),
        }
    }

    fn emit(&self, name: &str, kind: MetricKind, value: f64, tags: &[(&str, &str)], corr_id: Option<&str>) {
        if kind == MetricKind::Histogram && self.sample_rate < 1.0 && jitter_unit(value as u32) > self.sample_rate {
            return;
        }
        let event = MetricEvent {
            name: name.to_string(),
            kind: kind.into(),
            value,
            tags: tags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            corr_id: corr_id.map(str::to_string),
            timestamp: chrono::Utc::now(),
        };
        // Channel send only fails if the drain task panicked; dropping the
        // metric is preferable to taking down the caller for it.
        let _ = self.sender.send(event);
    }

    pub fn counter(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        self.emit(name, MetricKind::Counter, value, tags, None);
    }

    pub fn gauge(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        self.emit(name, MetricKind::Gauge, value, tags, None);
    }

    pub fn histogram(&self, name: &str, value: f64, tags: &[(&str, &str)], corr_id: Option<&str>) {
        self.emit(name, MetricKind::Histogram, value, tags, corr_id);
    }
}

/// Where drained `MetricEvent`s go. `emit` runs on the background drain
/// task, never on a caller's hot path.
pub trait MetricsSink: Send + Sync {
    fn emit(&self, event: MetricEvent);
}

/// Writes one JSON object per line to stdout.
pub struct StdoutSink;

impl MetricsSink for StdoutSink {
    fn emit(&self, event: MetricEvent) {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(err) => debug!(error = %err, "failed to serialize metric event"),
        }
    }
}

/// Appends one JSON object per line to a file, opening it once and
/// reusing the handle across emits.
pub struct FileSink {
    file: Mutex<std::fs::File>,
}

impl FileSink {
    pub fn open(path: &std::path::Path) -> std::io::Result<Self> {
        use std::fs::OpenOptions;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }
}

impl MetricsSink for FileSink {
    fn emit(&self, event: MetricEvent) {
        use std::io::Write;
        let Ok(line) = serde_json::to_string(&event) else {
            return;
        };
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{line}");
        }
    }
}

/// Health status of one reliability-envelope component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ComponentHealth {
    pub name: &'static str,
    pub status: HealthStatus,
    pub detail: String,
}

/// Aggregate health across the four components the envelope tracks:
/// `database` (wraps [`crate::storage::HealthReport`]), `cache`,
/// `memory`, and `config`. This is intentionally a superset of
/// `storage::HealthReport`, which only ever reasons about table
/// reachability; here it is folded in as the `database` component
/// alongside process-level concerns the storage layer can't see.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AggregateHealth {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealth>,
}

impl AggregateHealth {
    /// Combine components by the worst-status-wins rule.
    pub fn from_components(components: Vec<ComponentHealth>) -> Self {
        let status = components
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);
        Self { status, components }
    }

    /// Process exit code for this health snapshot. A healthy or merely
    /// degraded system still exits `0` (the health check itself
    /// succeeded); an unhealthy system exits according to which
    /// component failed, per the CLI's exit-code contract: the `config`
    /// component maps to a config error, `database` to an I/O error,
    /// anything else to an internal error.
    pub fn exit_code(&self) -> i32 {
        if self.status != HealthStatus::Unhealthy {
            return 0;
        }
        let worst = self
            .components
            .iter()
            .filter(|c| c.status == HealthStatus::Unhealthy)
            .next();
        match worst.map(|c| c.name) {
            Some("config") => 2,
            Some("database") => 3,
            _ => 1,
        }
    }
}

/// Builds the `database` component from a storage health report.
pub fn database_component(report: &crate::storage::HealthReport) -> ComponentHealth {
    if report.healthy() {
        ComponentHealth {
            name: "database",
            status: HealthStatus::Healthy,
            detail: format!("schema version {}", report.schema_version),
        }
    } else {
        let unreachable: Vec<&str> = report
            .tables
            .iter()
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| name.as_str())
            .collect();
        ComponentHealth {
            name: "database",
            status: HealthStatus::Unhealthy,
            detail: format!("unreachable tables: {}", unreachable.join(", ")),
        }
    }
}

/// Builds the `cache` component from a cache hit-rate snapshot, degraded
/// below `warn_below` and unhealthy if the cache is reporting zero
/// capacity (effectively disabled).
pub fn cache_component(hit_rate: f64, capacity: usize, warn_below: f64) -> ComponentHealth {
    let status = if capacity == 0 {
        HealthStatus::Unhealthy
    } else if hit_rate < warn_below {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };
    ComponentHealth {
        name: "cache",
        status,
        detail: format!("hit_rate={hit_rate:.2} capacity={capacity}"),
    }
}

/// Builds the `memory` component from approximate process RSS against a
/// configured ceiling.
pub fn memory_component(used_bytes: u64, limit_bytes: u64) -> ComponentHealth {
    let ratio = if limit_bytes == 0 {
        0.0
    } else {
        used_bytes as f64 / limit_bytes as f64
    };
    let status = if ratio >= 1.0 {
        HealthStatus::Unhealthy
    } else if ratio >= 0.85 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };
    ComponentHealth {
        name: "memory",
        status,
        detail: format!("used={used_bytes} limit={limit_bytes}"),
    }
}

/// Builds the `config` component from `Config::validate`'s outcome.
pub fn config_component(validation: &Result<()>) -> ComponentHealth {
    match validation {
        Ok(()) => ComponentHealth {
            name: "config",
            status: HealthStatus::Healthy,
            detail: "valid".to_string(),
        },
        Err(err) => ComponentHealth {
            name: "config",
            status: HealthStatus::Unhealthy,
            detail: err.to_string(),
        },
    }
}

/// Thin wrapper for an async closure, so ad-hoc operations (a single
/// storage call, a single search) can be passed through the Timeout /
/// CircuitBreaker / Retry combinators without a named type per call site.
pub struct FnOperation<F> {
    f: F,
}

impl<F> FnOperation<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut, I, O> Operation<I, O> for FnOperation<F>
where
    F: Fn(I) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O>> + Send,
    I: Send + 'static,
    O: Send + 'static,
{
    async fn call(&self, input: I) -> Result<O> {
        (self.f)(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct Flaky {
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl Operation<(), ()> for Flaky {
        async fn call(&self, _input: ()) -> Result<()> {
            if self.failures_left.fetch_sub(1, Ordering::SeqCst) > 0 {
                Err(PampaxError::StorageIo("transient".into()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_failure() {
        let op = Retry::new(
            Flaky { failures_left: AtomicU32::new(2) },
            RetryConfig { max_attempts: 5, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(5), jitter_fraction: 0.0 },
        );
        assert!(op.call(()).await.is_ok());
    }

    #[tokio::test]
    async fn retry_gives_up_on_non_transient_error() {
        struct AlwaysConfigError;
        #[async_trait]
        impl Operation<(), ()> for AlwaysConfigError {
            async fn call(&self, _input: ()) -> Result<()> {
                Err(PampaxError::Config("bad".into()))
            }
        }
        let op = Retry::new(AlwaysConfigError, RetryConfig::default());
        assert!(matches!(op.call(()).await, Err(PampaxError::Config(_))));
    }

    #[tokio::test]
    async fn circuit_breaker_opens_after_threshold_and_recovers() {
        struct AlwaysFails;
        #[async_trait]
        impl Operation<(), ()> for AlwaysFails {
            async fn call(&self, _input: ()) -> Result<()> {
                Err(PampaxError::StorageIo("down".into()))
            }
        }
        let breaker = CircuitBreaker::new(
            AlwaysFails,
            "test_op",
            CircuitBreakerConfig { failure_threshold: 2, recovery_timeout: Duration::from_millis(10) },
        );
        assert!(breaker.call(()).await.is_err());
        assert!(breaker.call(()).await.is_err());
        // Circuit now open; next call should fail fast without invoking inner.
        match breaker.call(()).await {
            Err(PampaxError::CircuitOpen(name)) => assert_eq!(name, "test_op"),
            other => panic!("expected circuit open, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_wraps_slow_operation() {
        struct Slow;
        #[async_trait]
        impl Operation<(), ()> for Slow {
            async fn call(&self, _input: ()) -> Result<()> {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(())
            }
        }
        let op = Timeout::new(Slow, Duration::from_millis(5));
        assert!(matches!(op.call(()).await, Err(PampaxError::Timeout(_))));
    }

    #[test]
    fn aggregate_health_takes_worst_component() {
        let agg = AggregateHealth::from_components(vec![
            ComponentHealth { name: "database", status: HealthStatus::Healthy, detail: String::new() },
            ComponentHealth { name: "config", status: HealthStatus::Unhealthy, detail: "bad".to_string() },
        ]);
        assert_eq!(agg.status, HealthStatus::Unhealthy);
        assert_eq!(agg.exit_code(), 2);
    }
}
