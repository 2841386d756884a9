//! Rolling-window circuit breaker used to protect the content fetcher (and any
//! other single shared downstream) from repeated failures.
//!
//! Unlike a consecutive-failure counter, this tracks successes/failures within a
//! rolling `interval` and opens once both `min_requests` and `failure_threshold`
//! (a fraction) are met. Half-open allows up to `half_open_max_requests` concurrent
//! probes; any probe failure reopens the breaker, and `half_open_max_requests`
//! consecutive probe successes close it.

use crate::clock::{Clock, MonotonicClock};
use crate::error::ResilienceError;
use crate::metrics::Metrics;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Length of the rolling window used to evaluate `failure_threshold` while closed.
    pub interval: Duration,
    /// Minimum requests observed in `interval` before the threshold is evaluated.
    pub min_requests: u32,
    /// Fraction of failed requests (0.0, 1.0] within `interval` that opens the breaker.
    pub failure_threshold: f64,
    /// How long the breaker stays open before allowing half-open probes.
    pub timeout: Duration,
    /// Consecutive successful half-open probes required to close the breaker.
    pub half_open_max_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            min_requests: 5,
            failure_threshold: 0.6,
            timeout: Duration::from_secs(60),
            half_open_max_requests: 5,
        }
    }
}

struct Window {
    started_at_millis: AtomicU64,
    successes: AtomicU32,
    failures: AtomicU32,
}

struct State {
    mode: AtomicU8,
    window: Window,
    opened_at_millis: AtomicU64,
    half_open_in_flight: AtomicU32,
    half_open_successes: AtomicU32,
}

/// Rolling-window circuit breaker, safe to clone and share across tasks.
#[derive(Clone)]
pub struct CircuitBreakerPolicy {
    name: Arc<str>,
    config: CircuitBreakerConfig,
    state: Arc<State>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
}

impl CircuitBreakerPolicy {
    pub fn new(name: impl Into<Arc<str>>, config: CircuitBreakerConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            name: name.into(),
            config,
            state: Arc::new(State {
                mode: AtomicU8::new(STATE_CLOSED),
                window: Window {
                    started_at_millis: AtomicU64::new(0),
                    successes: AtomicU32::new(0),
                    failures: AtomicU32::new(0),
                },
                opened_at_millis: AtomicU64::new(0),
                half_open_in_flight: AtomicU32::new(0),
                half_open_successes: AtomicU32::new(0),
            }),
            clock: Arc::new(MonotonicClock::default()),
            metrics,
        }
    }

    fn record_state(&self, state: CircuitState) {
        self.metrics.circuit_breaker_state(&self.name, state);
    }

    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        match self.state.mode.load(Ordering::Acquire) {
            STATE_CLOSED => CircuitState::Closed,
            STATE_OPEN => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }

    fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    pub async fn execute<T, E, Fut, Op>(&self, operation: Op) -> Result<T, ResilienceError<E>>
    where
        T: Send,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send,
        Op: FnOnce() -> Fut + Send,
    {
        let mut entered_half_open = false;
        loop {
            match self.state.mode.load(Ordering::Acquire) {
                STATE_OPEN => {
                    let opened_at = self.state.opened_at_millis.load(Ordering::Acquire);
                    let elapsed = self.now_millis().saturating_sub(opened_at);
                    if elapsed < self.config.timeout.as_millis() as u64 {
                        return Err(ResilienceError::CircuitOpen {
                            failures: self.state.window.failures.load(Ordering::Acquire),
                            requests: self.state.window.successes.load(Ordering::Acquire)
                                + self.state.window.failures.load(Ordering::Acquire),
                            open_duration: Duration::from_millis(elapsed),
                        });
                    }
                    if self
                        .state
                        .mode
                        .compare_exchange(STATE_OPEN, STATE_HALF_OPEN, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.state.half_open_in_flight.store(0, Ordering::Release);
                        self.state.half_open_successes.store(0, Ordering::Release);
                        tracing::info!(breaker = %self.name, "circuit breaker -> half-open");
                        self.record_state(CircuitState::HalfOpen);
                    }
                    continue;
                }
                STATE_HALF_OPEN => {
                    let in_flight = self.state.half_open_in_flight.fetch_add(1, Ordering::AcqRel) + 1;
                    if in_flight > self.config.half_open_max_requests {
                        self.state.half_open_in_flight.fetch_sub(1, Ordering::Release);
                        return Err(ResilienceError::CircuitOpen {
                            failures: 0,
                            requests: 0,
                            open_duration: Duration::from_millis(0),
                        });
                    }
                    entered_half_open = true;
                    break;
                }
                _ => break,
            }
        }

        let result = operation().await;

        if entered_half_open {
            self.state.half_open_in_flight.fetch_sub(1, Ordering::Release);
        }

        match &result {
            Ok(_) => self.on_success(entered_half_open),
            Err(_) => self.on_failure(entered_half_open),
        }

        result.map_err(ResilienceError::Inner)
    }

    fn roll_window_if_stale(&self) {
        let now = self.now_millis();
        let started = self.state.window.started_at_millis.load(Ordering::Acquire);
        if now.saturating_sub(started) >= self.config.interval.as_millis() as u64 {
            self.state.window.started_at_millis.store(now, Ordering::Release);
            self.state.window.successes.store(0, Ordering::Release);
            self.state.window.failures.store(0, Ordering::Release);
        }
    }

    fn on_success(&self, was_half_open: bool) {
        if was_half_open {
            let successes = self.state.half_open_successes.fetch_add(1, Ordering::AcqRel) + 1;
            if successes >= self.config.half_open_max_requests
                && self
                    .state
                    .mode
                    .compare_exchange(STATE_HALF_OPEN, STATE_CLOSED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                self.state.window.successes.store(0, Ordering::Release);
                self.state.window.failures.store(0, Ordering::Release);
                self.state.window.started_at_millis.store(self.now_millis(), Ordering::Release);
                tracing::info!(breaker = %self.name, "circuit breaker -> closed");
                self.record_state(CircuitState::Closed);
            }
            return;
        }

        self.roll_window_if_stale();
        self.state.window.successes.fetch_add(1, Ordering::AcqRel);
    }

    fn on_failure(&self, was_half_open: bool) {
        if was_half_open {
            if self
                .state
                .mode
                .compare_exchange(STATE_HALF_OPEN, STATE_OPEN, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.state.opened_at_millis.store(self.now_millis(), Ordering::Release);
                tracing::warn!(breaker = %self.name, "circuit breaker: half-open probe failed -> open");
                self.record_state(CircuitState::Open);
            }
            return;
        }

        self.roll_window_if_stale();
        let failures = self.state.window.failures.fetch_add(1, Ordering::AcqRel) + 1;
        let successes = self.state.window.successes.load(Ordering::Acquire);
        let total = failures + successes;

        if total >= self.config.min_requests
            && (failures as f64 / total as f64) >= self.config.failure_threshold
            && self
                .state
                .mode
                .compare_exchange(STATE_CLOSED, STATE_OPEN, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            self.state.opened_at_millis.store(self.now_millis(), Ordering::Release);
            tracing::error!(breaker = %self.name, failures, total, "circuit breaker -> open");
            self.record_state(CircuitState::Open);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::io;

    fn io_err() -> io::Error {
        io::Error::new(io::ErrorKind::Other, "boom")
    }

    #[tokio::test]
    async fn starts_closed_and_executes() {
        let breaker = CircuitBreakerPolicy::new("test", CircuitBreakerConfig::default(), Arc::new(Metrics::new_for_test()));
        let result = breaker.execute(|| async { Ok::<_, io::Error>(42) }).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn opens_after_threshold_with_enough_requests() {
        let config = CircuitBreakerConfig {
            interval: Duration::from_secs(60),
            min_requests: 5,
            failure_threshold: 0.6,
            timeout: Duration::from_secs(60),
            half_open_max_requests: 1,
        };
        let breaker = CircuitBreakerPolicy::new("test", config, Arc::new(Metrics::new_for_test()));

        for _ in 0..3 {
            let _ = breaker.execute(|| async { Err::<(), _>(io_err()) }).await;
        }
        for _ in 0..2 {
            let _ = breaker.execute(|| async { Ok::<_, io::Error>(()) }).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open, "3/5 failures meets the 0.6 threshold");
    }

    #[tokio::test]
    async fn does_not_open_below_min_requests() {
        let config = CircuitBreakerConfig {
            interval: Duration::from_secs(60),
            min_requests: 10,
            failure_threshold: 0.5,
            timeout: Duration::from_secs(60),
            half_open_max_requests: 1,
        };
        let breaker = CircuitBreakerPolicy::new("test", config, Arc::new(Metrics::new_for_test()));
        for _ in 0..5 {
            let _ = breaker.execute(|| async { Err::<(), _>(io_err()) }).await;
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_then_closed_on_enough_successes() {
        let clock = ManualClock::new();
        let config = CircuitBreakerConfig {
            interval: Duration::from_secs(60),
            min_requests: 1,
            failure_threshold: 0.5,
            timeout: Duration::from_millis(100),
            half_open_max_requests: 2,
        };
        let breaker = CircuitBreakerPolicy::new("test", config, Arc::new(Metrics::new_for_test())).with_clock(clock.clone());

        let _ = breaker.execute(|| async { Err::<(), _>(io_err()) }).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        clock.advance(150);
        let _ = breaker.execute(|| async { Ok::<_, io::Error>(()) }).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen, "needs 2 successes to close");

        let _ = breaker.execute(|| async { Ok::<_, io::Error>(()) }).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let clock = ManualClock::new();
        let config = CircuitBreakerConfig {
            interval: Duration::from_secs(60),
            min_requests: 1,
            failure_threshold: 0.5,
            timeout: Duration::from_millis(50),
            half_open_max_requests: 1,
        };
        let breaker = CircuitBreakerPolicy::new("test", config, Arc::new(Metrics::new_for_test())).with_clock(clock.clone());

        let _ = breaker.execute(|| async { Err::<(), _>(io_err()) }).await;
        clock.advance(100);
        let _ = breaker.execute(|| async { Err::<(), _>(io_err()) }).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn open_breaker_rejects_without_calling_operation() {
        let config = CircuitBreakerConfig {
            interval: Duration::from_secs(60),
            min_requests: 1,
            failure_threshold: 0.1,
            timeout: Duration::from_secs(60),
            half_open_max_requests: 1,
        };
        let breaker = CircuitBreakerPolicy::new("test", config, Arc::new(Metrics::new_for_test()));
        let _ = breaker.execute(|| async { Err::<(), _>(io_err()) }).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        let mut called = false;
        let result = breaker
            .execute(|| {
                called = true;
                async { Ok::<_, io::Error>(()) }
            })
            .await;
        assert!(result.unwrap_err().is_circuit_open());
        assert!(!called);
    }

    #[tokio::test]
    async fn opening_reports_state_through_metrics() {
        let config = CircuitBreakerConfig {
            interval: Duration::from_secs(60),
            min_requests: 1,
            failure_threshold: 0.1,
            timeout: Duration::from_secs(60),
            half_open_max_requests: 1,
        };
        let metrics = Arc::new(Metrics::new_for_test());
        let breaker = CircuitBreakerPolicy::new("content-fetch", config, metrics.clone());
        let _ = breaker.execute(|| async { Err::<(), _>(io_err()) }).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        use prometheus::Encoder;
        let mut buffer = Vec::new();
        prometheus::TextEncoder::new().encode(&metrics.registry().gather(), &mut buffer).unwrap();
        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains(r#"circuit_breaker_state{resource="content-fetch"} 1"#), "{output}");
    }
}
