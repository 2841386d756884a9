//! Dispatcher: fans an article out to every enabled sink, concurrently, with
//! bounded concurrency, per-sink health gating, and graceful shutdown.
//!
//! `SinkHealth` here is the simpler, edge-triggered scheme from spec §4.6 —
//! a consecutive-failure counter that disables a sink for a fixed window —
//! distinct from the rolling-window [`crate::circuit_breaker::CircuitBreakerPolicy`]
//! used in front of the content fetcher. The dispatcher only ever fans out to
//! cheap, independent webhook calls, where a fixed disable window is the right
//! tradeoff; the shared content-fetch downstream warrants the heavier model.

use crate::context::Context;
use crate::error::DropReason;
use crate::metrics::Metrics;
use crate::sinks::Sink;
use crate::types::{Article, Source};
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;

const WORKER_POOL_TIMEOUT: Duration = Duration::from_secs(5);
const NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(30);
const CIRCUIT_BREAKER_THRESHOLD: u32 = 5;
const CIRCUIT_BREAKER_TIMEOUT: Duration = Duration::from_secs(5 * 60);

struct SinkHealth {
    consecutive_failures: AtomicU32,
    /// Millis since dispatcher start at which the sink re-opens; 0 = not disabled.
    disabled_until_millis: AtomicI64,
}

impl SinkHealth {
    fn new() -> Self {
        Self { consecutive_failures: AtomicU32::new(0), disabled_until_millis: AtomicI64::new(0) }
    }

    fn is_disabled(&self, now_millis: i64) -> bool {
        let until = self.disabled_until_millis.load(Ordering::Acquire);
        until != 0 && now_millis < until
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        self.disabled_until_millis.store(0, Ordering::Release);
    }

    /// Returns true if this failure just opened the breaker.
    fn record_failure(&self, now_millis: i64) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= CIRCUIT_BREAKER_THRESHOLD {
            let until = now_millis + CIRCUIT_BREAKER_TIMEOUT.as_millis() as i64;
            self.disabled_until_millis.store(until, Ordering::Release);
            return true;
        }
        false
    }
}

#[derive(Debug, Clone)]
pub struct SinkHealthSnapshot {
    pub name: String,
    pub enabled: bool,
    pub circuit_breaker_open: bool,
    pub disabled_until_millis: Option<i64>,
}

pub struct Dispatcher {
    sinks: Vec<Arc<dyn Sink>>,
    health: HashMap<String, Arc<SinkHealth>>,
    worker_pool: Arc<Semaphore>,
    root: Context,
    active_tasks: Arc<AtomicU64>,
    start: Instant,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(sinks: Vec<Arc<dyn Sink>>, max_concurrent: usize, metrics: Arc<Metrics>) -> Self {
        let health = sinks.iter().map(|s| (s.name().to_string(), Arc::new(SinkHealth::new()))).collect();
        Self {
            sinks,
            health,
            worker_pool: Arc::new(Semaphore::new(max_concurrent)),
            root: Context::root(),
            active_tasks: Arc::new(AtomicU64::new(0)),
            start: Instant::now(),
            metrics,
        }
    }

    fn now_millis(&self) -> i64 {
        self.start.elapsed().as_millis() as i64
    }

    /// Fan an article out to every enabled sink. Never blocks on sink latency;
    /// spawns a task per enabled sink and returns immediately.
    pub fn notify(&self, article: Arc<Article>, source: Arc<Source>) {
        let request_id = crate::context::new_request_id();
        let now_millis = self.now_millis();

        for sink in &self.sinks {
            if !sink.is_enabled() {
                continue;
            }
            let health = match self.health.get(sink.name()) {
                Some(h) => h.clone(),
                None => continue,
            };

            self.metrics.notification_dispatch_total(sink.name());

            if health.is_disabled(now_millis) {
                self.metrics.notification_dropped_total(sink.name(), DropReason::CircuitOpen);
                tracing::warn!(sink = sink.name(), request_id = %request_id, "sink disabled, dropping dispatch");
                continue;
            }

            let ctx = self.root.child().with_request_id(request_id.clone());
            self.active_tasks.fetch_add(1, Ordering::AcqRel);

            tokio::spawn(run_sink_task(
                sink.clone(),
                article.clone(),
                source.clone(),
                ctx,
                self.worker_pool.clone(),
                self.active_tasks.clone(),
                self.metrics.clone(),
                health,
                self.start,
            ));
        }
    }

    pub fn health(&self) -> Vec<SinkHealthSnapshot> {
        let now_millis = self.now_millis();
        self.sinks
            .iter()
            .map(|sink| {
                let h = self.health.get(sink.name());
                let disabled_until = h.and_then(|h| {
                    let v = h.disabled_until_millis.load(Ordering::Acquire);
                    (v != 0).then_some(v)
                });
                SinkHealthSnapshot {
                    name: sink.name().to_string(),
                    enabled: sink.is_enabled(),
                    circuit_breaker_open: h.map(|h| h.is_disabled(now_millis)).unwrap_or(false),
                    disabled_until_millis: disabled_until,
                }
            })
            .collect()
    }

    /// Cancel the root context and wait for in-flight tasks to drain, up to
    /// `deadline`. Returns an error if tasks are still outstanding when the
    /// deadline elapses.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), ShutdownError> {
        self.root.cancel();
        let active = self.active_tasks.clone();
        tokio::time::timeout(deadline, async move {
            while active.load(Ordering::Acquire) > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .map_err(|_| ShutdownError::DeadlineExceeded)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("shutdown deadline exceeded with tasks still in flight")]
    DeadlineExceeded,
}

#[allow(clippy::too_many_arguments)]
async fn run_sink_task(
    sink: Arc<dyn Sink>,
    article: Arc<Article>,
    source: Arc<Source>,
    ctx: Context,
    worker_pool: Arc<Semaphore>,
    active_tasks: Arc<AtomicU64>,
    metrics: Arc<Metrics>,
    health: Arc<SinkHealth>,
    dispatcher_start: Instant,
) {
    let _guard = TaskGuard(active_tasks);

    let permit = match tokio::time::timeout(WORKER_POOL_TIMEOUT, worker_pool.acquire_owned()).await {
        Ok(Ok(permit)) => permit,
        _ => {
            metrics.notification_dropped_total(sink.name(), DropReason::PoolFull);
            tracing::warn!(sink = sink.name(), request_id = ctx.request_id(), "worker pool saturated, dropping dispatch");
            return;
        }
    };

    let sink_name = sink.name().to_string();
    let start = Instant::now();

    let outcome = AssertUnwindSafe(ctx.run_with_timeout(NOTIFICATION_TIMEOUT, sink.send(&ctx, &article, &source)))
        .catch_unwind()
        .await;

    drop(permit);
    metrics.notification_send_duration(&sink_name, start.elapsed());

    let succeeded = match outcome {
        Ok(Ok(Ok(()))) => {
            tracing::info!(sink = %sink_name, request_id = ctx.request_id(), "sink send succeeded");
            true
        }
        Ok(Ok(Err(e))) => {
            tracing::warn!(sink = %sink_name, request_id = ctx.request_id(), error = %e, "sink send failed");
            false
        }
        Ok(Err(_elapsed)) => {
            tracing::warn!(sink = %sink_name, request_id = ctx.request_id(), "sink send timed out or was cancelled");
            false
        }
        Err(panic) => {
            tracing::error!(sink = %sink_name, request_id = ctx.request_id(), "sink task panicked: {panic:?}");
            false
        }
    };

    let now_millis = dispatcher_start.elapsed().as_millis() as i64;
    if succeeded {
        health.record_success();
        metrics.notification_sent_total(&sink_name, "success");
    } else {
        let opened = health.record_failure(now_millis);
        metrics.notification_sent_total(&sink_name, "failure");
        if opened {
            tracing::info!(sink = %sink_name, "circuit_breaker_open");
        }
    }
}

struct TaskGuard(Arc<AtomicU64>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
