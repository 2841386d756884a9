//! Metrics facade: a focused `prometheus::Registry` wrapper exposing exactly
//! the counters/gauges/histogram this crate needs (spec §10.4), rather than
//! the generic `PolicyEvent`/`TelemetrySink` bus this crate's ancestor used
//! for pluggable telemetry backends — this app's metric surface is small and
//! fixed, so the indirection buys nothing here.

use crate::circuit_breaker::CircuitState;
use crate::error::DropReason;
use prometheus::{HistogramVec, IntCounterVec, Registry};
use std::time::Duration;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    notification_dispatch_total: IntCounterVec,
    notification_sent_total: IntCounterVec,
    notification_dropped_total: IntCounterVec,
    content_fetch_total: IntCounterVec,
    config_fallback_total: IntCounterVec,
    circuit_breaker_state: prometheus::GaugeVec,
    notification_send_duration_seconds: HistogramVec,
}

impl Metrics {
    pub fn new(registry: Registry) -> Result<Self, prometheus::Error> {
        let notification_dispatch_total = IntCounterVec::new(
            prometheus::Opts::new("notification_dispatch_total", "Sink dispatch attempts"),
            &["sink"],
        )?;
        let notification_sent_total = IntCounterVec::new(
            prometheus::Opts::new("notification_sent_total", "Sink send outcomes"),
            &["sink", "status"],
        )?;
        let notification_dropped_total = IntCounterVec::new(
            prometheus::Opts::new("notification_dropped_total", "Dispatches dropped before reaching a sink"),
            &["sink", "reason"],
        )?;
        let content_fetch_total = IntCounterVec::new(
            prometheus::Opts::new("content_fetch_total", "Content fetch outcomes"),
            &["outcome"],
        )?;
        let config_fallback_total = IntCounterVec::new(
            prometheus::Opts::new("config_fallback_total", "Config fields that fell back to their default"),
            &["field"],
        )?;
        let circuit_breaker_state = prometheus::GaugeVec::new(
            prometheus::Opts::new("circuit_breaker_state", "0=closed 1=open 2=half-open"),
            &["resource"],
        )?;
        let notification_send_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("notification_send_duration_seconds", "Sink send duration"),
            &["sink"],
        )?;

        registry.register(Box::new(notification_dispatch_total.clone()))?;
        registry.register(Box::new(notification_sent_total.clone()))?;
        registry.register(Box::new(notification_dropped_total.clone()))?;
        registry.register(Box::new(content_fetch_total.clone()))?;
        registry.register(Box::new(config_fallback_total.clone()))?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;
        registry.register(Box::new(notification_send_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            notification_dispatch_total,
            notification_sent_total,
            notification_dropped_total,
            content_fetch_total,
            config_fallback_total,
            circuit_breaker_state,
            notification_send_duration_seconds,
        })
    }

    /// A fresh registry per call, for tests that don't want to share process-wide state.
    pub fn new_for_test() -> Self {
        Self::new(Registry::new()).expect("metric registration cannot fail with unique names")
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn notification_dispatch_total(&self, sink: &str) {
        self.notification_dispatch_total.with_label_values(&[sink]).inc();
    }

    pub fn notification_sent_total(&self, sink: &str, status: &str) {
        self.notification_sent_total.with_label_values(&[sink, status]).inc();
    }

    pub fn notification_dropped_total(&self, sink: &str, reason: DropReason) {
        self.notification_dropped_total.with_label_values(&[sink, reason.as_label()]).inc();
    }

    pub fn content_fetch_total(&self, outcome: &str) {
        self.content_fetch_total.with_label_values(&[outcome]).inc();
    }

    pub fn config_fallback_total(&self, field: &str) {
        self.config_fallback_total.with_label_values(&[field]).inc();
    }

    pub fn circuit_breaker_state(&self, resource: &str, state: CircuitState) {
        let value = match state {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        };
        self.circuit_breaker_state.with_label_values(&[resource]).set(value);
    }

    pub fn notification_send_duration(&self, sink: &str, duration: Duration) {
        self.notification_send_duration_seconds.with_label_values(&[sink]).observe(duration.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_dispatch_and_drop_counters() {
        let metrics = Metrics::new_for_test();
        metrics.notification_dispatch_total("discord");
        metrics.notification_dropped_total("discord", DropReason::PoolFull);
        let families = metrics.registry().gather();
        assert!(!families.is_empty());
    }

    #[test]
    fn circuit_breaker_state_maps_to_numeric_gauge() {
        let metrics = Metrics::new_for_test();
        metrics.circuit_breaker_state("content-fetch", CircuitState::Open);
    }
}
