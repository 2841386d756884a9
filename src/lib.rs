#![forbid(unsafe_code)]

//! # courier
//!
//! Resilient multi-channel article notification dispatcher: SSRF-safe content
//! fetch, per-sink circuit breakers, and bounded fan-out to Discord/Slack
//! webhooks.
//!
//! ## Pipeline
//!
//! ```text
//! Dispatcher::notify(article, source)
//!   → for each enabled sink, spawn a task
//!     → rate limiter wait → sink health check → sink.send → retry/backoff
//!     → metrics & logs
//! ```
//!
//! Content enrichment (fetching and extracting an article's full text before
//! dispatch) goes through [`content_fetch::ContentFetcher`], which composes
//! [`url_guard`] (SSRF protection) with a rolling-window [`circuit_breaker`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use courier::config::PipelineConfig;
//! use courier::dispatcher::Dispatcher;
//! use courier::metrics::Metrics;
//! use courier::sinks::NoopSink;
//!
//! #[tokio::main]
//! async fn main() {
//!     let metrics = Arc::new(Metrics::new_for_test());
//!     let config = PipelineConfig::load(&metrics);
//!     let dispatcher = Dispatcher::new(vec![Arc::new(NoopSink)], config.max_concurrent, metrics);
//!     dispatcher.shutdown(Duration::from_secs(5)).await.ok();
//! }
//! ```

pub mod circuit_breaker;
pub mod clock;
pub mod config;
pub mod content_fetch;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod health;
pub mod http_client;
pub mod metrics;
pub mod rate_limit;
pub mod sleeper;
pub mod sinks;
pub mod types;
pub mod url_guard;

pub use circuit_breaker::{CircuitBreakerConfig, CircuitBreakerPolicy, CircuitState};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use context::Context;
pub use dispatcher::Dispatcher;
pub use error::ResilienceError;
