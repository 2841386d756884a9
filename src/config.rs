//! Process configuration, loaded once from the environment at startup (spec §6/§10.3).
//!
//! Every field is parsed independently: an invalid value falls back to its
//! documented default with a `tracing::warn!` and a `config_fallback_total`
//! metric increment, except the security-relevant knobs (`deny_private_ips`,
//! webhook host/scheme/path), which fail closed — a malformed webhook URL
//! disables that sink rather than being coerced into something "close enough".
//!
//! Parsed once into an immutable struct and handed around as `Arc<PipelineConfig>`;
//! there is no hot-reload.

use crate::metrics::Metrics;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub enabled: bool,
    pub threshold_bytes: usize,
    pub timeout: Duration,
    pub parallelism: usize,
    pub max_body_bytes: u64,
    pub max_redirects: u32,
    pub deny_private_ips: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_bytes: 500,
            timeout: Duration::from_secs(10),
            parallelism: 10,
            max_body_bytes: 10 * 1024 * 1024,
            max_redirects: 5,
            deny_private_ips: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SinkToggle {
    pub enabled: bool,
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub fetch: FetchConfig,
    pub discord: SinkToggle,
    pub slack: SinkToggle,
    pub max_concurrent: usize,
}

/// One config field's parse outcome: the value used, and whether it fell back.
struct Parsed<T> {
    value: T,
    fell_back: bool,
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Parsed<T> {
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(value) => Parsed { value, fell_back: false },
            Err(_) => Parsed { value: default, fell_back: true },
        },
        Err(_) => Parsed { value: default, fell_back: false },
    }
}

fn parse_env_bounded<T: std::str::FromStr + PartialOrd + Copy>(key: &str, default: T, min: T, max: T) -> Parsed<T> {
    let parsed = parse_env(key, default);
    if !parsed.fell_back && (parsed.value < min || parsed.value > max) {
        return Parsed { value: default, fell_back: true };
    }
    parsed
}

fn apply<T>(parsed: Parsed<T>, field: &str, metrics: &Metrics, fallbacks: &mut Vec<String>) -> T {
    if parsed.fell_back {
        tracing::warn!(field, "invalid config value, falling back to default");
        metrics.config_fallback_total(field);
        fallbacks.push(field.to_string());
    }
    parsed.value
}

fn bool_env(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}

impl PipelineConfig {
    /// Load configuration from the process environment, applying fallbacks and
    /// recording them through `metrics`.
    pub fn load(metrics: &Metrics) -> Self {
        Self::validate(metrics).0
    }

    /// Load without touching the network, additionally returning the list of
    /// fields that fell back to their default (for startup diagnostics).
    pub fn validate(metrics: &Metrics) -> (Self, Vec<String>) {
        let mut fallbacks = Vec::new();

        let fetch_enabled = bool_env("CONTENT_FETCH_ENABLED", true);
        let threshold_bytes = apply(parse_env("CONTENT_FETCH_THRESHOLD", 500usize), "content_fetch_threshold", metrics, &mut fallbacks);
        let timeout_secs = apply(parse_env("CONTENT_FETCH_TIMEOUT", 10u64), "content_fetch_timeout", metrics, &mut fallbacks);
        let parallelism = apply(
            parse_env_bounded("CONTENT_FETCH_PARALLELISM", 10usize, 1, 50),
            "content_fetch_parallelism",
            metrics,
            &mut fallbacks,
        );
        let max_body_bytes = apply(
            parse_env_bounded("CONTENT_FETCH_MAX_BODY_SIZE", 10 * 1024 * 1024u64, 1024, 100 * 1024 * 1024),
            "content_fetch_max_body_size",
            metrics,
            &mut fallbacks,
        );
        let max_redirects = apply(
            parse_env_bounded("CONTENT_FETCH_MAX_REDIRECTS", 5u32, 0, 10),
            "content_fetch_max_redirects",
            metrics,
            &mut fallbacks,
        );

        // Security-relevant: fail closed. A malformed boolean defaults to the
        // safe value (true = deny private IPs) rather than being "coerced".
        let deny_private_ips = bool_env("CONTENT_FETCH_DENY_PRIVATE_IPS", true);

        let max_concurrent = apply(
            parse_env_bounded("NOTIFY_MAX_CONCURRENT", 10usize, 1, 1000),
            "notify_max_concurrent",
            metrics,
            &mut fallbacks,
        );

        let config = Self {
            fetch: FetchConfig {
                enabled: fetch_enabled,
                threshold_bytes,
                timeout: Duration::from_secs(timeout_secs),
                parallelism,
                max_body_bytes,
                max_redirects,
                deny_private_ips,
            },
            discord: load_sink_toggle("DISCORD_ENABLED", "DISCORD_WEBHOOK_URL"),
            slack: load_sink_toggle("SLACK_ENABLED", "SLACK_WEBHOOK_URL"),
            max_concurrent,
        };
        (config, fallbacks)
    }
}

fn load_sink_toggle(enabled_key: &str, url_key: &str) -> SinkToggle {
    SinkToggle { enabled: bool_env(enabled_key, false), webhook_url: env::var(url_key).ok() }
}
