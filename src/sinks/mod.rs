//! Sink adapters: the `{Name, IsEnabled, Send}` capability set implemented by
//! each outbound notification channel.
//!
//! Every adapter composes the same three pieces — a [`crate::rate_limit`]
//! limiter, an HTTP client with a per-request timeout, and a payload builder —
//! behind the shared [`retry_send`] loop, which is the one place the "at most
//! 2 attempts, honor retry-after" policy (spec §4.5) lives.

pub mod discord;
pub mod slack;
pub mod noop;

use crate::context::Context;
use crate::error::SinkError;
use crate::rate_limit::RateLimiter;
use crate::sleeper::Sleeper;
use crate::types::{Article, Source};
use async_trait::async_trait;
use std::time::Duration;

pub use discord::DiscordSink;
pub use noop::NoopSink;
pub use slack::SlackSink;

/// An outbound notification channel.
#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &str;
    fn is_enabled(&self) -> bool;
    async fn send(&self, ctx: &Context, article: &Article, source: &Source) -> Result<(), SinkError>;
}

/// Truncate `s` to at most `max_chars` scalar values, appending "…" when cut.
pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Validate a configured webhook URL against a sink's allowlist: scheme
/// `https`, an exact host, and a required path prefix. Security-relevant, so
/// this fails closed — callers disable the sink rather than loosen the check.
pub fn validate_webhook_url(url: &str, expected_host: &str, required_path_prefix: &str) -> Result<(), String> {
    let parsed = url::Url::parse(url).map_err(|e| format!("invalid webhook url: {e}"))?;
    if parsed.scheme() != "https" {
        return Err(format!("webhook url must use https, got {}", parsed.scheme()));
    }
    if parsed.host_str() != Some(expected_host) {
        return Err(format!("webhook host must be {expected_host}"));
    }
    if !parsed.path().starts_with(required_path_prefix) {
        return Err(format!("webhook path must start with {required_path_prefix}"));
    }
    Ok(())
}

/// A single POST attempt's outcome, classified per spec §4.5 step 4.
pub(crate) enum AttemptOutcome {
    Success,
    RateLimited { retry_after: Duration },
    ClientError { status: u16 },
    ServerError { status: u16 },
}

/// Run `attempt` up to `max_attempts` times, honoring rate-limit/server-error
/// backoff between tries and returning the last error wrapped as `Exhausted`
/// once attempts run out. `sleeper` is injectable so tests can assert backoff
/// timing without waiting in real time.
pub(crate) async fn retry_send<F, Fut>(
    ctx: &Context,
    sleeper: &dyn Sleeper,
    max_attempts: u32,
    mut attempt: F,
) -> Result<(), SinkError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<AttemptOutcome, SinkError>>,
{
    let mut last_err: Option<SinkError> = None;
    for attempt_no in 1..=max_attempts {
        if ctx.is_cancelled() {
            return Err(SinkError::Cancelled);
        }
        let outcome = attempt().await;
        match outcome {
            Ok(AttemptOutcome::Success) => return Ok(()),
            Ok(AttemptOutcome::RateLimited { retry_after }) => {
                last_err = Some(SinkError::RateLimited { retry_after });
                if attempt_no < max_attempts {
                    sleep_cancellable(ctx, sleeper, retry_after).await?;
                }
            }
            Ok(AttemptOutcome::ClientError { status }) => {
                return Err(SinkError::ClientError { status });
            }
            Ok(AttemptOutcome::ServerError { status }) => {
                last_err = Some(SinkError::ServerError { status });
                if attempt_no < max_attempts {
                    sleep_cancellable(ctx, sleeper, Duration::from_secs(5)).await?;
                }
            }
            Err(e @ SinkError::Transport(_)) => {
                let retryable = e.is_retryable();
                last_err = Some(e);
                if retryable && attempt_no < max_attempts {
                    sleep_cancellable(ctx, sleeper, Duration::from_secs(5)).await?;
                }
            }
            Err(e) => return Err(e),
        }
    }

    let last = last_err.unwrap_or(SinkError::Transport("unknown failure".into()));
    Err(SinkError::Exhausted { attempts: max_attempts, last: Box::new(last) })
}

async fn sleep_cancellable(ctx: &Context, sleeper: &dyn Sleeper, delay: Duration) -> Result<(), SinkError> {
    tokio::select! {
        _ = ctx.cancelled() => Err(SinkError::Cancelled),
        _ = sleeper.sleep(delay) => Ok(()),
    }
}

pub(crate) fn limiter_wait<'a>(
    limiter: &'a dyn RateLimiter,
    ctx: &'a Context,
) -> impl std::future::Future<Output = Result<(), SinkError>> + 'a {
    crate::rate_limit::wait(limiter, ctx, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_leaves_short_strings_untouched() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn truncate_cuts_and_appends_ellipsis() {
        let out = truncate("hello world", 5);
        assert_eq!(out, "hell…");
        assert_eq!(out.chars().count(), 5);
    }

    #[test]
    fn truncate_is_idempotent() {
        let once = truncate("a very long string indeed", 10);
        let twice = truncate(&once, 10);
        assert_eq!(once, twice);
    }

    #[test]
    fn validates_discord_webhook_host_and_path() {
        assert!(validate_webhook_url(
            "https://discord.com/api/webhooks/1/abc",
            "discord.com",
            "/api/webhooks/"
        )
        .is_ok());
        assert!(validate_webhook_url("http://discord.com/api/webhooks/1/abc", "discord.com", "/api/webhooks/").is_err());
        assert!(validate_webhook_url("https://evil.example/api/webhooks/1/abc", "discord.com", "/api/webhooks/").is_err());
    }
}
