//! Discord webhook sink: embeds, per spec §6's exact JSON shape.

use super::{retry_send, truncate, validate_webhook_url, AttemptOutcome, Sink};
use crate::context::Context;
use crate::error::SinkError;
use crate::rate_limit::RateLimiter;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::types::{Article, Source};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const TITLE_MAX: usize = 256;
const DESCRIPTION_MAX: usize = 4096;
const EMBED_COLOR: u32 = 3_447_003;
const MAX_ATTEMPTS: u32 = 2;
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize, PartialEq)]
struct Embed {
    title: String,
    description: String,
    url: String,
    color: u32,
    timestamp: String,
    footer: Footer,
}

#[derive(Debug, Serialize, PartialEq)]
struct Footer {
    text: String,
}

#[derive(Debug, Serialize, PartialEq)]
struct DiscordPayload {
    embeds: [Embed; 1],
}

#[derive(Debug, Deserialize, Default)]
struct RateLimitBody {
    retry_after: Option<f64>,
}

fn build_payload(article: &Article, source: &Source) -> DiscordPayload {
    DiscordPayload {
        embeds: [Embed {
            title: truncate(&article.title, TITLE_MAX),
            description: truncate(&article.summary, DESCRIPTION_MAX),
            url: article.url.clone(),
            color: EMBED_COLOR,
            timestamp: article.published_at.to_rfc3339(),
            footer: Footer { text: source.name.clone() },
        }],
    }
}

pub struct DiscordSink {
    enabled: bool,
    webhook_url: String,
    client: Client,
    limiter: Arc<dyn RateLimiter>,
    sleeper: Arc<dyn Sleeper>,
    timeout: Duration,
}

impl std::fmt::Debug for DiscordSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordSink")
            .field("enabled", &self.enabled)
            .field("webhook_url", &self.webhook_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl DiscordSink {
    pub fn new(
        enabled: bool,
        webhook_url: String,
        client: Client,
        limiter: Arc<dyn RateLimiter>,
        timeout: Duration,
    ) -> Result<Self, String> {
        Self::with_sleeper(enabled, webhook_url, client, limiter, Arc::new(TokioSleeper), timeout)
    }

    pub fn with_sleeper(
        enabled: bool,
        webhook_url: String,
        client: Client,
        limiter: Arc<dyn RateLimiter>,
        sleeper: Arc<dyn Sleeper>,
        timeout: Duration,
    ) -> Result<Self, String> {
        if enabled {
            validate_webhook_url(&webhook_url, "discord.com", "/api/webhooks/")?;
        }
        Ok(Self { enabled, webhook_url, client, limiter, sleeper, timeout })
    }

    /// Bypasses the discord.com host allowlist so integration tests can point
    /// this sink at a local mock server. Not reachable from `new`/`with_sleeper`,
    /// which stay fail-closed against the real webhook host.
    #[doc(hidden)]
    pub fn for_testing(
        webhook_url: String,
        client: Client,
        limiter: Arc<dyn RateLimiter>,
        sleeper: Arc<dyn Sleeper>,
        timeout: Duration,
    ) -> Self {
        Self { enabled: true, webhook_url, client, limiter, sleeper, timeout }
    }
}

#[async_trait]
impl Sink for DiscordSink {
    fn name(&self) -> &str {
        "discord"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn send(&self, ctx: &Context, article: &Article, source: &Source) -> Result<(), SinkError> {
        super::limiter_wait(self.limiter.as_ref(), ctx).await?;
        let payload = build_payload(article, source);

        retry_send(ctx, self.sleeper.as_ref(), MAX_ATTEMPTS, || async {
            let response = self
                .client
                .post(&self.webhook_url)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await
                .map_err(|e| SinkError::Transport(e.to_string()))?;

            let status = response.status();
            if status.is_success() {
                return Ok(AttemptOutcome::Success);
            }
            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .json::<RateLimitBody>()
                    .await
                    .ok()
                    .and_then(|b| b.retry_after)
                    .map(Duration::from_secs_f64)
                    .unwrap_or(DEFAULT_RETRY_AFTER);
                return Ok(AttemptOutcome::RateLimited { retry_after });
            }
            if status.is_server_error() {
                return Ok(AttemptOutcome::ServerError { status: status.as_u16() });
            }
            Ok(AttemptOutcome::ClientError { status: status.as_u16() })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample_article() -> Article {
        Article {
            id: "1".into(),
            source_id: "s1".into(),
            title: "x".repeat(300),
            url: "https://x/1".into(),
            summary: "y".repeat(5000),
            published_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn sample_source() -> Source {
        Source {
            id: "s1".into(),
            name: "S".into(),
            feed_url: "https://x/feed".into(),
            kind: crate::types::SourceKind::Rss,
            active: true,
        }
    }

    #[test]
    fn payload_truncates_title_and_description() {
        let payload = build_payload(&sample_article(), &sample_source());
        assert_eq!(payload.embeds[0].title.chars().count(), TITLE_MAX);
        assert_eq!(payload.embeds[0].description.chars().count(), DESCRIPTION_MAX);
        assert_eq!(payload.embeds[0].color, EMBED_COLOR);
        assert_eq!(payload.embeds[0].footer.text, "S");
    }

    #[test]
    fn payload_build_is_pure() {
        let a = sample_article();
        let s = sample_source();
        assert_eq!(build_payload(&a, &s), build_payload(&a, &s));
    }

    #[test]
    fn rejects_non_discord_host() {
        let err = DiscordSink::new(
            true,
            "https://evil.example/api/webhooks/1/a".into(),
            Client::new(),
            Arc::new(crate::rate_limit::strategies::TokenBucket::new(
                crate::rate_limit::store::InMemoryTokenStore::default(),
                "discord",
                1.0,
                1.0,
            )),
            Duration::from_secs(5),
        )
        .unwrap_err();
        assert!(err.contains("discord.com"));
    }
}
