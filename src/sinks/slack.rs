//! Slack webhook sink: Block Kit section + context blocks, per spec §6.

use super::{retry_send, truncate, validate_webhook_url, AttemptOutcome, Sink};
use crate::context::Context;
use crate::error::SinkError;
use crate::rate_limit::RateLimiter;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::types::{Article, Source};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

const SECTION_MAX: usize = 3000;
const FALLBACK_MAX: usize = 150;
const MAX_ATTEMPTS: u32 = 2;
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type")]
enum Block {
    #[serde(rename = "section")]
    Section { text: MrkdwnText },
    #[serde(rename = "context")]
    Context { elements: [MrkdwnText; 1] },
}

#[derive(Debug, Serialize, PartialEq)]
struct MrkdwnText {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
}

fn mrkdwn(text: String) -> MrkdwnText {
    MrkdwnText { kind: "mrkdwn", text }
}

#[derive(Debug, Serialize, PartialEq)]
struct SlackPayload {
    text: String,
    blocks: [Block; 2],
}

fn build_payload(article: &Article, source: &Source) -> SlackPayload {
    let section_text = truncate(&format!("*<{}|{}>*\n\n{}", article.url, article.title, article.summary), SECTION_MAX);
    let context_text = format!("{} • {}", source.name, article.published_at.to_rfc3339());

    SlackPayload {
        text: truncate(&article.title, FALLBACK_MAX),
        blocks: [
            Block::Section { text: mrkdwn(section_text) },
            Block::Context { elements: [mrkdwn(context_text)] },
        ],
    }
}

pub struct SlackSink {
    enabled: bool,
    webhook_url: String,
    client: Client,
    limiter: Arc<dyn RateLimiter>,
    sleeper: Arc<dyn Sleeper>,
    timeout: Duration,
}

impl std::fmt::Debug for SlackSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackSink")
            .field("enabled", &self.enabled)
            .field("webhook_url", &self.webhook_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SlackSink {
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
            validate_webhook_url(&webhook_url, "hooks.slack.com", "/services/")?;
        }
        Ok(Self { enabled, webhook_url, client, limiter, sleeper, timeout })
    }

    /// Bypasses the hooks.slack.com host allowlist so integration tests can
    /// point this sink at a local mock server. Not reachable from
    /// `new`/`with_sleeper`, which stay fail-closed against the real webhook host.
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
impl Sink for SlackSink {
    fn name(&self) -> &str {
        "slack"
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
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs)
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
