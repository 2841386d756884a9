//! Content fetcher: URL guard → circuit breaker → HTTP GET with redirect
//! re-validation → body cap → content sniff → readability extraction.
//!
//! This is the one pipeline stage that talks to arbitrary third-party hosts, so
//! every step here exists to bound what an adversarial or merely broken server
//! can do to the process: bytes read, redirects followed, and time spent.

mod extract;

use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerPolicy};
use crate::error::{FetchError, ResilienceError};
use crate::http_client::{self, FetchLimits};
use crate::metrics::Metrics;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Extracted article content. `Text` is the readability-extracted result;
/// `Raw` is the whitespace-normalized full body, used when extraction finds
/// nothing worth keeping but the body itself was non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchedContent {
    Text { title: Option<String>, body: String },
    Raw { body: String },
}

impl FetchedContent {
    pub fn body(&self) -> &str {
        match self {
            Self::Text { body, .. } => body,
            Self::Raw { body } => body,
        }
    }
}

#[derive(Clone)]
pub struct ContentFetcher {
    client: Client,
    limits: FetchLimits,
    breaker: CircuitBreakerPolicy,
    metrics: Arc<Metrics>,
}

impl ContentFetcher {
    pub fn new(limits: FetchLimits, metrics: Arc<Metrics>) -> Result<Self, FetchError> {
        let client = http_client::build_client(limits.timeout)?;
        let breaker = CircuitBreakerPolicy::new(
            "content-fetch",
            CircuitBreakerConfig {
                interval: Duration::from_secs(60),
                min_requests: 5,
                failure_threshold: 0.6,
                timeout: Duration::from_secs(60),
                half_open_max_requests: 5,
            },
            metrics.clone(),
        );
        Ok(Self { client, limits, breaker, metrics })
    }

    pub fn breaker_state(&self) -> crate::circuit_breaker::CircuitState {
        self.breaker.state()
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchedContent, FetchError> {
        let client = self.client.clone();
        let limits = self.limits.clone();
        let url = Arc::<str>::from(url);

        let result = self
            .breaker
            .execute(move || {
                let url = url.clone();
                async move { http_client::get_with_redirects(&client, &url, &limits).await }
            })
            .await;

        let outcome = match result {
            Ok(response) => extract_content(response),
            Err(ResilienceError::CircuitOpen { .. }) => Err(FetchError::BreakerOpen),
            Err(ResilienceError::Timeout { .. }) => Err(FetchError::Timeout(self.limits.timeout)),
            Err(ResilienceError::Inner(e)) => Err(e),
        };

        let label = match &outcome {
            Ok(_) => "success",
            Err(e) => e.metric_label(),
        };
        self.metrics.content_fetch_total(label);
        outcome
    }
}

fn extract_content(response: http_client::FetchedResponse) -> Result<FetchedContent, FetchError> {
    let content_type = response.content_type.as_deref().unwrap_or("");
    let media_type = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    let is_html = media_type.is_empty() || media_type == "text/html" || media_type == "application/xhtml+xml";
    let is_text = media_type.starts_with("text/");

    if !media_type.is_empty() && !is_html && !is_text {
        return Err(FetchError::UnsupportedContentType(media_type));
    }

    let charset = content_type
        .split(';')
        .find_map(|part| part.trim().strip_prefix("charset="))
        .map(str::to_ascii_lowercase);
    let text_body = decode_body(&response.body, charset.as_deref());

    let extracted = if is_html {
        extract::extract_html(&text_body)
    } else {
        extract::extract_plain(&text_body)
    };

    if extracted.text.chars().count() >= extract::MIN_EXTRACTED_CHARS {
        return Ok(FetchedContent::Text { title: extracted.title, body: extracted.text });
    }

    let fallback = text_body.split_whitespace().collect::<Vec<_>>().join(" ");
    if !fallback.is_empty() {
        return Ok(FetchedContent::Raw { body: fallback });
    }

    Err(FetchError::ExtractionFailed)
}

fn decode_body(body: &[u8], charset: Option<&str>) -> String {
    match charset {
        Some("utf-8") | Some("utf8") | None => String::from_utf8_lossy(body).into_owned(),
        Some(other) => {
            // Unrecognized declared charset: fall back to lossy UTF-8 rather than
            // pulling in a full charset-detection crate for an edge case.
            tracing::debug!(charset = other, "unrecognized charset, decoding as utf-8");
            String::from_utf8_lossy(body).into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::FetchedResponse;
    use reqwest::StatusCode;
    use url::Url;

    fn response(content_type: &str, body: &str) -> FetchedResponse {
        FetchedResponse {
            final_url: Url::parse("https://example.com/article").unwrap(),
            status: StatusCode::OK,
            body: body.as_bytes().to_vec(),
            content_type: Some(content_type.to_string()),
        }
    }

    #[test]
    fn extracts_text_content_from_html() {
        let html = "<html><body><article><p>".to_string()
            + &"word ".repeat(20)
            + "</p></article></body></html>";
        let result = extract_content(response("text/html; charset=utf-8", &html)).unwrap();
        assert!(matches!(result, FetchedContent::Text { .. }));
    }

    #[test]
    fn rejects_unsupported_content_type() {
        let err = extract_content(response("image/png", "binary")).unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedContentType(_)));
    }

    #[test]
    fn falls_back_to_raw_when_extraction_is_too_short() {
        let result = extract_content(response("text/plain", "short body text here")).unwrap();
        assert!(matches!(result, FetchedContent::Raw { .. }));
    }

    #[test]
    fn empty_body_is_extraction_failed() {
        let err = extract_content(response("text/html", "")).unwrap_err();
        assert!(matches!(err, FetchError::ExtractionFailed));
    }
}
