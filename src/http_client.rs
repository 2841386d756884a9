//! HTTP client wrapper: a `reqwest::Client` configured with this crate's TLS floor
//! and sane timeouts, plus a GET loop that re-validates every redirect hop through
//! [`crate::url_guard`] instead of trusting `reqwest`'s built-in redirect follower.
//!
//! `reqwest` is told never to follow redirects itself (`redirect::Policy::none()`)
//! so every hop passes back through here before a single byte of the next response
//! is read — this is what makes the guard TOCTOU-safe across a redirect chain.

use crate::error::FetchError;
use crate::url_guard;
use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

const USER_AGENT: &str = concat!("courier/", env!("CARGO_PKG_VERSION"), " (+https://github.com/flyingrobots/courier)");

#[derive(Debug, Clone)]
pub struct FetchLimits {
    pub timeout: Duration,
    pub max_redirects: u32,
    pub max_body_bytes: u64,
    pub deny_private_ips: bool,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_redirects: 5,
            max_body_bytes: 5 * 1024 * 1024,
            deny_private_ips: true,
        }
    }
}

/// The result of a validated GET: the final (post-redirect) URL, status, body, and
/// the `Content-Type` header value if present.
pub struct FetchedResponse {
    pub final_url: Url,
    pub status: StatusCode,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

pub fn build_client(timeout: Duration) -> Result<Client, FetchError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .min_tls_version(reqwest::tls::Version::TLS_1_2)
        .redirect(Policy::none())
        .timeout(timeout)
        .build()
        .map_err(FetchError::Transport)
}

/// GET `url`, following redirects up to `limits.max_redirects`, re-validating each
/// hop with the url guard, and capping the body read at `limits.max_body_bytes`.
pub async fn get_with_redirects(
    client: &Client,
    url: &str,
    limits: &FetchLimits,
) -> Result<FetchedResponse, FetchError> {
    let validated = url_guard::validate(url, limits.deny_private_ips).await?;
    let mut current = validated.url;
    let mut redirects = 0u32;

    loop {
        let response = client.get(current.clone()).send().await?;
        let status = response.status();

        if status.is_redirection() {
            redirects += 1;
            if redirects > limits.max_redirects {
                return Err(FetchError::TooManyRedirects { limit: limits.max_redirects });
            }
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| FetchError::Url(crate::error::UrlGuardError::InvalidUrl(
                    "redirect missing Location header".into(),
                )))?;
            let next = current
                .join(location)
                .map_err(|e| FetchError::Url(crate::error::UrlGuardError::InvalidUrl(format!("bad redirect target: {e}"))))?;
            let next_validated = url_guard::validate_parsed(next, limits.deny_private_ips).await?;
            current = next_validated.url;
            continue;
        }

        if status != StatusCode::OK {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if let Some(len) = response.content_length() {
            if len > limits.max_body_bytes {
                return Err(FetchError::BodyTooLarge { cap: limits.max_body_bytes });
            }
        }

        let body = read_capped(response, limits.max_body_bytes).await?;
        return Ok(FetchedResponse { final_url: current, status, body, content_type });
    }
}

async fn read_capped(response: reqwest::Response, cap: u64) -> Result<Vec<u8>, FetchError> {
    use futures::StreamExt;

    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if body.len() as u64 + chunk.len() as u64 > cap {
            return Err(FetchError::BodyTooLarge { cap });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}
