//! Error types shared across resilience policies and the notification pipeline.

use std::fmt;
use std::time::Duration;

/// Cap the number of stored failures inside RetryExhausted to avoid unbounded growth.
pub const MAX_RETRY_FAILURES: usize = 10;

/// Unified error type for the generic resilience policies (breaker, timeout).
#[derive(Debug)]
pub enum ResilienceError<E> {
    /// The operation exceeded the timeout duration.
    Timeout { elapsed: Duration, timeout: Duration },
    /// The circuit breaker is open.
    CircuitOpen { failures: u32, requests: u32, open_duration: Duration },
    /// The underlying operation failed.
    Inner(E),
}

impl<E: Clone> Clone for ResilienceError<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Timeout { elapsed, timeout } => {
                Self::Timeout { elapsed: *elapsed, timeout: *timeout }
            }
            Self::CircuitOpen { failures, requests, open_duration } => {
                Self::CircuitOpen { failures: *failures, requests: *requests, open_duration: *open_duration }
            }
            Self::Inner(e) => Self::Inner(e.clone()),
        }
    }
}

impl<E: fmt::Display> fmt::Display for ResilienceError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { elapsed, timeout } => {
                write!(f, "operation timed out after {:?} (limit: {:?})", elapsed, timeout)
            }
            Self::CircuitOpen { failures, requests, open_duration } => {
                write!(
                    f,
                    "circuit breaker open ({failures}/{requests} failed, open for {open_duration:?})"
                )
            }
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ResilienceError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> ResilienceError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}

/// Errors from validating and resolving a URL before it is fetched.
#[derive(Debug, thiserror::Error)]
pub enum UrlGuardError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("url resolves to a private, loopback, or link-local address: {0}")]
    PrivateIp(std::net::IpAddr),
    #[error("dns resolution failed for {host}: {source}")]
    ResolutionFailed { host: String, #[source] source: std::io::Error },
}

/// Failure taxonomy for the content fetcher (spec §4.4 / §7).
///
/// `Url` subsumes the `InvalidURL`/`PrivateIP` kinds from [`UrlGuardError`]; callers
/// that need to distinguish them inspect the wrapped value.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Url(#[from] UrlGuardError),
    #[error("too many redirects (limit {limit})")]
    TooManyRedirects { limit: u32 },
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("unexpected http status {0}")]
    HttpStatus(u16),
    #[error("response body exceeded cap of {cap} bytes")]
    BodyTooLarge { cap: u64 },
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),
    #[error("content extraction produced no usable text")]
    ExtractionFailed,
    #[error("content-fetch circuit breaker is open")]
    BreakerOpen,
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl FetchError {
    pub fn is_private_ip(&self) -> bool {
        matches!(self, Self::Url(UrlGuardError::PrivateIp(_)))
    }

    pub fn is_invalid_url(&self) -> bool {
        matches!(self, Self::Url(UrlGuardError::InvalidUrl(_) | UrlGuardError::ResolutionFailed { .. }))
    }

    /// Label used for the `content_fetch_total{outcome}` metric.
    pub fn metric_label(&self) -> &'static str {
        match self {
            Self::Url(UrlGuardError::PrivateIp(_)) => "private_ip",
            Self::Url(_) => "invalid_url",
            Self::TooManyRedirects { .. } => "too_many_redirects",
            Self::Timeout(_) => "timeout",
            Self::HttpStatus(_) => "http_status",
            Self::BodyTooLarge { .. } => "body_too_large",
            Self::UnsupportedContentType(_) => "unsupported_content_type",
            Self::ExtractionFailed => "extraction_failed",
            Self::BreakerOpen => "breaker_open",
            Self::Transport(_) => "transport",
        }
    }
}

/// Failure taxonomy for a single sink send attempt (spec §4.5 / §7).
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("rate limiter wait was cancelled")]
    Cancelled,
    #[error("rate-limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
    #[error("client error: http {status}")]
    ClientError { status: u16 },
    #[error("server error: http {status}")]
    ServerError { status: u16 },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<SinkError> },
}

impl SinkError {
    /// Errors that justify another attempt within a single `Send` call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::ServerError { .. } | Self::Transport(_))
    }
}

/// Reasons the dispatcher drops a task without ever calling `sink.Send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    PoolFull,
    CircuitOpen,
}

impl DropReason {
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::PoolFull => "pool_full",
            Self::CircuitOpen => "circuit_open",
        }
    }
}
