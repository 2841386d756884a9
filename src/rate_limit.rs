//! Rate limiting primitives.
//!
//! This module provides the building blocks used by each sink adapter to enforce
//! its own outbound rate:
//! - [`RateLimiter`]: the core trait for rate limiting logic (non-blocking `acquire`).
//! - [`Decision`]: the result of a rate limit check (Allowed/Denied).
//! - [`wait`]: a blocking-until-allowed wrapper over `acquire`, cancellable via
//!   [`crate::context::Context`].
//!
//! **Logic**: `TokenBucket` (in the `strategies` module) implements the math.
//! **Storage**: `TokenStore` (in the `store` module) holds the state, which keeps
//! the door open for a distributed backend without touching the limiter logic.

use std::collections::HashMap;
use std::time::Duration;

pub mod store;
pub mod strategies;

use crate::context::Context;
use crate::error::SinkError;

/// The decision returned by a rate limiter.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// The request is allowed to proceed.
    Allowed {
        /// Number of permits remaining after this acquisition.
        remaining: u32,
        /// Optional metadata (e.g., "reset time", "tier").
        metadata: HashMap<String, String>,
    },
    /// The request is denied.
    Denied {
        /// How long the caller should wait before retrying.
        wait: Duration,
        /// Reason for denial (e.g., "token_bucket_empty").
        reason: String,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

/// Core interface for rate limiting logic, decoupled from the storage backend.
#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    /// Attempt to acquire `permits` without blocking.
    async fn acquire(&self, permits: u32) -> Result<Decision, Box<dyn std::error::Error + Send + Sync>>;
}

/// Block until `permits` tokens are available or `ctx` is cancelled.
///
/// Spec'd as `Wait(ctx)` (§4.3): a token is consumed only on successful
/// acquisition, never on a cancelled wait.
pub async fn wait(limiter: &dyn RateLimiter, ctx: &Context, permits: u32) -> Result<(), SinkError> {
    loop {
        if ctx.is_cancelled() {
            return Err(SinkError::Cancelled);
        }
        let decision = limiter
            .acquire(permits)
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        match decision {
            Decision::Allowed { .. } => return Ok(()),
            Decision::Denied { wait: delay, .. } => {
                tokio::select! {
                    _ = ctx.cancelled() => return Err(SinkError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
