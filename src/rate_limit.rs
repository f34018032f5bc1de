//! HTTP-side rate limiting.
//!
//! A sync request fans out into a whole batch pipeline of provider calls,
//! so the sync route gets a small global quota. This protects the provider
//! key from being throttled by the exchange, on top of the inter-batch
//! delay inside the fetcher.

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SyncRateLimitConfig {
    /// Maximum sync requests per minute across all accounts.
    pub syncs_per_minute: u32,
}

impl Default for SyncRateLimitConfig {
    fn default() -> Self {
        Self { syncs_per_minute: 6 }
    }
}

impl SyncRateLimitConfig {
    pub fn from_env() -> Self {
        let syncs_per_minute = std::env::var("SYNC_REQUESTS_PER_MINUTE")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|v| *v > 0)
            .unwrap_or(6);
        Self { syncs_per_minute }
    }
}

pub type SyncRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

pub fn create_sync_rate_limiter(config: SyncRateLimitConfig) -> SyncRateLimiter {
    let quota = Quota::per_minute(
        NonZeroU32::new(config.syncs_per_minute).unwrap_or(NonZeroU32::MIN),
    );
    Arc::new(RateLimiter::direct(quota))
}

/// Middleware guarding the sync route.
pub async fn sync_rate_limit_middleware(
    limiter: SyncRateLimiter,
    request: Request,
    next: Next,
) -> Response {
    match limiter.check() {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!("Sync rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many sync requests. Please wait before retrying.",
            )
                .into_response()
        }
    }
}
