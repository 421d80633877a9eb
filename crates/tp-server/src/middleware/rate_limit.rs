//! Governor-based rate limiting middleware for the download route.

use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::error::AppError;

/// A shared rate limiter instance.
pub type SharedLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Create a rate limiter with the given requests-per-minute quota.
/// Returns `None` for a zero quota, which disables limiting.
pub fn create_limiter(requests_per_minute: u32) -> Option<SharedLimiter> {
    let per_minute = NonZeroU32::new(requests_per_minute)?;
    Some(Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))))
}

/// Rate limiting middleware. Returns 429 Too Many Requests when exceeded.
pub async fn rate_limit_middleware(request: Request<axum::body::Body>, next: Next) -> Response {
    let limiter = request.extensions().get::<SharedLimiter>().cloned();

    if let Some(limiter) = limiter {
        if limiter.check().is_err() {
            tracing::debug!("Rate limit exceeded");
            return AppError::new(tp_core::Error::RateLimited).into_response();
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_disables() {
        assert!(create_limiter(0).is_none());
    }

    #[test]
    fn quota_is_enforced() {
        let limiter = create_limiter(2).unwrap();
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }
}
