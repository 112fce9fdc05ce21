//! Token-bucket rate limiting for the relay routes
//!
//! One bucket guards the whole API: the relay fronts a single vehicle, so
//! the limit protects the upstream account rather than individual callers.

use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use parking_lot::Mutex;

use crate::error::ApiError;
use crate::state::AppState;

/// Token bucket refilled at `rate` tokens per second up to `burst`
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last: Instant,
}

impl RateLimiter {
    /// The bucket starts full
    pub fn new(rate: f64, burst: u32) -> Self {
        let burst = f64::from(burst);
        Self {
            rate: rate.max(0.0),
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last: Instant::now(),
            }),
        }
    }

    /// Take one token if available
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    fn allow_at(&self, now: Instant) -> bool {
        let mut bucket = self.bucket.lock();
        let elapsed = now.saturating_duration_since(bucket.last).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.last = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Reject requests once the bucket is empty, before any other work
pub async fn limit_requests(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.limiter().allow() {
        tracing::warn!(path = %request.uri().path(), "Too many requests");
        return Err(ApiError::TooManyRequests);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_burst_then_reject() {
        let limiter = RateLimiter::new(1.0, 3);
        let now = Instant::now();
        assert!(limiter.allow_at(now));
        assert!(limiter.allow_at(now));
        assert!(limiter.allow_at(now));
        assert!(!limiter.allow_at(now));
    }

    #[test]
    fn test_refill_over_time() {
        let limiter = RateLimiter::new(2.0, 1);
        let start = Instant::now();
        assert!(limiter.allow_at(start));
        assert!(!limiter.allow_at(start + Duration::from_millis(100)));
        assert!(limiter.allow_at(start + Duration::from_millis(700)));
    }

    #[test]
    fn test_refill_capped_at_burst() {
        let limiter = RateLimiter::new(10.0, 2);
        let start = Instant::now();
        let later = start + Duration::from_secs(60);
        assert!(limiter.allow_at(later));
        assert!(limiter.allow_at(later));
        assert!(!limiter.allow_at(later));
    }

    #[test]
    fn test_zero_burst_rejects_everything() {
        let limiter = RateLimiter::new(5.0, 0);
        assert!(!limiter.allow());
    }
}
