/// Rate limiting middleware for OTP endpoints
///
/// Every endpoint that sends or checks a one-time code gets its own
/// token bucket: one token per second refill with a burst of ten. The bucket
/// is global to the route (not keyed by client), which caps how fast anyone
/// can guess codes or trigger outgoing mail and SMS.
///
/// # Algorithm
///
/// `governor`'s GCRA implementation of the token bucket:
/// - Tokens refill at a constant rate
/// - Each request consumes 1 token
/// - Request rejected if bucket empty
///
/// # Headers
///
/// - `Retry-After`: Seconds to wait (429 responses only)
///
/// # Example
///
/// ```no_run
/// use taidao_api::middleware::rate_limit::{rate_limit_layer, RouteLimiter};
/// use axum::{middleware::from_fn_with_state, routing::post, Router};
///
/// # async fn handler() {}
/// let app: Router = Router::new()
///     .route("/verify", post(handler))
///     .layer(from_fn_with_state(RouteLimiter::otp(), rate_limit_layer));
/// ```

use crate::error::ApiError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::{Clock, DefaultClock},
    DefaultDirectRateLimiter, Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Tokens added per second
pub const OTP_REFILL_PER_SECOND: NonZeroU32 = NonZeroU32::MIN;

/// Bucket capacity
pub const OTP_BURST: NonZeroU32 = match NonZeroU32::new(10) {
    Some(n) => n,
    None => panic!("burst must be non-zero"),
};

/// Token bucket shared by every request to one route
#[derive(Clone)]
pub struct RouteLimiter {
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl RouteLimiter {
    /// Creates a bucket refilling `per_second` tokens with room for `burst`
    pub fn new(per_second: NonZeroU32, burst: NonZeroU32) -> Self {
        let quota = Quota::per_second(per_second).allow_burst(burst);
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Bucket used by the OTP send and verify endpoints
    pub fn otp() -> Self {
        Self::new(OTP_REFILL_PER_SECOND, OTP_BURST)
    }

    /// Takes one token
    ///
    /// # Errors
    ///
    /// Returns the number of whole seconds (at least 1) until a token is
    /// available when the bucket is empty
    pub fn check(&self) -> Result<(), u64> {
        self.limiter.check().map_err(|not_until| {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            wait.as_secs().max(1)
        })
    }
}

/// Rate limiting middleware layer
///
/// # Errors
///
/// - 429 Too Many Requests: bucket empty
pub async fn rate_limit_layer(
    State(limiter): State<RouteLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Err(retry_after) = limiter.check() {
        tracing::warn!(
            path = %request.uri().path(),
            retry_after,
            "Rate limit exceeded"
        );
        return Err(ApiError::RateLimitExceeded {
            retry_after,
            message: format!("Too many requests. Try again in {} seconds", retry_after),
        });
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware::from_fn_with_state, routing::get, Router};
    use tower::ServiceExt;

    #[test]
    fn test_burst_then_reject() {
        let limiter = RouteLimiter::otp();
        for _ in 0..OTP_BURST.get() {
            assert!(limiter.check().is_ok());
        }
        let retry_after = limiter.check().unwrap_err();
        assert!(retry_after >= 1);
    }

    #[test]
    fn test_routes_have_independent_buckets() {
        let first = RouteLimiter::new(NonZeroU32::MIN, NonZeroU32::MIN);
        let second = RouteLimiter::new(NonZeroU32::MIN, NonZeroU32::MIN);

        assert!(first.check().is_ok());
        assert!(first.check().is_err());
        assert!(second.check().is_ok());
    }

    #[tokio::test]
    async fn test_middleware_returns_429() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(from_fn_with_state(
                RouteLimiter::new(NonZeroU32::MIN, NonZeroU32::MIN),
                rate_limit_layer,
            ));

        let request = || Request::builder().uri("/").body(Body::empty()).unwrap();

        let ok = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        let limited = app.oneshot(request()).await.unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(limited.headers().contains_key("retry-after"));
    }
}
