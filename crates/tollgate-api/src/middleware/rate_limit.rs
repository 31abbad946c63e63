//! Rate limit stage.
//!
//! Charges one token per request to the bucket chosen by the policy's key
//! strategy. Admitted responses carry `X-RateLimit-Limit` and
//! `X-RateLimit-Remaining`; denied requests get a 429 with `Retry-After`
//! and never reach the downstream handler.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tollgate_core::{Authentication, RateLimitPolicy};
use tollgate_limiter::{Decision, RateLimiter};
use tracing::debug;

use crate::{middleware::client_ip::client_ip, rejection::GateRejection};

/// Bucket capacity header.
pub static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// Tokens left after this request.
pub static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Rate limit stage state.
#[derive(Debug)]
pub struct RateLimitGate {
    policy: RateLimitPolicy,
    limiter: Arc<RateLimiter>,
}

impl RateLimitGate {
    /// Creates the stage over a limiter owned by the caller.
    ///
    /// The same limiter may be shared with an [`IdleSweeper`] or inspected
    /// by tests. Its bandwidth is the one charged and reported.
    ///
    /// [`IdleSweeper`]: tollgate_limiter::IdleSweeper
    pub fn new(policy: RateLimitPolicy, limiter: Arc<RateLimiter>) -> Self {
        Self { policy, limiter }
    }

    /// Rate limit policy in force.
    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Shared limiter, for the idle sweeper and diagnostics.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Bucket key for a request that has passed authentication.
    pub fn bucket_key(&self, req: &Request) -> String {
        let subject = req.extensions().get::<Authentication>().map(Authentication::subject);
        let ip = client_ip(req.headers(), req.extensions());
        self.policy.strategy.bucket_key(subject, ip.as_deref())
    }
}

/// Axum middleware running the rate limit stage.
pub async fn rate_limit_middleware(
    State(gate): State<Arc<RateLimitGate>>,
    req: Request,
    next: Next,
) -> Response {
    if gate.policy.should_skip(req.method().as_str(), req.uri().path()) {
        return next.run(req).await;
    }

    let key = gate.bucket_key(&req);
    match gate.limiter.try_consume(&key) {
        Decision::Admitted { remaining } => {
            let mut response = next.run(req).await;
            let headers = response.headers_mut();
            headers.insert(
                X_RATELIMIT_LIMIT.clone(),
                HeaderValue::from(gate.limiter.bandwidth().capacity()),
            );
            headers.insert(X_RATELIMIT_REMAINING.clone(), HeaderValue::from(remaining));
            response
        },
        Decision::Denied { retry_after_seconds } => {
            debug!(%key, retry_after_seconds, "rate limit exceeded");
            GateRejection::RateLimited { retry_after_seconds }.into_response()
        },
    }
}
