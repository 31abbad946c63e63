//! Responses produced when the gate stops a request.

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

/// A request rejected by one of the gate stages.
///
/// Every variant renders as a JSON body with a stable `error` code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateRejection {
    /// Token supplied but rejected by the identity provider.
    #[error("invalid or expired token")]
    InvalidToken,

    /// Token supplied but no identity provider could check it.
    #[error("authentication service unavailable")]
    AuthUnavailable,

    /// Token valid but the email address is not verified.
    #[error("email address not verified")]
    EmailNotVerified,

    /// Token valid but its role claim is not recognized.
    #[error("unrecognized role claim")]
    InvalidRole,

    /// Handler requires an authenticated principal and none is attached.
    #[error("authentication required")]
    AuthenticationRequired,

    /// Rate limit bucket is empty.
    #[error("rate limit exceeded, retry after {retry_after_seconds}s")]
    RateLimited {
        /// Seconds until the bucket refills
        retry_after_seconds: u64,
    },
}

impl GateRejection {
    /// HTTP status for this rejection.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidToken | Self::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            Self::AuthUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::EmailNotVerified | Self::InvalidRole => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// JSON body for this rejection.
    pub fn body(&self) -> Value {
        match self {
            Self::InvalidToken => json!({ "error": "Invalid or expired token" }),
            Self::AuthUnavailable => json!({ "error": "Authentication service unavailable" }),
            Self::EmailNotVerified => json!({
                "error": "email_not_verified",
                "message": "Email address must be verified",
            }),
            Self::InvalidRole => json!({
                "error": "invalid_role",
                "message": "Unrecognized role claim",
            }),
            Self::AuthenticationRequired => json!({
                "error": "authentication_required",
                "message": "A valid bearer token is required",
            }),
            Self::RateLimited { .. } => json!({
                "error": "rate_limit_exceeded",
                "message": "Too many requests. Please retry later.",
            }),
        }
    }
}

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        let mut response = (self.status_code(), Json(self.body())).into_response();
        if let Self::RateLimited { retry_after_seconds } = self {
            response.headers_mut().insert(RETRY_AFTER, HeaderValue::from(retry_after_seconds));
        }
        response
    }
}
