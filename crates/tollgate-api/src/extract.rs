//! Extractor for handlers that require an authenticated caller.

use axum::{extract::FromRequestParts, http::request::Parts};
use tollgate_core::Authentication;

use crate::rejection::GateRejection;

/// The authentication context attached by the authentication stage.
///
/// Handlers taking this extractor respond 401 to unauthenticated requests,
/// which is how protected routes opt in to requiring a token.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Authentication);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = GateRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Authentication>()
            .cloned()
            .map(Self)
            .ok_or(GateRejection::AuthenticationRequired)
    }
}
