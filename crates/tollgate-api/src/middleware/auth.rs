//! Bearer token authentication stage.
//!
//! Public paths and requests without a bearer token pass through
//! unauthenticated; authorization is left to downstream handlers. A request
//! that does carry a token is either authenticated or stopped here, and is
//! never forwarded when the identity provider cannot check the token.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use tollgate_core::{AuthPolicy, Authentication};
use tollgate_identity::{IdentityError, IdentityVerifier};
use tracing::{debug, warn};

use crate::rejection::GateRejection;

const BEARER_PREFIX: &str = "Bearer ";

/// Extracts the token from an `Authorization: Bearer <token>` header.
///
/// Returns `Ok(None)` for a missing header, another scheme, or a blank
/// token. A token that is present but not valid UTF-8 cannot be anything the
/// provider issued, so it is rejected rather than treated as absent.
///
/// # Errors
///
/// Returns `GateRejection::InvalidToken` for a non-UTF-8 token.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<Option<&str>, GateRejection> {
    let Some(raw) = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.as_bytes().strip_prefix(BEARER_PREFIX.as_bytes()))
        .map(<[u8]>::trim_ascii)
        .filter(|token| !token.is_empty())
    else {
        return Ok(None);
    };

    std::str::from_utf8(raw).map(Some).map_err(|_| {
        debug!("bearer token is not valid UTF-8");
        GateRejection::InvalidToken
    })
}

/// Authentication stage state.
#[derive(Debug, Clone)]
pub struct AuthGate {
    policy: AuthPolicy,
    verifier: Option<Arc<dyn IdentityVerifier>>,
}

impl AuthGate {
    /// Creates the stage. `None` means no identity provider is configured.
    pub fn new(policy: AuthPolicy, verifier: Option<Arc<dyn IdentityVerifier>>) -> Self {
        Self { policy, verifier }
    }

    /// Authentication policy in force.
    pub fn policy(&self) -> &AuthPolicy {
        &self.policy
    }

    /// Whether a verifier is configured and reports itself available.
    pub fn is_provider_available(&self) -> bool {
        self.verifier.as_ref().is_some_and(|verifier| verifier.is_available())
    }

    /// Verifies a token and derives the request's authentication context.
    ///
    /// # Errors
    ///
    /// - `AuthUnavailable` when no verifier can check the token
    /// - `InvalidToken` when the provider rejects it
    /// - `EmailNotVerified` when policy demands a verified email
    /// - `InvalidRole` when the role claim is not recognized
    pub async fn authenticate(&self, token: &str) -> Result<Authentication, GateRejection> {
        let verifier = match &self.verifier {
            Some(verifier) if verifier.is_available() => verifier,
            _ => {
                warn!("bearer token received but no identity provider is available");
                return Err(GateRejection::AuthUnavailable);
            },
        };

        let principal = verifier.verify(token).await.map_err(|error| match error {
            IdentityError::InvalidToken { reason } => {
                debug!(%reason, "bearer token rejected");
                GateRejection::InvalidToken
            },
            other => {
                warn!(error = %other, "identity provider could not verify token");
                GateRejection::AuthUnavailable
            },
        })?;

        if self.policy.require_email_verified && !principal.email_verified {
            debug!(subject = %principal.subject, "rejecting principal with unverified email");
            return Err(GateRejection::EmailNotVerified);
        }

        let subject = principal.subject.clone();
        let authentication = Authentication::from_principal(principal).map_err(|error| {
            warn!(%subject, %error, "rejecting principal with unusable role claim");
            GateRejection::InvalidRole
        })?;

        debug!(
            %subject,
            authorities = ?authentication.authorities,
            "request authenticated"
        );
        Ok(authentication)
    }
}

/// Axum middleware running the authentication stage.
pub async fn auth_middleware(
    State(gate): State<Arc<AuthGate>>,
    mut req: Request,
    next: Next,
) -> Result<Response, GateRejection> {
    if gate.policy.is_public(req.uri().path()) {
        return Ok(next.run(req).await);
    }

    let Some(token) = extract_bearer_token(req.headers())? else {
        return Ok(next.run(req).await);
    };

    let authentication = gate.authenticate(token).await?;
    req.extensions_mut().insert(authentication);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn extracts_bearer_token() {
        assert_eq!(extract_bearer_token(&headers("Bearer abc.def.ghi")), Ok(Some("abc.def.ghi")));
    }

    #[test]
    fn ignores_other_schemes_and_blank_tokens() {
        assert_eq!(extract_bearer_token(&headers("Basic dXNlcjpwYXNz")), Ok(None));
        assert_eq!(extract_bearer_token(&headers("Bearer    ")), Ok(None));
        assert_eq!(extract_bearer_token(&headers("bearer abc")), Ok(None));
        assert_eq!(extract_bearer_token(&HeaderMap::new()), Ok(None));
    }

    #[test]
    fn non_utf8_token_is_rejected_not_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_bytes(b"Bearer tok\xe9n").unwrap());

        assert_eq!(extract_bearer_token(&headers), Err(GateRejection::InvalidToken));
    }

    #[tokio::test]
    async fn missing_verifier_is_unavailable() {
        let gate = AuthGate::new(AuthPolicy::default(), None);

        assert!(!gate.is_provider_available());
        assert_eq!(gate.authenticate("token").await, Err(GateRejection::AuthUnavailable));
    }
}
