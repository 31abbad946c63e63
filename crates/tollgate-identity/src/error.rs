//! Identity verification errors.
//!
//! Every failure is classified as either the client's fault (the token is
//! bad) or the provider's fault (we could not check the token). The
//! authentication stage turns the first into 401 and the second into 503.

use thiserror::Error;

/// Result type alias for verification operations.
pub type Result<T> = std::result::Result<T, IdentityError>;

/// Errors raised while verifying a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// Token is malformed, expired, wrongly signed or carries bad claims.
    #[error("invalid token: {reason}")]
    InvalidToken {
        /// What was wrong with the token
        reason: String,
    },

    /// Provider could not be reached or returned unusable key material.
    #[error("identity provider unavailable: {reason}")]
    ProviderUnavailable {
        /// Why the provider could not be consulted
        reason: String,
    },

    /// Verifier could not be constructed from its configuration.
    #[error("invalid identity configuration: {message}")]
    Configuration {
        /// Configuration error message
        message: String,
    },
}

impl IdentityError {
    /// Creates an invalid token error.
    pub fn invalid_token(reason: impl Into<String>) -> Self {
        Self::InvalidToken { reason: reason.into() }
    }

    /// Creates a provider unavailable error.
    pub fn provider_unavailable(reason: impl Into<String>) -> Self {
        Self::ProviderUnavailable { reason: reason.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Returns true when the caller's token is at fault.
    ///
    /// Provider and configuration failures say nothing about the token and
    /// must never be reported to the caller as an invalid credential.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::InvalidToken { .. } => true,
            Self::ProviderUnavailable { .. } | Self::Configuration { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_identified_correctly() {
        assert!(IdentityError::invalid_token("expired").is_client_error());

        assert!(!IdentityError::provider_unavailable("connection refused").is_client_error());
        assert!(!IdentityError::configuration("bad url").is_client_error());
    }

    #[test]
    fn display_includes_reason() {
        assert_eq!(
            IdentityError::provider_unavailable("HTTP 502").to_string(),
            "identity provider unavailable: HTTP 502"
        );
    }
}
