//! Identity provider abstraction.

use async_trait::async_trait;
use tollgate_core::Principal;

use crate::error::Result;

/// Verifies opaque bearer tokens and resolves them to a principal.
///
/// Implementations must be safe to call concurrently from many requests.
#[async_trait]
pub trait IdentityVerifier: Send + Sync + std::fmt::Debug {
    /// Verifies a token.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` when the token itself is rejected and
    /// `ProviderUnavailable` when it could not be checked.
    async fn verify(&self, token: &str) -> Result<Principal>;

    /// Whether the verifier is able to serve requests at all.
    fn is_available(&self) -> bool {
        true
    }
}
