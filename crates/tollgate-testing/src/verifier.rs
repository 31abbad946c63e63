//! Identity verifier with scripted outcomes.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tollgate_core::Principal;
use tollgate_identity::{IdentityError, IdentityVerifier};

/// Verifier that answers from a token table.
///
/// Unknown tokens are rejected as invalid. While marked unavailable every
/// call fails with [`IdentityError::ProviderUnavailable`].
#[derive(Debug, Default)]
pub struct ScriptedVerifier {
    outcomes: Mutex<HashMap<String, Result<Principal, IdentityError>>>,
    calls: AtomicUsize,
    unavailable: AtomicBool,
}

impl ScriptedVerifier {
    /// Creates a verifier that knows no tokens.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `token` as `principal`.
    #[must_use]
    pub fn accepting(self, token: &str, principal: Principal) -> Self {
        self.outcomes.lock().insert(token.to_string(), Ok(principal));
        self
    }

    /// Answers `token` with `error`.
    #[must_use]
    pub fn failing(self, token: &str, error: IdentityError) -> Self {
        self.outcomes.lock().insert(token.to_string(), Err(error));
        self
    }

    /// Marks the provider as unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `verify` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityVerifier for ScriptedVerifier {
    async fn verify(&self, token: &str) -> tollgate_identity::Result<Principal> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(IdentityError::provider_unavailable("scripted outage"));
        }

        self.outcomes
            .lock()
            .get(token)
            .cloned()
            .unwrap_or_else(|| Err(IdentityError::invalid_token("unknown token")))
    }

    fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }
}
