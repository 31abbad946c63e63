//! Shared state for the gate stages and built-in handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use tollgate_core::{AuthPolicy, Clock, RateLimitPolicy};
use tollgate_identity::{IdentityVerifier, JwksVerifier};
use tollgate_limiter::RateLimiter;
use tracing::{info, warn};

use crate::{
    config::Config,
    middleware::{AuthGate, RateLimitGate},
};

/// State shared by every request.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Authentication stage.
    pub auth: Arc<AuthGate>,
    /// Rate limit stage.
    pub rate_limit: Arc<RateLimitGate>,
    /// Time source for the limiter and response timestamps.
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Assembles state from already-built policies and verifier, with a new
    /// limiter sized by the rate limit policy.
    pub fn new(
        auth_policy: AuthPolicy,
        verifier: Option<Arc<dyn IdentityVerifier>>,
        rate_limit_policy: RateLimitPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(rate_limit_policy.bandwidth, Arc::clone(&clock)));
        Self::with_limiter(auth_policy, verifier, rate_limit_policy, limiter, clock)
    }

    /// Assembles state around a limiter owned by the caller.
    pub fn with_limiter(
        auth_policy: AuthPolicy,
        verifier: Option<Arc<dyn IdentityVerifier>>,
        rate_limit_policy: RateLimitPolicy,
        limiter: Arc<RateLimiter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            auth: Arc::new(AuthGate::new(auth_policy, verifier)),
            rate_limit: Arc::new(RateLimitGate::new(rate_limit_policy, limiter)),
            clock,
        }
    }

    /// Builds state from loaded configuration.
    ///
    /// Without a JWKS URL no verifier is installed and every request that
    /// presents a token is answered with 503.
    pub fn from_config(config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let verifier: Option<Arc<dyn IdentityVerifier>> = match config.to_jwks_config() {
            Some(jwks) => {
                info!(url = %jwks.jwks_url, "using JWKS identity verifier");
                let verifier = JwksVerifier::new(jwks, Arc::clone(&clock))
                    .context("failed to create identity verifier")?;
                Some(Arc::new(verifier))
            },
            None => {
                warn!("no identity provider configured; bearer tokens will be refused");
                None
            },
        };

        Ok(Self::new(config.to_auth_policy()?, verifier, config.to_rate_limit_policy()?, clock))
    }
}
