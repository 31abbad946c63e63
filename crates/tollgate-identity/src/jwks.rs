//! Identity verification against a JSON Web Key Set.
//!
//! Tokens are RS256 JWTs whose header names the signing key by `kid`.
//! Keys are fetched from the provider's JWKS endpoint and cached; a token
//! signed by a key the cache has not seen triggers one refetch, which is
//! how provider key rotation is picked up. Refetches are single-flight:
//! concurrent requests that find the cache stale wait for one fetch and
//! then read its result.
//!
//! Failure classification:
//!
//! | Failure                                        | Error                 |
//! |------------------------------------------------|-----------------------|
//! | malformed token, wrong alg, missing `kid`      | `InvalidToken`        |
//! | bad signature, expired, wrong `iss` / `aud`    | `InvalidToken`        |
//! | missing or empty `sub`                         | `InvalidToken`        |
//! | unknown `kid` after refetch                    | `InvalidToken`        |
//! | JWKS transport error, timeout, non-2xx         | `ProviderUnavailable` |
//! | JWKS body unparsable or without usable keys    | `ProviderUnavailable` |

use std::{
    collections::HashMap,
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tollgate_core::{Clock, Principal};
use tracing::{debug, info, warn};

use crate::{
    error::{IdentityError, Result},
    verifier::IdentityVerifier,
};

/// Settings for [`JwksVerifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JwksConfig {
    /// URL of the provider's JWKS document.
    pub jwks_url: String,
    /// Required `iss` claim, if any.
    pub issuer: Option<String>,
    /// Required `aud` claim, if any.
    pub audience: Option<String>,
    /// Timeout for a JWKS fetch.
    pub timeout: Duration,
    /// How long fetched keys are trusted before refetching.
    pub cache_ttl: Duration,
    /// Minimum age of the cache before an unknown `kid` may force a refetch.
    pub refresh_cooldown: Duration,
    /// Clock skew tolerated on `exp` and `nbf`.
    pub leeway: Duration,
    /// User agent sent with JWKS requests.
    pub user_agent: String,
}

impl JwksConfig {
    /// Creates a configuration with default timings for the given JWKS URL.
    pub fn new(jwks_url: impl Into<String>) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            issuer: None,
            audience: None,
            timeout: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(3600),
            refresh_cooldown: Duration::from_secs(30),
            leeway: Duration::from_secs(60),
            user_agent: format!("tollgate/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Requires the given issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Requires the given audience.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = self.leeway.as_secs();
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        validation
    }
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kty: String,
    kid: Option<String>,
    #[serde(rename = "use")]
    key_use: Option<String>,
    alg: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

impl Jwk {
    fn is_rsa_signing_key(&self) -> bool {
        self.kty == "RSA"
            && self.key_use.as_deref().map_or(true, |u| u == "sig")
            && self.alg.as_deref().map_or(true, |a| a == "RS256")
    }
}

struct KeyCache {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Instant,
}

impl fmt::Debug for KeyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyCache")
            .field("kids", &self.keys.keys().collect::<Vec<_>>())
            .field("fetched_at", &self.fetched_at)
            .finish()
    }
}

/// Verifies RS256 ID tokens against a provider's published signing keys.
#[derive(Debug)]
pub struct JwksVerifier {
    client: reqwest::Client,
    config: JwksConfig,
    validation: Validation,
    cache: RwLock<Option<KeyCache>>,
    refresh: Mutex<()>,
    clock: Arc<dyn Clock>,
}

impl JwksVerifier {
    /// Creates a verifier. No keys are fetched until the first token arrives.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Configuration` if the URL is not absolute
    /// http(s) or the HTTP client cannot be built.
    pub fn new(config: JwksConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let url = reqwest::Url::parse(&config.jwks_url).map_err(|e| {
            IdentityError::configuration(format!("invalid JWKS URL '{}': {e}", config.jwks_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(IdentityError::configuration(format!(
                "JWKS URL must use http or https, got '{}'",
                url.scheme()
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                IdentityError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        let validation = config.validation();
        Ok(Self {
            client,
            config,
            validation,
            cache: RwLock::new(None),
            refresh: Mutex::new(()),
            clock,
        })
    }

    /// Number of signing keys currently cached.
    pub async fn cached_key_count(&self) -> usize {
        self.cache.read().await.as_ref().map_or(0, |cache| cache.keys.len())
    }

    async fn signing_key(&self, kid: &str) -> Result<DecodingKey> {
        if let Some(lookup) = self.cached_key(kid).await {
            return lookup;
        }

        let _refresh = self.refresh.lock().await;
        // Another request may have refreshed the cache while this one waited.
        if let Some(lookup) = self.cached_key(kid).await {
            return lookup;
        }

        debug!(kid, "signing key not cached, fetching key set");
        let keys = self.fetch_keys().await?;
        let key = keys.get(kid).cloned();
        *self.cache.write().await = Some(KeyCache { keys, fetched_at: self.clock.now() });

        key.ok_or_else(|| unknown_key(kid))
    }

    /// Answers from the cache, or `None` when a fetch is needed.
    async fn cached_key(&self, kid: &str) -> Option<Result<DecodingKey>> {
        let cache = self.cache.read().await;
        let cache = cache.as_ref()?;
        let age = self.clock.now().saturating_duration_since(cache.fetched_at);
        if age >= self.config.cache_ttl {
            return None;
        }
        if let Some(key) = cache.keys.get(kid) {
            return Some(Ok(key.clone()));
        }
        if age < self.config.refresh_cooldown {
            return Some(Err(unknown_key(kid)));
        }
        None
    }

    async fn fetch_keys(&self) -> Result<HashMap<String, DecodingKey>> {
        let response = self.client.get(&self.config.jwks_url).send().await.map_err(|e| {
            if e.is_timeout() {
                IdentityError::provider_unavailable(format!(
                    "JWKS request timed out after {}s",
                    self.config.timeout.as_secs()
                ))
            } else {
                IdentityError::provider_unavailable(format!("JWKS request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(IdentityError::provider_unavailable(format!(
                "JWKS endpoint returned HTTP {}",
                status.as_u16()
            )));
        }

        let set: JwkSet = response.json().await.map_err(|e| {
            IdentityError::provider_unavailable(format!("JWKS document is not valid: {e}"))
        })?;

        let mut keys = HashMap::new();
        for jwk in set.keys.iter().filter(|jwk| jwk.is_rsa_signing_key()) {
            let (Some(kid), Some(n), Some(e)) = (&jwk.kid, &jwk.n, &jwk.e) else {
                warn!(kid = ?jwk.kid, "skipping JWKS entry without kid or RSA components");
                continue;
            };
            match DecodingKey::from_rsa_components(n, e) {
                Ok(key) => {
                    keys.insert(kid.clone(), key);
                },
                Err(error) => warn!(kid, %error, "skipping malformed JWKS entry"),
            }
        }

        if keys.is_empty() {
            return Err(IdentityError::provider_unavailable("JWKS contains no usable RS256 keys"));
        }

        info!(keys = keys.len(), url = %self.config.jwks_url, "fetched identity provider signing keys");
        Ok(keys)
    }
}

#[async_trait]
impl IdentityVerifier for JwksVerifier {
    async fn verify(&self, token: &str) -> Result<Principal> {
        let header = decode_header(token)
            .map_err(|e| IdentityError::invalid_token(format!("malformed token: {e}")))?;
        if header.alg != Algorithm::RS256 {
            return Err(IdentityError::invalid_token(format!(
                "unsupported signing algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| IdentityError::invalid_token("token header has no key id"))?;

        let key = self.signing_key(&kid).await?;
        let data = decode::<Map<String, Value>>(token, &key, &self.validation)
            .map_err(|e| IdentityError::invalid_token(describe_rejection(e.kind())))?;

        principal_from_claims(data.claims)
    }
}

fn unknown_key(kid: &str) -> IdentityError {
    IdentityError::invalid_token(format!("token signed with unknown key '{kid}'"))
}

fn describe_rejection(kind: &ErrorKind) -> String {
    match kind {
        ErrorKind::ExpiredSignature => "token has expired".to_string(),
        ErrorKind::ImmatureSignature => "token is not yet valid".to_string(),
        ErrorKind::InvalidSignature => "signature does not verify".to_string(),
        ErrorKind::InvalidIssuer => "unexpected issuer".to_string(),
        ErrorKind::InvalidAudience => "unexpected audience".to_string(),
        ErrorKind::MissingRequiredClaim(claim) => format!("missing required claim '{claim}'"),
        other => format!("token rejected: {other:?}"),
    }
}

/// Maps verified claims onto a principal.
pub(crate) fn principal_from_claims(claims: Map<String, Value>) -> Result<Principal> {
    let subject = claims
        .get("sub")
        .and_then(Value::as_str)
        .filter(|sub| !sub.is_empty())
        .ok_or_else(|| IdentityError::invalid_token("token has no subject"))?
        .to_string();
    let email = claims.get("email").and_then(Value::as_str).map(str::to_string);
    let email_verified = claims.get("email_verified").and_then(Value::as_bool).unwrap_or(false);

    Ok(Principal { subject, email, email_verified, claims })
}
