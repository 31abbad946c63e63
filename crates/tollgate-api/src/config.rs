//! Configuration management for the tollgate service.

use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use axum::http::{HeaderName, HeaderValue, Method, Uri};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize};
use tollgate_core::{
    policy::{DEFAULT_EXCLUDED_PATHS, DEFAULT_PUBLIC_PATHS},
    AuthPolicy, Bandwidth, KeyStrategy, PathSet, RateLimitPolicy,
};
use tollgate_identity::JwksConfig;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

use crate::server::RouterSettings;

const CONFIG_FILE: &str = "tollgate.toml";

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`tollgate.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// List-valued settings accept either a TOML array or, from the
/// environment, a comma-separated string.
///
/// # Example
///
/// ```no_run
/// use tollgate_api::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
///
/// println!("Gate will bind to {}:{}", config.host, config.port);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server
    /// Server bind address.
    ///
    /// Environment variable: `HOST`
    #[serde(default = "default_host", alias = "HOST")]
    pub host: String,
    /// Server bind port.
    ///
    /// Environment variable: `PORT`
    #[serde(default = "default_port", alias = "PORT")]
    pub port: u16,
    /// HTTP request timeout in seconds.
    ///
    /// Environment variable: `REQUEST_TIMEOUT`
    #[serde(default = "default_request_timeout", alias = "REQUEST_TIMEOUT")]
    pub request_timeout: u64,

    // Authentication
    /// Ant-style patterns served without authentication.
    ///
    /// Environment variable: `AUTH_PUBLIC_PATHS`
    #[serde(
        default = "default_public_paths",
        alias = "AUTH_PUBLIC_PATHS",
        deserialize_with = "string_list"
    )]
    pub auth_public_paths: Vec<String>,
    /// Reject tokens whose email is not verified.
    ///
    /// Environment variable: `AUTH_REQUIRE_EMAIL_VERIFIED`
    #[serde(default, alias = "AUTH_REQUIRE_EMAIL_VERIFIED")]
    pub auth_require_email_verified: bool,

    // Identity provider
    /// JWKS document URL; unset means no identity provider.
    ///
    /// Environment variable: `IDENTITY_JWKS_URL`
    #[serde(default, alias = "IDENTITY_JWKS_URL")]
    pub identity_jwks_url: Option<String>,
    /// Required token issuer.
    ///
    /// Environment variable: `IDENTITY_ISSUER`
    #[serde(default, alias = "IDENTITY_ISSUER")]
    pub identity_issuer: Option<String>,
    /// Required token audience.
    ///
    /// Environment variable: `IDENTITY_AUDIENCE`
    #[serde(default, alias = "IDENTITY_AUDIENCE")]
    pub identity_audience: Option<String>,
    /// JWKS fetch timeout in seconds.
    ///
    /// Environment variable: `IDENTITY_TIMEOUT_SECONDS`
    #[serde(default = "default_identity_timeout", alias = "IDENTITY_TIMEOUT_SECONDS")]
    pub identity_timeout_seconds: u64,
    /// How long fetched signing keys are trusted, in seconds.
    ///
    /// Environment variable: `IDENTITY_JWKS_CACHE_SECONDS`
    #[serde(default = "default_jwks_cache", alias = "IDENTITY_JWKS_CACHE_SECONDS")]
    pub identity_jwks_cache_seconds: u64,
    /// Tolerated clock skew on token expiry, in seconds.
    ///
    /// Environment variable: `IDENTITY_LEEWAY_SECONDS`
    #[serde(default = "default_leeway", alias = "IDENTITY_LEEWAY_SECONDS")]
    pub identity_leeway_seconds: u64,

    // Rate limiting
    /// Master switch for rate limiting.
    ///
    /// Environment variable: `RATE_LIMIT_ENABLED`
    #[serde(default = "default_true", alias = "RATE_LIMIT_ENABLED")]
    pub rate_limit_enabled: bool,
    /// Bucket capacity.
    ///
    /// Environment variable: `RATE_LIMIT_CAPACITY`
    #[serde(default = "default_capacity", alias = "RATE_LIMIT_CAPACITY")]
    pub rate_limit_capacity: u64,
    /// Tokens added per refill interval.
    ///
    /// Environment variable: `RATE_LIMIT_REFILL_TOKENS`
    #[serde(default = "default_capacity", alias = "RATE_LIMIT_REFILL_TOKENS")]
    pub rate_limit_refill_tokens: u64,
    /// Refill interval in seconds; 0 falls back to 60.
    ///
    /// Environment variable: `RATE_LIMIT_REFILL_INTERVAL_SECONDS`
    #[serde(default = "default_refill_interval", alias = "RATE_LIMIT_REFILL_INTERVAL_SECONDS")]
    pub rate_limit_refill_interval_seconds: u64,
    /// Key strategy: `AUTO`, `PER_IP` or `PER_USER`.
    ///
    /// Environment variable: `RATE_LIMIT_STRATEGY`
    #[serde(default = "default_strategy", alias = "RATE_LIMIT_STRATEGY")]
    pub rate_limit_strategy: String,
    /// Ant-style patterns that bypass rate limiting.
    ///
    /// Environment variable: `RATE_LIMIT_EXCLUDED_PATHS`
    #[serde(
        default = "default_excluded_paths",
        alias = "RATE_LIMIT_EXCLUDED_PATHS",
        deserialize_with = "string_list"
    )]
    pub rate_limit_excluded_paths: Vec<String>,
    /// Idle refill intervals before a full bucket is evicted; 0 disables.
    ///
    /// Environment variable: `RATE_LIMIT_IDLE_EVICTION_INTERVALS`
    #[serde(default = "default_idle_eviction", alias = "RATE_LIMIT_IDLE_EVICTION_INTERVALS")]
    pub rate_limit_idle_eviction_intervals: u32,

    // CORS
    /// Allowed origins; empty disables the CORS layer, `*` mirrors any origin.
    ///
    /// Environment variable: `CORS_ALLOWED_ORIGINS`
    #[serde(default, alias = "CORS_ALLOWED_ORIGINS", deserialize_with = "string_list")]
    pub cors_allowed_origins: Vec<String>,
    /// Allowed methods.
    ///
    /// Environment variable: `CORS_ALLOWED_METHODS`
    #[serde(
        default = "default_cors_methods",
        alias = "CORS_ALLOWED_METHODS",
        deserialize_with = "string_list"
    )]
    pub cors_allowed_methods: Vec<String>,
    /// Allowed request headers; `*` mirrors the requested headers.
    ///
    /// Environment variable: `CORS_ALLOWED_HEADERS`
    #[serde(
        default = "default_cors_headers",
        alias = "CORS_ALLOWED_HEADERS",
        deserialize_with = "string_list"
    )]
    pub cors_allowed_headers: Vec<String>,
    /// Response headers readable by cross-origin scripts.
    ///
    /// Environment variable: `CORS_EXPOSED_HEADERS`
    #[serde(
        default = "default_cors_exposed_headers",
        alias = "CORS_EXPOSED_HEADERS",
        deserialize_with = "string_list"
    )]
    pub cors_exposed_headers: Vec<String>,
    /// Whether credentials may accompany cross-origin requests.
    ///
    /// Environment variable: `CORS_ALLOW_CREDENTIALS`
    #[serde(default = "default_true", alias = "CORS_ALLOW_CREDENTIALS")]
    pub cors_allow_credentials: bool,
    /// Pre-flight cache lifetime in seconds.
    ///
    /// Environment variable: `CORS_MAX_AGE_SECONDS`
    #[serde(default = "default_cors_max_age", alias = "CORS_MAX_AGE_SECONDS")]
    pub cors_max_age_seconds: u64,

    // Response hardening
    /// Add `X-Content-Type-Options`, `X-Frame-Options`, HSTS,
    /// `Referrer-Policy` and `Permissions-Policy` to responses.
    ///
    /// Environment variable: `SECURITY_HEADERS_ENABLED`
    #[serde(default = "default_true", alias = "SECURITY_HEADERS_ENABLED")]
    pub security_headers_enabled: bool,

    // Logging
    /// Log level configuration.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level", alias = "RUST_LOG")]
    pub rust_log: String,
}

impl Config {
    /// Load configuration from defaults, config file, and environment variable
    /// overrides, then validate it.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(""));

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Convert to the rate limit policy.
    pub fn to_rate_limit_policy(&self) -> Result<RateLimitPolicy> {
        let bandwidth = Bandwidth::new(
            self.rate_limit_capacity,
            self.rate_limit_refill_tokens,
            Duration::from_secs(self.rate_limit_refill_interval_seconds),
        )
        .context("invalid rate limit bandwidth")?;
        let strategy =
            KeyStrategy::from_str(&self.rate_limit_strategy).context("invalid rate limit strategy")?;
        let excluded_paths = PathSet::parse(&self.rate_limit_excluded_paths)
            .context("invalid rate limit excluded path")?;

        Ok(RateLimitPolicy {
            enabled: self.rate_limit_enabled,
            bandwidth,
            strategy,
            excluded_paths,
            idle_eviction_intervals: self.rate_limit_idle_eviction_intervals,
        })
    }

    /// Convert to the authentication policy.
    pub fn to_auth_policy(&self) -> Result<AuthPolicy> {
        let public_paths =
            PathSet::parse(&self.auth_public_paths).context("invalid public path")?;
        Ok(AuthPolicy { public_paths, require_email_verified: self.auth_require_email_verified })
    }

    /// Convert to the JWKS verifier configuration; `None` without a JWKS URL.
    pub fn to_jwks_config(&self) -> Option<JwksConfig> {
        let url = self.identity_jwks_url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;

        let mut jwks = JwksConfig::new(url);
        jwks.issuer.clone_from(&self.identity_issuer);
        jwks.audience.clone_from(&self.identity_audience);
        jwks.timeout = Duration::from_secs(self.identity_timeout_seconds);
        jwks.cache_ttl = Duration::from_secs(self.identity_jwks_cache_seconds);
        jwks.leeway = Duration::from_secs(self.identity_leeway_seconds);
        Some(jwks)
    }

    /// Build the CORS layer; `None` when no origins are configured.
    pub fn cors_layer(&self) -> Result<Option<CorsLayer>> {
        if self.cors_allowed_origins.is_empty() {
            return Ok(None);
        }

        let origins = if self.cors_allowed_origins.iter().any(|o| o == "*") {
            AllowOrigin::mirror_request()
        } else {
            let origins = self
                .cors_allowed_origins
                .iter()
                .map(|o| HeaderValue::from_str(o).with_context(|| format!("invalid CORS origin '{o}'")))
                .collect::<Result<Vec<_>>>()?;
            AllowOrigin::list(origins)
        };

        let headers = if self.cors_allowed_headers.iter().any(|h| h == "*") {
            AllowHeaders::mirror_request()
        } else {
            let headers = self
                .cors_allowed_headers
                .iter()
                .map(|h| HeaderName::from_str(h).with_context(|| format!("invalid CORS header '{h}'")))
                .collect::<Result<Vec<_>>>()?;
            AllowHeaders::list(headers)
        };

        let exposed = self
            .cors_exposed_headers
            .iter()
            .map(|h| HeaderName::from_str(h).with_context(|| format!("invalid CORS header '{h}'")))
            .collect::<Result<Vec<_>>>()?;

        let methods = self
            .cors_allowed_methods
            .iter()
            .map(|m| {
                Method::from_str(&m.to_ascii_uppercase())
                    .with_context(|| format!("invalid CORS method '{m}'"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(methods)
                .allow_headers(headers)
                .expose_headers(exposed)
                .allow_credentials(self.cors_allow_credentials)
                .max_age(Duration::from_secs(self.cors_max_age_seconds)),
        ))
    }

    /// Outer router layers.
    pub fn router_settings(&self) -> Result<RouterSettings> {
        Ok(RouterSettings {
            request_timeout: Duration::from_secs(self.request_timeout),
            cors: self.cors_layer()?,
            security_headers: self.security_headers_enabled,
        })
    }

    /// Parse server socket address from host and port configuration.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.host, self.port);
        SocketAddr::from_str(&addr_str).context("Invalid server address")
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.request_timeout == 0 {
            anyhow::bail!("request_timeout must be greater than 0");
        }

        self.to_rate_limit_policy()?;
        self.to_auth_policy()?;
        self.cors_layer()?;

        if let Some(jwks) = self.to_jwks_config() {
            if !is_http_url(&jwks.jwks_url) {
                anyhow::bail!(
                    "identity_jwks_url must be an absolute http(s) URL, got '{}'",
                    jwks.jwks_url
                );
            }
        }

        Ok(())
    }
}

fn is_http_url(url: &str) -> bool {
    url.trim().parse::<Uri>().is_ok_and(|uri| {
        matches!(uri.scheme_str(), Some("http" | "https")) && uri.authority().is_some()
    })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            auth_public_paths: default_public_paths(),
            auth_require_email_verified: false,
            identity_jwks_url: None,
            identity_issuer: None,
            identity_audience: None,
            identity_timeout_seconds: default_identity_timeout(),
            identity_jwks_cache_seconds: default_jwks_cache(),
            identity_leeway_seconds: default_leeway(),
            rate_limit_enabled: true,
            rate_limit_capacity: default_capacity(),
            rate_limit_refill_tokens: default_capacity(),
            rate_limit_refill_interval_seconds: default_refill_interval(),
            rate_limit_strategy: default_strategy(),
            rate_limit_excluded_paths: default_excluded_paths(),
            rate_limit_idle_eviction_intervals: default_idle_eviction(),
            cors_allowed_origins: Vec::new(),
            cors_allowed_methods: default_cors_methods(),
            cors_allowed_headers: default_cors_headers(),
            cors_exposed_headers: default_cors_exposed_headers(),
            cors_allow_credentials: true,
            cors_max_age_seconds: default_cors_max_age(),
            security_headers_enabled: true,
            rust_log: default_log_level(),
        }
    }
}

/// Accepts a list or a comma-separated string.
fn string_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringList {
        List(Vec<String>),
        Csv(String),
    }

    Ok(match StringList::deserialize(deserializer)? {
        StringList::List(items) => items,
        StringList::Csv(csv) => csv
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect(),
    })
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_public_paths() -> Vec<String> {
    DEFAULT_PUBLIC_PATHS.iter().map(|p| (*p).to_string()).collect()
}

fn default_identity_timeout() -> u64 {
    5
}

fn default_jwks_cache() -> u64 {
    3600
}

fn default_leeway() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_capacity() -> u64 {
    200
}

fn default_refill_interval() -> u64 {
    60
}

fn default_strategy() -> String {
    KeyStrategy::Auto.to_string()
}

fn default_excluded_paths() -> Vec<String> {
    DEFAULT_EXCLUDED_PATHS.iter().map(|p| (*p).to_string()).collect()
}

fn default_idle_eviction() -> u32 {
    10
}

fn default_cors_methods() -> Vec<String> {
    ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"].iter().map(|m| (*m).to_string()).collect()
}

fn default_cors_headers() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_cors_exposed_headers() -> Vec<String> {
    ["X-RateLimit-Limit", "X-RateLimit-Remaining", "Retry-After"]
        .iter()
        .map(|h| (*h).to_string())
        .collect()
}

fn default_cors_max_age() -> u64 {
    3600
}

fn default_log_level() -> String {
    "info".to_string()
}
