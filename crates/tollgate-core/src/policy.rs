//! Gate policies: who may pass unauthenticated, and how fast anyone may pass.
//!
//! Policies are immutable after construction and shared read-only between
//! the stages of the pipeline.

use std::{fmt, str::FromStr, time::Duration};

use crate::{
    error::{PolicyError, Result},
    path::PathSet,
};

/// Refill interval used when configuration supplies a zero interval.
pub const DEFAULT_REFILL_INTERVAL: Duration = Duration::from_secs(60);

/// Paths that skip authentication unless configured otherwise.
pub const DEFAULT_PUBLIC_PATHS: &[&str] = &[
    "/",
    "/api/public/**",
    "/api/auth/register/**",
    "/api/health/**",
    "/swagger-ui/**",
    "/v3/api-docs/**",
    "/actuator/**",
];

/// Paths that skip rate limiting unless configured otherwise.
pub const DEFAULT_EXCLUDED_PATHS: &[&str] =
    &["/api/health/**", "/v3/api-docs/**", "/swagger-ui/**", "/actuator/health"];

/// Token bucket dimensions shared by every bucket in a registry.
///
/// A bucket holds at most `capacity` tokens and gains `refill_tokens`
/// (capped at capacity) each time a full `refill_interval` elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bandwidth {
    capacity: u64,
    refill_tokens: u64,
    refill_interval: Duration,
}

impl Bandwidth {
    /// Validates and builds bucket dimensions.
    ///
    /// A zero interval falls back to [`DEFAULT_REFILL_INTERVAL`].
    pub fn new(capacity: u64, refill_tokens: u64, refill_interval: Duration) -> Result<Self> {
        if capacity == 0 {
            return Err(PolicyError::InvalidCapacity { value: capacity });
        }
        if refill_tokens == 0 {
            return Err(PolicyError::InvalidRefillTokens { value: refill_tokens });
        }
        let refill_interval =
            if refill_interval.is_zero() { DEFAULT_REFILL_INTERVAL } else { refill_interval };

        Ok(Self { capacity, refill_tokens, refill_interval })
    }

    /// Maximum tokens a bucket can hold.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Tokens added per completed interval.
    pub fn refill_tokens(&self) -> u64 {
        self.refill_tokens
    }

    /// Length of one refill interval.
    pub fn refill_interval(&self) -> Duration {
        self.refill_interval
    }
}

impl Default for Bandwidth {
    fn default() -> Self {
        Self { capacity: 200, refill_tokens: 200, refill_interval: DEFAULT_REFILL_INTERVAL }
    }
}

/// How the rate-limit key is derived from a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum KeyStrategy {
    /// Authenticated subject when present, client IP otherwise.
    #[default]
    Auto,
    /// Always the client IP.
    PerIp,
    /// Authenticated subject when present, client IP otherwise.
    PerUser,
}

impl KeyStrategy {
    /// Builds the bucket key for a request.
    ///
    /// Keys are namespaced so a subject id never shares a bucket with an
    /// address. Without any address the key is `ip:unknown`.
    pub fn bucket_key(self, subject: Option<&str>, client_ip: Option<&str>) -> String {
        let subject = match self {
            Self::PerIp => None,
            Self::Auto | Self::PerUser => subject.filter(|s| !s.is_empty()),
        };

        match (subject, client_ip.filter(|ip| !ip.is_empty())) {
            (Some(subject), _) => format!("user:{subject}"),
            (None, Some(ip)) => format!("ip:{ip}"),
            (None, None) => "ip:unknown".to_string(),
        }
    }

    /// Configuration name of the strategy.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "AUTO",
            Self::PerIp => "PER_IP",
            Self::PerUser => "PER_USER",
        }
    }
}

impl FromStr for KeyStrategy {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "AUTO" => Ok(Self::Auto),
            "PER_IP" => Ok(Self::PerIp),
            "PER_USER" => Ok(Self::PerUser),
            _ => Err(PolicyError::UnknownStrategy { name: s.to_string() }),
        }
    }
}

impl fmt::Display for KeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rate limiting policy for the whole gate.
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    /// When false every request bypasses the limiter.
    pub enabled: bool,
    /// Bucket dimensions.
    pub bandwidth: Bandwidth,
    /// Key derivation strategy.
    pub strategy: KeyStrategy,
    /// Paths that bypass the limiter.
    pub excluded_paths: PathSet,
    /// Idle intervals after which a full bucket may be evicted; 0 disables.
    pub idle_eviction_intervals: u32,
}

impl RateLimitPolicy {
    /// Builds an enabled policy with the given dimensions and default exclusions.
    pub fn new(bandwidth: Bandwidth) -> Self {
        Self { bandwidth, ..Self::default() }
    }

    /// Replaces the key strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Replaces the excluded path set.
    #[must_use]
    pub fn with_excluded_paths(mut self, excluded_paths: PathSet) -> Self {
        self.excluded_paths = excluded_paths;
        self
    }

    /// Returns true when a request bypasses the limiter entirely.
    ///
    /// Disabled policies, `OPTIONS` pre-flights and excluded paths skip.
    pub fn should_skip(&self, method: &str, path: &str) -> bool {
        !self.enabled || method.eq_ignore_ascii_case("OPTIONS") || self.excluded_paths.matches(path)
    }

    /// Minimum idle time before a full bucket may be evicted.
    pub fn idle_eviction_after(&self) -> Option<Duration> {
        if self.idle_eviction_intervals == 0 {
            return None;
        }
        Some(self.bandwidth.refill_interval.saturating_mul(self.idle_eviction_intervals))
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            bandwidth: Bandwidth::default(),
            strategy: KeyStrategy::Auto,
            excluded_paths: PathSet::parse(DEFAULT_EXCLUDED_PATHS).unwrap_or_default(),
            idle_eviction_intervals: 10,
        }
    }
}

/// Authentication policy.
#[derive(Debug, Clone)]
pub struct AuthPolicy {
    /// Paths served without inspecting credentials.
    pub public_paths: PathSet,
    /// Reject verified tokens whose email is not verified.
    pub require_email_verified: bool,
}

impl AuthPolicy {
    /// Returns true when the path skips authentication.
    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.matches(path)
    }
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            public_paths: PathSet::parse(DEFAULT_PUBLIC_PATHS).unwrap_or_default(),
            require_email_verified: false,
        }
    }
}
