//! Error types for policy construction.

use thiserror::Error;

/// Result type for policy operations.
pub type Result<T> = std::result::Result<T, PolicyError>;

/// Errors raised while building a gate policy from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// Bucket capacity must admit at least one request.
    #[error("bucket capacity must be at least 1, got {value}")]
    InvalidCapacity {
        /// Rejected capacity.
        value: u64,
    },

    /// Each refill must add at least one token.
    #[error("refill token count must be at least 1, got {value}")]
    InvalidRefillTokens {
        /// Rejected refill amount.
        value: u64,
    },

    /// Path pattern could not be parsed.
    #[error("invalid path pattern '{pattern}': {reason}")]
    InvalidPathPattern {
        /// Pattern as written in configuration.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Key strategy name is not one of AUTO, PER_IP, PER_USER.
    #[error("unknown rate limit key strategy '{name}'")]
    UnknownStrategy {
        /// Name as written in configuration.
        name: String,
    },
}

impl PolicyError {
    /// Creates an invalid path pattern error.
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPathPattern { pattern: pattern.into(), reason: reason.into() }
    }
}
