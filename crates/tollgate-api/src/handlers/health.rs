//! Health endpoint.
//!
//! Public and excluded from rate limiting by default, so probes are never
//! throttled and never need a token.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::AppState;

/// Health check response structure.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service health status
    pub status: HealthStatus,
    /// Timestamp when health check was performed
    pub timestamp: DateTime<Utc>,
    /// Individual component health checks
    pub checks: HealthChecks,
    /// Service version information
    pub version: String,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every component is usable
    Healthy,
    /// Serving, but requests carrying tokens will be refused
    Degraded,
}

/// Per-component results.
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    /// Identity provider wiring
    pub identity_provider: ComponentHealth,
    /// Rate limiter registry
    pub rate_limiter: RateLimiterHealth,
}

/// Health of a single component.
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    /// Component status
    pub status: ComponentStatus,
    /// Optional explanation when not up
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Rate limiter details.
#[derive(Debug, Serialize)]
pub struct RateLimiterHealth {
    /// Component status
    pub status: ComponentStatus,
    /// Whether requests are being limited at all
    pub enabled: bool,
    /// Keys with a live bucket
    pub tracked_keys: usize,
}

/// Component-level status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Working
    Up,
    /// Not configured
    Unconfigured,
}

/// Reports gate health.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    debug!("performing health check");

    let identity_provider = if state.auth.is_provider_available() {
        ComponentHealth { status: ComponentStatus::Up, message: None }
    } else {
        ComponentHealth {
            status: ComponentStatus::Unconfigured,
            message: Some("no identity provider configured".to_string()),
        }
    };
    let status = match identity_provider.status {
        ComponentStatus::Up => HealthStatus::Healthy,
        ComponentStatus::Unconfigured => HealthStatus::Degraded,
    };

    let rate_limit = &state.rate_limit;
    Json(HealthResponse {
        status,
        timestamp: DateTime::<Utc>::from(state.clock.now_system()),
        checks: HealthChecks {
            identity_provider,
            rate_limiter: RateLimiterHealth {
                status: ComponentStatus::Up,
                enabled: rate_limit.policy().enabled,
                tracked_keys: rate_limit.limiter().tracked_keys(),
            },
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
