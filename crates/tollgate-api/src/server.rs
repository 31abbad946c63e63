//! HTTP server configuration and request routing.
//!
//! Requests flow through middleware in order:
//! 1. Request ID propagation
//! 2. Request/response tracing
//! 3. Security response headers (if enabled)
//! 4. CORS (if configured), so pre-flights are answered before the gate
//! 5. Timeout enforcement
//! 6. Authentication stage
//! 7. Rate limit stage
//! 8. Handler execution
//!
//! # Graceful Shutdown
//!
//! On SIGINT or SIGTERM the server stops accepting connections and waits
//! for in-flight requests before returning.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::Request,
    http::{
        header::{
            REFERRER_POLICY, STRICT_TRANSPORT_SECURITY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
            X_XSS_PROTECTION,
        },
        HeaderName, HeaderValue, StatusCode,
    },
    middleware,
    routing::get,
    Router,
};
use tower_http::{
    cors::CorsLayer, set_header::SetResponseHeaderLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::{info, info_span, warn};

use crate::{
    handlers,
    middleware::{auth_middleware, inject_request_id, rate_limit_middleware, RequestId},
    AppState,
};

/// Timeout applied when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Outer layers that are not part of the gate itself.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// CORS policy, if cross-origin access is configured.
    pub cors: Option<CorsLayer>,
    /// Whether hardening headers are added to responses.
    pub security_headers: bool,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self { request_timeout: DEFAULT_REQUEST_TIMEOUT, cors: None, security_headers: true }
    }
}

/// Wraps a downstream router with the authentication and rate limit stages.
///
/// Authentication runs first so the rate limit stage can key on the
/// authenticated subject.
pub fn gate(router: Router, state: &AppState) -> Router {
    router
        .layer(middleware::from_fn_with_state(Arc::clone(&state.rate_limit), rate_limit_middleware))
        .layer(middleware::from_fn_with_state(Arc::clone(&state.auth), auth_middleware))
}

/// Creates the standalone router: built-in endpoints behind the gate.
pub fn create_router(state: AppState, settings: RouterSettings) -> Router {
    let routes = Router::new()
        .route("/api/health", get(handlers::health_check))
        .route("/api/whoami", get(handlers::whoami))
        .with_state(state.clone());

    let mut app = gate(routes, &state).layer(TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        settings.request_timeout,
    ));
    if let Some(cors) = settings.cors {
        app = app.layer(cors);
    }
    if settings.security_headers {
        app = with_security_headers(app);
    }

    let trace = TraceLayer::new_for_http().make_span_with(|req: &Request| {
        let request_id = req.extensions().get::<RequestId>().map_or("-", |id| id.0.as_str());
        info_span!("request", method = %req.method(), uri = %req.uri(), request_id)
    });

    app.layer(trace).layer(middleware::from_fn(inject_request_id))
}

/// Adds the hardening headers to every response, including rejections and
/// CORS pre-flights.
///
/// Responses that already carry one of these headers keep their own value.
pub fn with_security_headers(router: Router) -> Router {
    let headers = [
        (X_CONTENT_TYPE_OPTIONS, "nosniff"),
        (X_FRAME_OPTIONS, "DENY"),
        (X_XSS_PROTECTION, "0"),
        (STRICT_TRANSPORT_SECURITY, "max-age=31536000; includeSubDomains"),
        (REFERRER_POLICY, "strict-origin-when-cross-origin"),
        (
            HeaderName::from_static("permissions-policy"),
            "geolocation=(), microphone=(), camera=()",
        ),
    ];

    headers.into_iter().fold(router, |router, (name, value)| {
        router.layer(SetResponseHeaderLayer::if_not_present(name, HeaderValue::from_static(value)))
    })
}

/// Serves `app` on `addr` until a shutdown signal arrives.
///
/// Peer addresses are recorded so the rate limit stage can fall back to
/// them when no `X-Forwarded-For` header is present.
///
/// # Errors
///
/// Returns `std::io::Error` if the address cannot be bound.
pub async fn start_server(app: Router, addr: SocketAddr) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!(%actual_addr, "HTTP server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped gracefully");
    Ok(())
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received CTRL+C, starting graceful shutdown");
        },
        () = terminate => {
            info!("received SIGTERM, starting graceful shutdown");
        },
    }

    warn!("waiting for in-flight requests to complete");
}
