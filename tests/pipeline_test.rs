//! End-to-end tests of the standalone gate: real JWKS verification against a
//! mock provider, the full router with its outer layers, and the built-in
//! endpoints.

use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tollgate_api::{create_router, gate, server::RouterSettings, AppState, Config};
use tollgate_core::{AuthPolicy, Bandwidth, Clock, KeyStrategy, RateLimitPolicy, TestClock};
use tollgate_identity::{IdentityVerifier, JwksConfig, JwksVerifier};
use tollgate_testing::{DownstreamSpy, JwksServer, TestKeys, TEST_AUDIENCE, TEST_ISSUER};
use tower::ServiceExt;

struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl Response {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

async fn call(app: &Router, request: Request<Body>) -> Response {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    Response { status, headers, body }
}

fn get(path: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(path).header("x-forwarded-for", "198.51.100.20");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn jwks_verifier(server: &JwksServer, clock: &Arc<dyn Clock>) -> Arc<dyn IdentityVerifier> {
    let config = JwksConfig::new(server.url()).with_issuer(TEST_ISSUER).with_audience(TEST_AUDIENCE);
    Arc::new(JwksVerifier::new(config, Arc::clone(clock)).unwrap())
}

fn state(
    verifier: Option<Arc<dyn IdentityVerifier>>,
    capacity: u64,
    clock: Arc<dyn Clock>,
) -> AppState {
    let bandwidth = Bandwidth::new(capacity, capacity, Duration::from_secs(60)).unwrap();
    let rate_limit = RateLimitPolicy::new(bandwidth).with_strategy(KeyStrategy::PerUser);
    let auth = AuthPolicy { require_email_verified: true, ..AuthPolicy::default() };
    AppState::new(auth, verifier, rate_limit, clock)
}

#[tokio::test]
async fn signed_token_reaches_whoami_with_authorities() {
    let keys = TestKeys::new();
    let server = JwksServer::publishing(&[&keys]).await;
    let clock: Arc<dyn Clock> = Arc::new(TestClock::new());
    let app = create_router(
        state(Some(jwks_verifier(&server, &clock)), 10, clock),
        RouterSettings::default(),
    );

    let token = keys.token().subject("u1").email("u1@example.com", true).role("admin").sign();
    let response = call(&app, get("/api/whoami", Some(&token))).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["subject"], "u1");
    assert_eq!(response.body["email"], "u1@example.com");
    assert_eq!(response.body["authorities"], json!(["ROLE_ADMIN"]));
    assert_eq!(response.header("x-ratelimit-limit"), Some("10"));
    assert_eq!(response.header("x-ratelimit-remaining"), Some("9"));
    assert!(response.header("x-request-id").is_some());
}

#[tokio::test]
async fn whoami_requires_authentication() {
    let clock: Arc<dyn Clock> = Arc::new(TestClock::new());
    let app = create_router(state(None, 10, clock), RouterSettings::default());

    let response = call(&app, get("/api/whoami", None)).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "authentication_required");
}

#[tokio::test]
async fn expired_token_is_rejected_with_401() {
    let keys = TestKeys::new();
    let server = JwksServer::publishing(&[&keys]).await;
    let clock: Arc<dyn Clock> = Arc::new(TestClock::new());
    let app = create_router(
        state(Some(jwks_verifier(&server, &clock)), 10, clock),
        RouterSettings::default(),
    );

    let expired = keys.token().email("u1@example.com", true).expires_in(-7200).sign();
    let response = call(&app, get("/api/whoami", Some(&expired))).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body, json!({ "error": "Invalid or expired token" }));
}

#[tokio::test]
async fn unverified_email_is_rejected_with_403() {
    let keys = TestKeys::new();
    let server = JwksServer::publishing(&[&keys]).await;
    let clock: Arc<dyn Clock> = Arc::new(TestClock::new());
    let app = create_router(
        state(Some(jwks_verifier(&server, &clock)), 10, clock),
        RouterSettings::default(),
    );

    let token = keys.token().email("u1@example.com", false).sign();
    let response = call(&app, get("/api/whoami", Some(&token))).await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["error"], "email_not_verified");
}

#[tokio::test]
async fn provider_outage_fails_closed_before_downstream() {
    let keys = TestKeys::new();
    let server = JwksServer::start().await;
    server.fail_with(502).await;
    let clock: Arc<dyn Clock> = Arc::new(TestClock::new());
    let state = state(Some(jwks_verifier(&server, &clock)), 10, clock);
    let spy = DownstreamSpy::new();
    let app = gate(spy.router(), &state);

    let token = keys.token().email("u1@example.com", true).sign();
    let response = call(&app, get("/api/orders", Some(&token))).await;

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.body, json!({ "error": "Authentication service unavailable" }));
    assert_eq!(spy.hits(), 0);
    assert_eq!(state.rate_limit.limiter().tracked_keys(), 0);
}

#[tokio::test]
async fn health_is_public_and_not_rate_limited() {
    let clock: Arc<dyn Clock> = Arc::new(TestClock::new());
    let app = create_router(state(None, 1, clock), RouterSettings::default());

    for _ in 0..3 {
        let response = call(&app, get("/api/health", Some("not-even-a-jwt"))).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["status"], "degraded");
        assert_eq!(response.body["checks"]["identity_provider"]["status"], "unconfigured");
        assert!(response.header("x-ratelimit-limit").is_none());
    }
}

#[tokio::test]
async fn health_reports_configured_provider() {
    let server = JwksServer::publishing(&[&TestKeys::new()]).await;
    let clock: Arc<dyn Clock> = Arc::new(TestClock::new());
    let app = create_router(
        state(Some(jwks_verifier(&server, &clock)), 5, clock),
        RouterSettings::default(),
    );

    let response = call(&app, get("/api/health", None)).await;

    assert_eq!(response.body["status"], "healthy");
    assert_eq!(response.body["checks"]["rate_limiter"]["enabled"], true);
}

#[tokio::test]
async fn inbound_request_id_is_echoed() {
    let clock: Arc<dyn Clock> = Arc::new(TestClock::new());
    let app = create_router(state(None, 5, clock), RouterSettings::default());

    let request = Request::builder()
        .uri("/api/health")
        .header("x-request-id", "trace-abc-123")
        .body(Body::empty())
        .unwrap();
    let response = call(&app, request).await;

    assert_eq!(response.header("x-request-id"), Some("trace-abc-123"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_for_one_user_admit_exactly_capacity() {
    const CAPACITY: u64 = 5;
    const REQUESTS: usize = 40;

    let keys = TestKeys::new();
    let server = JwksServer::publishing(&[&keys]).await;
    let clock: Arc<dyn Clock> = Arc::new(TestClock::new());
    let app = create_router(
        state(Some(jwks_verifier(&server, &clock)), CAPACITY, clock),
        RouterSettings::default(),
    );
    let token = keys.token().subject("u1").email("u1@example.com", true).sign();

    let mut handles = Vec::with_capacity(REQUESTS);
    for i in 0..REQUESTS {
        let app = app.clone();
        let token = token.clone();
        handles.push(tokio::spawn(async move {
            let request = Request::builder()
                .uri("/api/whoami")
                .header("authorization", format!("Bearer {token}"))
                .header("x-forwarded-for", format!("198.51.100.{}", i % 200))
                .body(Body::empty())
                .unwrap();
            call(&app, request).await.status
        }));
    }

    let mut admitted = 0;
    let mut limited = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::OK => admitted += 1,
            StatusCode::TOO_MANY_REQUESTS => limited += 1,
            other => panic!("unexpected status {other}"),
        }
    }

    assert_eq!(admitted, CAPACITY);
    assert_eq!(limited, REQUESTS as u64 - CAPACITY);
}

#[tokio::test]
async fn state_from_config_verifies_against_configured_provider() {
    let keys = TestKeys::new();
    let server = JwksServer::publishing(&[&keys]).await;
    let config = Config {
        identity_jwks_url: Some(server.url()),
        identity_issuer: Some(TEST_ISSUER.to_string()),
        identity_audience: Some(TEST_AUDIENCE.to_string()),
        rate_limit_capacity: 2,
        rate_limit_refill_tokens: 2,
        ..Config::default()
    };
    let clock: Arc<dyn Clock> = Arc::new(TestClock::new());
    let state = AppState::from_config(&config, clock).unwrap();
    let app = create_router(state, config.router_settings().unwrap());

    let token = keys.token().sign();
    let first = call(&app, get("/api/whoami", Some(&token))).await;
    let second = call(&app, get("/api/whoami", Some(&token))).await;
    let third = call(&app, get("/api/whoami", Some(&token))).await;

    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(second.header("x-ratelimit-remaining"), Some("0"));
    assert_eq!(third.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(third.header("retry-after"), Some("60"));
}

#[tokio::test]
async fn cors_preflight_is_answered_before_the_gate() {
    let config = Config {
        cors_allowed_origins: vec!["https://app.example".to_string()],
        rate_limit_capacity: 1,
        rate_limit_refill_tokens: 1,
        ..Config::default()
    };
    let clock: Arc<dyn Clock> = Arc::new(TestClock::new());
    let state = AppState::from_config(&config, clock).unwrap();
    let limiter = Arc::clone(state.rate_limit.limiter());
    let app = create_router(state, config.router_settings().unwrap());

    let preflight = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/whoami")
        .header("origin", "https://app.example")
        .header("access-control-request-method", "GET")
        .body(Body::empty())
        .unwrap();
    let response = call(&app, preflight).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("access-control-allow-origin"), Some("https://app.example"));
    assert_eq!(limiter.tracked_keys(), 0);
}

#[tokio::test]
async fn responses_carry_security_headers_even_when_rejected() {
    let clock: Arc<dyn Clock> = Arc::new(TestClock::new());
    let app = create_router(state(None, 1, clock), RouterSettings::default());

    let admitted = call(&app, get("/api/health", None)).await;
    let rejected = call(&app, get("/api/whoami", None)).await;

    for response in [&admitted, &rejected] {
        assert_eq!(response.header("x-content-type-options"), Some("nosniff"));
        assert_eq!(response.header("x-frame-options"), Some("DENY"));
        assert_eq!(
            response.header("strict-transport-security"),
            Some("max-age=31536000; includeSubDomains")
        );
        assert_eq!(response.header("referrer-policy"), Some("strict-origin-when-cross-origin"));
        assert_eq!(
            response.header("permissions-policy"),
            Some("geolocation=(), microphone=(), camera=()")
        );
    }
    assert_eq!(rejected.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn security_headers_can_be_disabled() {
    let config = Config { security_headers_enabled: false, ..Config::default() };
    let clock: Arc<dyn Clock> = Arc::new(TestClock::new());
    let state = AppState::from_config(&config, clock).unwrap();
    let app = create_router(state, config.router_settings().unwrap());

    let response = call(&app, get("/api/health", None)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.header("x-frame-options").is_none());
}

#[tokio::test]
async fn cross_origin_responses_expose_rate_limit_headers() {
    let config = Config {
        cors_allowed_origins: vec!["https://app.example".to_string()],
        rate_limit_capacity: 1,
        rate_limit_refill_tokens: 1,
        ..Config::default()
    };
    let clock: Arc<dyn Clock> = Arc::new(TestClock::new());
    let state = AppState::from_config(&config, clock).unwrap();
    let app = create_router(state, config.router_settings().unwrap());

    let request = || {
        Request::builder()
            .uri("/api/whoami")
            .header("origin", "https://app.example")
            .header("x-forwarded-for", "198.51.100.30")
            .body(Body::empty())
            .unwrap()
    };
    let admitted = call(&app, request()).await;
    let limited = call(&app, request()).await;

    assert_eq!(admitted.header("x-ratelimit-remaining"), Some("0"));
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    for response in [&admitted, &limited] {
        let exposed = response.header("access-control-expose-headers").unwrap().to_lowercase();
        for name in ["x-ratelimit-limit", "x-ratelimit-remaining", "retry-after"] {
            assert!(exposed.contains(name), "{name} missing from {exposed}");
        }
    }
}
