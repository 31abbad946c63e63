//! In-process gate harness.
//!
//! Builds the authentication and rate limit stages around a
//! [`DownstreamSpy`] and drives them with `tower::ServiceExt::oneshot`, so
//! tests exercise the real middleware without binding a socket.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tollgate_api::{server::gate, AppState};
use tollgate_core::{
    AuthPolicy, Bandwidth, Clock, KeyStrategy, PathSet, RateLimitPolicy, TestClock,
};
use tollgate_identity::IdentityVerifier;
use tollgate_limiter::RateLimiter;
use tower::ServiceExt;

use crate::spy::DownstreamSpy;

/// Gate under test together with its controllable collaborators.
pub struct TestGate {
    /// Gated router.
    pub app: Router,
    /// Shared state, for inspecting the limiter.
    pub state: AppState,
    /// Clock driving bucket refills.
    pub clock: TestClock,
    /// Downstream handler.
    pub spy: DownstreamSpy,
}

impl TestGate {
    /// Starts a builder with the default policies and no verifier.
    pub fn builder() -> TestGateBuilder {
        TestGateBuilder::default()
    }

    /// Sends a request through the gate.
    #[allow(clippy::expect_used)]
    pub async fn send(&self, request: TestRequest) -> TestResponse {
        let response =
            self.app.clone().oneshot(request.build()).await.expect("router is infallible");

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body must be readable");

        TestResponse { status, headers, body: body.to_vec() }
    }

    /// Advances the gate's clock.
    pub fn advance(&self, duration: Duration) {
        self.clock.advance(duration);
    }

    /// Number of buckets currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.state.rate_limit.limiter().tracked_keys()
    }
}

/// Configures a [`TestGate`].
#[derive(Debug)]
pub struct TestGateBuilder {
    bandwidth: Bandwidth,
    strategy: KeyStrategy,
    enabled: bool,
    excluded_paths: Option<Vec<String>>,
    public_paths: Option<Vec<String>>,
    require_email_verified: bool,
    verifier: Option<Arc<dyn IdentityVerifier>>,
    limiter: Option<Arc<RateLimiter>>,
    clock: TestClock,
}

impl Default for TestGateBuilder {
    fn default() -> Self {
        Self {
            bandwidth: Bandwidth::default(),
            strategy: KeyStrategy::Auto,
            enabled: true,
            excluded_paths: None,
            public_paths: None,
            require_email_verified: false,
            verifier: None,
            limiter: None,
            clock: TestClock::new(),
        }
    }
}

impl TestGateBuilder {
    /// Sets the bucket shape.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn bandwidth(mut self, capacity: u64, refill_tokens: u64, interval: Duration) -> Self {
        self.bandwidth =
            Bandwidth::new(capacity, refill_tokens, interval).expect("test bandwidth must be valid");
        self
    }

    /// Sets the key strategy.
    #[must_use]
    pub fn strategy(mut self, strategy: KeyStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Turns rate limiting on or off.
    #[must_use]
    pub fn rate_limit_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Replaces the paths exempt from rate limiting.
    #[must_use]
    pub fn excluded_paths(mut self, paths: &[&str]) -> Self {
        self.excluded_paths = Some(paths.iter().map(ToString::to_string).collect());
        self
    }

    /// Replaces the paths exempt from authentication.
    #[must_use]
    pub fn public_paths(mut self, paths: &[&str]) -> Self {
        self.public_paths = Some(paths.iter().map(ToString::to_string).collect());
        self
    }

    /// Sets whether verified email is required.
    #[must_use]
    pub fn require_email_verified(mut self, required: bool) -> Self {
        self.require_email_verified = required;
        self
    }

    /// Installs an identity verifier.
    #[must_use]
    pub fn verifier(mut self, verifier: Arc<dyn IdentityVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Uses an existing limiter instead of creating one from the bandwidth.
    #[must_use]
    pub fn limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Uses an existing clock.
    #[must_use]
    pub fn clock(mut self, clock: TestClock) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the gate around a fresh spy.
    #[allow(clippy::expect_used)]
    pub fn build(self) -> TestGate {
        let mut rate_limit = RateLimitPolicy::new(self.bandwidth).with_strategy(self.strategy);
        rate_limit.enabled = self.enabled;
        if let Some(paths) = self.excluded_paths {
            rate_limit = rate_limit
                .with_excluded_paths(PathSet::parse(paths).expect("excluded paths must parse"));
        }

        let mut auth = AuthPolicy {
            require_email_verified: self.require_email_verified,
            ..AuthPolicy::default()
        };
        if let Some(paths) = self.public_paths {
            auth.public_paths = PathSet::parse(paths).expect("public paths must parse");
        }

        let clock: Arc<dyn Clock> = Arc::new(self.clock.clone());
        let limiter = self
            .limiter
            .unwrap_or_else(|| Arc::new(RateLimiter::new(self.bandwidth, Arc::clone(&clock))));
        let state = AppState::with_limiter(auth, self.verifier, rate_limit, limiter, clock);
        let spy = DownstreamSpy::new();
        let app = gate(spy.router(), &state);

        TestGate { app, state, clock: self.clock, spy }
    }
}

/// Request sent through a [`TestGate`].
#[derive(Debug, Clone)]
pub struct TestRequest {
    method: Method,
    path: String,
    headers: Vec<(String, Vec<u8>)>,
    peer: Option<SocketAddr>,
}

impl TestRequest {
    /// GET request for `path`.
    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    /// Request with an arbitrary method.
    pub fn new(method: Method, path: &str) -> Self {
        Self { method, path: path.to_string(), headers: Vec::new(), peer: None }
    }

    /// Adds `Authorization: Bearer <token>`.
    #[must_use]
    pub fn bearer(self, token: &str) -> Self {
        self.header("authorization", &format!("Bearer {token}"))
    }

    /// Adds `X-Forwarded-For`.
    #[must_use]
    pub fn forwarded_for(self, value: &str) -> Self {
        self.header("x-forwarded-for", value)
    }

    /// Adds a header.
    #[must_use]
    pub fn header(self, name: &str, value: &str) -> Self {
        self.header_bytes(name, value.as_bytes())
    }

    /// Adds a header from raw bytes, which need not be visible ASCII.
    #[must_use]
    pub fn header_bytes(mut self, name: &str, value: &[u8]) -> Self {
        self.headers.push((name.to_string(), value.to_vec()));
        self
    }

    /// Records the peer address as the server would.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn peer(mut self, addr: &str) -> Self {
        self.peer = Some(addr.parse().expect("peer must be a socket address"));
        self
    }

    #[allow(clippy::expect_used)]
    fn build(self) -> Request<Body> {
        let mut builder = Request::builder().method(self.method).uri(self.path);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_slice());
        }

        let mut request = builder.body(Body::empty()).expect("test request must be valid");
        if let Some(addr) = self.peer {
            request.extensions_mut().insert(ConnectInfo(addr));
        }
        request
    }
}

/// Buffered response from a [`TestGate`].
#[derive(Debug, Clone)]
pub struct TestResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    body: Vec<u8>,
}

impl TestResponse {
    /// Header value as a string, if present and ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Header value parsed as an integer.
    pub fn header_u64(&self, name: &str) -> Option<u64> {
        self.header(name).and_then(|v| v.parse().ok())
    }

    /// Body parsed as JSON.
    #[allow(clippy::expect_used)]
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body must be JSON")
    }
}
