//! Mock identity provider key endpoint.

use serde_json::Value;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::keys::TestKeys;

/// Path the key set is served under.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// JWKS endpoint backed by wiremock.
///
/// Responses mounted earlier take precedence, so a one-shot response
/// followed by a persistent one models a key rotation.
pub struct JwksServer {
    server: MockServer,
}

impl JwksServer {
    /// Starts an empty server on a random port. Unmatched requests get 404.
    pub async fn start() -> Self {
        Self { server: MockServer::start().await }
    }

    /// Starts a server publishing `keys`.
    pub async fn publishing(keys: &[&TestKeys]) -> Self {
        let server = Self::start().await;
        server.serve(TestKeys::jwks(keys)).await;
        server
    }

    /// Full URL of the key set.
    pub fn url(&self) -> String {
        format!("{}{JWKS_PATH}", self.server.uri())
    }

    /// Serves `jwks` on every request.
    pub async fn serve(&self, jwks: Value) {
        self.mount(ResponseTemplate::new(200).set_body_json(jwks), None).await;
    }

    /// Serves `jwks` for the next request only.
    pub async fn serve_once(&self, jwks: Value) {
        self.mount(ResponseTemplate::new(200).set_body_json(jwks), Some(1)).await;
    }

    /// Serves a raw body with status 200, for malformed documents.
    pub async fn serve_raw(&self, body: &str) {
        let template =
            ResponseTemplate::new(200).set_body_raw(body.to_string(), "application/json");
        self.mount(template, None).await;
    }

    /// Answers every request with `status`.
    pub async fn fail_with(&self, status: u16) {
        self.mount(ResponseTemplate::new(status), None).await;
    }

    /// Removes every mounted response and forgets received requests.
    pub async fn reset(&self) {
        self.server.reset().await;
    }

    /// Number of key set fetches received.
    pub async fn fetch_count(&self) -> usize {
        self.server.received_requests().await.map_or(0, |requests| requests.len())
    }

    async fn mount(&self, template: ResponseTemplate, times: Option<u64>) {
        let mock = Mock::given(method("GET")).and(path(JWKS_PATH)).respond_with(template);
        let mock = match times {
            Some(n) => mock.up_to_n_times(n),
            None => mock,
        };
        mock.mount(&self.server).await;
    }
}
