//! Downstream handler that records what reached it.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use axum::{extract::Request, Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tollgate_core::Authentication;

/// Router that answers every request with 200 and counts hits.
///
/// The response body echoes the authentication context, or `null` for
/// anonymous requests, so tests can see what the gate attached.
#[derive(Debug, Clone, Default)]
pub struct DownstreamSpy {
    hits: Arc<AtomicUsize>,
    last_subject: Arc<Mutex<Option<String>>>,
}

impl DownstreamSpy {
    /// Creates a spy with no recorded hits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Router to place behind the gate.
    pub fn router(&self) -> Router {
        let spy = self.clone();
        Router::new().fallback(move |req: Request| {
            let spy = spy.clone();
            async move { spy.record(&req) }
        })
    }

    /// Requests that reached the downstream handler.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Subject of the most recent authenticated request.
    pub fn last_subject(&self) -> Option<String> {
        self.last_subject.lock().clone()
    }

    fn record(&self, req: &Request) -> Json<Value> {
        self.hits.fetch_add(1, Ordering::SeqCst);

        let authentication = req.extensions().get::<Authentication>();
        *self.last_subject.lock() = authentication.map(|a| a.subject().to_string());

        Json(json!({ "path": req.uri().path(), "authentication": authentication }))
    }
}
