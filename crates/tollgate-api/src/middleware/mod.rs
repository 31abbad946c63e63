//! Gate stages and supporting request middleware.
//!
//! The authentication stage must run before the rate limit stage so the
//! limiter can key on the authenticated subject.

pub mod auth;
pub mod client_ip;
pub mod rate_limit;
pub mod request_id;

pub use auth::{auth_middleware, AuthGate};
pub use rate_limit::{rate_limit_middleware, RateLimitGate};
pub use request_id::{inject_request_id, RequestId};
