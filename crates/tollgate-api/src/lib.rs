//! Tollgate HTTP gate.
//!
//! Two middleware stages sit in front of any downstream router:
//!
//! 1. [`middleware::auth`] verifies bearer tokens and attaches an
//!    [`Authentication`](tollgate_core::Authentication) to the request.
//! 2. [`middleware::rate_limit`] charges one token per request against a
//!    bucket keyed by the authenticated subject or the client address.
//!
//! [`server::gate`] wraps an arbitrary router with both stages in that
//! order; [`server::create_router`] builds the standalone service.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod rejection;
pub mod server;
pub mod state;

pub use config::Config;
pub use extract::Authenticated;
pub use rejection::GateRejection;
pub use server::{create_router, gate, start_server};
pub use state::AppState;
