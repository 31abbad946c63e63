//! Test infrastructure for the tollgate request gate.
//!
//! Provides a fixed RSA key pair with a token builder, a wiremock-backed
//! JWKS endpoint, a scripted identity verifier, and an in-process harness
//! that drives the gate middleware against a recording downstream handler.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod gate;
pub mod jwks;
pub mod keys;
pub mod spy;
pub mod verifier;

pub use gate::{TestGate, TestGateBuilder, TestRequest, TestResponse};
pub use jwks::JwksServer;
pub use keys::{TestKeys, TokenBuilder, DEFAULT_KID, TEST_AUDIENCE, TEST_ISSUER};
pub use spy::DownstreamSpy;
pub use tollgate_core::TestClock;
pub use verifier::ScriptedVerifier;
