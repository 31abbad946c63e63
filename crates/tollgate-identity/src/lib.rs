//! Bearer token verification.
//!
//! The gate talks to its identity provider through the
//! [`IdentityVerifier`] trait. [`JwksVerifier`] is the production
//! implementation: it validates RS256 ID tokens against the provider's
//! published JSON Web Key Set.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod jwks;
pub mod verifier;

pub use error::{IdentityError, Result};
pub use jwks::{JwksConfig, JwksVerifier};
pub use verifier::IdentityVerifier;
