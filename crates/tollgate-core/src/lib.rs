//! Core domain types for the tollgate request gate.
//!
//! Holds the pieces every other crate agrees on: the authenticated
//! principal and its authorities, the rate-limit and authentication
//! policies, Ant-style path patterns, and the clock abstraction used to
//! keep refill arithmetic deterministic under test.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod path;
pub mod policy;
pub mod principal;
pub mod time;

pub use error::{PolicyError, Result};
pub use path::{PathPattern, PathSet};
pub use policy::{AuthPolicy, Bandwidth, KeyStrategy, RateLimitPolicy, DEFAULT_REFILL_INTERVAL};
pub use principal::{Authentication, Authority, Principal, Role, RoleError};
pub use time::{Clock, RealClock, TestClock};
