//! Built-in endpoints served behind the gate.
//!
//! - `health` - liveness and component status, public by default
//! - `whoami` - echoes the authenticated principal

pub mod health;
pub mod whoami;

pub use health::health_check;
pub use whoami::whoami;
