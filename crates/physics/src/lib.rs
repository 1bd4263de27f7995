//! Collision queries for Skyward.
//!
//! Static geometry only: there is no simulation, just ray tests against
//! triangle sets built with Rapier's shape library.

pub mod raycast;

pub use raycast::*;

// Re-export Rapier for downstream crates
pub use rapier3d;
