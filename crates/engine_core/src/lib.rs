//! Core engine types and utilities for Skyward.
//!
//! This crate provides the foundational types used across all engine systems:
//! - Axis-aligned bounds and matrix helpers
//! - Frame time management
//! - Movement toggles
//! - The mesh loader contract (what a loader hands to the renderer)

pub mod bounds;
pub mod controls;
pub mod mesh;
pub mod time;
pub mod transform;

pub use bounds::*;
pub use controls::*;
pub use mesh::*;
pub use time::*;
pub use transform::*;

// Re-export commonly used types
pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
