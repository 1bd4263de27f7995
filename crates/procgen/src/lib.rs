//! Procedural assets for Skyward: noise terrain and simple hand-built shapes.
//!
//! Everything here produces [`engine_core::GeometricMesh`] data, so the renderer
//! cannot tell a generated mesh from a loaded one.

pub mod loader;
pub mod shapes;
pub mod terrain;
pub mod textures;

pub use loader::*;
pub use shapes::*;
pub use terrain::*;
pub use textures::*;
