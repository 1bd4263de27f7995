//! Skyward scene renderer: GPU device seam, scene nodes, spotlight with shadow
//! map, camera rigs, craft kinematics and the three-pass frame pipeline.

pub mod camera;
pub mod collidable;
pub mod craft;
pub mod error;
pub mod gltf_loader;
pub mod gpu;
pub mod light;
pub mod node;
pub mod postprocess;
pub mod programs;
pub mod renderer;
pub mod settings;
pub mod shader;
pub mod visibility;

pub use camera::*;
pub use collidable::*;
pub use craft::*;
pub use error::*;
pub use gltf_loader::*;
pub use gpu::{GpuDevice, GpuError, HeadlessDevice, WgpuDevice};
pub use light::*;
pub use node::*;
pub use postprocess::*;
pub use programs::ProgramKind;
pub use renderer::*;
pub use settings::*;
pub use shader::*;
pub use visibility::*;
