//! Renderer-level errors.

use engine_core::LoadError;
use thiserror::Error;

use crate::gpu::GpuError;
use crate::node::NodeRole;
use crate::shader::ShaderError;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("asset '{name}' failed to load: {source}")]
    Asset {
        name: String,
        #[source]
        source: LoadError,
    },
    #[error("required node role {0:?} is not present")]
    MissingRole(NodeRole),
    #[error("framebuffer '{label}' is incomplete: {reason}")]
    IncompleteFramebuffer { label: String, reason: String },
    #[error("GPU errors after {stage}: {errors:?}")]
    GpuState { stage: String, errors: Vec<GpuError> },
    #[error("renderer used before init")]
    NotInitialized,
    #[error(transparent)]
    Shader(#[from] ShaderError),
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error(transparent)]
    Load(#[from] LoadError),
}

pub type RenderResult<T> = Result<T, RenderError>;
