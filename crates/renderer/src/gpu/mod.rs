//! GL-shaped device seam.
//!
//! The renderer drives a stateful, handle-based device: bind a framebuffer, set a
//! viewport, clear, use a program, set uniforms, bind textures to units, draw.
//! [`WgpuDevice`] records that state into wgpu render passes; [`HeadlessDevice`]
//! validates it like a driver would and records what happened.
//!
//! Handles are `NonZeroU32` newtypes and "unallocated" is `None`, so a zero
//! handle can never be mistaken for a live object.

mod headless;
mod wgpu_device;

pub use headless::*;
pub use wgpu_device::*;

use glam::{Mat4, Vec3};
use std::num::NonZeroU32;
use thiserror::Error;

macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(NonZeroU32);

        impl $name {
            /// `None` for 0, the reserved "no object" name.
            pub fn new(raw: u32) -> Option<Self> {
                NonZeroU32::new(raw).map(Self)
            }

            pub fn raw(self) -> u32 {
                self.0.get()
            }
        }
    };
}

gpu_handle!(
    /// A set of vertex streams drawn together.
    VertexArrayHandle
);
gpu_handle!(
    /// A 2D texture, color or depth.
    TextureHandle
);
gpu_handle!(
    /// An offscreen render target. The default framebuffer has no handle.
    FramebufferHandle
);
gpu_handle!(
    /// A linked vertex + fragment program.
    ProgramHandle
);

/// Hands out increasing object names, skipping 0.
#[derive(Debug, Default)]
pub(crate) struct NameAllocator {
    last: u32,
}

impl NameAllocator {
    pub(crate) fn next(&mut self) -> NonZeroU32 {
        self.last = self.last.checked_add(1).unwrap_or(1);
        NonZeroU32::new(self.last).unwrap_or(NonZeroU32::MIN)
    }
}

/// Errors raised by device operations, and reported later by [`GpuDevice::take_error`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GpuError {
    #[error("invalid enum: {0}")]
    InvalidEnum(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("invalid framebuffer operation: {0}")]
    IncompleteFramebuffer(String),
    #[error("{stage} shader failed to compile: {message}")]
    ShaderCompile { stage: ShaderStage, message: String },
    #[error("program link failed: {0}")]
    Link(String),
    #[error("out of memory: {0}")]
    OutOfMemory(String),
    #[error("device error: {0}")]
    Device(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

/// Texel formats the renderer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit RGBA, loaded images.
    Rgba8,
    /// Half-float RGBA, the offscreen scene color.
    Rgba16Float,
    /// 32-bit float depth.
    Depth32,
}

impl TextureFormat {
    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth32)
    }

    pub fn bytes_per_texel(self) -> u32 {
        match self {
            TextureFormat::Rgba8 | TextureFormat::Depth32 => 4,
            TextureFormat::Rgba16Float => 8,
        }
    }

    pub(crate) fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            TextureFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::Depth32 => wgpu::TextureFormat::Depth32Float,
        }
    }
}

/// Storage definition for a texture. Redefining keeps the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// Largest texture edge either backend accepts.
pub const MAX_TEXTURE_SIZE: u32 = 8192;

impl TextureDesc {
    pub fn new(width: u32, height: u32, format: TextureFormat) -> Self {
        Self { width, height, format }
    }

    pub fn byte_len(&self) -> usize {
        (self.width * self.height * self.format.bytes_per_texel()) as usize
    }

    /// Size and pixel-length checks shared by both backends.
    pub(crate) fn validate(&self, pixels: Option<&[u8]>) -> Result<(), GpuError> {
        if self.width == 0 || self.height == 0 {
            return Err(GpuError::InvalidValue(format!(
                "texture size {}x{}",
                self.width, self.height
            )));
        }
        if self.width > MAX_TEXTURE_SIZE || self.height > MAX_TEXTURE_SIZE {
            return Err(GpuError::InvalidValue(format!(
                "texture size {}x{} exceeds {}",
                self.width, self.height, MAX_TEXTURE_SIZE
            )));
        }
        if let Some(pixels) = pixels {
            if self.format.is_depth() {
                return Err(GpuError::InvalidOperation("depth textures cannot be uploaded".into()));
            }
            if pixels.len() != self.byte_len() {
                return Err(GpuError::InvalidValue(format!(
                    "{} bytes for a {}x{} {:?} texture",
                    pixels.len(),
                    self.width,
                    self.height,
                    self.format
                )));
            }
        }
        Ok(())
    }
}

/// One float vertex attribute stream (non-interleaved).
#[derive(Debug, Clone, Copy)]
pub struct VertexStream<'a> {
    pub location: u32,
    /// 2, 3 or 4.
    pub components: u32,
    pub data: &'a [f32],
}

impl VertexStream<'_> {
    pub fn vertex_count(&self) -> u32 {
        self.data.len() as u32 / self.components.max(1)
    }
}

/// Checks shared by both backends; returns the vertex count.
pub(crate) fn validate_streams(streams: &[VertexStream]) -> Result<u32, GpuError> {
    let first = streams
        .first()
        .ok_or_else(|| GpuError::InvalidValue("vertex array with no streams".into()))?;
    let count = first.vertex_count();
    for stream in streams {
        if !(2..=4).contains(&stream.components) {
            return Err(GpuError::InvalidEnum(format!(
                "{} components at location {}",
                stream.components, stream.location
            )));
        }
        if stream.data.len() % stream.components as usize != 0 || stream.vertex_count() != count {
            return Err(GpuError::InvalidValue(format!(
                "stream at location {} has {} floats, expected {} vertices of {}",
                stream.location,
                stream.data.len(),
                count,
                stream.components
            )));
        }
    }
    let mut locations: Vec<u32> = streams.iter().map(|s| s.location).collect();
    locations.sort_unstable();
    locations.dedup();
    if locations.len() != streams.len() {
        return Err(GpuError::InvalidValue("duplicate stream location".into()));
    }
    Ok(count)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attachment {
    Color,
    Depth,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    Incomplete(String),
}

impl FramebufferStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, FramebufferStatus::Complete)
    }
}

/// Completeness rules shared by both backends: at least one attachment, the
/// right kind of texture in each slot, matching sizes.
pub(crate) fn framebuffer_status(
    color: Option<TextureDesc>,
    depth: Option<TextureDesc>,
) -> FramebufferStatus {
    match (color, depth) {
        (None, None) => FramebufferStatus::Incomplete("no attachments".into()),
        (Some(c), _) if c.format.is_depth() => {
            FramebufferStatus::Incomplete("depth format in color attachment".into())
        }
        (_, Some(d)) if !d.format.is_depth() => {
            FramebufferStatus::Incomplete("color format in depth attachment".into())
        }
        (Some(c), Some(d)) if (c.width, c.height) != (d.width, d.height) => {
            FramebufferStatus::Incomplete(format!(
                "attachment sizes differ: {}x{} vs {}x{}",
                c.width, c.height, d.width, d.height
            ))
        }
        _ => FramebufferStatus::Complete,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthFunc {
    #[default]
    Less,
    LessEqual,
    Always,
}

impl DepthFunc {
    pub(crate) fn to_wgpu(self) -> wgpu::CompareFunction {
        match self {
            DepthFunc::Less => wgpu::CompareFunction::Less,
            DepthFunc::LessEqual => wgpu::CompareFunction::LessEqual,
            DepthFunc::Always => wgpu::CompareFunction::Always,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    None,
    Back,
    Front,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    Triangles,
    TriangleStrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Int,
    Float,
    Vec3,
    Mat4,
}

impl UniformKind {
    /// (align, size) in the WGSL uniform address space.
    fn align_size(self) -> (u32, u32) {
        match self {
            UniformKind::Int | UniformKind::Float => (4, 4),
            UniformKind::Vec3 => (16, 12),
            UniformKind::Mat4 => (16, 64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec3(Vec3),
    Mat4(Mat4),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Int(_) => UniformKind::Int,
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Mat4(_) => UniformKind::Mat4,
        }
    }

    fn write_bytes(&self, out: &mut [u8]) {
        match self {
            UniformValue::Int(v) => out[..4].copy_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Float(v) => out[..4].copy_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Vec3(v) => out[..12].copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            UniformValue::Mat4(m) => {
                out[..64].copy_from_slice(bytemuck::cast_slice(&m.to_cols_array()))
            }
        }
    }
}

/// A named uniform in a program's uniform block. The WGSL struct lists the same
/// members in the same order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: String,
    pub kind: UniformKind,
}

impl UniformDecl {
    pub fn new(name: &str, kind: UniformKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

/// What a sampled texture slot expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    /// Filterable float texture (`texture_2d<f32>`).
    Color,
    /// Depth texture read with `textureSampleLevel` (`texture_depth_2d`).
    Depth,
}

/// A sampled texture bound to a fixed unit. In WGSL, unit `n` is
/// `@group(1) @binding(2n)` with its sampler at `@binding(2n + 1)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureSlot {
    pub name: String,
    pub unit: u32,
    pub kind: SlotKind,
}

impl TextureSlot {
    pub fn new(name: &str, unit: u32, kind: SlotKind) -> Self {
        Self {
            name: name.to_string(),
            unit,
            kind,
        }
    }
}

/// Everything needed to build a program. Entry points are `vs_main` and `fs_main`.
#[derive(Debug, Clone, Copy)]
pub struct ProgramDesc<'a> {
    pub label: &'a str,
    pub vertex_source: &'a str,
    pub fragment_source: &'a str,
    pub uniforms: &'a [UniformDecl],
    pub textures: &'a [TextureSlot],
}

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

/// Texture units available for sampling.
pub const MAX_TEXTURE_UNITS: u32 = 16;

/// Front-end check run before a backend compiles a stage: the entry point must
/// exist and braces must balance.
pub(crate) fn check_entry_point(source: &str, stage: ShaderStage) -> Result<(), GpuError> {
    let (attribute, entry) = match stage {
        ShaderStage::Vertex => ("@vertex", VERTEX_ENTRY),
        ShaderStage::Fragment => ("@fragment", FRAGMENT_ENTRY),
    };
    if !source.contains(attribute) || !source.contains(&format!("fn {}", entry)) {
        return Err(GpuError::ShaderCompile {
            stage,
            message: format!("missing {} entry point '{}'", attribute, entry),
        });
    }
    let opens = source.matches('{').count();
    let closes = source.matches('}').count();
    if opens != closes {
        return Err(GpuError::ShaderCompile {
            stage,
            message: format!("unbalanced braces ({} open, {} close)", opens, closes),
        });
    }
    Ok(())
}

/// Every sampler gets its own unit, below [`MAX_TEXTURE_UNITS`].
pub(crate) fn check_texture_units(desc: &ProgramDesc) -> Result<(), GpuError> {
    let mut units: Vec<u32> = desc.textures.iter().map(|slot| slot.unit).collect();
    units.sort_unstable();
    units.dedup();
    if units.len() != desc.textures.len() {
        return Err(GpuError::Link(format!("'{}' assigns one unit to two samplers", desc.label)));
    }
    if units.iter().any(|unit| *unit >= MAX_TEXTURE_UNITS) {
        return Err(GpuError::Link(format!(
            "'{}' uses a texture unit past {}",
            desc.label, MAX_TEXTURE_UNITS
        )));
    }
    Ok(())
}

/// A resolved uniform: which program, which member of its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation {
    pub program: ProgramHandle,
    pub(crate) index: u32,
}

/// Byte offsets of a program's uniform block, following WGSL uniform layout rules.
#[derive(Debug, Clone)]
pub struct UniformLayout {
    entries: Vec<(UniformDecl, u32)>,
    size: u32,
}

fn round_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

impl UniformLayout {
    pub fn new(decls: &[UniformDecl]) -> Self {
        let mut offset = 0;
        let mut entries = Vec::with_capacity(decls.len());
        for decl in decls {
            let (align, size) = decl.kind.align_size();
            offset = round_up(offset, align);
            entries.push((decl.clone(), offset));
            offset += size;
        }
        Self {
            entries,
            // Uniform blocks are always a multiple of 16 bytes, and never empty.
            size: round_up(offset.max(16), 16),
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn index_of(&self, name: &str) -> Option<u32> {
        self.entries
            .iter()
            .position(|(decl, _)| decl.name == name)
            .map(|i| i as u32)
    }

    pub fn offset_of(&self, name: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|(decl, _)| decl.name == name)
            .map(|(_, offset)| *offset)
    }

    pub fn decl(&self, index: u32) -> Option<&UniformDecl> {
        self.entries.get(index as usize).map(|(decl, _)| decl)
    }

    /// Write `value` into `block` at member `index`, checking its type.
    pub fn write(&self, block: &mut [u8], index: u32, value: UniformValue) -> Result<(), GpuError> {
        let (decl, offset) = self
            .entries
            .get(index as usize)
            .ok_or_else(|| GpuError::InvalidOperation(format!("uniform index {} out of range", index)))?;
        if decl.kind != value.kind() {
            return Err(GpuError::InvalidOperation(format!(
                "uniform '{}' is {:?}, got {:?}",
                decl.name,
                decl.kind,
                value.kind()
            )));
        }
        value.write_bytes(&mut block[*offset as usize..]);
        Ok(())
    }
}

/// The device seam. Mirrors the GL object/state model the renderer is written against.
///
/// Operations that would raise a GL error return it directly when they create
/// something (`create_*`, `define_texture`, `attach_texture`); state-changing and
/// draw calls queue it for [`take_error`](GpuDevice::take_error) instead.
pub trait GpuDevice {
    fn create_vertex_array(
        &mut self,
        label: &str,
        streams: &[VertexStream],
    ) -> Result<VertexArrayHandle, GpuError>;
    fn delete_vertex_array(&mut self, vertex_array: VertexArrayHandle);

    /// Allocate a texture name with no storage yet.
    fn create_texture(&mut self, label: &str) -> TextureHandle;
    /// (Re)define storage, optionally uploading RGBA8 pixels.
    fn define_texture(
        &mut self,
        texture: TextureHandle,
        desc: TextureDesc,
        pixels: Option<&[u8]>,
    ) -> Result<(), GpuError>;
    fn texture_desc(&self, texture: TextureHandle) -> Option<TextureDesc>;
    fn delete_texture(&mut self, texture: TextureHandle);

    fn create_framebuffer(&mut self, label: &str) -> FramebufferHandle;
    fn attach_texture(
        &mut self,
        framebuffer: FramebufferHandle,
        attachment: Attachment,
        texture: TextureHandle,
    ) -> Result<(), GpuError>;
    fn framebuffer_status(&self, framebuffer: FramebufferHandle) -> FramebufferStatus;
    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle);

    fn create_program(&mut self, desc: &ProgramDesc) -> Result<ProgramHandle, GpuError>;
    fn delete_program(&mut self, program: ProgramHandle);
    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;

    /// `None` binds the default framebuffer (the window).
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>);
    fn bound_framebuffer(&self) -> Option<FramebufferHandle>;
    fn viewport(&mut self, width: u32, height: u32);
    fn set_depth_test(&mut self, enabled: bool);
    fn depth_test_enabled(&self) -> bool;
    fn depth_func(&mut self, func: DepthFunc);
    fn cull_face(&mut self, mode: CullMode);
    fn clear(&mut self, color: Option<[f32; 4]>, depth: Option<f32>);

    fn use_program(&mut self, program: Option<ProgramHandle>);
    fn bound_program(&self) -> Option<ProgramHandle>;
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue);
    /// `None` unbinds the unit; the shader sees a placeholder it must not rely on.
    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>);
    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayHandle>);
    fn draw_arrays(&mut self, topology: Topology, first: u32, count: u32);

    /// Oldest pending error, like `glGetError`.
    fn take_error(&mut self) -> Option<GpuError>;
    fn resize_surface(&mut self, width: u32, height: u32);
    fn surface_size(&self) -> (u32, u32);
    /// Submit and present everything recorded since the last call.
    fn finish_frame(&mut self) -> Result<(), GpuError>;
}

/// Drain every pending error.
pub fn drain_errors(device: &mut dyn GpuDevice) -> Vec<GpuError> {
    std::iter::from_fn(|| device.take_error()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_not_a_handle() {
        assert!(TextureHandle::new(0).is_none());
        assert_eq!(TextureHandle::new(7).map(|h| h.raw()), Some(7));
    }

    #[test]
    fn names_start_at_one() {
        let mut names = NameAllocator::default();
        assert_eq!(names.next().get(), 1);
        assert_eq!(names.next().get(), 2);
    }

    #[test]
    fn uniform_layout_follows_wgsl_rules() {
        let layout = UniformLayout::new(&[
            UniformDecl::new("m", UniformKind::Mat4),
            UniformDecl::new("color", UniformKind::Vec3),
            UniformDecl::new("exponent", UniformKind::Float),
            UniformDecl::new("dir", UniformKind::Vec3),
            UniformDecl::new("flag", UniformKind::Int),
            UniformDecl::new("scale", UniformKind::Float),
        ]);
        assert_eq!(layout.offset_of("m"), Some(0));
        assert_eq!(layout.offset_of("color"), Some(64));
        // A scalar packs into the vec3's trailing 4 bytes.
        assert_eq!(layout.offset_of("exponent"), Some(76));
        assert_eq!(layout.offset_of("dir"), Some(80));
        assert_eq!(layout.offset_of("flag"), Some(92));
        assert_eq!(layout.offset_of("scale"), Some(96));
        assert_eq!(layout.size(), 112);
    }

    #[test]
    fn uniform_write_checks_kind() {
        let layout = UniformLayout::new(&[UniformDecl::new("flag", UniformKind::Int)]);
        let mut block = vec![0u8; layout.size() as usize];
        assert!(layout.write(&mut block, 0, UniformValue::Float(1.0)).is_err());
        layout.write(&mut block, 0, UniformValue::Int(1)).unwrap();
        assert_eq!(&block[..4], &1i32.to_ne_bytes());
    }

    #[test]
    fn streams_must_agree_on_vertex_count() {
        let positions = [0.0; 9];
        let texcoords = [0.0; 4];
        let result = validate_streams(&[
            VertexStream { location: 0, components: 3, data: &positions },
            VertexStream { location: 2, components: 2, data: &texcoords },
        ]);
        assert!(matches!(result, Err(GpuError::InvalidValue(_))));
    }

    #[test]
    fn framebuffer_completeness() {
        let color = TextureDesc::new(4, 4, TextureFormat::Rgba16Float);
        let depth = TextureDesc::new(4, 4, TextureFormat::Depth32);
        assert!(framebuffer_status(Some(color), Some(depth)).is_complete());
        assert!(framebuffer_status(None, Some(depth)).is_complete());
        assert!(!framebuffer_status(None, None).is_complete());
        assert!(!framebuffer_status(Some(depth), None).is_complete());
        let small = TextureDesc::new(2, 2, TextureFormat::Depth32);
        assert!(!framebuffer_status(Some(color), Some(small)).is_complete());
    }
}
