//! Shader program service: load stage sources, build a program, set uniforms by name,
//! hot-reload.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use glam::{Mat4, Vec3};
use thiserror::Error;

use crate::gpu::{
    GpuDevice, GpuError, ProgramDesc, ProgramHandle, ShaderStage, TextureSlot, UniformDecl,
    UniformLocation, UniformValue,
};

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("failed to read shader {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("program '{0}' has no {1} shader source")]
    MissingStage(String, ShaderStage),
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

#[derive(Debug, Default, Clone)]
struct StageSource {
    path: Option<PathBuf>,
    source: Option<String>,
}

impl StageSource {
    fn read(path: &Path) -> Result<String, ShaderError> {
        std::fs::read_to_string(path).map_err(|source| ShaderError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Fresh source for a rebuild: re-read from disk when file backed.
    fn current(&self) -> Result<Option<String>, ShaderError> {
        match &self.path {
            Some(path) => Self::read(path).map(Some),
            None => Ok(self.source.clone()),
        }
    }
}

/// A vertex + fragment program with a declared uniform block and texture slots.
///
/// Uniform names resolve lazily and are cached per program build. Setting a name
/// the program does not declare logs a warning once and is otherwise ignored.
#[derive(Debug)]
pub struct ShaderProgram {
    label: String,
    vertex: StageSource,
    fragment: StageSource,
    uniforms: Vec<UniformDecl>,
    textures: Vec<TextureSlot>,
    program: Option<ProgramHandle>,
    locations: HashMap<String, UniformLocation>,
    /// Names requested through `load_uniform`, re-resolved after a reload.
    loaded: Vec<String>,
    warned: HashSet<String>,
}

impl ShaderProgram {
    pub fn new(label: &str, uniforms: Vec<UniformDecl>, textures: Vec<TextureSlot>) -> Self {
        Self {
            label: label.to_string(),
            vertex: StageSource::default(),
            fragment: StageSource::default(),
            uniforms,
            textures,
            program: None,
            locations: HashMap::new(),
            loaded: Vec::new(),
            warned: HashSet::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn handle(&self) -> Option<ProgramHandle> {
        self.program
    }

    pub fn is_created(&self) -> bool {
        self.program.is_some()
    }

    pub fn texture_slots(&self) -> &[TextureSlot] {
        &self.textures
    }

    pub fn load_vertex_shader_from_file(&mut self, path: impl AsRef<Path>) -> Result<(), ShaderError> {
        let path = path.as_ref();
        self.vertex = StageSource {
            source: Some(StageSource::read(path)?),
            path: Some(path.to_path_buf()),
        };
        Ok(())
    }

    pub fn load_fragment_shader_from_file(&mut self, path: impl AsRef<Path>) -> Result<(), ShaderError> {
        let path = path.as_ref();
        self.fragment = StageSource {
            source: Some(StageSource::read(path)?),
            path: Some(path.to_path_buf()),
        };
        Ok(())
    }

    /// In-memory vertex source; reloads rebuild from it.
    pub fn set_vertex_source(&mut self, source: &str) {
        self.vertex = StageSource {
            path: None,
            source: Some(source.to_string()),
        };
    }

    pub fn set_fragment_source(&mut self, source: &str) {
        self.fragment = StageSource {
            path: None,
            source: Some(source.to_string()),
        };
    }

    fn build(&self, device: &mut dyn GpuDevice, vertex: &str, fragment: &str) -> Result<ProgramHandle, ShaderError> {
        let handle = device.create_program(&ProgramDesc {
            label: &self.label,
            vertex_source: vertex,
            fragment_source: fragment,
            uniforms: &self.uniforms,
            textures: &self.textures,
        })?;
        Ok(handle)
    }

    /// Compile and link the loaded sources. Replaces any previous program.
    pub fn create_program(&mut self, device: &mut dyn GpuDevice) -> Result<(), ShaderError> {
        let vertex = self
            .vertex
            .source
            .clone()
            .ok_or_else(|| ShaderError::MissingStage(self.label.clone(), ShaderStage::Vertex))?;
        let fragment = self
            .fragment
            .source
            .clone()
            .ok_or_else(|| ShaderError::MissingStage(self.label.clone(), ShaderStage::Fragment))?;
        let handle = self.build(device, &vertex, &fragment)?;
        self.replace(device, handle);
        log::debug!("Created program '{}'", self.label);
        Ok(())
    }

    fn replace(&mut self, device: &mut dyn GpuDevice, handle: ProgramHandle) {
        if let Some(old) = self.program.replace(handle) {
            if device.bound_program() == Some(old) {
                device.use_program(None);
            }
            device.delete_program(old);
        }
        self.locations.clear();
        self.warned.clear();
        for name in self.loaded.clone() {
            self.resolve(device, &name);
        }
    }

    /// Rebuild from current sources (re-read from disk when file backed). On
    /// failure the previous program stays in place and the error is returned.
    pub fn reload_program(&mut self, device: &mut dyn GpuDevice) -> Result<(), ShaderError> {
        let vertex = self
            .vertex
            .current()?
            .ok_or_else(|| ShaderError::MissingStage(self.label.clone(), ShaderStage::Vertex))?;
        let fragment = self
            .fragment
            .current()?
            .ok_or_else(|| ShaderError::MissingStage(self.label.clone(), ShaderStage::Fragment))?;
        let handle = self.build(device, &vertex, &fragment)?;
        self.vertex.source = Some(vertex);
        self.fragment.source = Some(fragment);
        self.replace(device, handle);
        log::info!("Reloaded program '{}'", self.label);
        Ok(())
    }

    pub fn bind(&self, device: &mut dyn GpuDevice) {
        match self.program {
            Some(program) => device.use_program(Some(program)),
            None => log::warn!("Binding program '{}' before it was created", self.label),
        }
    }

    pub fn unbind(&self, device: &mut dyn GpuDevice) {
        device.use_program(None);
    }

    fn resolve(&mut self, device: &dyn GpuDevice, name: &str) -> Option<UniformLocation> {
        if let Some(location) = self.locations.get(name) {
            return Some(*location);
        }
        let location = device.uniform_location(self.program?, name)?;
        self.locations.insert(name.to_string(), location);
        Some(location)
    }

    /// Resolve `name` up front. Returns false (with a warning) when the program
    /// has no such uniform.
    pub fn load_uniform(&mut self, device: &dyn GpuDevice, name: &str) -> bool {
        if !self.loaded.iter().any(|n| n == name) {
            self.loaded.push(name.to_string());
        }
        if self.resolve(device, name).is_some() {
            return true;
        }
        log::warn!("Program '{}' has no uniform '{}'", self.label, name);
        false
    }

    pub fn location(&mut self, device: &dyn GpuDevice, name: &str) -> Option<UniformLocation> {
        let location = self.resolve(device, name);
        if location.is_none() && self.warned.insert(name.to_string()) {
            log::warn!("Ignoring unknown uniform '{}' on program '{}'", name, self.label);
        }
        location
    }

    pub fn set(&mut self, device: &mut dyn GpuDevice, name: &str, value: UniformValue) {
        if let Some(location) = self.location(device, name) {
            device.set_uniform(location, value);
        }
    }

    pub fn set_int(&mut self, device: &mut dyn GpuDevice, name: &str, value: i32) {
        self.set(device, name, UniformValue::Int(value));
    }

    pub fn set_float(&mut self, device: &mut dyn GpuDevice, name: &str, value: f32) {
        self.set(device, name, UniformValue::Float(value));
    }

    pub fn set_vec3(&mut self, device: &mut dyn GpuDevice, name: &str, value: Vec3) {
        self.set(device, name, UniformValue::Vec3(value));
    }

    pub fn set_mat4(&mut self, device: &mut dyn GpuDevice, name: &str, value: Mat4) {
        self.set(device, name, UniformValue::Mat4(value));
    }

    /// Delete the program. Safe to call more than once.
    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        if let Some(program) = self.program.take() {
            device.delete_program(program);
        }
        self.locations.clear();
    }
}
