//! The mesh loader contract: what any loader (file or procedural) hands to the renderer.
//!
//! Vertices are non-indexed triangle lists. Each [`MeshObject`] is a contiguous
//! `start..end` range of that list drawn with one material.

use glam::{Vec2, Vec3};
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while turning a [`MeshSource`] into a [`GeometricMesh`].
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("mesh file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("unsupported mesh: {0}")]
    Unsupported(String),
    #[error("invalid mesh data: {0}")]
    Invalid(String),
}

/// RGBA8 pixels referenced by materials.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl ImageData {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        Self { width, height, rgba }
    }

    /// 1x1 image of a single color.
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self::new(1, 1, rgba.to_vec())
    }

    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.rgba.len() == (self.width * self.height * 4) as usize
    }
}

/// Material description as authored. Texture fields index into [`GeometricMesh::images`].
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialDesc {
    pub name: String,
    pub diffuse: Vec3,
    pub ambient: Vec3,
    pub specular: Vec3,
    pub shininess: f32,
    pub diffuse_texture: Option<usize>,
    pub normal_texture: Option<usize>,
    pub bump_texture: Option<usize>,
}

impl Default for MaterialDesc {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            diffuse: Vec3::splat(0.8),
            ambient: Vec3::splat(0.1),
            specular: Vec3::splat(0.2),
            shininess: 32.0,
            diffuse_texture: None,
            normal_texture: None,
            bump_texture: None,
        }
    }
}

impl MaterialDesc {
    /// Flat colored material with default lighting terms.
    pub fn flat(name: &str, diffuse: Vec3) -> Self {
        Self {
            name: name.to_string(),
            diffuse,
            ambient: diffuse * 0.15,
            ..Default::default()
        }
    }
}

/// A contiguous vertex range sharing one material.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshObject {
    pub start: u32,
    pub end: u32,
    pub material: MaterialDesc,
}

impl MeshObject {
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Flat, non-indexed mesh data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometricMesh {
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    /// May be empty; the renderer substitutes zeros.
    pub texcoords: Vec<Vec2>,
    pub objects: Vec<MeshObject>,
    pub images: Vec<ImageData>,
}

impl GeometricMesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Check the invariants the renderer relies on.
    pub fn validate(&self) -> Result<(), LoadError> {
        let n = self.vertices.len();
        if n == 0 {
            return Err(LoadError::Invalid("mesh has no vertices".into()));
        }
        if self.normals.len() != n {
            return Err(LoadError::Invalid(format!(
                "{} normals for {} vertices",
                self.normals.len(),
                n
            )));
        }
        if !self.texcoords.is_empty() && self.texcoords.len() != n {
            return Err(LoadError::Invalid(format!(
                "{} texcoords for {} vertices",
                self.texcoords.len(),
                n
            )));
        }
        for object in &self.objects {
            if object.start > object.end || object.end as usize > n {
                return Err(LoadError::Invalid(format!(
                    "object '{}' range {}..{} exceeds {} vertices",
                    object.material.name, object.start, object.end, n
                )));
            }
            let textures = [
                object.material.diffuse_texture,
                object.material.normal_texture,
                object.material.bump_texture,
            ];
            if textures.iter().flatten().any(|&i| i >= self.images.len()) {
                return Err(LoadError::Invalid(format!(
                    "object '{}' references a missing image",
                    object.material.name
                )));
            }
        }
        Ok(())
    }

    /// Append another mesh, shifting its object ranges and image indices.
    pub fn append(&mut self, mut other: GeometricMesh) {
        let vertex_base = self.vertices.len() as u32;
        let image_base = self.images.len();
        let had_texcoords = !self.texcoords.is_empty() || self.vertices.is_empty();

        if had_texcoords && !other.texcoords.is_empty() {
            self.texcoords.append(&mut other.texcoords);
        } else if !self.texcoords.is_empty() {
            self.texcoords
                .extend(std::iter::repeat(Vec2::ZERO).take(other.vertices.len()));
        } else if !other.texcoords.is_empty() {
            self.texcoords = std::iter::repeat(Vec2::ZERO)
                .take(self.vertices.len())
                .chain(other.texcoords)
                .collect();
        }

        self.vertices.append(&mut other.vertices);
        self.normals.append(&mut other.normals);
        self.images.append(&mut other.images);
        for mut object in other.objects {
            object.start += vertex_base;
            object.end += vertex_base;
            let shift = |slot: &mut Option<usize>| {
                if let Some(i) = slot {
                    *i += image_base;
                }
            };
            shift(&mut object.material.diffuse_texture);
            shift(&mut object.material.normal_texture);
            shift(&mut object.material.bump_texture);
            self.objects.push(object);
        }
    }
}

/// Built-in procedural meshes.
#[derive(Debug, Clone, PartialEq)]
pub enum ProceduralMesh {
    /// Noise heightfield centered on the origin.
    Terrain {
        size: f32,
        resolution: u32,
        height_scale: f32,
        seed: u64,
    },
    /// Small dart-shaped craft pointing along +Z.
    Craft { length: f32 },
    /// Box obstacle.
    Hull { half_extents: Vec3 },
}

/// Where a mesh comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshSource {
    File(PathBuf),
    Procedural(ProceduralMesh),
}

impl std::fmt::Display for MeshSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MeshSource::File(path) => write!(f, "{}", path.display()),
            MeshSource::Procedural(kind) => write!(f, "procedural {:?}", kind),
        }
    }
}

/// Turns a [`MeshSource`] into mesh data.
pub trait MeshLoader {
    fn load(&self, source: &MeshSource) -> Result<GeometricMesh, LoadError>;
}
