//! Drawable scene nodes.
//!
//! A node owns its GPU vertex array and textures, a list of parts (vertex ranges
//! drawn with one material), its local AABB, and two transforms: `model_matrix`
//! written by simulation and `app_model_matrix` derived from it once per update.

use engine_core::{about_pivot, Aabb, GeometricMesh, Mat4, MaterialDesc, Vec2, Vec3};

use crate::error::RenderResult;
use crate::gpu::{
    GpuDevice, TextureDesc, TextureFormat, TextureHandle, VertexArrayHandle, VertexStream,
};

/// Shader attribute locations.
pub const POSITION_LOCATION: u32 = 0;
pub const NORMAL_LOCATION: u32 = 1;
pub const TEXCOORD_LOCATION: u32 = 2;

/// What a node is in the scene. Nodes are found by role, not by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeRole {
    Terrain,
    Craft,
    Hull,
}

/// Lighting terms of a part.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub diffuse: Vec3,
    pub ambient: Vec3,
    pub specular: Vec3,
    pub shininess: f32,
}

impl From<&MaterialDesc> for Material {
    fn from(desc: &MaterialDesc) -> Self {
        Self {
            diffuse: desc.diffuse,
            ambient: desc.ambient,
            specular: desc.specular,
            shininess: desc.shininess,
        }
    }
}

/// A contiguous vertex range with one material.
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub name: String,
    pub start_offset: u32,
    pub count: u32,
    pub material: Material,
    pub diffuse_texture: Option<TextureHandle>,
    pub normal_texture: Option<TextureHandle>,
    pub bump_texture: Option<TextureHandle>,
}

impl Part {
    /// Texture for the surface-detail unit and whether it is a bump map.
    /// A bump map wins over a normal map.
    pub fn detail_texture(&self) -> Option<(TextureHandle, bool)> {
        self.bump_texture
            .map(|t| (t, true))
            .or(self.normal_texture.map(|t| (t, false)))
    }
}

/// Per-frame derivation of `app_model_matrix` from `model_matrix`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum NodeAnimation {
    #[default]
    Identity,
    /// Spin about the AABB center, `rate` radians per second of scene time.
    Spin { axis: Vec3, rate: f32 },
}

impl NodeAnimation {
    pub fn apply(&self, model: Mat4, pivot: Vec3, time: f32) -> Mat4 {
        match *self {
            NodeAnimation::Identity => model,
            NodeAnimation::Spin { axis, rate } => {
                let axis = axis.normalize_or_zero();
                if axis == Vec3::ZERO {
                    return model;
                }
                about_pivot(pivot, Mat4::from_axis_angle(axis, rate * time)) * model
            }
        }
    }
}

/// GPU-resident mesh with transforms.
#[derive(Debug)]
pub struct GeometryNode {
    label: String,
    pub model_matrix: Mat4,
    pub app_model_matrix: Mat4,
    pub aabb: Aabb,
    pub animation: NodeAnimation,
    parts: Vec<Part>,
    vertex_array: Option<VertexArrayHandle>,
    textures: Vec<TextureHandle>,
    vertex_count: u32,
}

impl GeometryNode {
    /// Upload `mesh` and build the part list and bounds.
    ///
    /// On failure everything allocated so far is released before returning.
    pub fn init(device: &mut dyn GpuDevice, label: &str, mesh: &GeometricMesh) -> RenderResult<Self> {
        mesh.validate()?;

        let mut node = Self {
            label: label.to_string(),
            model_matrix: Mat4::IDENTITY,
            app_model_matrix: Mat4::IDENTITY,
            aabb: Aabb::from_points(mesh.vertices.iter()),
            animation: NodeAnimation::Identity,
            parts: Vec::with_capacity(mesh.objects.len().max(1)),
            vertex_array: None,
            textures: Vec::with_capacity(mesh.images.len()),
            vertex_count: mesh.vertices.len() as u32,
        };
        if let Err(error) = node.upload(device, mesh) {
            node.release(device);
            return Err(error);
        }

        if mesh.objects.is_empty() {
            node.parts.push(Part {
                name: label.to_string(),
                start_offset: 0,
                count: node.vertex_count,
                material: Material::from(&MaterialDesc::default()),
                diffuse_texture: None,
                normal_texture: None,
                bump_texture: None,
            });
        }
        for object in &mesh.objects {
            let texture = |index: Option<usize>| index.and_then(|i| node.textures.get(i).copied());
            let part = Part {
                name: object.material.name.clone(),
                start_offset: object.start,
                count: object.end - object.start,
                material: Material::from(&object.material),
                diffuse_texture: texture(object.material.diffuse_texture),
                normal_texture: texture(object.material.normal_texture),
                bump_texture: texture(object.material.bump_texture),
            };
            node.parts.push(part);
        }

        log::debug!(
            "Node '{}': {} vertices, {} parts, {} textures",
            node.label,
            node.vertex_count,
            node.parts.len(),
            node.textures.len()
        );
        Ok(node)
    }

    fn upload(&mut self, device: &mut dyn GpuDevice, mesh: &GeometricMesh) -> RenderResult<()> {
        let positions: Vec<f32> = mesh.vertices.iter().flat_map(|v| v.to_array()).collect();
        let normals: Vec<f32> = mesh.normals.iter().flat_map(|n| n.to_array()).collect();
        let texcoords: Vec<f32> = if mesh.texcoords.is_empty() {
            vec![0.0; mesh.vertices.len() * 2]
        } else {
            mesh.texcoords.iter().flat_map(|t: &Vec2| t.to_array()).collect()
        };
        self.vertex_array = Some(device.create_vertex_array(
            &self.label,
            &[
                VertexStream {
                    location: POSITION_LOCATION,
                    components: 3,
                    data: &positions,
                },
                VertexStream {
                    location: NORMAL_LOCATION,
                    components: 3,
                    data: &normals,
                },
                VertexStream {
                    location: TEXCOORD_LOCATION,
                    components: 2,
                    data: &texcoords,
                },
            ],
        )?);

        for (index, image) in mesh.images.iter().enumerate() {
            let texture = device.create_texture(&format!("{} image {}", self.label, index));
            self.textures.push(texture);
            device.define_texture(
                texture,
                TextureDesc::new(image.width, image.height, TextureFormat::Rgba8),
                Some(&image.rgba),
            )?;
        }
        Ok(())
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn vertex_array(&self) -> Option<VertexArrayHandle> {
        self.vertex_array
    }

    pub fn textures(&self) -> &[TextureHandle] {
        &self.textures
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn is_released(&self) -> bool {
        self.vertex_array.is_none() && self.textures.is_empty()
    }

    /// Recompute `app_model_matrix` from `model_matrix` and the animation.
    pub fn derive(&mut self, time: f32) {
        self.app_model_matrix = self.animation.apply(self.model_matrix, self.aabb.center, time);
    }

    /// Free every GPU handle. Handles are cleared as they are freed, so calling
    /// this again does nothing.
    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        if let Some(vertex_array) = self.vertex_array.take() {
            device.delete_vertex_array(vertex_array);
        }
        for texture in self.textures.drain(..) {
            device.delete_texture(texture);
        }
        for part in &mut self.parts {
            part.diffuse_texture = None;
            part.normal_texture = None;
            part.bump_texture = None;
        }
    }
}

impl Drop for GeometryNode {
    fn drop(&mut self) {
        if !self.is_released() {
            log::warn!("Node '{}' dropped without releasing its GPU handles", self.label);
        }
    }
}
