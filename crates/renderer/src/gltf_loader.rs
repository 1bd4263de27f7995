//! glTF 2.0 (`.gltf` / `.glb`) meshes.
//!
//! Every triangle primitive in the default scene is flattened into one
//! non-indexed [`GeometricMesh`] with node transforms baked in. Each primitive
//! becomes one object; base-color and normal textures are converted to RGBA8.

use std::collections::HashMap;
use std::path::Path;

use engine_core::{
    GeometricMesh, ImageData, LoadError, Mat4, MaterialDesc, MeshLoader, MeshObject, MeshSource,
    Vec2, Vec3,
};
use image::{DynamicImage, ImageBuffer};

/// Loads [`MeshSource::File`] glTF assets.
#[derive(Debug, Default, Clone, Copy)]
pub struct GltfLoader;

impl GltfLoader {
    pub fn handles(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
            Some("gltf") | Some("glb")
        )
    }

    pub fn load_path(path: &Path) -> Result<GeometricMesh, LoadError> {
        if !path.exists() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }
        let (document, buffers, images) = gltf::import(path).map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let mesh = Flattener::new(&buffers, &images).run(&document)?;
        log::info!(
            "Loaded glTF {} ({} vertices, {} objects, {} images)",
            path.display(),
            mesh.vertex_count(),
            mesh.objects.len(),
            mesh.images.len()
        );
        Ok(mesh)
    }

    /// Same as [`load_path`](Self::load_path) for an in-memory `.gltf`/`.glb`
    /// with embedded buffers.
    pub fn load_slice(bytes: &[u8]) -> Result<GeometricMesh, LoadError> {
        let (document, buffers, images) = gltf::import_slice(bytes).map_err(|e| LoadError::Parse {
            path: "<memory>".into(),
            message: e.to_string(),
        })?;
        Flattener::new(&buffers, &images).run(&document)
    }
}

impl MeshLoader for GltfLoader {
    fn load(&self, source: &MeshSource) -> Result<GeometricMesh, LoadError> {
        match source {
            MeshSource::File(path) if Self::handles(path) => Self::load_path(path),
            other => Err(LoadError::Unsupported(format!("glTF loader cannot load {}", other))),
        }
    }
}

struct Flattener<'a> {
    buffers: &'a [gltf::buffer::Data],
    images: &'a [gltf::image::Data],
    mesh: GeometricMesh,
    /// glTF image index -> index in `mesh.images`.
    converted: HashMap<usize, Option<usize>>,
}

impl<'a> Flattener<'a> {
    fn new(buffers: &'a [gltf::buffer::Data], images: &'a [gltf::image::Data]) -> Self {
        Self {
            buffers,
            images,
            mesh: GeometricMesh::default(),
            converted: HashMap::new(),
        }
    }

    fn run(mut self, document: &gltf::Document) -> Result<GeometricMesh, LoadError> {
        let scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .ok_or_else(|| LoadError::Invalid("glTF has no scene".into()))?;
        for node in scene.nodes() {
            self.visit(&node, Mat4::IDENTITY);
        }
        if self.mesh.vertices.is_empty() {
            return Err(LoadError::Invalid("glTF scene has no triangles".into()));
        }
        if self.mesh.texcoords.iter().all(|t| *t == Vec2::ZERO) {
            self.mesh.texcoords.clear();
        }
        self.mesh.validate()?;
        Ok(self.mesh)
    }

    fn visit(&mut self, node: &gltf::Node, parent: Mat4) {
        let transform = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
        if let Some(mesh) = node.mesh() {
            for primitive in mesh.primitives() {
                if primitive.mode() != gltf::mesh::Mode::Triangles {
                    log::warn!(
                        "glTF mesh '{}': skipping {:?} primitive",
                        mesh.name().unwrap_or("unnamed"),
                        primitive.mode()
                    );
                    continue;
                }
                self.add_primitive(&primitive, transform);
            }
        }
        for child in node.children() {
            self.visit(&child, transform);
        }
    }

    fn add_primitive(&mut self, primitive: &gltf::Primitive, transform: Mat4) {
        let buffers = self.buffers;
        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| &d.0[..]));
        let Some(positions) = reader.read_positions() else {
            log::warn!("glTF primitive without positions skipped");
            return;
        };
        let positions: Vec<Vec3> = positions.map(Vec3::from).collect();
        let normals: Option<Vec<Vec3>> = reader.read_normals().map(|n| n.map(Vec3::from).collect());
        let texcoords: Option<Vec<Vec2>> = reader
            .read_tex_coords(0)
            .map(|t| t.into_f32().map(Vec2::from).collect());
        let indices: Vec<u32> = match reader.read_indices() {
            Some(indices) => indices.into_u32().collect(),
            None => (0..positions.len() as u32).collect(),
        };

        let normal_transform = transform.inverse().transpose();
        let start = self.mesh.vertices.len() as u32;
        for triangle in indices.chunks_exact(3) {
            if triangle.iter().any(|&i| i as usize >= positions.len()) {
                log::warn!("glTF triangle references a missing vertex, skipped");
                continue;
            }
            let corners = [0, 1, 2].map(|k| transform.transform_point3(positions[triangle[k] as usize]));
            let face = (corners[1] - corners[0]).cross(corners[2] - corners[0]).normalize_or(Vec3::Y);
            for (k, &index) in triangle.iter().enumerate() {
                let i = index as usize;
                self.mesh.vertices.push(corners[k]);
                let normal = normals
                    .as_ref()
                    .and_then(|n| n.get(i))
                    .map(|n| normal_transform.transform_vector3(*n).normalize_or(face))
                    .unwrap_or(face);
                self.mesh.normals.push(normal);
                let uv = texcoords.as_ref().and_then(|t| t.get(i)).copied().unwrap_or(Vec2::ZERO);
                self.mesh.texcoords.push(uv);
            }
        }
        let end = self.mesh.vertices.len() as u32;
        if end > start {
            let material = self.material(&primitive.material());
            self.mesh.objects.push(MeshObject { start, end, material });
        }
    }

    fn material(&mut self, material: &gltf::Material) -> MaterialDesc {
        let pbr = material.pbr_metallic_roughness();
        let [r, g, b, _] = pbr.base_color_factor();
        let diffuse = Vec3::new(r, g, b);
        let smoothness = 1.0 - pbr.roughness_factor().clamp(0.0, 1.0);
        let diffuse_texture = pbr
            .base_color_texture()
            .and_then(|info| self.image(info.texture().source().index()));
        let normal_texture = material
            .normal_texture()
            .and_then(|info| self.image(info.texture().source().index()));
        MaterialDesc {
            name: material.name().unwrap_or("default").to_string(),
            ambient: diffuse * 0.15,
            specular: Vec3::splat(0.5 * smoothness),
            shininess: 2.0 + smoothness * smoothness * 126.0,
            diffuse,
            diffuse_texture,
            normal_texture,
            bump_texture: None,
        }
    }

    fn image(&mut self, index: usize) -> Option<usize> {
        if let Some(slot) = self.converted.get(&index) {
            return *slot;
        }
        let slot = self.images.get(index).and_then(to_rgba8).map(|image| {
            self.mesh.images.push(image);
            self.mesh.images.len() - 1
        });
        if slot.is_none() {
            log::warn!("glTF image {} has an unsupported format, ignored", index);
        }
        self.converted.insert(index, slot);
        slot
    }
}

fn u16_samples(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

fn f32_samples(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|quad| f32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]))
        .collect()
}

/// Decode any glTF pixel layout into RGBA8.
fn to_rgba8(data: &gltf::image::Data) -> Option<ImageData> {
    use gltf::image::Format;

    let (w, h) = (data.width, data.height);
    let pixels = data.pixels.clone();
    let dynamic = match data.format {
        Format::R8 => DynamicImage::ImageLuma8(ImageBuffer::from_raw(w, h, pixels)?),
        Format::R8G8 => DynamicImage::ImageLumaA8(ImageBuffer::from_raw(w, h, pixels)?),
        Format::R8G8B8 => DynamicImage::ImageRgb8(ImageBuffer::from_raw(w, h, pixels)?),
        Format::R8G8B8A8 => DynamicImage::ImageRgba8(ImageBuffer::from_raw(w, h, pixels)?),
        Format::R16 => DynamicImage::ImageLuma16(ImageBuffer::from_raw(w, h, u16_samples(&pixels))?),
        Format::R16G16 => DynamicImage::ImageLumaA16(ImageBuffer::from_raw(w, h, u16_samples(&pixels))?),
        Format::R16G16B16 => DynamicImage::ImageRgb16(ImageBuffer::from_raw(w, h, u16_samples(&pixels))?),
        Format::R16G16B16A16 => {
            DynamicImage::ImageRgba16(ImageBuffer::from_raw(w, h, u16_samples(&pixels))?)
        }
        Format::R32G32B32FLOAT => {
            DynamicImage::ImageRgb32F(ImageBuffer::from_raw(w, h, f32_samples(&pixels))?)
        }
        Format::R32G32B32A32FLOAT => {
            DynamicImage::ImageRgba32F(ImageBuffer::from_raw(w, h, f32_samples(&pixels))?)
        }
    };
    let rgba = dynamic.to_rgba8();
    Some(ImageData::new(rgba.width(), rgba.height(), rgba.into_raw()))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One indexed triangle without normals, red material, translated to z = 5.
    const TRIANGLE: &str = r#"{
        "asset": { "version": "2.0" },
        "buffers": [{
            "byteLength": 44,
            "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAAAAABAAIAAAA="
        }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 6 }
        ],
        "accessors": [
            { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
              "min": [0, 0, 0], "max": [1, 1, 0] },
            { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }
        ],
        "materials": [{
            "name": "paint",
            "pbrMetallicRoughness": { "baseColorFactor": [1, 0, 0, 1], "roughnessFactor": 0.5 }
        }],
        "meshes": [{ "name": "tri", "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1, "material": 0 }] }],
        "nodes": [{ "mesh": 0, "translation": [0, 0, 5] }],
        "scenes": [{ "nodes": [0] }],
        "scene": 0
    }"#;

    #[test]
    fn flattens_indexed_triangle_with_node_transform() {
        let mesh = GltfLoader::load_slice(TRIANGLE.as_bytes()).unwrap();
        assert_eq!(mesh.vertices, vec![Vec3::new(0.0, 0.0, 5.0), Vec3::new(1.0, 0.0, 5.0), Vec3::new(0.0, 1.0, 5.0)]);
        // No normals in the file: the face normal is used.
        assert!(mesh.normals.iter().all(|n| n.abs_diff_eq(Vec3::Z, 1e-6)));
        assert!(mesh.texcoords.is_empty());
        assert_eq!(mesh.objects.len(), 1);
        assert_eq!((mesh.objects[0].start, mesh.objects[0].end), (0, 3));
        let material = &mesh.objects[0].material;
        assert_eq!(material.name, "paint");
        assert_eq!(material.diffuse, Vec3::X);
        assert!(material.diffuse_texture.is_none());
    }

    #[test]
    fn rejects_other_sources() {
        let procedural = MeshSource::Procedural(engine_core::ProceduralMesh::Craft { length: 1.0 });
        assert!(matches!(GltfLoader.load(&procedural), Err(LoadError::Unsupported(_))));
        let obj = MeshSource::File("craft.obj".into());
        assert!(matches!(GltfLoader.load(&obj), Err(LoadError::Unsupported(_))));
        let missing = MeshSource::File("does/not/exist.glb".into());
        assert!(matches!(GltfLoader.load(&missing), Err(LoadError::NotFound(_))));
    }

    #[test]
    fn rgb_images_gain_opaque_alpha() {
        let data = gltf::image::Data {
            pixels: vec![10, 20, 30],
            format: gltf::image::Format::R8G8B8,
            width: 1,
            height: 1,
        };
        let image = to_rgba8(&data).unwrap();
        assert_eq!(image.rgba, vec![10, 20, 30, 255]);
    }
}
