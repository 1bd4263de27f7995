//! Terrain generation using noise functions.
//!
//! All noise is derived from `config.seed`, so the same seed always produces the
//! same heightfield.

use engine_core::{GeometricMesh, MaterialDesc, MeshObject, Vec2, Vec3};
use noise::{NoiseFn, Perlin, Simplex};

use crate::textures::TextureGenerator;

/// Derive a deterministic u32 noise seed from a world seed and an offset.
#[inline]
fn deterministic_noise_seed(seed: u64, offset: u64) -> u32 {
    ((seed.wrapping_add(offset))
        .wrapping_mul(0x9e3779b97f4a7c15_u64)
        .wrapping_add(offset.wrapping_mul(0x6c078965_u64))
        >> 32) as u32
}

/// Configuration for terrain generation.
#[derive(Debug, Clone)]
pub struct TerrainConfig {
    /// Size of terrain in world units.
    pub size: f32,
    /// Number of vertices per side.
    pub resolution: u32,
    /// Maximum height of terrain.
    pub height_scale: f32,
    /// Noise frequency (lower = smoother).
    pub frequency: f64,
    /// Number of octaves for fractal noise.
    pub octaves: u32,
    /// Lacunarity (frequency multiplier per octave).
    pub lacunarity: f64,
    /// Persistence (amplitude multiplier per octave).
    pub persistence: f64,
    /// Seed for noise generation.
    pub seed: u64,
    /// Normalized height (0-1) above which triangles are rock.
    pub rock_height: f32,
    /// Triangles steeper than this (normal.y below it) are rock.
    pub rock_slope: f32,
    /// How many times the textures repeat across the terrain.
    pub texture_repeat: f32,
    /// Edge length of the generated textures in texels.
    pub texture_size: u32,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            size: 256.0,
            resolution: 128,
            height_scale: 30.0,
            frequency: 0.02,
            octaves: 4,
            lacunarity: 2.0,
            persistence: 0.5,
            seed: 0,
            rock_height: 0.62,
            rock_slope: 0.75,
            texture_repeat: 16.0,
            texture_size: 128,
        }
    }
}

/// Generated heightfield.
#[derive(Debug)]
pub struct TerrainData {
    /// Row-major (z, then x) heights in world units.
    pub heightmap: Vec<f32>,
    pub config: TerrainConfig,
}

impl TerrainData {
    /// Generate terrain from configuration. Resolution is clamped to at least 2.
    pub fn generate(mut config: TerrainConfig) -> Self {
        config.resolution = config.resolution.max(2);
        let perlin = Perlin::new(deterministic_noise_seed(config.seed, 0));
        let simplex = Simplex::new(deterministic_noise_seed(config.seed, 1));

        let res = config.resolution as usize;
        let step = config.step();
        let mut heightmap = Vec::with_capacity(res * res);
        for z in 0..res {
            for x in 0..res {
                let world_x = x as f32 * step - config.size / 2.0;
                let world_z = z as f32 * step - config.size / 2.0;
                let height = Self::fractal_noise(&perlin, &simplex, world_x as f64, world_z as f64, &config);
                heightmap.push(height as f32 * config.height_scale);
            }
        }

        log::debug!(
            "Generated terrain {}x{} (seed {}, size {})",
            res,
            res,
            config.seed,
            config.size
        );
        Self { heightmap, config }
    }

    fn fractal_noise(perlin: &Perlin, simplex: &Simplex, x: f64, z: f64, config: &TerrainConfig) -> f64 {
        let mut value = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = config.frequency;
        let mut max_value = 0.0;

        for _ in 0..config.octaves.max(1) {
            // Mix Perlin and Simplex for variety
            let perlin_sample = perlin.get([x * frequency, z * frequency]);
            let simplex_sample = simplex.get([x * frequency + 1000.0, z * frequency + 1000.0]);

            value += (perlin_sample * 0.7 + simplex_sample * 0.3) * amplitude;
            max_value += amplitude;

            amplitude *= config.persistence;
            frequency *= config.lacunarity;
        }

        // Normalize to 0-1 range
        (value / max_value + 1.0) * 0.5
    }

    fn grid_position(&self, x: usize, z: usize) -> Vec3 {
        let res = self.config.resolution as usize;
        let step = self.config.step();
        Vec3::new(
            x as f32 * step - self.config.size / 2.0,
            self.heightmap[z * res + x],
            z as f32 * step - self.config.size / 2.0,
        )
    }

    /// Bilinearly interpolated height at a world position, clamped to the terrain edge.
    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        let res = self.config.resolution as usize;
        let step = self.config.step();
        let last = (res - 1) as f32;
        let gx = ((x + self.config.size / 2.0) / step).clamp(0.0, last);
        let gz = ((z + self.config.size / 2.0) / step).clamp(0.0, last);
        let x0 = (gx.floor() as usize).min(res - 2);
        let z0 = (gz.floor() as usize).min(res - 2);
        let fx = gx - x0 as f32;
        let fz = gz - z0 as f32;

        let h = |x: usize, z: usize| self.heightmap[z * res + x];
        let top = h(x0, z0) * (1.0 - fx) + h(x0 + 1, z0) * fx;
        let bottom = h(x0, z0 + 1) * (1.0 - fx) + h(x0 + 1, z0 + 1) * fx;
        top * (1.0 - fz) + bottom * fz
    }

    /// Smooth per-grid-vertex normals from accumulated face normals.
    fn calculate_normals(&self) -> Vec<Vec3> {
        let res = self.config.resolution as usize;
        let mut normals = vec![Vec3::ZERO; res * res];

        for z in 0..(res - 1) {
            for x in 0..(res - 1) {
                let i0 = z * res + x;
                let i1 = i0 + 1;
                let i2 = (z + 1) * res + x;
                let i3 = i2 + 1;

                let v0 = self.grid_position(x, z);
                let v1 = self.grid_position(x + 1, z);
                let v2 = self.grid_position(x, z + 1);
                let v3 = self.grid_position(x + 1, z + 1);

                let n1 = (v2 - v0).cross(v1 - v0).normalize();
                normals[i0] += n1;
                normals[i2] += n1;
                normals[i1] += n1;

                let n2 = (v2 - v1).cross(v3 - v1).normalize();
                normals[i1] += n2;
                normals[i2] += n2;
                normals[i3] += n2;
            }
        }

        normals.into_iter().map(|n| n.normalize_or(Vec3::Y)).collect()
    }

    /// Expand to a non-indexed mesh with a grass object and a bump-mapped rock object.
    pub fn to_mesh(&self) -> GeometricMesh {
        let res = self.config.resolution as usize;
        let normals = self.calculate_normals();
        let repeat = self.config.texture_repeat / (res - 1) as f32;
        let rock_height = self.config.rock_height * self.config.height_scale;

        let mut grass = Vec::new();
        let mut rock = Vec::new();
        for z in 0..(res - 1) {
            for x in 0..(res - 1) {
                // Counter-clockwise seen from above.
                let quads = [[(x, z), (x, z + 1), (x + 1, z)], [(x + 1, z), (x, z + 1), (x + 1, z + 1)]];
                for tri in quads {
                    let corners = tri.map(|(x, z)| self.grid_position(x, z));
                    let face = (corners[1] - corners[0]).cross(corners[2] - corners[0]).normalize_or(Vec3::Y);
                    let mean_height = (corners[0].y + corners[1].y + corners[2].y) / 3.0;
                    let target = if mean_height > rock_height || face.y < self.config.rock_slope {
                        &mut rock
                    } else {
                        &mut grass
                    };
                    for (x, z) in tri {
                        target.push((
                            self.grid_position(x, z),
                            normals[z * res + x],
                            Vec2::new(x as f32 * repeat, z as f32 * repeat),
                        ));
                    }
                }
            }
        }

        let textures = TextureGenerator::new(deterministic_noise_seed(self.config.seed, 7));
        let mut mesh = GeometricMesh {
            images: vec![
                textures.grass(self.config.texture_size).into_image(),
                textures.rock_bump(self.config.texture_size).into_image(),
            ],
            ..Default::default()
        };

        let grass_material = MaterialDesc {
            name: "grass".to_string(),
            diffuse: Vec3::ONE,
            ambient: Vec3::splat(0.15),
            specular: Vec3::splat(0.05),
            shininess: 8.0,
            diffuse_texture: Some(0),
            ..Default::default()
        };
        let rock_material = MaterialDesc {
            name: "rock".to_string(),
            diffuse: Vec3::new(0.45, 0.42, 0.4),
            ambient: Vec3::splat(0.1),
            specular: Vec3::splat(0.2),
            shininess: 16.0,
            bump_texture: Some(1),
            ..Default::default()
        };

        for (vertices, material) in [(grass, grass_material), (rock, rock_material)] {
            if vertices.is_empty() {
                continue;
            }
            let start = mesh.vertices.len() as u32;
            for (position, normal, uv) in vertices {
                mesh.vertices.push(position);
                mesh.normals.push(normal);
                mesh.texcoords.push(uv);
            }
            mesh.objects.push(MeshObject {
                start,
                end: mesh.vertices.len() as u32,
                material,
            });
        }
        mesh
    }
}

impl TerrainConfig {
    fn step(&self) -> f32 {
        self.size / (self.resolution.max(2) - 1) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small(seed: u64) -> TerrainConfig {
        TerrainConfig {
            size: 64.0,
            resolution: 9,
            texture_size: 8,
            seed,
            ..Default::default()
        }
    }

    #[test]
    fn same_seed_same_heights() {
        let a = TerrainData::generate(small(42));
        let b = TerrainData::generate(small(42));
        assert_eq!(a.heightmap, b.heightmap);
        let c = TerrainData::generate(small(43));
        assert_ne!(a.heightmap, c.heightmap);
    }

    #[test]
    fn heights_within_scale() {
        let terrain = TerrainData::generate(small(1));
        let scale = terrain.config.height_scale;
        assert!(terrain
            .heightmap
            .iter()
            .all(|h| *h >= -0.01 * scale && *h <= 1.01 * scale));
    }

    #[test]
    fn height_at_matches_grid_points() {
        let terrain = TerrainData::generate(small(5));
        let p = terrain.grid_position(3, 4);
        assert!((terrain.height_at(p.x, p.z) - p.y).abs() < 1e-4);
        // Outside the terrain clamps to the edge.
        let corner = terrain.grid_position(0, 0);
        assert!((terrain.height_at(-1000.0, -1000.0) - corner.y).abs() < 1e-4);
    }

    #[test]
    fn mesh_covers_every_cell_and_validates() {
        let terrain = TerrainData::generate(small(9));
        let mesh = terrain.to_mesh();
        assert!(mesh.validate().is_ok());
        assert_eq!(mesh.vertex_count(), 8 * 8 * 6);
        assert_eq!(mesh.texcoords.len(), mesh.vertex_count());
        assert!(mesh.normals.iter().all(|n| n.y > 0.0));
    }

    #[test]
    fn flat_terrain_normals_point_straight_up() {
        let terrain = TerrainData::generate(TerrainConfig {
            height_scale: 0.0,
            ..small(3)
        });
        for normal in terrain.calculate_normals() {
            assert!(normal.abs_diff_eq(Vec3::Y, 1e-5), "normal {:?}", normal);
        }
    }

    #[test]
    fn triangles_face_up() {
        let mesh = TerrainData::generate(TerrainConfig {
            height_scale: 0.0,
            ..small(2)
        })
        .to_mesh();
        for tri in mesh.vertices.chunks_exact(3) {
            let n = (tri[1] - tri[0]).cross(tri[2] - tri[0]);
            assert!(n.y > 0.0);
        }
        // Flat terrain is all grass.
        assert_eq!(mesh.objects.len(), 1);
        assert_eq!(mesh.objects[0].material.name, "grass");
    }
}
