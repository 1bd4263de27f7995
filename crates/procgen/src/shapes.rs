//! Hand-built low-poly shapes: the craft and box obstacles.
//!
//! Shapes are emitted with flat (per-face) normals, one object per material.

use engine_core::{GeometricMesh, MaterialDesc, MeshObject, Vec2, Vec3};

use crate::textures::TextureGenerator;

/// Accumulates flat-shaded triangles into one material object.
#[derive(Default)]
struct FlatBuilder {
    vertices: Vec<Vec3>,
    normals: Vec<Vec3>,
    texcoords: Vec<Vec2>,
}

impl FlatBuilder {
    /// Counter-clockwise triangle; the face normal follows the winding.
    fn triangle(&mut self, a: Vec3, b: Vec3, c: Vec3, uv: [Vec2; 3]) {
        let normal = (b - a).cross(c - a).normalize_or(Vec3::Y);
        self.vertices.extend([a, b, c]);
        self.normals.extend([normal; 3]);
        self.texcoords.extend(uv);
    }

    /// Counter-clockwise quad `a b c d`.
    fn quad(&mut self, a: Vec3, b: Vec3, c: Vec3, d: Vec3) {
        self.triangle(a, b, c, [Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0)]);
        self.triangle(a, c, d, [Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0), Vec2::new(0.0, 1.0)]);
    }

    fn flush_into(self, mesh: &mut GeometricMesh, material: MaterialDesc) {
        if self.vertices.is_empty() {
            return;
        }
        let start = mesh.vertices.len() as u32;
        mesh.vertices.extend(self.vertices);
        mesh.normals.extend(self.normals);
        mesh.texcoords.extend(self.texcoords);
        mesh.objects.push(MeshObject {
            start,
            end: mesh.vertices.len() as u32,
            material,
        });
    }
}

/// Dart-shaped craft, nose along +Z, centered on the origin.
pub fn craft_mesh(length: f32) -> GeometricMesh {
    let l = length.max(f32::EPSILON);
    let nose = Vec3::new(0.0, 0.0, 0.5 * l);
    let tail_left = Vec3::new(-0.4 * l, 0.0, -0.5 * l);
    let tail_right = Vec3::new(0.4 * l, 0.0, -0.5 * l);
    let tail_top = Vec3::new(0.0, 0.12 * l, -0.4 * l);
    let tail_bottom = Vec3::new(0.0, -0.06 * l, -0.4 * l);

    let mut body = FlatBuilder::default();
    let uv = [Vec2::new(0.5, 1.0), Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0)];
    // Upper surface
    body.triangle(nose, tail_top, tail_left, uv);
    body.triangle(nose, tail_right, tail_top, uv);
    // Lower surface
    body.triangle(nose, tail_left, tail_bottom, uv);
    body.triangle(nose, tail_bottom, tail_right, uv);
    // Exhaust plate
    body.triangle(tail_left, tail_top, tail_bottom, uv);
    body.triangle(tail_right, tail_bottom, tail_top, uv);

    let canopy_front = Vec3::new(0.0, 0.04 * l, 0.15 * l);
    let canopy_top = Vec3::new(0.0, 0.14 * l, -0.1 * l);
    let canopy_left = Vec3::new(-0.07 * l, 0.06 * l, -0.2 * l);
    let canopy_right = Vec3::new(0.07 * l, 0.06 * l, -0.2 * l);
    let mut canopy = FlatBuilder::default();
    canopy.triangle(canopy_front, canopy_top, canopy_left, uv);
    canopy.triangle(canopy_front, canopy_right, canopy_top, uv);
    canopy.triangle(canopy_left, canopy_top, canopy_right, uv);

    let mut mesh = GeometricMesh::default();
    body.flush_into(&mut mesh, MaterialDesc::flat("craft_body", Vec3::new(0.75, 0.2, 0.15)));
    canopy.flush_into(
        &mut mesh,
        MaterialDesc {
            specular: Vec3::splat(0.9),
            shininess: 96.0,
            ..MaterialDesc::flat("craft_canopy", Vec3::new(0.2, 0.35, 0.6))
        },
    );
    mesh
}

/// Axis-aligned box centered on the origin, textured with hull panels.
pub fn hull_mesh(half_extents: Vec3) -> GeometricMesh {
    let h = half_extents.abs();
    let corner = |x: f32, y: f32, z: f32| Vec3::new(x * h.x, y * h.y, z * h.z);

    let mut panels = FlatBuilder::default();
    // +X, -X
    panels.quad(corner(1.0, -1.0, 1.0), corner(1.0, -1.0, -1.0), corner(1.0, 1.0, -1.0), corner(1.0, 1.0, 1.0));
    panels.quad(corner(-1.0, -1.0, -1.0), corner(-1.0, -1.0, 1.0), corner(-1.0, 1.0, 1.0), corner(-1.0, 1.0, -1.0));
    // +Y, -Y
    panels.quad(corner(-1.0, 1.0, 1.0), corner(1.0, 1.0, 1.0), corner(1.0, 1.0, -1.0), corner(-1.0, 1.0, -1.0));
    panels.quad(corner(-1.0, -1.0, -1.0), corner(1.0, -1.0, -1.0), corner(1.0, -1.0, 1.0), corner(-1.0, -1.0, 1.0));
    // +Z, -Z
    panels.quad(corner(-1.0, -1.0, 1.0), corner(1.0, -1.0, 1.0), corner(1.0, 1.0, 1.0), corner(-1.0, 1.0, 1.0));
    panels.quad(corner(1.0, -1.0, -1.0), corner(-1.0, -1.0, -1.0), corner(-1.0, 1.0, -1.0), corner(1.0, 1.0, -1.0));

    let mut mesh = GeometricMesh {
        images: vec![TextureGenerator::new(11).hull_panels(64, 4).into_image()],
        ..Default::default()
    };
    panels.flush_into(
        &mut mesh,
        MaterialDesc {
            diffuse_texture: Some(0),
            specular: Vec3::splat(0.4),
            shininess: 48.0,
            ..MaterialDesc::flat("hull", Vec3::ONE)
        },
    );
    mesh
}
