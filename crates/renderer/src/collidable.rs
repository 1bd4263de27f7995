//! Nodes that answer ray queries.

use std::ops::{Deref, DerefMut};

use engine_core::{GeometricMesh, Mat4, Vec3};
use physics::{CollisionMesh, RayPrecision};

use crate::error::RenderResult;
use crate::gpu::GpuDevice;
use crate::node::GeometryNode;

/// A [`GeometryNode`] with a CPU-side copy of its triangles for ray tests.
#[derive(Debug)]
pub struct CollidableNode {
    node: GeometryNode,
    collision: CollisionMesh,
    pub precision: RayPrecision,
}

impl CollidableNode {
    pub fn init(
        device: &mut dyn GpuDevice,
        label: &str,
        mesh: &GeometricMesh,
        precision: RayPrecision,
    ) -> RenderResult<Self> {
        let node = GeometryNode::init(device, label, mesh)?;
        Ok(Self {
            node,
            collision: CollisionMesh::from_triangle_list(&mesh.vertices),
            precision,
        })
    }

    pub fn node(&self) -> &GeometryNode {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut GeometryNode {
        &mut self.node
    }

    pub fn into_node(self) -> GeometryNode {
        self.node
    }

    pub fn collision_mesh(&self) -> &CollisionMesh {
        &self.collision
    }

    /// Nearest positive hit parameter of `origin + t * direction` (world space)
    /// against this node, placed by `world_matrix * model_matrix`. `None` when
    /// nothing lies in front of the origin within `max_t`.
    pub fn intersect_ray(
        &self,
        origin: Vec3,
        direction: Vec3,
        world_matrix: Mat4,
        max_t: Option<f32>,
    ) -> Option<f32> {
        let to_local = (world_matrix * self.node.model_matrix).inverse();
        if !to_local.is_finite() {
            return None;
        }
        let local_origin = to_local.transform_point3(origin);
        let local_direction = to_local.transform_vector3(direction);
        self.collision
            .cast_local_ray(
                local_origin,
                local_direction,
                max_t.unwrap_or(f32::MAX),
                self.precision,
            )
            .map(|hit| hit.t)
    }
}

impl Deref for CollidableNode {
    type Target = GeometryNode;

    fn deref(&self) -> &GeometryNode {
        &self.node
    }
}

impl DerefMut for CollidableNode {
    fn deref_mut(&mut self) -> &mut GeometryNode {
        &mut self.node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessDevice;
    use engine_core::MeshObject;
    use engine_core::MaterialDesc;

    /// Unit quad in the z = 0 plane, both windings so either side is hit.
    fn wall() -> GeometricMesh {
        let a = Vec3::new(-1.0, -1.0, 0.0);
        let b = Vec3::new(1.0, -1.0, 0.0);
        let c = Vec3::new(1.0, 1.0, 0.0);
        let d = Vec3::new(-1.0, 1.0, 0.0);
        let vertices = vec![a, b, c, a, c, d];
        GeometricMesh {
            normals: vec![Vec3::Z; vertices.len()],
            vertices,
            texcoords: Vec::new(),
            objects: vec![MeshObject {
                start: 0,
                end: 6,
                material: MaterialDesc::default(),
            }],
            images: Vec::new(),
        }
    }

    #[test]
    fn hit_in_front_reports_world_parameter() {
        let mut device = HeadlessDevice::new(4, 4);
        let mut wall = CollidableNode::init(&mut device, "wall", &wall(), RayPrecision::Triangles).unwrap();
        wall.model_matrix = Mat4::from_translation(Vec3::new(0.0, 0.0, 100.0));
        let world = Mat4::from_scale(Vec3::splat(0.02));

        // Wall sits at world z = 2.
        let t = wall
            .intersect_ray(Vec3::ZERO, Vec3::Z, world, None)
            .unwrap();
        assert!((t - 2.0).abs() < 1e-4);

        assert!(wall.intersect_ray(Vec3::ZERO, Vec3::Z, world, Some(1.0)).is_none());
        wall.release(&mut device);
    }

    #[test]
    fn nothing_behind_the_origin() {
        let mut device = HeadlessDevice::new(4, 4);
        let mut wall = CollidableNode::init(&mut device, "wall", &wall(), RayPrecision::Triangles).unwrap();
        assert!(wall
            .intersect_ray(Vec3::new(0.0, 0.0, 1.0), Vec3::Z, Mat4::IDENTITY, None)
            .is_none());
        wall.release(&mut device);
    }

    #[test]
    fn bounds_precision_hits_the_box() {
        let mut device = HeadlessDevice::new(4, 4);
        let mut wall = CollidableNode::init(&mut device, "wall", &wall(), RayPrecision::Bounds).unwrap();
        let t = wall
            .intersect_ray(Vec3::new(0.5, 0.5, -3.0), Vec3::Z, Mat4::IDENTITY, None)
            .unwrap();
        assert!((t - 3.0).abs() < 1e-4);
        wall.release(&mut device);
    }
}
