//! Which collidable nodes are drawn this frame.

use engine_core::{Mat4, Vec3};

use crate::collidable::CollidableNode;

/// Policy applied to collidable nodes in both the shadow and geometry passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisibilityTest {
    /// Skip a node when the camera's view ray hits it.
    #[default]
    Occluded,
    /// Draw every node.
    Visible,
}

/// The ray the policy is evaluated against, fixed for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewRay {
    pub origin: Vec3,
    pub direction: Vec3,
    pub world_matrix: Mat4,
}

impl VisibilityTest {
    pub fn is_drawn(&self, node: &CollidableNode, ray: &ViewRay) -> bool {
        match self {
            VisibilityTest::Visible => true,
            VisibilityTest::Occluded => node
                .intersect_ray(ray.origin, ray.direction, ray.world_matrix, None)
                .is_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessDevice;
    use engine_core::{GeometricMesh, MaterialDesc, MeshObject};
    use physics::RayPrecision;

    fn wall(device: &mut HeadlessDevice) -> CollidableNode {
        let vertices = vec![
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(-1.0, 1.0, 0.0),
        ];
        let mesh = GeometricMesh {
            normals: vec![Vec3::Z; vertices.len()],
            vertices,
            objects: vec![MeshObject {
                start: 0,
                end: 6,
                material: MaterialDesc::default(),
            }],
            ..Default::default()
        };
        CollidableNode::init(device, "wall", &mesh, RayPrecision::Triangles).unwrap()
    }

    #[test]
    fn occluded_skips_nodes_on_the_view_ray() {
        let mut device = HeadlessDevice::new(4, 4);
        let mut node = wall(&mut device);
        let looking_at = ViewRay {
            origin: Vec3::new(0.0, 0.0, 5.0),
            direction: Vec3::NEG_Z,
            world_matrix: Mat4::IDENTITY,
        };
        let looking_away = ViewRay {
            direction: Vec3::Z,
            ..looking_at
        };

        assert!(!VisibilityTest::Occluded.is_drawn(&node, &looking_at));
        assert!(VisibilityTest::Occluded.is_drawn(&node, &looking_away));
        assert!(VisibilityTest::Visible.is_drawn(&node, &looking_at));
        node.release(&mut device);
    }
}
