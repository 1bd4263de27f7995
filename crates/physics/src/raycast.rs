//! Ray queries against static triangle geometry.
//!
//! Queries run in the mesh's local space; callers bring the ray into that space
//! first. The direction is *not* normalized, so the returned parameter `t` is
//! valid for the untransformed ray as well (`origin + t * direction`).

use engine_core::{Aabb, Vec3};
use rapier3d::na::{Point3, Vector3};
use rapier3d::parry::bounding_volume::Aabb as ParryAabb;
use rapier3d::parry::query::{Ray, RayCast};
use rapier3d::parry::shape::Triangle;

/// How precisely a ray is tested against a [`CollisionMesh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RayPrecision {
    /// Every triangle (after an early-out against the bounds).
    #[default]
    Triangles,
    /// The local bounding box only.
    Bounds,
}

/// Result of a ray query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Ray parameter of the hit, always positive.
    pub t: f32,
    /// Local-space hit position.
    pub point: Vec3,
    /// Index of the triangle that was hit (`None` for bounds-only queries).
    pub triangle: Option<usize>,
}

/// Triangle soup plus its bounds, kept CPU side for ray tests.
#[derive(Debug, Clone)]
pub struct CollisionMesh {
    triangles: Vec<Triangle>,
    bounds: Aabb,
}

fn to_point(v: Vec3) -> Point3<f32> {
    Point3::new(v.x, v.y, v.z)
}

fn to_vector(v: Vec3) -> Vector3<f32> {
    Vector3::new(v.x, v.y, v.z)
}

impl CollisionMesh {
    /// Build from a non-indexed triangle list. A trailing partial triangle is ignored.
    pub fn from_triangle_list(vertices: &[Vec3]) -> Self {
        let triangles: Vec<Triangle> = vertices
            .chunks_exact(3)
            .map(|tri| Triangle::new(to_point(tri[0]), to_point(tri[1]), to_point(tri[2])))
            .collect();
        if vertices.len() % 3 != 0 {
            log::warn!(
                "Collision mesh: {} trailing vertices ignored",
                vertices.len() % 3
            );
        }
        Self {
            triangles,
            bounds: Aabb::from_points(vertices.iter()),
        }
    }

    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Nearest hit with `0 < t <= max_t`, or `None`.
    pub fn cast_local_ray(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_t: f32,
        precision: RayPrecision,
    ) -> Option<RayHit> {
        if self.bounds.is_empty() || direction.length_squared() <= f32::EPSILON || max_t <= 0.0 {
            return None;
        }

        let ray = Ray::new(to_point(origin), to_vector(direction));
        let bounds = ParryAabb::new(to_point(self.bounds.min), to_point(self.bounds.max));

        // Inside the box a solid cast reports 0; the hollow cast gives the exit distance.
        let box_t = bounds.cast_local_ray(&ray, max_t, false);
        let inside = self.bounds.contains(origin);
        if box_t.is_none() && !inside {
            return None;
        }

        match precision {
            RayPrecision::Bounds => box_t.filter(|t| *t > 0.0).map(|t| RayHit {
                t,
                point: origin + direction * t,
                triangle: None,
            }),
            RayPrecision::Triangles => {
                let mut best: Option<RayHit> = None;
                for (index, triangle) in self.triangles.iter().enumerate() {
                    let limit = best.map_or(max_t, |hit| hit.t);
                    if let Some(t) = triangle.cast_local_ray(&ray, limit, false) {
                        if t > 0.0 && best.map_or(true, |hit| t < hit.t) {
                            best = Some(RayHit {
                                t,
                                point: origin + direction * t,
                                triangle: Some(index),
                            });
                        }
                    }
                }
                best
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two triangles forming the unit quad in the z = 0 plane.
    fn quad() -> CollisionMesh {
        CollisionMesh::from_triangle_list(&[
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(-1.0, 1.0, 0.0),
        ])
    }

    #[test]
    fn hits_quad_in_front() {
        let hit = quad()
            .cast_local_ray(Vec3::new(0.2, 0.1, 5.0), Vec3::NEG_Z, f32::MAX, RayPrecision::Triangles)
            .expect("ray toward the quad must hit");
        assert!((hit.t - 5.0).abs() < 1e-4);
        assert!(hit.point.abs_diff_eq(Vec3::new(0.2, 0.1, 0.0), 1e-4));
        assert!(hit.triangle.is_some());
    }

    #[test]
    fn misses_behind_origin() {
        let hit = quad().cast_local_ray(Vec3::new(0.0, 0.0, 5.0), Vec3::Z, f32::MAX, RayPrecision::Triangles);
        assert!(hit.is_none());
    }

    #[test]
    fn unnormalized_direction_scales_t() {
        let hit = quad()
            .cast_local_ray(Vec3::new(0.0, 0.0, 4.0), Vec3::new(0.0, 0.0, -2.0), f32::MAX, RayPrecision::Triangles)
            .expect("hit");
        assert!((hit.t - 2.0).abs() < 1e-4);
    }

    #[test]
    fn max_t_limits_reach() {
        let hit = quad().cast_local_ray(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z, 4.0, RayPrecision::Triangles);
        assert!(hit.is_none());
    }

    #[test]
    fn bounds_precision_reports_box_hit() {
        // The quad's box is flat in z, so the box hit coincides with the plane.
        let hit = quad().cast_local_ray(Vec3::new(0.9, 0.9, 3.0), Vec3::NEG_Z, f32::MAX, RayPrecision::Bounds);
        assert!(hit.is_some_and(|h| h.triangle.is_none() && (h.t - 3.0).abs() < 1e-4));
    }

    #[test]
    fn zero_direction_never_hits() {
        assert!(quad()
            .cast_local_ray(Vec3::Z, Vec3::ZERO, f32::MAX, RayPrecision::Triangles)
            .is_none());
    }
}
