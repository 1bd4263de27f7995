//! Axis-aligned bounding boxes in a node's local space.

use glam::Vec3;

/// Local-space bounds of a mesh, computed once when the mesh is loaded.
///
/// `center` doubles as the pivot for spin animations. It is *not* kept in sync
/// with the owning node's transform: code that moves a node and relies on the
/// center (collision, animation) must call [`Aabb::recenter`] itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
    pub center: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Aabb {
    /// Inverted bounds: any point folded in replaces both corners.
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::MAX),
        max: Vec3::splat(-f32::MAX),
        center: Vec3::ZERO,
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min,
            max,
            center: (min + max) * 0.5,
        }
    }

    /// Single pass over `points`: component-wise min/max, then the midpoint.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> Self {
        let mut min = Self::EMPTY.min;
        let mut max = Self::EMPTY.max;
        let mut any = false;
        for p in points {
            min = min.min(*p);
            max = max.max(*p);
            any = true;
        }
        if !any {
            return Self::EMPTY;
        }
        Self::new(min, max)
    }

    /// True when no point has been folded in.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Full size along each axis.
    pub fn size(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            self.max - self.min
        }
    }

    pub fn half_extents(&self) -> Vec3 {
        self.size() * 0.5
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Move the pivot without touching `min`/`max`.
    pub fn recenter(&mut self, center: Vec3) {
        self.center = center;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_match_componentwise_extremes() {
        let points = [
            Vec3::new(1.0, -2.0, 3.0),
            Vec3::new(-4.0, 5.0, 0.5),
            Vec3::new(2.5, 0.0, -6.0),
            Vec3::new(0.0, 1.0, 1.0),
        ];
        let aabb = Aabb::from_points(points.iter());
        assert_eq!(aabb.min, Vec3::new(-4.0, -2.0, -6.0));
        assert_eq!(aabb.max, Vec3::new(2.5, 5.0, 3.0));
        assert_eq!(aabb.center, (aabb.min + aabb.max) * 0.5);
    }

    #[test]
    fn single_point_is_degenerate_but_not_empty() {
        let p = Vec3::new(7.0, 8.0, 9.0);
        let aabb = Aabb::from_points([p].iter());
        assert!(!aabb.is_empty());
        assert_eq!(aabb.min, p);
        assert_eq!(aabb.max, p);
        assert_eq!(aabb.center, p);
        assert_eq!(aabb.size(), Vec3::ZERO);
    }

    #[test]
    fn no_points_yields_empty_bounds() {
        let aabb = Aabb::from_points(std::iter::empty::<&Vec3>());
        assert!(aabb.is_empty());
        assert_eq!(aabb.size(), Vec3::ZERO);
        assert!(!aabb.contains(Vec3::ZERO));
    }

    #[test]
    fn recenter_keeps_extents() {
        let mut aabb = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        aabb.recenter(Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(aabb.center, Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(aabb.size(), Vec3::splat(2.0));
    }
}
