//! Matrix helpers for column-major model matrices.
//!
//! Node transforms are plain `Mat4`s rather than decomposed position/rotation/scale:
//! the craft integrates orientation by multiplying small rotations straight into its
//! model matrix, so drift is expected and never re-orthonormalized.

use glam::{Mat4, Vec3, Vec4};

/// Column accessors and in-place composition on model matrices.
pub trait MatrixExt {
    /// Translation column.
    fn translation(&self) -> Vec3;
    /// Overwrite the translation column, leaving the basis untouched.
    fn set_translation(&mut self, position: Vec3);
    /// Local +X axis in parent space (not normalized).
    fn right_axis(&self) -> Vec3;
    /// Local +Y axis in parent space (not normalized).
    fn up_axis(&self) -> Vec3;
    /// Local +Z axis in parent space (not normalized). The craft flies along it.
    fn forward_axis(&self) -> Vec3;
    /// Post-multiply a rotation of `angle` radians about a local axis.
    fn rotate_local(&mut self, axis: Vec3, angle: f32);
}

impl MatrixExt for Mat4 {
    fn translation(&self) -> Vec3 {
        self.w_axis.truncate()
    }

    fn set_translation(&mut self, position: Vec3) {
        self.w_axis = Vec4::new(position.x, position.y, position.z, 1.0);
    }

    fn right_axis(&self) -> Vec3 {
        self.x_axis.truncate()
    }

    fn up_axis(&self) -> Vec3 {
        self.y_axis.truncate()
    }

    fn forward_axis(&self) -> Vec3 {
        self.z_axis.truncate()
    }

    fn rotate_local(&mut self, axis: Vec3, angle: f32) {
        if angle != 0.0 {
            *self *= Mat4::from_axis_angle(axis, angle);
        }
    }
}

/// `translate(pivot) * rotation * translate(-pivot)`: rotate about a point instead of the origin.
pub fn about_pivot(pivot: Vec3, rotation: Mat4) -> Mat4 {
    Mat4::from_translation(pivot) * rotation * Mat4::from_translation(-pivot)
}

/// Inverse-transpose, used to carry normals through a non-uniformly scaled transform.
pub fn normal_matrix(model: Mat4) -> Mat4 {
    model.inverse().transpose()
}

/// An up vector that is not parallel to `direction`.
pub fn stable_up(direction: Vec3) -> Vec3 {
    if direction.normalize_or_zero().y.abs() > 0.99 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_roundtrip_keeps_basis() {
        let mut m = Mat4::from_rotation_y(0.3);
        let basis = m.right_axis();
        m.set_translation(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(m.translation(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(m.right_axis(), basis);
        assert_eq!(m.w_axis.w, 1.0);
    }

    #[test]
    fn rotate_local_about_y_preserves_up() {
        let mut m = Mat4::IDENTITY;
        m.rotate_local(Vec3::Y, std::f32::consts::FRAC_PI_2);
        assert!(m.up_axis().abs_diff_eq(Vec3::Y, 1e-6));
        assert!(m.forward_axis().abs_diff_eq(Vec3::X, 1e-6));
    }

    #[test]
    fn pivot_is_a_fixed_point() {
        let pivot = Vec3::new(3.0, -1.0, 2.0);
        let m = about_pivot(pivot, Mat4::from_rotation_y(1.2));
        assert!(m.transform_point3(pivot).abs_diff_eq(pivot, 1e-5));
    }

    #[test]
    fn normal_matrix_of_uniform_scale_is_inverse_scale() {
        let n = normal_matrix(Mat4::from_scale(Vec3::splat(0.02)));
        assert!(n.transform_vector3(Vec3::Y).abs_diff_eq(Vec3::Y * 50.0, 1e-3));
    }

    #[test]
    fn stable_up_avoids_vertical_direction() {
        assert_eq!(stable_up(Vec3::NEG_Y), Vec3::Z);
        assert_eq!(stable_up(Vec3::new(1.0, -1.0, 0.0)), Vec3::Y);
    }
}
