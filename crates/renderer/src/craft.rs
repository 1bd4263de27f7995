//! Craft kinematics.
//!
//! The craft is a world-space matrix that integrates its own orientation: each
//! update composes small yaw/pitch rotations into it and then moves along the
//! new forward axis. Drift is tolerated and never re-orthonormalized.

use engine_core::{MatrixExt, MoveDirection, Vec2, Vec3};
use glam::Mat4;

#[derive(Debug, Clone)]
pub struct CraftState {
    transform: Mat4,
    /// `x` forward/back, `y` right/left, each -1, 0 or 1.
    movement: Vec2,
    look: Vec2,
    boost: bool,
    /// World units per second at full throttle.
    pub speed: f32,
    /// Degrees per second per look unit.
    pub turn_rate: f32,
    /// Speed multiplier while boosting.
    pub boost_factor: f32,
}

impl Default for CraftState {
    fn default() -> Self {
        Self::new(Vec3::new(10.0, 20.0, 0.0))
    }
}

impl CraftState {
    /// A level craft at `position` facing +Z.
    pub fn new(position: Vec3) -> Self {
        Self {
            transform: Mat4::from_translation(position),
            movement: Vec2::ZERO,
            look: Vec2::ZERO,
            boost: false,
            speed: 5.0,
            turn_rate: std::f32::consts::PI * 20.0,
            boost_factor: 2.0,
        }
    }

    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    pub fn position(&self) -> Vec3 {
        self.transform.translation()
    }

    pub fn forward(&self) -> Vec3 {
        self.transform.forward_axis().normalize_or_zero()
    }

    pub fn up(&self) -> Vec3 {
        self.transform.up_axis().normalize_or_zero()
    }

    /// Local -X: with +Z forward and +Y up, right-handed.
    pub fn right(&self) -> Vec3 {
        self.forward().cross(self.up()).normalize_or_zero()
    }

    pub fn movement(&self) -> Vec2 {
        self.movement
    }

    pub fn set_move(&mut self, direction: MoveDirection, enabled: bool) {
        direction.apply(&mut self.movement, enabled, 1.0);
    }

    /// Queue a turn (`x` right, `y` nose up) for the next update.
    pub fn look(&mut self, delta: Vec2) {
        self.look = delta;
    }

    pub fn pending_look(&self) -> Vec2 {
        self.look
    }

    pub fn set_boost(&mut self, boost: bool) {
        self.boost = boost;
    }

    pub fn is_boosting(&self) -> bool {
        self.boost
    }

    /// Apply and clear the queued turn. Only the dominant axis turns; a tie yaws.
    pub fn turn(&mut self, dt: f32) {
        let mut look = std::mem::take(&mut self.look);
        if look.x.abs() >= look.y.abs() {
            look.y = 0.0;
        } else {
            look.x = 0.0;
        }
        let rate = self.turn_rate.to_radians() * dt;
        self.transform.rotate_local(Vec3::Y, -look.x * rate);
        self.transform.rotate_local(Vec3::X, -look.y * rate);
    }

    /// Displacement this tick would apply, along the current axes.
    pub fn step(&self, dt: f32) -> Vec3 {
        let boost = if self.boost { self.boost_factor } else { 1.0 };
        let distance = self.movement * self.speed * boost * dt;
        self.forward() * distance.x + self.right() * distance.y
    }

    pub fn advance(&mut self, displacement: Vec3) {
        let position = self.position() + displacement;
        self.transform.set_translation(position);
    }

    /// Turn, then move. Returns the displacement applied.
    pub fn update(&mut self, dt: f32) -> Vec3 {
        self.turn(dt);
        let displacement = self.step(dt);
        self.advance(displacement);
        displacement
    }

    /// Model matrix that puts a mesh authored in model units at the craft,
    /// given the scene's world matrix: `world * model == transform * world * offset`.
    pub fn node_matrix(&self, world_matrix: Mat4, mesh_offset: Mat4) -> Mat4 {
        let inverse = world_matrix.inverse();
        if !inverse.is_finite() {
            return self.transform * mesh_offset;
        }
        inverse * self.transform * world_matrix * mesh_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_flight_moves_along_forward() {
        let mut craft = CraftState::new(Vec3::new(10.0, 20.0, 0.0));
        craft.set_move(MoveDirection::Forward, true);
        let displacement = craft.update(0.016);
        let expected = Vec3::new(10.0, 20.0, 0.0) + craft.speed * 0.016 * Vec3::Z;
        assert!(craft.position().abs_diff_eq(expected, 1e-5));
        assert!(displacement.abs_diff_eq(Vec3::Z * 0.08, 1e-6));
        assert_eq!(craft.forward(), Vec3::Z);
    }

    #[test]
    fn yaw_only_rotates_about_world_up() {
        let mut craft = CraftState::new(Vec3::ZERO);
        craft.look(Vec2::new(1.0, 0.0));
        craft.update(0.1);

        let angle = -(std::f32::consts::PI * 20.0).to_radians() * 0.1;
        assert!(craft.up().abs_diff_eq(Vec3::Y, 1e-6));
        let expected = Vec3::new(angle.sin(), 0.0, angle.cos());
        assert!(craft.forward().abs_diff_eq(expected, 1e-5));
        // Positive x turns toward the right side.
        assert!(craft.forward().x < 0.0);
        assert_eq!(craft.pending_look(), Vec2::ZERO);
    }

    #[test]
    fn pitch_only_keeps_right_axis() {
        let mut craft = CraftState::new(Vec3::ZERO);
        craft.look(Vec2::new(0.0, 1.0));
        craft.turn(0.1);
        assert!(craft.right().abs_diff_eq(Vec3::NEG_X, 1e-6));
        assert!(craft.forward().y > 0.0);
    }

    #[test]
    fn dominant_axis_wins() {
        let mut craft = CraftState::new(Vec3::ZERO);
        craft.look(Vec2::new(1.0, 0.5));
        craft.turn(0.1);
        assert!(craft.forward().y.abs() < 1e-6);
        assert!(craft.up().abs_diff_eq(Vec3::Y, 1e-6));
    }

    #[test]
    fn boost_doubles_speed_and_strafe_uses_right() {
        let mut craft = CraftState::new(Vec3::ZERO);
        craft.set_move(MoveDirection::Forward, true);
        craft.set_boost(true);
        assert!(craft.step(1.0).abs_diff_eq(Vec3::Z * 10.0, 1e-5));

        craft.set_move(MoveDirection::Forward, false);
        craft.set_boost(false);
        craft.set_move(MoveDirection::Right, true);
        assert!(craft.step(1.0).abs_diff_eq(Vec3::NEG_X * 5.0, 1e-5));
    }

    #[test]
    fn node_matrix_places_mesh_at_craft() {
        let craft = CraftState::new(Vec3::new(10.0, 20.0, 0.0));
        let world = Mat4::from_scale(Vec3::splat(0.02));
        let model = craft.node_matrix(world, Mat4::IDENTITY);
        let origin = (world * model).transform_point3(Vec3::ZERO);
        assert!(origin.abs_diff_eq(craft.position(), 1e-4));
        // Mesh units still shrink by the world scale.
        let tip = (world * model).transform_point3(Vec3::Z * 100.0);
        assert!((tip - origin).abs_diff_eq(Vec3::Z * 2.0, 1e-4));
    }
}
