//! Camera state and the two rigs that drive it.

use engine_core::{MoveDirection, Vec2, Vec3};
use glam::Mat4;

use crate::craft::CraftState;

/// Look-at camera with a fixed vertical field of view.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraState {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Width / height.
    pub aspect: f32,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 10.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_degrees: 45.0,
            near: 0.1,
            far: 1000.0,
            aspect: 16.0 / 9.0,
        }
    }
}

impl CameraState {
    pub fn set_aspect(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    /// Unit view direction. Falls back to -Z when position and target coincide.
    pub fn direction(&self) -> Vec3 {
        (self.target - self.position).try_normalize().unwrap_or(Vec3::NEG_Z)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_degrees.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

/// Which rig drives the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraMode {
    Free,
    #[default]
    Chase,
}

impl CameraMode {
    pub fn toggled(self) -> Self {
        match self {
            CameraMode::Free => CameraMode::Chase,
            CameraMode::Chase => CameraMode::Free,
        }
    }
}

/// A camera update strategy, run once per frame after the craft has moved.
pub trait CameraController {
    fn update(&mut self, camera: &mut CameraState, craft: &CraftState, dt: f32);
}

/// Fly-through camera steered by movement toggles and look impulses.
#[derive(Debug, Clone)]
pub struct FreeCamera {
    /// `x` forward/back, `y` right/left, each -1, 0 or 1.
    pub movement: Vec2,
    look: Vec2,
    /// World units per second.
    pub speed: f32,
    /// Radians per look unit.
    pub look_rate: f32,
}

impl Default for FreeCamera {
    fn default() -> Self {
        Self {
            movement: Vec2::ZERO,
            look: Vec2::ZERO,
            speed: 5.0,
            look_rate: 0.02,
        }
    }
}

impl FreeCamera {
    pub fn new(speed: f32, look_rate: f32) -> Self {
        Self {
            speed,
            look_rate,
            ..Default::default()
        }
    }

    pub fn set_move(&mut self, direction: MoveDirection, enabled: bool) {
        direction.apply(&mut self.movement, enabled, 1.0);
    }

    /// Queue a look delta (`x` right, `y` down) for the next update.
    pub fn look(&mut self, delta: Vec2) {
        self.look = delta;
    }

    pub fn pending_look(&self) -> Vec2 {
        self.look
    }

    /// Drop a look delta that no update will consume.
    pub fn discard_look(&mut self) {
        self.look = Vec2::ZERO;
    }
}

impl CameraController for FreeCamera {
    fn update(&mut self, camera: &mut CameraState, _craft: &CraftState, dt: f32) {
        let offset = camera.target - camera.position;
        let distance = offset.length().max(f32::EPSILON);
        let mut direction = camera.direction();
        let right = direction.cross(camera.up).try_normalize().unwrap_or(Vec3::X);

        let step = self.movement * self.speed * dt;
        let translation = direction * step.x + right * step.y;
        camera.position += translation;

        if self.look != Vec2::ZERO {
            let yaw = Mat4::from_axis_angle(camera.up, -self.look.x * self.look_rate);
            direction = yaw.transform_vector3(direction);
            let right = direction.cross(camera.up).try_normalize().unwrap_or(right);
            let pitch = Mat4::from_axis_angle(right, -self.look.y * self.look_rate);
            let pitched = pitch.transform_vector3(direction);
            // Never pitch through the up vector.
            if pitched.dot(camera.up).abs() < 0.99 {
                direction = pitched;
            }
            self.look = Vec2::ZERO;
        }
        camera.target = camera.position + direction.normalize() * distance;
    }
}

/// Camera slaved to the craft: behind and above it, looking ahead of its nose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChaseCamera {
    /// Distance behind the craft along its forward axis.
    pub distance: f32,
    /// Height above the craft along its up axis.
    pub height: f32,
    /// How far ahead of the craft the camera looks.
    pub look_ahead: f32,
}

impl Default for ChaseCamera {
    fn default() -> Self {
        Self {
            distance: 8.0,
            height: 2.5,
            look_ahead: 10.0,
        }
    }
}

impl ChaseCamera {
    /// Camera placement for `craft`. Depends on nothing else.
    pub fn place(&self, camera: &mut CameraState, craft: &CraftState) {
        let forward = craft.forward();
        let up = craft.up();
        camera.position = craft.position() - forward * self.distance + up * self.height;
        camera.target = craft.position() + forward * self.look_ahead;
        camera.up = up;
    }
}

impl CameraController for ChaseCamera {
    fn update(&mut self, camera: &mut CameraState, craft: &CraftState, _dt: f32) {
        self.place(camera, craft);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn looking_down_z() -> CameraState {
        CameraState {
            position: Vec3::ZERO,
            target: Vec3::NEG_Z * 10.0,
            ..Default::default()
        }
    }

    #[test]
    fn projection_uses_aspect() {
        let mut camera = CameraState::default();
        camera.set_aspect(1280, 720);
        assert!((camera.aspect - 1280.0 / 720.0).abs() < 1e-6);
        let expected = Mat4::perspective_rh(45f32.to_radians(), 1280.0 / 720.0, 0.1, 1000.0);
        assert_eq!(camera.projection_matrix(), expected);

        camera.set_aspect(10, 0);
        assert_eq!(camera.aspect, 10.0);
    }

    #[test]
    fn free_camera_moves_along_view() {
        let mut camera = looking_down_z();
        let mut rig = FreeCamera::default();
        rig.set_move(MoveDirection::Forward, true);
        rig.update(&mut camera, &CraftState::default(), 0.5);
        assert!(camera.position.abs_diff_eq(Vec3::new(0.0, 0.0, -2.5), 1e-5));
        assert!(camera.target.abs_diff_eq(Vec3::new(0.0, 0.0, -12.5), 1e-5));

        rig.set_move(MoveDirection::Forward, false);
        rig.set_move(MoveDirection::Right, true);
        rig.update(&mut camera, &CraftState::default(), 1.0);
        assert!(camera.position.abs_diff_eq(Vec3::new(5.0, 0.0, -2.5), 1e-5));
    }

    #[test]
    fn look_impulse_is_consumed() {
        let mut camera = looking_down_z();
        let mut rig = FreeCamera::default();
        rig.look(Vec2::new(10.0, 0.0));
        rig.update(&mut camera, &CraftState::default(), 0.016);
        let turned = camera.direction();
        // Positive x looks right.
        assert!(turned.x > 0.0);
        assert_eq!(rig.pending_look(), Vec2::ZERO);
        assert!(((camera.target - camera.position).length() - 10.0).abs() < 1e-4);

        rig.update(&mut camera, &CraftState::default(), 0.016);
        assert!(camera.direction().abs_diff_eq(turned, 1e-6));
    }

    #[test]
    fn configured_rig_starts_idle() {
        let rig = FreeCamera::new(12.0, 0.5);
        assert_eq!(rig.speed, 12.0);
        assert_eq!(rig.look_rate, 0.5);
        assert_eq!(rig.movement, Vec2::ZERO);
        assert_eq!(rig.pending_look(), Vec2::ZERO);
    }

    #[test]
    fn discarded_look_never_turns_the_camera() {
        let mut camera = looking_down_z();
        let before = camera.direction();
        let mut rig = FreeCamera::new(5.0, 0.02);
        rig.look(Vec2::new(40.0, 0.0));
        rig.discard_look();
        rig.update(&mut camera, &CraftState::default(), 0.0);
        assert!(camera.direction().abs_diff_eq(before, 1e-6));
    }

    #[test]
    fn chase_camera_is_a_function_of_the_craft() {
        let craft = CraftState::new(Vec3::new(10.0, 20.0, 0.0));
        let rig = ChaseCamera::default();
        let mut a = looking_down_z();
        let mut b = CameraState::default();
        rig.place(&mut a, &craft);
        rig.place(&mut b, &craft);
        assert_eq!(a.position, b.position);
        assert_eq!(a.target, b.target);
        assert!(a.position.abs_diff_eq(Vec3::new(10.0, 22.5, -8.0), 1e-5));
        assert!(a.target.abs_diff_eq(Vec3::new(10.0, 20.0, 10.0), 1e-5));
    }

    #[test]
    fn mode_toggles() {
        assert_eq!(CameraMode::Chase.toggled(), CameraMode::Free);
        assert_eq!(CameraMode::Free.toggled(), CameraMode::Chase);
    }
}
