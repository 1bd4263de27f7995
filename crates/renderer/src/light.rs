//! The scene's single spotlight and its optional shadow map.

use engine_core::{stable_up, Mat4, Vec3};

use crate::error::{RenderError, RenderResult};
use crate::gpu::{
    Attachment, FramebufferHandle, FramebufferStatus, GpuDevice, TextureDesc, TextureFormat,
    TextureHandle,
};

/// Edge length of the square shadow depth texture.
pub const SHADOW_MAP_RESOLUTION: u32 = 1024;

/// Shadow map lifecycle. `Enabling` is the window between the request and a
/// complete framebuffer; resources are allocated on the first enable only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadowState {
    #[default]
    Disabled,
    Enabling,
    Enabled,
}

/// Fixed perspective frustum the shadow map is rendered with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowFrustum {
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for ShadowFrustum {
    fn default() -> Self {
        Self {
            fov_degrees: 90.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl ShadowFrustum {
    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_degrees.to_radians(), 1.0, self.near, self.far)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ShadowTargets {
    framebuffer: FramebufferHandle,
    depth_texture: TextureHandle,
}

/// A spotlight: position, target, color, cone and falloff exponent.
#[derive(Debug)]
pub struct LightNode {
    name: String,
    position: Vec3,
    target: Vec3,
    direction: Vec3,
    color: Vec3,
    umbra: f32,
    penumbra: f32,
    exponent: f32,
    state: ShadowState,
    shadow: Option<ShadowTargets>,
    resolution: u32,
    pub frustum: ShadowFrustum,
}

impl Default for LightNode {
    fn default() -> Self {
        let mut light = Self {
            name: "spotlight".to_string(),
            position: Vec3::new(5.0, 3.0, 0.0),
            target: Vec3::new(4.0, 2.0, 0.0),
            direction: Vec3::new(-1.0, -1.0, 0.0).normalize(),
            color: Vec3::ONE,
            umbra: 60.0,
            penumbra: 60.0,
            exponent: 2.0,
            state: ShadowState::Disabled,
            shadow: None,
            resolution: SHADOW_MAP_RESOLUTION,
            frustum: ShadowFrustum::default(),
        };
        light.update_direction();
        light
    }
}

impl LightNode {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn update_direction(&mut self) {
        let delta = self.target - self.position;
        if delta.length_squared() <= f32::EPSILON {
            log::warn!(
                "Light '{}': position and target coincide, keeping direction {:?}",
                self.name,
                self.direction
            );
            return;
        }
        self.direction = delta.normalize();
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.update_direction();
    }

    pub fn set_target(&mut self, target: Vec3) {
        self.target = target;
        self.update_direction();
    }

    pub fn set_color(&mut self, color: Vec3) {
        self.color = color;
    }

    /// Inner (umbra) and outer (penumbra) cone angles in degrees.
    pub fn set_cone_size(&mut self, umbra: f32, penumbra: f32) {
        self.umbra = umbra;
        self.penumbra = penumbra;
    }

    pub fn set_exponent(&mut self, exponent: f32) {
        self.exponent = exponent;
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn color(&self) -> Vec3 {
        self.color
    }

    pub fn umbra(&self) -> f32 {
        self.umbra
    }

    pub fn penumbra(&self) -> f32 {
        self.penumbra
    }

    pub fn exponent(&self) -> f32 {
        self.exponent
    }

    pub fn shadow_state(&self) -> ShadowState {
        self.state
    }

    pub fn casts_shadows(&self) -> bool {
        self.state == ShadowState::Enabled
    }

    pub fn shadow_map_resolution(&self) -> u32 {
        self.resolution
    }

    /// Only takes effect before the shadow map is first allocated.
    pub fn set_shadow_map_resolution(&mut self, resolution: u32) {
        if self.shadow.is_some() {
            log::warn!("Light '{}': shadow map already allocated, resolution unchanged", self.name);
            return;
        }
        self.resolution = resolution.max(1);
    }

    pub fn shadow_framebuffer(&self) -> Option<FramebufferHandle> {
        self.shadow.map(|s| s.framebuffer)
    }

    pub fn shadow_depth_texture(&self) -> Option<TextureHandle> {
        self.shadow.map(|s| s.depth_texture)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.direction, stable_up(self.direction))
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.frustum.projection()
    }

    /// Enable or disable shadow casting. Enabling allocates the depth texture and
    /// framebuffer once; later enables reuse them. Disabling keeps them.
    pub fn cast_shadow(&mut self, device: &mut dyn GpuDevice, enable: bool) -> RenderResult<()> {
        if !enable {
            self.state = ShadowState::Disabled;
            return Ok(());
        }
        if self.state == ShadowState::Enabled {
            return Ok(());
        }
        self.state = ShadowState::Enabling;
        if self.shadow.is_none() {
            self.shadow = Some(self.allocate(device)?);
            log::info!(
                "Light '{}': {}x{} shadow map allocated",
                self.name,
                self.resolution,
                self.resolution
            );
        }
        let framebuffer = self.shadow.map(|s| s.framebuffer);
        if let Some(FramebufferStatus::Incomplete(reason)) = framebuffer.map(|fb| device.framebuffer_status(fb)) {
            self.state = ShadowState::Disabled;
            return Err(RenderError::IncompleteFramebuffer {
                label: format!("{} shadow", self.name),
                reason,
            });
        }
        self.state = ShadowState::Enabled;
        Ok(())
    }

    fn allocate(&mut self, device: &mut dyn GpuDevice) -> RenderResult<ShadowTargets> {
        let depth_texture = device.create_texture(&format!("{} shadow depth", self.name));
        let framebuffer = device.create_framebuffer(&format!("{} shadow", self.name));
        let targets = ShadowTargets {
            framebuffer,
            depth_texture,
        };
        let result = device
            .define_texture(
                depth_texture,
                TextureDesc::new(self.resolution, self.resolution, TextureFormat::Depth32),
                None,
            )
            .and_then(|_| device.attach_texture(framebuffer, Attachment::Depth, depth_texture));
        if let Err(error) = result {
            device.delete_framebuffer(framebuffer);
            device.delete_texture(depth_texture);
            self.state = ShadowState::Disabled;
            return Err(error.into());
        }
        Ok(targets)
    }

    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        if let Some(targets) = self.shadow.take() {
            device.delete_framebuffer(targets.framebuffer);
            device.delete_texture(targets.depth_texture);
        }
        self.state = ShadowState::Disabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessDevice;

    #[test]
    fn direction_tracks_position_and_target() {
        let mut light = LightNode::new("test");
        light.set_position(Vec3::new(0.0, 30.0, 0.0));
        light.set_target(Vec3::ZERO);
        assert!(light.direction().abs_diff_eq(Vec3::NEG_Y, 1e-6));

        light.set_target(Vec3::new(10.0, 30.0, 0.0));
        assert!(light.direction().abs_diff_eq(Vec3::X, 1e-6));
        light.set_position(Vec3::new(10.0, 0.0, 0.0));
        assert!(light.direction().abs_diff_eq(Vec3::Y, 1e-6));
    }

    #[test]
    fn coincident_points_keep_previous_direction() {
        let mut light = LightNode::new("test");
        light.set_position(Vec3::ZERO);
        light.set_target(Vec3::X);
        light.set_position(Vec3::X);
        assert_eq!(light.direction(), Vec3::X);
    }

    #[test]
    fn cast_shadow_allocates_once() {
        let mut device = HeadlessDevice::new(4, 4);
        let mut light = LightNode::new("test");
        assert!(light.shadow_framebuffer().is_none());

        light.cast_shadow(&mut device, true).unwrap();
        let fb = light.shadow_framebuffer();
        let depth = light.shadow_depth_texture();
        assert!(fb.is_some() && depth.is_some());
        assert_eq!(light.shadow_state(), ShadowState::Enabled);

        light.cast_shadow(&mut device, true).unwrap();
        assert_eq!(light.shadow_framebuffer(), fb);
        assert_eq!(device.stats().framebuffers_created, 1);
        assert_eq!(device.stats().textures_created, 1);

        light.cast_shadow(&mut device, false).unwrap();
        assert_eq!(light.shadow_state(), ShadowState::Disabled);
        assert_eq!(light.shadow_depth_texture(), depth);

        light.cast_shadow(&mut device, true).unwrap();
        assert_eq!(device.stats().framebuffers_created, 1);
        assert!(device.framebuffer_status(fb.unwrap()).is_complete());

        light.release(&mut device);
        assert_eq!(device.stats().live_framebuffers(), 0);
        assert!(device.take_error().is_none());
    }

    #[test]
    fn projection_uses_fixed_frustum() {
        let light = LightNode::new("test");
        let expected = Mat4::perspective_rh(90f32.to_radians(), 1.0, 0.1, 100.0);
        assert_eq!(light.projection_matrix(), expected);
    }
}
