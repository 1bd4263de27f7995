//! Windowed game state: window, renderer, input and frame timing.

use std::sync::Arc;

use anyhow::Result;
use engine_core::{MoveDirection, Time};
use input::{Bindings, ControlFocus, InputState, Intent};
use renderer::{CameraMode, GpuDevice, Renderer, ShadowState, WgpuDevice};
use winit::window::{CursorGrabMode, Window};

use crate::assets::SceneLoader;
use crate::config::GameConfig;

/// Movement keys steer whatever the active camera mode follows.
pub fn focus_for(mode: CameraMode) -> ControlFocus {
    match mode {
        CameraMode::Free => ControlFocus::Camera,
        CameraMode::Chase => ControlFocus::Craft,
    }
}

/// Apply one intent to the renderer. Returns false when the app should quit.
pub fn apply_intent<D: GpuDevice>(renderer: &mut Renderer<D>, focus: &mut ControlFocus, intent: Intent) -> bool {
    match intent {
        Intent::CameraMove(direction, held) => renderer.camera_move(direction, held),
        Intent::CraftMove(direction, held) => renderer.craft_move(direction, held),
        Intent::CameraLook(delta) => renderer.camera_look(delta),
        Intent::CraftLook(delta) => renderer.craft_look(delta),
        Intent::Boost(on) => renderer.set_boost(on),
        Intent::ToggleCameraMode => {
            // Held keys belong to the old target.
            for direction in MoveDirection::ALL {
                renderer.camera_move(direction, false);
                renderer.craft_move(direction, false);
            }
            *focus = focus_for(renderer.toggle_camera_mode());
        }
        Intent::ToggleShadows => {
            let enable = renderer.light().shadow_state() != ShadowState::Enabled;
            match renderer.set_cast_shadows(enable) {
                Ok(()) => log::info!("Shadows {}", if enable { "on" } else { "off" }),
                Err(e) => log::error!("Could not enable shadows: {}", e),
            }
        }
        Intent::ToggleShadowInset => {
            let shown = renderer.toggle_shadow_map_inset();
            log::info!("Shadow map inset {}", if shown { "shown" } else { "hidden" });
        }
        Intent::ReloadShaders => {
            if let Err(e) = renderer.reload_shaders() {
                log::error!("Shader reload failed: {}", e);
            }
        }
        Intent::Quit => return false,
    }
    true
}

pub struct GameState {
    pub window: Arc<Window>,
    pub renderer: Renderer<WgpuDevice>,
    pub input: InputState,
    pub bindings: Bindings,
    pub focus: ControlFocus,
    pub time: Time,
    pub running: bool,
}

impl GameState {
    pub async fn new(window: Arc<Window>, config: &GameConfig) -> Result<Self> {
        let mut device = WgpuDevice::new(window.clone()).await?;
        device.set_vsync(config.vsync);

        let size = window.inner_size();
        let base_dir = std::env::current_dir().ok();
        let mut renderer = Renderer::new(
            device,
            config.renderer_settings(),
            Box::new(SceneLoader::new(base_dir)),
        );
        renderer.init(size.width.max(1), size.height.max(1))?;

        let bindings = Bindings {
            mouse_sensitivity: Bindings::default().mouse_sensitivity * config.sensitivity,
            ..Default::default()
        };
        Ok(Self {
            focus: focus_for(renderer.camera_mode()),
            window,
            renderer,
            input: InputState::new(),
            bindings,
            time: Time::new(),
            running: true,
        })
    }

    /// One frame: intents, update, render.
    pub fn frame(&mut self) {
        self.time.update();
        let intents = self.bindings.collect(&self.input, self.focus);
        self.input.begin_frame();
        for intent in intents {
            if !apply_intent(&mut self.renderer, &mut self.focus, intent) {
                self.running = false;
            }
        }

        self.renderer.update(self.time.delta_seconds());
        match self.renderer.render() {
            Ok(stats) if stats.gpu_errors > 0 => {
                log::warn!("Frame {} had {} GPU errors", self.time.frame_count(), stats.gpu_errors)
            }
            Ok(_) => {}
            Err(e) => log::error!("Render error: {}", e),
        }
    }

    pub fn lock_cursor(&mut self) {
        let _ = self
            .window
            .set_cursor_grab(CursorGrabMode::Locked)
            .or_else(|_| self.window.set_cursor_grab(CursorGrabMode::Confined));
        self.window.set_cursor_visible(false);
        self.input.set_cursor_locked(true);
    }

    pub fn unlock_cursor(&mut self) {
        self.window.set_cursor_visible(true);
        let _ = self.window.set_cursor_grab(CursorGrabMode::None);
        self.input.set_cursor_locked(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::{MeshSource, ProceduralMesh};
    use renderer::HeadlessDevice;

    fn headless() -> Renderer<HeadlessDevice> {
        let mut settings = GameConfig::default().renderer_settings();
        settings.assets[0].source = MeshSource::Procedural(ProceduralMesh::Terrain {
            size: 32.0,
            resolution: 4,
            height_scale: 2.0,
            seed: 1,
        });
        let mut renderer = Renderer::new(
            HeadlessDevice::new(64, 64),
            settings,
            Box::new(SceneLoader::default()),
        );
        renderer.init(64, 64).unwrap();
        renderer
    }

    #[test]
    fn camera_toggle_moves_focus_and_drops_held_keys() {
        let mut renderer = headless();
        let mut focus = focus_for(renderer.camera_mode());
        assert_eq!(focus, ControlFocus::Craft);

        apply_intent(&mut renderer, &mut focus, Intent::CraftMove(MoveDirection::Forward, true));
        assert_eq!(renderer.craft().movement().x, 1.0);

        apply_intent(&mut renderer, &mut focus, Intent::ToggleCameraMode);
        assert_eq!(focus, ControlFocus::Camera);
        assert_eq!(renderer.camera_mode(), CameraMode::Free);
        assert_eq!(renderer.craft().movement().x, 0.0);
    }

    #[test]
    fn shadow_toggle_flips_state() {
        let mut renderer = headless();
        let mut focus = ControlFocus::Craft;
        assert!(apply_intent(&mut renderer, &mut focus, Intent::ToggleShadows));
        assert_eq!(renderer.light().shadow_state(), ShadowState::Enabled);
        apply_intent(&mut renderer, &mut focus, Intent::ToggleShadows);
        assert_eq!(renderer.light().shadow_state(), ShadowState::Disabled);
    }

    #[test]
    fn quit_stops_the_loop() {
        let mut renderer = headless();
        let mut focus = ControlFocus::Craft;
        assert!(!apply_intent(&mut renderer, &mut focus, Intent::Quit));
        assert!(apply_intent(&mut renderer, &mut focus, Intent::ReloadShaders));
    }
}
