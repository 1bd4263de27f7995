//! Window and device event handling for GameState.

use winit::event::{DeviceEvent, WindowEvent};

impl crate::state::GameState {
    /// Handle a window event. Returns true if the app should exit.
    pub(crate) fn handle_window_event(&mut self, event: WindowEvent) -> bool {
        match event {
            WindowEvent::CloseRequested => {
                self.running = false;
                true
            }
            WindowEvent::Resized(size) => {
                // Minimized windows report 0x0.
                if size.width == 0 || size.height == 0 {
                    return false;
                }
                if let Err(e) = self.renderer.resize_buffers(size.width, size.height) {
                    log::error!("Resize to {}x{} failed, keeping previous size: {}", size.width, size.height, e);
                }
                false
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let winit::keyboard::PhysicalKey::Code(key) = event.physical_key {
                    self.input.process_keyboard(key, event.state);
                }
                false
            }
            WindowEvent::MouseInput { state, button, .. } => {
                self.input.process_mouse_button(button, state);
                if state.is_pressed() && !self.input.is_cursor_locked() {
                    self.lock_cursor();
                }
                false
            }
            WindowEvent::Focused(false) => {
                self.input.release_all();
                self.unlock_cursor();
                false
            }
            WindowEvent::RedrawRequested => {
                self.frame();
                self.window.request_redraw();
                !self.running
            }
            _ => false,
        }
    }

    /// Handle device events (e.g. raw mouse motion).
    pub(crate) fn handle_device_event(&mut self, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta } = event {
            if self.input.is_cursor_locked() {
                self.input.process_mouse_motion(delta);
            }
        }
    }
}
