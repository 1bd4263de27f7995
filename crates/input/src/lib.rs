//! Keyboard and mouse state, translated into discrete flight intents.

mod intents;

pub use intents::*;

use glam::Vec2;
use std::collections::HashSet;

/// Manages input state for the current frame.
#[derive(Debug, Default)]
pub struct InputState {
    /// Keys currently held down.
    keys_held: HashSet<KeyCode>,
    /// Keys pressed this frame.
    keys_pressed: HashSet<KeyCode>,
    /// Keys released this frame.
    keys_released: HashSet<KeyCode>,

    /// Mouse buttons currently held.
    mouse_held: HashSet<MouseButton>,

    /// Mouse movement accumulated since the last `begin_frame`.
    accumulated_delta: Vec2,

    /// Whether the cursor is captured/locked.
    cursor_locked: bool,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear per-frame state. Call once per frame after intents are collected.
    pub fn begin_frame(&mut self) {
        self.keys_pressed.clear();
        self.keys_released.clear();
        self.accumulated_delta = Vec2::ZERO;
    }

    /// Process a keyboard event. Key repeat does not re-trigger a press.
    pub fn process_keyboard(&mut self, key: KeyCode, state: ElementState) {
        match state {
            ElementState::Pressed => {
                if !self.keys_held.contains(&key) {
                    self.keys_pressed.insert(key);
                }
                self.keys_held.insert(key);
            }
            ElementState::Released => {
                if self.keys_held.remove(&key) {
                    self.keys_released.insert(key);
                }
            }
        }
    }

    /// Process a mouse button event.
    pub fn process_mouse_button(&mut self, button: MouseButton, state: ElementState) {
        match state {
            ElementState::Pressed => {
                self.mouse_held.insert(button);
            }
            ElementState::Released => {
                self.mouse_held.remove(&button);
            }
        }
    }

    /// Process raw mouse movement.
    pub fn process_mouse_motion(&mut self, delta: (f64, f64)) {
        self.accumulated_delta.x += delta.0 as f32;
        self.accumulated_delta.y += delta.1 as f32;
    }

    /// Drop every held key, e.g. when the window loses focus.
    pub fn release_all(&mut self) {
        self.keys_released.extend(self.keys_held.drain());
        self.mouse_held.clear();
    }

    pub fn is_key_held(&self, key: KeyCode) -> bool {
        self.keys_held.contains(&key)
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    pub fn is_key_released(&self, key: KeyCode) -> bool {
        self.keys_released.contains(&key)
    }

    pub fn is_mouse_held(&self, button: MouseButton) -> bool {
        self.mouse_held.contains(&button)
    }

    /// Mouse movement since the last `begin_frame`.
    pub fn mouse_delta(&self) -> Vec2 {
        self.accumulated_delta
    }

    pub fn is_cursor_locked(&self) -> bool {
        self.cursor_locked
    }

    pub fn set_cursor_locked(&mut self, locked: bool) {
        self.cursor_locked = locked;
    }
}

// Re-export for convenience
pub use winit::event::{ElementState, MouseButton};
pub use winit::keyboard::KeyCode;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_and_release_edges() {
        let mut input = InputState::new();
        input.process_keyboard(KeyCode::KeyW, ElementState::Pressed);
        assert!(input.is_key_pressed(KeyCode::KeyW));
        assert!(input.is_key_held(KeyCode::KeyW));

        input.begin_frame();
        // OS key repeat
        input.process_keyboard(KeyCode::KeyW, ElementState::Pressed);
        assert!(!input.is_key_pressed(KeyCode::KeyW));

        input.process_keyboard(KeyCode::KeyW, ElementState::Released);
        assert!(input.is_key_released(KeyCode::KeyW));
        assert!(!input.is_key_held(KeyCode::KeyW));
    }

    #[test]
    fn release_without_press_is_ignored() {
        let mut input = InputState::new();
        input.process_keyboard(KeyCode::KeyA, ElementState::Released);
        assert!(!input.is_key_released(KeyCode::KeyA));
    }

    #[test]
    fn mouse_motion_accumulates_until_begin_frame() {
        let mut input = InputState::new();
        input.process_mouse_motion((2.0, 1.0));
        input.process_mouse_motion((3.0, -1.0));
        assert_eq!(input.mouse_delta(), Vec2::new(5.0, 0.0));
        input.begin_frame();
        assert_eq!(input.mouse_delta(), Vec2::ZERO);
    }
}
