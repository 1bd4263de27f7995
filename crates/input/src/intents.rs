//! Key bindings and the intents they produce.
//!
//! Movement keys emit an intent on the press edge (`true`) and on the release
//! edge (`false`), so the consumer holds a toggle rather than polling keys.
//! Look intents are impulses: one per frame while there is motion.

use glam::Vec2;

pub use engine_core::MoveDirection;

use crate::{InputState, KeyCode};

/// What the movement keys and mouse currently steer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlFocus {
    /// Free-fly camera.
    #[default]
    Camera,
    /// The craft (chase camera follows it).
    Craft,
}

/// A discrete request for the scene, produced from raw input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intent {
    CameraMove(MoveDirection, bool),
    CraftMove(MoveDirection, bool),
    CameraLook(Vec2),
    CraftLook(Vec2),
    Boost(bool),
    ToggleCameraMode,
    ToggleShadows,
    ToggleShadowInset,
    ReloadShaders,
    Quit,
}

/// Key assignments and look sensitivities.
#[derive(Debug, Clone)]
pub struct Bindings {
    pub forward: KeyCode,
    pub back: KeyCode,
    pub left: KeyCode,
    pub right: KeyCode,
    pub turn_left: KeyCode,
    pub turn_right: KeyCode,
    pub turn_up: KeyCode,
    pub turn_down: KeyCode,
    pub boost: [KeyCode; 2],
    pub camera_mode: KeyCode,
    pub shadows: KeyCode,
    pub shadow_inset: KeyCode,
    pub reload: KeyCode,
    pub quit: KeyCode,
    /// Look units per pixel of mouse motion.
    pub mouse_sensitivity: f32,
    /// Look units per frame while a turn key is held.
    pub key_turn: f32,
}

impl Default for Bindings {
    fn default() -> Self {
        Self {
            forward: KeyCode::KeyW,
            back: KeyCode::KeyS,
            left: KeyCode::KeyA,
            right: KeyCode::KeyD,
            turn_left: KeyCode::ArrowLeft,
            turn_right: KeyCode::ArrowRight,
            turn_up: KeyCode::ArrowUp,
            turn_down: KeyCode::ArrowDown,
            boost: [KeyCode::ShiftLeft, KeyCode::ShiftRight],
            camera_mode: KeyCode::KeyC,
            shadows: KeyCode::F2,
            shadow_inset: KeyCode::F3,
            reload: KeyCode::F5,
            quit: KeyCode::Escape,
            mouse_sensitivity: 0.1,
            key_turn: 1.0,
        }
    }
}

impl Bindings {
    pub fn key_for(&self, direction: MoveDirection) -> KeyCode {
        match direction {
            MoveDirection::Forward => self.forward,
            MoveDirection::Back => self.back,
            MoveDirection::Left => self.left,
            MoveDirection::Right => self.right,
        }
    }

    /// Intents for this frame. Call before [`InputState::begin_frame`].
    pub fn collect(&self, input: &InputState, focus: ControlFocus) -> Vec<Intent> {
        let mut intents = Vec::new();

        let movement = |direction, held| match focus {
            ControlFocus::Camera => Intent::CameraMove(direction, held),
            ControlFocus::Craft => Intent::CraftMove(direction, held),
        };
        for direction in MoveDirection::ALL {
            let key = self.key_for(direction);
            if input.is_key_pressed(key) {
                intents.push(movement(direction, true));
            } else if input.is_key_released(key) {
                intents.push(movement(direction, false));
            }
        }

        if self.boost.iter().any(|k| input.is_key_pressed(*k)) {
            intents.push(Intent::Boost(true));
        } else if self.boost.iter().any(|k| input.is_key_released(*k))
            && !self.boost.iter().any(|k| input.is_key_held(*k))
        {
            intents.push(Intent::Boost(false));
        }

        let mouse = input.mouse_delta() * self.mouse_sensitivity;
        if mouse != Vec2::ZERO && input.is_cursor_locked() {
            intents.push(match focus {
                ControlFocus::Camera => Intent::CameraLook(mouse),
                ControlFocus::Craft => Intent::CraftLook(mouse),
            });
        }

        let mut turn = Vec2::ZERO;
        if input.is_key_held(self.turn_left) {
            turn.x -= self.key_turn;
        }
        if input.is_key_held(self.turn_right) {
            turn.x += self.key_turn;
        }
        if input.is_key_held(self.turn_up) {
            turn.y -= self.key_turn;
        }
        if input.is_key_held(self.turn_down) {
            turn.y += self.key_turn;
        }
        if turn != Vec2::ZERO {
            intents.push(Intent::CraftLook(turn));
        }

        let toggles = [
            (self.camera_mode, Intent::ToggleCameraMode),
            (self.shadows, Intent::ToggleShadows),
            (self.shadow_inset, Intent::ToggleShadowInset),
            (self.reload, Intent::ReloadShaders),
            (self.quit, Intent::Quit),
        ];
        for (key, intent) in toggles {
            if input.is_key_pressed(key) {
                intents.push(intent);
            }
        }

        intents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ElementState;

    #[test]
    fn movement_follows_focus() {
        let bindings = Bindings::default();
        let mut input = InputState::new();
        input.process_keyboard(KeyCode::KeyW, ElementState::Pressed);

        let camera = bindings.collect(&input, ControlFocus::Camera);
        assert_eq!(camera, vec![Intent::CameraMove(MoveDirection::Forward, true)]);
        let craft = bindings.collect(&input, ControlFocus::Craft);
        assert_eq!(craft, vec![Intent::CraftMove(MoveDirection::Forward, true)]);

        input.begin_frame();
        assert!(bindings.collect(&input, ControlFocus::Camera).is_empty());

        input.process_keyboard(KeyCode::KeyW, ElementState::Released);
        assert_eq!(
            bindings.collect(&input, ControlFocus::Camera),
            vec![Intent::CameraMove(MoveDirection::Forward, false)]
        );
    }

    #[test]
    fn held_arrows_turn_the_craft_every_frame() {
        let bindings = Bindings::default();
        let mut input = InputState::new();
        input.process_keyboard(KeyCode::ArrowLeft, ElementState::Pressed);
        for _ in 0..2 {
            let intents = bindings.collect(&input, ControlFocus::Camera);
            assert_eq!(intents, vec![Intent::CraftLook(Vec2::new(-1.0, 0.0))]);
            input.begin_frame();
        }
    }

    #[test]
    fn mouse_look_requires_locked_cursor() {
        let bindings = Bindings::default();
        let mut input = InputState::new();
        input.process_mouse_motion((10.0, 0.0));
        assert!(bindings.collect(&input, ControlFocus::Craft).is_empty());

        input.set_cursor_locked(true);
        let intents = bindings.collect(&input, ControlFocus::Craft);
        assert_eq!(intents, vec![Intent::CraftLook(Vec2::new(1.0, 0.0))]);
    }

    #[test]
    fn boost_stays_on_while_either_shift_is_held() {
        let bindings = Bindings::default();
        let mut input = InputState::new();
        input.process_keyboard(KeyCode::ShiftLeft, ElementState::Pressed);
        input.process_keyboard(KeyCode::ShiftRight, ElementState::Pressed);
        assert_eq!(bindings.collect(&input, ControlFocus::Craft), vec![Intent::Boost(true)]);
        input.begin_frame();

        input.process_keyboard(KeyCode::ShiftLeft, ElementState::Released);
        assert!(bindings.collect(&input, ControlFocus::Craft).is_empty());
        input.begin_frame();

        input.process_keyboard(KeyCode::ShiftRight, ElementState::Released);
        assert_eq!(bindings.collect(&input, ControlFocus::Craft), vec![Intent::Boost(false)]);
    }

    #[test]
    fn function_keys_toggle_once_per_press() {
        let bindings = Bindings::default();
        let mut input = InputState::new();
        input.process_keyboard(KeyCode::F2, ElementState::Pressed);
        input.process_keyboard(KeyCode::F5, ElementState::Pressed);
        let intents = bindings.collect(&input, ControlFocus::Camera);
        assert_eq!(intents, vec![Intent::ToggleShadows, Intent::ReloadShaders]);
        input.begin_frame();
        assert!(bindings.collect(&input, ControlFocus::Camera).is_empty());
    }
}
