//! Movement toggles shared by the input layer and the scene.

use glam::Vec2;

/// One of the four movement toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveDirection {
    Forward,
    Back,
    Left,
    Right,
}

impl MoveDirection {
    pub const ALL: [MoveDirection; 4] = [
        MoveDirection::Forward,
        MoveDirection::Back,
        MoveDirection::Left,
        MoveDirection::Right,
    ];

    /// Set the component of `movement` this toggle owns: `x` is forward (+) or
    /// back (-), `y` is right (+) or left (-). Releasing zeroes the component.
    pub fn apply(self, movement: &mut Vec2, enabled: bool, magnitude: f32) {
        let value = if enabled { magnitude } else { 0.0 };
        match self {
            MoveDirection::Forward => movement.x = value,
            MoveDirection::Back => movement.x = -value,
            MoveDirection::Left => movement.y = -value,
            MoveDirection::Right => movement.y = value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggles_share_an_axis() {
        let mut movement = Vec2::ZERO;
        MoveDirection::Forward.apply(&mut movement, true, 1.0);
        MoveDirection::Left.apply(&mut movement, true, 1.0);
        assert_eq!(movement, Vec2::new(1.0, -1.0));

        // Back overrides forward on the same axis; releasing clears it.
        MoveDirection::Back.apply(&mut movement, true, 1.0);
        assert_eq!(movement.x, -1.0);
        MoveDirection::Forward.apply(&mut movement, false, 1.0);
        assert_eq!(movement.x, 0.0);
        assert_eq!(movement.y, -1.0);
    }
}
