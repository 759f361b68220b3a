//! Free-flying keyboard controller for the viewer.

use glam::Vec3;
use orbit_platform::{InputState, KeyCode};

use crate::transform::{Transform, WORLD_UP};

/// Key bindings for [`KeyboardController`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyMappings {
    pub move_left: KeyCode,
    pub move_right: KeyCode,
    pub move_forward: KeyCode,
    pub move_backward: KeyCode,
    pub move_up: KeyCode,
    pub move_down: KeyCode,
    pub look_left: KeyCode,
    pub look_right: KeyCode,
    pub look_up: KeyCode,
    pub look_down: KeyCode,
}

impl Default for KeyMappings {
    fn default() -> Self {
        Self {
            move_left: KeyCode::KeyA,
            move_right: KeyCode::KeyD,
            move_forward: KeyCode::KeyW,
            move_backward: KeyCode::KeyS,
            move_up: KeyCode::KeyE,
            move_down: KeyCode::KeyQ,
            look_left: KeyCode::ArrowLeft,
            look_right: KeyCode::ArrowRight,
            look_up: KeyCode::ArrowUp,
            look_down: KeyCode::ArrowDown,
        }
    }
}

/// Moves a transform on the XZ plane from keyboard state.
///
/// Look keys yaw about the world up axis and pitch about the transform's own
/// X axis, so no roll builds up. Movement follows the orientation after this
/// frame's look rotation; up and down always follow the world axis.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyboardController {
    pub keys: KeyMappings,
    /// World units per second.
    pub move_speed: f32,
    /// Radians per second.
    pub look_speed: f32,
}

impl Default for KeyboardController {
    fn default() -> Self {
        Self {
            keys: KeyMappings::default(),
            move_speed: 3.0,
            look_speed: 1.5,
        }
    }
}

impl KeyboardController {
    pub fn new(move_speed: f32, look_speed: f32) -> Self {
        Self {
            move_speed,
            look_speed,
            ..Default::default()
        }
    }

    /// Applies one frame of input, `dt` seconds long, to `transform`.
    pub fn move_in_plane_xz(&self, input: &InputState, dt: f32, transform: &mut Transform) {
        let axis = |positive: KeyCode, negative: KeyCode| {
            let mut value = 0.0;
            if input.is_key_pressed(positive) {
                value += 1.0;
            }
            if input.is_key_pressed(negative) {
                value -= 1.0;
            }
            value
        };

        let rotate = Vec3::new(
            axis(self.keys.look_up, self.keys.look_down),
            axis(self.keys.look_left, self.keys.look_right),
            0.0,
        );
        if rotate.length_squared() > f32::EPSILON {
            let step = self.look_speed * dt;
            transform.euler_rotate_global(Vec3::new(0.0, rotate.y, 0.0) * step);
            transform.euler_rotate_local(Vec3::new(rotate.x, 0.0, 0.0) * step);
        }

        let forward = transform.forward();
        let right = transform.right();
        let move_dir = forward * axis(self.keys.move_forward, self.keys.move_backward)
            + right * axis(self.keys.move_right, self.keys.move_left)
            + WORLD_UP * axis(self.keys.move_up, self.keys.move_down);

        if move_dir.length_squared() > f32::EPSILON {
            transform.translation += self.move_speed * dt * move_dir.normalize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn pressed(keys: &[KeyCode]) -> InputState {
        let mut input = InputState::new();
        for &key in keys {
            input.on_key_pressed(key);
        }
        input
    }

    #[test]
    fn test_forward_for_half_second() {
        let controller = KeyboardController::default();
        let mut transform = Transform::new();
        controller.move_in_plane_xz(&pressed(&[KeyCode::KeyW]), 0.5, &mut transform);
        assert_abs_diff_eq!(transform.translation, Vec3::new(0.0, 0.0, 1.5), epsilon = 1e-5);
    }

    #[test]
    fn test_opposing_keys_cancel() {
        let controller = KeyboardController::default();
        let mut transform = Transform::new();
        let input = pressed(&[KeyCode::KeyW, KeyCode::KeyS, KeyCode::ArrowLeft, KeyCode::ArrowRight]);
        controller.move_in_plane_xz(&input, 1.0, &mut transform);
        assert_eq!(transform, Transform::new());
    }

    #[test]
    fn test_diagonal_movement_is_normalized() {
        let controller = KeyboardController::default();
        let mut transform = Transform::new();
        let input = pressed(&[KeyCode::KeyW, KeyCode::KeyD]);
        controller.move_in_plane_xz(&input, 0.5, &mut transform);
        assert_abs_diff_eq!(transform.translation.length(), 1.5, epsilon = 1e-5);
        assert!(transform.translation.x > 0.0 && transform.translation.z > 0.0);
    }

    #[test]
    fn test_up_key_moves_against_y() {
        let controller = KeyboardController::default();
        let mut transform = Transform::new();
        controller.move_in_plane_xz(&pressed(&[KeyCode::KeyE]), 1.0, &mut transform);
        assert_abs_diff_eq!(transform.translation, Vec3::new(0.0, -3.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_look_left_yaws_and_moves_along_new_facing() {
        let controller = KeyboardController::default();
        let mut transform = Transform::new();
        let input = pressed(&[KeyCode::ArrowLeft, KeyCode::KeyW]);
        controller.move_in_plane_xz(&input, 0.5, &mut transform);

        assert_abs_diff_eq!(transform.yaw(), 0.75, epsilon = 1e-5);
        assert_abs_diff_eq!(transform.pitch(), 0.0, epsilon = 1e-5);
        // Moved along the rotated forward, which now leans towards -X.
        assert!(transform.translation.x < 0.0);
        assert_abs_diff_eq!(transform.translation.length(), 1.5, epsilon = 1e-5);
    }

    #[test]
    fn test_pitch_does_not_roll() {
        let controller = KeyboardController::default();
        let mut transform = Transform::new();
        for _ in 0..10 {
            controller.move_in_plane_xz(&pressed(&[KeyCode::ArrowUp, KeyCode::ArrowRight]), 0.05, &mut transform);
        }
        assert_abs_diff_eq!(transform.roll(), 0.0, epsilon = 1e-4);
        assert!(transform.pitch() > 0.0);
        assert!(transform.yaw() < 0.0);
    }
}
