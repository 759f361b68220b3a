//! Keyboard state.

use std::collections::HashSet;

pub use winit::keyboard::KeyCode;

/// Keys held down, plus the keys pressed since the last
/// [`begin_frame`](InputState::begin_frame).
#[derive(Debug, Default, Clone)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    just_pressed_keys: HashSet<KeyCode>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears per-frame state. Call once per frame before pumping events.
    pub fn begin_frame(&mut self) {
        self.just_pressed_keys.clear();
    }

    pub fn on_key_pressed(&mut self, key: KeyCode) {
        if self.pressed_keys.insert(key) {
            self.just_pressed_keys.insert(key);
        }
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    /// Releases every key, e.g. when the window loses focus and release
    /// events would be missed.
    pub fn clear(&mut self) {
        self.pressed_keys.clear();
        self.just_pressed_keys.clear();
    }

    #[inline]
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    /// Whether `key` went down this frame. Key repeat does not count.
    #[inline]
    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_and_release() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyW);
        assert!(input.is_key_pressed(KeyCode::KeyW));
        assert!(input.is_key_just_pressed(KeyCode::KeyW));

        input.begin_frame();
        assert!(input.is_key_pressed(KeyCode::KeyW));
        assert!(!input.is_key_just_pressed(KeyCode::KeyW));

        input.on_key_released(KeyCode::KeyW);
        assert!(!input.is_key_pressed(KeyCode::KeyW));
    }

    #[test]
    fn test_repeat_is_not_just_pressed() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::Escape);
        input.begin_frame();
        input.on_key_pressed(KeyCode::Escape);
        assert!(!input.is_key_just_pressed(KeyCode::Escape));
    }

    #[test]
    fn test_clear_releases_everything() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyA);
        input.on_key_pressed(KeyCode::ArrowUp);
        input.clear();
        assert!(!input.is_key_pressed(KeyCode::KeyA));
        assert!(!input.is_key_pressed(KeyCode::ArrowUp));
    }
}
