use std::collections::HashSet;

use glam::Vec2;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::camera::{Camera, CameraMovement, ProjectionMode};

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Escape,
}

const MOVEMENT_KEYS: [(char, CameraMovement); 6] = [
    ('W', CameraMovement::Forward),
    ('S', CameraMovement::Backward),
    ('A', CameraMovement::Left),
    ('D', CameraMovement::Right),
    ('E', CameraMovement::Up),
    ('Q', CameraMovement::Down),
];

const PROJECTION_KEY: KeyCode = KeyCode::Character('P');
const CLOSE_KEY: KeyCode = KeyCode::Named(NamedKey::Escape);

/// Keys currently held down.
#[derive(Debug, Default)]
pub struct InputState {
    keys: HashSet<KeyCode>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the key was not already down.
    pub fn set_key_down(&mut self, key: KeyCode) -> bool {
        self.keys.insert(key)
    }

    pub fn set_key_up(&mut self, key: KeyCode) {
        self.keys.remove(&key);
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.contains(&key)
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }
}

/// Turns window events into camera motion and projection changes.
#[derive(Debug, Default)]
pub struct InputController {
    state: InputState,
    last_cursor: Option<Vec2>,
    projection: ProjectionMode,
    close_requested: bool,
}

impl InputController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &InputState {
        &self.state
    }

    pub fn projection(&self) -> ProjectionMode {
        self.projection
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    pub fn toggle_projection(&mut self) {
        self.projection.toggle();
        debug!("projection switched to {:?}", self.projection);
    }

    /// Records a key transition. The projection key acts on press only, so
    /// holding it does not flicker between modes.
    pub fn on_key(&mut self, key: KeyCode, pressed: bool) {
        if !pressed {
            self.state.set_key_up(key);
            return;
        }
        let newly_pressed = self.state.set_key_down(key);
        if !newly_pressed {
            return;
        }
        if key == PROJECTION_KEY {
            self.toggle_projection();
        } else if key == CLOSE_KEY {
            self.request_close();
        }
    }

    /// Applies every held movement key to the camera for this frame.
    pub fn process_held_keys(&self, camera: &mut Camera, dt: f32) {
        for (ch, direction) in MOVEMENT_KEYS {
            if self.state.is_key_down(KeyCode::Character(ch)) {
                camera.process_key(direction, dt);
            }
        }
    }

    /// Mouse-look. The first event only records the cursor; screen y grows
    /// downward, so the vertical delta is inverted.
    pub fn on_cursor_move(&mut self, camera: &mut Camera, x: f32, y: f32) {
        let position = Vec2::new(x, y);
        let Some(last) = self.last_cursor.replace(position) else {
            return;
        };
        camera.process_mouse_delta(position.x - last.x, last.y - position.y);
    }

    pub fn on_scroll(&mut self, camera: &mut Camera, dy: f32) {
        camera.process_scroll(dy);
    }

    /// Forgets held keys and the cursor anchor, e.g. when the window loses focus.
    pub fn reset(&mut self) {
        self.state.clear();
        self.last_cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn input_state_tracks_keys() {
        let mut state = InputState::new();
        assert!(state.set_key_down(KeyCode::Character('W')));
        assert!(!state.set_key_down(KeyCode::Character('W')));
        assert!(state.is_key_down(KeyCode::Character('W')));
        state.set_key_up(KeyCode::Character('W'));
        assert!(!state.is_key_down(KeyCode::Character('W')));
    }

    #[test]
    fn first_cursor_event_only_seeds_position() {
        let mut input = InputController::new();
        let mut camera = Camera::new(Vec3::ZERO);
        let yaw = camera.yaw();

        input.on_cursor_move(&mut camera, 400.0, 300.0);
        assert_eq!(camera.yaw(), yaw);
        assert_eq!(camera.pitch(), 0.0);

        input.on_cursor_move(&mut camera, 410.0, 300.0);
        assert!((camera.yaw() - (yaw + 10.0 * camera.mouse_sensitivity)).abs() < 1e-5);
    }

    #[test]
    fn moving_cursor_up_pitches_up() {
        let mut input = InputController::new();
        let mut camera = Camera::new(Vec3::ZERO);
        input.on_cursor_move(&mut camera, 0.0, 100.0);
        input.on_cursor_move(&mut camera, 0.0, 80.0);
        assert!(camera.pitch() > 0.0);
    }

    #[test]
    fn projection_key_toggles_on_press_edge() {
        let mut input = InputController::new();
        let p = KeyCode::Character('P');
        input.on_key(p, true);
        assert_eq!(input.projection(), ProjectionMode::Orthographic);
        // key repeat while held
        input.on_key(p, true);
        assert_eq!(input.projection(), ProjectionMode::Orthographic);
        input.on_key(p, false);
        input.on_key(p, true);
        assert_eq!(input.projection(), ProjectionMode::Perspective);
    }

    #[test]
    fn held_keys_combine() {
        let mut input = InputController::new();
        input.on_key(KeyCode::Character('W'), true);
        input.on_key(KeyCode::Character('D'), true);
        let mut camera = Camera::new(Vec3::ZERO);
        input.process_held_keys(&mut camera, 0.1);
        let expected = (camera.front() + camera.right()) * camera.movement_speed() * 0.1;
        assert!((camera.position - expected).length() < 1e-5);
    }

    #[test]
    fn escape_requests_close() {
        let mut input = InputController::new();
        assert!(!input.close_requested());
        input.on_key(KeyCode::Named(NamedKey::Escape), true);
        assert!(input.close_requested());
    }
}
