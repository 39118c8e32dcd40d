use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

pub const DEFAULT_YAW: f32 = -90.0;
pub const DEFAULT_PITCH: f32 = 0.0;
pub const DEFAULT_SPEED: f32 = 10.0;
pub const DEFAULT_SENSITIVITY: f32 = 0.1;
pub const DEFAULT_ZOOM: f32 = 45.0;

pub const PITCH_LIMIT: f32 = 89.0;
pub const MIN_SPEED: f32 = 1.0;
pub const MAX_SPEED: f32 = 50.0;

pub const NEAR_PLANE: f32 = 0.1;
pub const FAR_PLANE: f32 = 100.0;

/// Direction requested by a held movement key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraMovement {
    Forward,
    Backward,
    Left,
    Right,
    Up,
    Down,
}

/// Free-fly camera driven by yaw/pitch Euler angles.
///
/// `front`, `right` and `up` are always derived from `yaw`/`pitch` and kept
/// at unit length; they are never edited directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub position: Vec3,
    front: Vec3,
    up: Vec3,
    right: Vec3,
    world_up: Vec3,
    yaw: f32,
    pitch: f32,
    /// Field of view in degrees, only read by the perspective projection.
    pub zoom: f32,
    movement_speed: f32,
    pub mouse_sensitivity: f32,
}

impl Camera {
    pub fn new(position: Vec3) -> Self {
        Self::with_angles(position, DEFAULT_YAW, DEFAULT_PITCH)
    }

    pub fn with_angles(position: Vec3, yaw: f32, pitch: f32) -> Self {
        let mut camera = Self {
            position,
            front: Vec3::NEG_Z,
            up: Vec3::Y,
            right: Vec3::X,
            world_up: Vec3::Y,
            yaw,
            pitch: pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT),
            zoom: DEFAULT_ZOOM,
            movement_speed: DEFAULT_SPEED,
            mouse_sensitivity: DEFAULT_SENSITIVITY,
        };
        camera.update_vectors();
        camera
    }

    pub fn front(&self) -> Vec3 {
        self.front
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn right(&self) -> Vec3 {
        self.right
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn movement_speed(&self) -> f32 {
        self.movement_speed
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front, self.up)
    }

    /// Moves the eye along one of its local axes.
    pub fn process_key(&mut self, direction: CameraMovement, dt: f32) {
        let velocity = self.movement_speed * dt;
        let axis = match direction {
            CameraMovement::Forward => self.front,
            CameraMovement::Backward => -self.front,
            CameraMovement::Left => -self.right,
            CameraMovement::Right => self.right,
            CameraMovement::Up => self.up,
            CameraMovement::Down => -self.up,
        };
        self.position += axis * velocity;
    }

    pub fn process_mouse_delta(&mut self, dx: f32, dy: f32) {
        self.yaw += dx * self.mouse_sensitivity;
        self.pitch = (self.pitch + dy * self.mouse_sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.update_vectors();
    }

    /// Scroll adjusts how fast the camera travels, not the field of view.
    pub fn process_scroll(&mut self, dy: f32) {
        self.movement_speed = (self.movement_speed + dy).clamp(MIN_SPEED, MAX_SPEED);
    }

    fn update_vectors(&mut self) {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        let front = Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos());
        self.front = front.normalize();
        self.right = self.front.cross(self.world_up).normalize();
        self.up = self.right.cross(self.front).normalize();
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::ZERO)
    }
}

/// Which projection the frame renderer builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProjectionMode {
    #[default]
    Perspective,
    Orthographic,
}

impl ProjectionMode {
    pub fn toggle(&mut self) {
        *self = match self {
            Self::Perspective => Self::Orthographic,
            Self::Orthographic => Self::Perspective,
        };
    }

    /// Builds the projection for a `width`×`height` viewport.
    ///
    /// Orthographic half-extents are the viewport size divided by `ortho_divisor`.
    pub fn matrix(self, zoom: f32, (width, height): (u32, u32), ortho_divisor: f32) -> Mat4 {
        let width = width.max(1) as f32;
        let height = height.max(1) as f32;
        match self {
            Self::Perspective => {
                Mat4::perspective_rh(zoom.to_radians(), width / height, NEAR_PLANE, FAR_PLANE)
            }
            Self::Orthographic => {
                let (half_w, half_h) = (width / ortho_divisor, height / ortho_divisor);
                Mat4::orthographic_rh(-half_w, half_w, -half_h, half_h, NEAR_PLANE, FAR_PLANE)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn front_is_unit_length_for_any_yaw() {
        let mut camera = Camera::default();
        for step in 0..720 {
            camera.process_mouse_delta(5.0, if step % 2 == 0 { 3.0 } else { -3.0 });
            assert!((camera.front().length() - 1.0).abs() < EPS, "yaw {}", camera.yaw());
            assert!((camera.up().length() - 1.0).abs() < EPS);
            assert!((camera.right().length() - 1.0).abs() < EPS);
            assert!(camera.front().dot(camera.right()).abs() < 1e-4);
            assert!(camera.up().dot(camera.right()).abs() < 1e-4);
        }
    }

    #[test]
    fn pitch_is_clamped_and_up_never_flips() {
        let mut camera = Camera::default();
        let mut previous_up = camera.up();
        for _ in 0..200 {
            camera.process_mouse_delta(0.0, 10.0);
            assert!(camera.pitch() <= PITCH_LIMIT);
            assert!(camera.up().y > 0.0);
            assert!(camera.up().dot(previous_up) > 0.0);
            previous_up = camera.up();
        }
        assert_eq!(camera.pitch(), PITCH_LIMIT);

        for _ in 0..400 {
            camera.process_mouse_delta(0.0, -10.0);
            assert!(camera.pitch() >= -PITCH_LIMIT);
            assert!(camera.up().y > 0.0);
        }
        assert_eq!(camera.pitch(), -PITCH_LIMIT);
    }

    #[test]
    fn construction_clamps_pitch() {
        let camera = Camera::with_angles(Vec3::ZERO, 0.0, 120.0);
        assert_eq!(camera.pitch(), PITCH_LIMIT);
    }

    #[test]
    fn scroll_moves_speed_with_sign_and_stays_positive() {
        let mut camera = Camera::default();
        let start = camera.movement_speed();
        camera.process_scroll(2.0);
        assert!(camera.movement_speed() > start);
        let raised = camera.movement_speed();
        camera.process_scroll(-1.0);
        assert!(camera.movement_speed() < raised);

        for _ in 0..100 {
            camera.process_scroll(-3.0);
            assert!(camera.movement_speed() > 0.0);
        }
        assert_eq!(camera.movement_speed(), MIN_SPEED);
        assert_eq!(camera.zoom, DEFAULT_ZOOM);
    }

    #[test]
    fn combined_keys_sum_unit_directions_in_any_order() {
        let dt = 0.016;
        let start = Vec3::new(1.0, 2.0, 3.0);
        let keys = [
            CameraMovement::Forward,
            CameraMovement::Left,
            CameraMovement::Up,
        ];

        let mut a = Camera::new(start);
        for key in keys {
            a.process_key(key, dt);
        }
        let mut b = Camera::new(start);
        for key in keys.iter().rev() {
            b.process_key(*key, dt);
        }

        let expected =
            start + (a.front() - a.right() + a.up()) * a.movement_speed() * dt;
        assert!((a.position - expected).length() < EPS);
        assert!((a.position - b.position).length() < EPS);
    }

    #[test]
    fn opposite_keys_cancel() {
        let mut camera = Camera::new(Vec3::ZERO);
        camera.process_key(CameraMovement::Forward, 0.5);
        camera.process_key(CameraMovement::Backward, 0.5);
        assert!(camera.position.length() < EPS);
    }

    #[test]
    fn default_view_looks_down_negative_z() {
        let camera = Camera::new(Vec3::new(0.0, 0.0, 5.0));
        let origin = camera.view_matrix().transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(0.0, 0.0, -5.0)).length() < 1e-4);
    }

    #[test]
    fn projection_toggle_round_trips() {
        let mut mode = ProjectionMode::default();
        assert_eq!(mode, ProjectionMode::Perspective);
        mode.toggle();
        assert_eq!(mode, ProjectionMode::Orthographic);
        mode.toggle();
        assert_eq!(mode, ProjectionMode::Perspective);
    }

    #[test]
    fn orthographic_extents_follow_viewport() {
        let ortho = ProjectionMode::Orthographic.matrix(45.0, (800, 600), 50.0);
        // 800 / 50 = 16 units of half-width map to clip x = 1.
        let edge = ortho.project_point3(Vec3::new(16.0, 12.0, -1.0));
        assert!((edge.x - 1.0).abs() < 1e-4);
        assert!((edge.y - 1.0).abs() < 1e-4);
    }

    #[test]
    fn perspective_uses_zoom_and_viewport_aspect() {
        let expected = Mat4::perspective_rh(45f32.to_radians(), 800.0 / 600.0, NEAR_PLANE, FAR_PLANE);
        assert_eq!(ProjectionMode::Perspective.matrix(45.0, (800, 600), 50.0), expected);
        assert_eq!((NEAR_PLANE, FAR_PLANE), (0.1, 100.0));

        let wide = ProjectionMode::Perspective.matrix(45.0, (1600, 600), 50.0);
        assert_ne!(wide, expected);
        assert_eq!(wide.y_axis, expected.y_axis);
    }
}
