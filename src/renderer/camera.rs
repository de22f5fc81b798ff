use glam::{EulerRot, Mat3, Mat4, Vec3};

/// Position and orientation of the viewer.
/// The view matrix is only recomputed by [`Camera::render`].
#[derive(Debug)]
pub struct Camera {
    position: Vec3,
    // Pitch, yaw and roll in degrees
    rotation: Vec3,
    view: Mat4,
}

impl Camera {
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            view: Mat4::IDENTITY,
        }
    }

    pub fn set_position(&mut self, x: f32, y: f32, z: f32) {
        self.position = Vec3::new(x, y, z);
    }

    /// Angles are in degrees
    pub fn set_rotation(&mut self, pitch: f32, yaw: f32, roll: f32) {
        self.rotation = Vec3::new(pitch, yaw, roll);
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn rotation(&self) -> Vec3 {
        self.rotation
    }

    /// Rebuilds the left-handed view matrix from the current position and rotation
    pub fn render(&mut self) {
        let pitch = self.rotation.x.to_radians();
        let yaw = self.rotation.y.to_radians();
        let roll = self.rotation.z.to_radians();

        // Roll about Z, then pitch about X, then yaw about Y
        let rotation = Mat3::from_euler(EulerRot::YXZ, yaw, pitch, roll);
        let up = rotation * Vec3::Y;
        let look_at = self.position + rotation * Vec3::Z;

        self.view = Mat4::look_at_lh(self.position, look_at, up);
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.view
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: Vec3, expected: Vec3) {
        assert!(
            actual.abs_diff_eq(expected, 1e-5),
            "expected {:?}, got {:?}", expected, actual,
        );
    }

    #[test]
    fn view_is_stale_until_render() {
        let mut camera = Camera::new();
        camera.set_position(0.0, 0.0, -5.0);
        assert_eq!(camera.view_matrix(), Mat4::IDENTITY);

        camera.render();
        assert_ne!(camera.view_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn default_orientation_looks_down_positive_z() {
        let mut camera = Camera::new();
        camera.set_position(0.0, 0.0, -5.0);
        camera.render();

        let view = camera.view_matrix();
        assert_close(view.transform_point3(Vec3::ZERO), Vec3::new(0.0, 0.0, 5.0));
        assert_close(view.transform_point3(Vec3::new(0.0, 1.0, -5.0)), Vec3::new(0.0, 1.0, 0.0));
        assert_close(view.transform_point3(Vec3::new(1.0, 0.0, -5.0)), Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn yaw_turns_toward_positive_x() {
        let mut camera = Camera::new();
        camera.set_position(0.0, 0.0, -5.0);
        camera.set_rotation(0.0, 90.0, 0.0);
        camera.render();

        let ahead = camera.view_matrix().transform_point3(Vec3::new(1.0, 0.0, -5.0));
        assert_close(ahead, Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn roll_tilts_up_vector() {
        let mut camera = Camera::new();
        camera.set_rotation(0.0, 0.0, 90.0);
        camera.render();

        // With the camera rolled a quarter turn, world up appears sideways
        let up = camera.view_matrix().transform_vector3(Vec3::Y);
        assert!(up.y.abs() < 1e-5);
        assert!((up.x.abs() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn setters_are_pure() {
        let mut camera = Camera::new();
        camera.set_position(1.0, 2.0, 3.0);
        camera.set_rotation(10.0, 20.0, 30.0);
        assert_eq!(camera.position(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(camera.rotation(), Vec3::new(10.0, 20.0, 30.0));
        assert_eq!(camera.view_matrix(), Mat4::IDENTITY);
    }
}
