use glam::{Vec3, Vec4};
use crate::renderer::shader_data::LightBufferData;

/// A single directional light
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    diffuse_color: Vec4,
    direction: Vec3,
}

impl Light {
    /// White light shining down +Z
    pub fn new() -> Self {
        Self {
            diffuse_color: Vec4::ONE,
            direction: Vec3::Z,
        }
    }

    pub fn set_diffuse_color(&mut self, red: f32, green: f32, blue: f32, alpha: f32) {
        self.diffuse_color = Vec4::new(red, green, blue, alpha);
    }

    /// The direction the light travels, not the direction towards it
    pub fn set_direction(&mut self, x: f32, y: f32, z: f32) {
        self.direction = Vec3::new(x, y, z);
    }

    pub fn diffuse_color(&self) -> Vec4 {
        self.diffuse_color
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub(crate) fn buffer_data(&self) -> LightBufferData {
        LightBufferData::new(self.diffuse_color, self.direction)
    }
}

impl Default for Light {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_round_trip() {
        let mut light = Light::new();
        light.set_diffuse_color(1.0, 0.0, 1.0, 1.0);
        light.set_direction(0.0, -1.0, 0.5);
        assert_eq!(light.diffuse_color(), Vec4::new(1.0, 0.0, 1.0, 1.0));
        assert_eq!(light.direction(), Vec3::new(0.0, -1.0, 0.5));
    }

    #[test]
    fn direction_is_not_normalized() {
        let mut light = Light::new();
        light.set_direction(0.0, 0.0, 3.0);
        assert_eq!(light.buffer_data(), LightBufferData::new(Vec4::ONE, Vec3::new(0.0, 0.0, 3.0)));
    }
}
