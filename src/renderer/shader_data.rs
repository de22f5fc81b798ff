use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// Transforms uploaded to the vertex stage once per draw.
///
/// Shaders multiply row vectors (`v * world * view * projection`), so each
/// matrix is stored transposed relative to glam's column convention.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct MatrixBufferData {
    pub world: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
}

impl MatrixBufferData {
    pub fn new(world: Mat4, view: Mat4, projection: Mat4) -> Self {
        Self {
            world: world.transpose(),
            view: view.transpose(),
            projection: projection.transpose(),
        }
    }
}

/// Directional light parameters uploaded to the fragment stage
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct LightBufferData {
    pub diffuse_color: Vec4,
    pub light_direction: Vec3,
    _padding: f32,
}

impl LightBufferData {
    pub fn new(diffuse_color: Vec4, light_direction: Vec3) -> Self {
        Self {
            diffuse_color,
            light_direction,
            _padding: 0.0,
        }
    }
}

/// Size of a uniform buffer holding one `T`, rounded up to a multiple of 16 bytes
pub const fn constant_buffer_size<T>() -> u64 {
    let size = size_of::<T>() as u64;
    (size + 15) & !15
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_buffers_are_16_byte_multiples() {
        assert_eq!(constant_buffer_size::<MatrixBufferData>(), 192);
        assert_eq!(constant_buffer_size::<LightBufferData>(), 32);
        assert_eq!(constant_buffer_size::<[f32; 3]>(), 16);
        assert_eq!(constant_buffer_size::<[f32; 5]>(), 32);
        assert_eq!(constant_buffer_size::<()>(), 0);
    }

    #[test]
    fn light_layout_is_color_then_direction() {
        let data = LightBufferData::new(
            Vec4::new(1.0, 0.0, 1.0, 1.0),
            Vec3::new(0.0, 0.0, 1.0),
        );
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&data));
        assert_eq!(floats, &[1.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn matrices_are_transposed_before_upload() {
        let world = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let view = Mat4::from_rotation_y(0.5);
        let projection = Mat4::perspective_lh(std::f32::consts::FRAC_PI_4, 4.0 / 3.0, 0.1, 1000.0);

        let data = MatrixBufferData::new(world, view, projection);
        assert_eq!(data.world, world.transpose());
        assert_eq!(data.view, view.transpose());
        assert_eq!(data.projection, projection.transpose());

        // The translation lands in the last column of the uploaded rows
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&data));
        assert_eq!(floats[3], 1.0);
        assert_eq!(floats[7], 2.0);
        assert_eq!(floats[11], 3.0);
    }
}
