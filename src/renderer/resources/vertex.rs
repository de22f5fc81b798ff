use std::mem::{offset_of, size_of};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Data unique to each vertex passed as elements into a vertex buffer
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub texcoord: Vec2,
    pub normal: Vec3,
}

impl Vertex {
    pub const STRIDE: u32 = size_of::<Self>() as u32;

    pub fn new(position: Vec3, texcoord: Vec2, normal: Vec3) -> Self {
        Self {
            position,
            texcoord,
            normal,
        }
    }
}

/// Describes how the bytes of a `Vertex` buffer map onto shader inputs.
/// Attribute offsets are taken from the struct itself so the two cannot drift apart.
#[derive(Debug, Clone)]
pub struct VertexInputDescription {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
    pub flags: vk::PipelineVertexInputStateCreateFlags,
}

impl VertexInputDescription {
    /// Position and texture coordinate only
    pub fn textured() -> Self {
        Self {
            bindings: vec![Self::binding()],
            attributes: vec![
                Self::attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, position)),
                Self::attribute(1, vk::Format::R32G32_SFLOAT, offset_of!(Vertex, texcoord)),
            ],
            flags: vk::PipelineVertexInputStateCreateFlags::empty(),
        }
    }

    /// Position, texture coordinate and normal
    pub fn lit() -> Self {
        let mut description = Self::textured();
        description.attributes.push(
            Self::attribute(2, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, normal))
        );
        description
    }

    fn binding() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(Vertex::STRIDE)
            .input_rate(vk::VertexInputRate::VERTEX)
    }

    fn attribute(
        location: u32,
        format: vk::Format,
        offset: usize,
    ) -> vk::VertexInputAttributeDescription {
        vk::VertexInputAttributeDescription::default()
            .binding(0)
            .location(location)
            .format(format)
            .offset(offset as u32)
    }
}

impl Default for VertexInputDescription {
    fn default() -> Self {
        Self::lit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(size_of::<Vertex>(), 32);
        assert_eq!(Vertex::STRIDE, 32);
        assert_eq!(offset_of!(Vertex, position), 0);
        assert_eq!(offset_of!(Vertex, texcoord), 12);
        assert_eq!(offset_of!(Vertex, normal), 20);
    }

    #[test]
    fn lit_layout_matches_vertex_bytes() {
        let description = VertexInputDescription::lit();
        assert_eq!(description.bindings.len(), 1);
        assert_eq!(description.bindings[0].stride, 32);

        let layout = description
            .attributes
            .iter()
            .map(|a| (a.location, a.format, a.offset))
            .collect::<Vec<_>>();
        assert_eq!(layout, vec![
            (0, vk::Format::R32G32B32_SFLOAT, 0),
            (1, vk::Format::R32G32_SFLOAT, 12),
            (2, vk::Format::R32G32B32_SFLOAT, 20),
        ]);
    }

    #[test]
    fn textured_layout_skips_normal() {
        let description = VertexInputDescription::textured();
        assert_eq!(description.attributes.len(), 2);
        assert!(description.attributes.iter().all(|a| a.location < 2));
    }

    #[test]
    fn vertex_bytes_follow_field_order() {
        let vertex = Vertex::new(
            Vec3::new(1.0, 2.0, 3.0),
            Vec2::new(4.0, 5.0),
            Vec3::new(6.0, 7.0, 8.0),
        );
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&vertex));
        assert_eq!(floats, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    }
}
