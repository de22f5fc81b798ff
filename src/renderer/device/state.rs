use ash::vk;

/// Fixed-function state shared by every pipeline built against the device
#[derive(Debug, Clone, Copy)]
pub struct FixedState {
    pub rasterization: vk::PipelineRasterizationStateCreateInfo<'static>,
    pub depth_stencil: vk::PipelineDepthStencilStateCreateInfo<'static>,
    pub multisample: vk::PipelineMultisampleStateCreateInfo<'static>,
}

impl Default for FixedState {
    fn default() -> Self {
        Self {
            rasterization: rasterization_info(),
            depth_stencil: depth_stencil_info(),
            multisample: multisample_info(),
        }
    }
}

/// Solid fill, back faces culled, clockwise winding is front facing
pub fn rasterization_info() -> vk::PipelineRasterizationStateCreateInfo<'static> {
    vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        // Discards all primitives before rasterization stage if true
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::CLOCKWISE)
        // No depth bias
        .depth_bias_enable(false)
        .depth_bias_constant_factor(0.0)
        .depth_bias_clamp(0.0)
        .depth_bias_slope_factor(0.0)
}

/// Depth test LESS with writes on. The stencil test always passes and only
/// counts depth failures: up for front faces, down for back faces.
pub fn depth_stencil_info() -> vk::PipelineDepthStencilStateCreateInfo<'static> {
    let front = vk::StencilOpState::default()
        .fail_op(vk::StencilOp::KEEP)
        .depth_fail_op(vk::StencilOp::INCREMENT_AND_CLAMP)
        .pass_op(vk::StencilOp::KEEP)
        .compare_op(vk::CompareOp::ALWAYS)
        .compare_mask(0xFF)
        .write_mask(0xFF)
        .reference(0);
    let back = front.depth_fail_op(vk::StencilOp::DECREMENT_AND_CLAMP);

    vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(true)
        .depth_write_enable(true)
        .depth_compare_op(vk::CompareOp::LESS)
        .depth_bounds_test_enable(false)
        .min_depth_bounds(0.0)
        .max_depth_bounds(1.0)
        .stencil_test_enable(true)
        .front(front)
        .back(back)
}

pub fn multisample_info() -> vk::PipelineMultisampleStateCreateInfo<'static> {
    vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        // 1 sample per pixel means no multisampling
        .rasterization_samples(vk::SampleCountFlags::TYPE_1)
        .min_sample_shading(1.0)
        .alpha_to_coverage_enable(false)
        .alpha_to_one_enable(false)
}

/// Depth-stencil formats in order of preference
pub const DEPTH_STENCIL_FORMATS: [vk::Format; 2] = [
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D32_SFLOAT_S8_UINT,
];

/// Picks the first preferred format for which `supports_attachment` holds
pub fn select_depth_stencil_format(
    supports_attachment: impl Fn(vk::Format) -> bool,
) -> Option<vk::Format> {
    DEPTH_STENCIL_FORMATS
        .into_iter()
        .find(|format| supports_attachment(*format))
}

/// Full-target viewport. The height is negative so clip-space +Y points up.
pub fn flipped_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: extent.height as f32,
        width: extent.width as f32,
        height: -(extent.height as f32),
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rasterizer_culls_back_faces_with_clockwise_front() {
        let info = rasterization_info();
        assert_eq!(info.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(info.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(info.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(info.depth_bias_enable, vk::FALSE);
    }

    #[test]
    fn depth_stencil_counts_depth_failures() {
        let info = depth_stencil_info();
        assert_eq!(info.depth_test_enable, vk::TRUE);
        assert_eq!(info.depth_write_enable, vk::TRUE);
        assert_eq!(info.depth_compare_op, vk::CompareOp::LESS);
        assert_eq!(info.stencil_test_enable, vk::TRUE);

        assert_eq!(info.front.depth_fail_op, vk::StencilOp::INCREMENT_AND_CLAMP);
        assert_eq!(info.back.depth_fail_op, vk::StencilOp::DECREMENT_AND_CLAMP);
        for face in [info.front, info.back] {
            assert_eq!(face.fail_op, vk::StencilOp::KEEP);
            assert_eq!(face.pass_op, vk::StencilOp::KEEP);
            assert_eq!(face.compare_op, vk::CompareOp::ALWAYS);
            assert_eq!(face.compare_mask, 0xFF);
            assert_eq!(face.write_mask, 0xFF);
        }
    }

    #[test]
    fn depth_format_falls_back_to_d32() {
        assert_eq!(
            select_depth_stencil_format(|_| true),
            Some(vk::Format::D24_UNORM_S8_UINT),
        );
        assert_eq!(
            select_depth_stencil_format(|f| f == vk::Format::D32_SFLOAT_S8_UINT),
            Some(vk::Format::D32_SFLOAT_S8_UINT),
        );
        assert_eq!(select_depth_stencil_format(|_| false), None);
    }

    #[test]
    fn viewport_covers_target_with_y_up() {
        let viewport = flipped_viewport(vk::Extent2D { width: 800, height: 600 });
        assert_eq!((viewport.x, viewport.y), (0.0, 600.0));
        assert_eq!((viewport.width, viewport.height), (800.0, -600.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
    }
}
