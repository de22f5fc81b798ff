use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::{eyre, Result, WrapErr};
use gpu_allocator::{
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator},
    MemoryLocation,
};
use crate::renderer::device::transfer_ctx::TransferContext;
use crate::renderer::error::{RenderError, ResourceResultExt};
use crate::renderer::resources::buffer::Buffer;

pub struct ImageCreateInfo {
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
    pub name: String,
}

pub struct Image {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub aspect: vk::ImageAspectFlags,
    pub mip_levels: u32,

    allocation: Option<Allocation>, // GPU-only memory block
    memory_allocator: Arc<Mutex<Allocator>>,
    device: Arc<ash::Device>,
}

impl Image {
    // NOTE: The memory of the returned image is GPU-only and holds no data yet.
    // Color images are filled by `Image::upload()`.
    fn new(
        create_info: &ImageCreateInfo,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let name = create_info.name.as_str();
        let image = {
            let info = vk::ImageCreateInfo::default()
                .format(create_info.format)
                .usage(create_info.usage)
                .extent(create_info.extent)
                .image_type(vk::ImageType::TYPE_2D)
                .mip_levels(create_info.mip_levels)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL);
            unsafe { device.create_image(&info, None) }.or_resource(name)?
        };
        let reqs = unsafe { device.get_image_memory_requirements(image) };
        let allocation = memory_allocator
            .lock()
            .map_err(|e| eyre!(e.to_string()))?
            .allocate(&AllocationCreateDesc {
                name,
                requirements: reqs,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::DedicatedImage(image),
            });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e).or_resource(name);
            }
        };

        // From here on the partially built image releases itself on drop
        let mut result = Self {
            image,
            view: vk::ImageView::null(),
            format: create_info.format,
            extent: create_info.extent,
            aspect: create_info.aspect,
            mip_levels: create_info.mip_levels,

            allocation: Some(allocation),
            memory_allocator,
            device,
        };

        if let Some(allocation) = result.allocation.as_ref() {
            unsafe {
                result.device.bind_image_memory(image, allocation.memory(), allocation.offset())
            }.or_resource(name)?;
        }

        result.view = {
            let info = vk::ImageViewCreateInfo::default()
                .view_type(vk::ImageViewType::TYPE_2D)
                .image(image)
                .format(create_info.format)
                .subresource_range(result.full_range());
            unsafe { result.device.create_image_view(&info, None) }
                .or_resource(&format!("{} view", name))?
        };

        log::debug!(
            "Created image \"{}\" ({}x{}, {:?}, {} mip levels)",
            name,
            create_info.extent.width,
            create_info.extent.height,
            create_info.format,
            create_info.mip_levels,
        );

        Ok(result)
    }

    /// Create a shader-readable RGBA8 image from tightly packed pixels and fill
    /// every mip level, level 0 from `data` and the rest by successive blits
    pub fn new_color_image(
        data: &[u8],
        width: u32,
        height: u32,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
        transfer_context: &TransferContext,
    ) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(RenderError::invalid(format!(
                "{}x{} image needs {} bytes of pixels, got {}",
                width, height, expected, data.len(),
            )).into());
        }

        let create_info = ImageCreateInfo {
            format: vk::Format::R8G8B8A8_UNORM,
            extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            mip_levels: mip_level_count(width, height),
            usage: vk::ImageUsageFlags::SAMPLED
                | vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST,
            aspect: vk::ImageAspectFlags::COLOR,
            name: "Color Image".into(),
        };
        let mut image = Self::new(&create_info, memory_allocator, device)?;
        image.upload(data, transfer_context)
            .wrap_err("Failed to upload texture pixels")?;

        Ok(image)
    }

    /// Create the depth-stencil attachment for a swapchain of the given size
    pub fn new_depth_image(
        width: u32,
        height: u32,
        format: vk::Format,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let create_info = ImageCreateInfo {
            format,
            extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            mip_levels: 1,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect: vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
            name: "Depth Stencil Image".into(),
        };
        Self::new(&create_info, memory_allocator, device)
    }

    pub fn full_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect,
            base_mip_level: 0,
            level_count: self.mip_levels,
            base_array_layer: 0,
            layer_count: 1,
        }
    }

    fn upload(
        &mut self,
        data: &[u8],
        transfer_context: &TransferContext,
    ) -> Result<()> {
        let mut staging_buffer = Buffer::new(
            data.len() as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            "Image staging buffer",
            MemoryLocation::CpuToGpu,
            self.memory_allocator.clone(),
            self.device.clone(),
        )?;
        staging_buffer.write(data, 0)?;
        transfer_context.immediate_submit(
            |cmd: vk::CommandBuffer, device: &ash::Device| {
                // Every level starts out as a copy destination
                transition_image_layout(
                    cmd,
                    self.image,
                    self.full_range(),
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    device,
                );

                let copy_region = vk::BufferImageCopy {
                    buffer_offset: 0,
                    buffer_row_length: 0,
                    buffer_image_height: 0,
                    image_subresource: vk::ImageSubresourceLayers {
                        aspect_mask: self.aspect,
                        mip_level: 0,
                        base_array_layer: 0,
                        layer_count: 1,
                    },
                    image_extent: self.extent,
                    ..Default::default()
                };

                unsafe {
                    // Copy staging buffer into mip level 0
                    device.cmd_copy_buffer_to_image(
                        cmd,
                        staging_buffer.buffer,
                        self.image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[copy_region],
                    );
                }

                self.generate_mipmaps(cmd, device);

                Ok(())
            },
        )?;

        Ok(())
    }

    /// Expects every level in TRANSFER_DST_OPTIMAL with level 0 filled.
    /// Leaves every level in SHADER_READ_ONLY_OPTIMAL.
    fn generate_mipmaps(&self, cmd: vk::CommandBuffer, device: &ash::Device) {
        let mut src_size = vk::Extent2D {
            width: self.extent.width,
            height: self.extent.height,
        };

        for level in 1..self.mip_levels {
            let dst_size = vk::Extent2D {
                width: (src_size.width / 2).max(1),
                height: (src_size.height / 2).max(1),
            };

            transition_image_layout(
                cmd,
                self.image,
                self.level_range(level - 1),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                device,
            );
            blit_level(cmd, self.image, level - 1, src_size, level, dst_size, device);
            transition_image_layout(
                cmd,
                self.image,
                self.level_range(level - 1),
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                device,
            );

            src_size = dst_size;
        }

        // The last level was only ever written to
        transition_image_layout(
            cmd,
            self.image,
            self.level_range(self.mip_levels - 1),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            device,
        );
    }

    fn level_range(&self, level: u32) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect,
            base_mip_level: level,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        }
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.destroy_image_view(self.view, None);
            }
        }
        if let Some(allocation) = self.allocation.take() {
            match self.memory_allocator.lock() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        log::error!("Failed to free image memory: {}", e);
                    }
                }
                Err(e) => log::error!("Memory allocator poisoned: {}", e),
            }
        }
        unsafe {
            self.device.destroy_image(self.image, None);
        }
    }
}

/// `floor(log2(max(width, height))) + 1`
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

fn blit_level(
    cmd: vk::CommandBuffer,
    image: vk::Image,
    src_level: u32,
    src_size: vk::Extent2D,
    dst_level: u32,
    dst_size: vk::Extent2D,
    device: &ash::Device,
) {
    let blit_region = vk::ImageBlit2::default()
        .src_offsets([
            vk::Offset3D { x: 0, y: 0, z: 0 },
            vk::Offset3D {
                x: src_size.width as i32,
                y: src_size.height as i32,
                z: 1,
            },
        ])
        .dst_offsets([
            vk::Offset3D { x: 0, y: 0, z: 0 },
            vk::Offset3D {
                x: dst_size.width as i32,
                y: dst_size.height as i32,
                z: 1,
            },
        ])
        .src_subresource(vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_array_layer: 0,
            layer_count: 1,
            mip_level: src_level,
        })
        .dst_subresource(vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_array_layer: 0,
            layer_count: 1,
            mip_level: dst_level,
        });
    let regions = [blit_region];

    let blit_info = vk::BlitImageInfo2::default()
        .src_image(image)
        .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
        .dst_image(image)
        .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .filter(vk::Filter::LINEAR)
        .regions(&regions);

    unsafe {
        device.cmd_blit_image2(cmd, &blit_info);
    }
}

pub fn transition_image_layout(
    cmd: vk::CommandBuffer,
    image: vk::Image,
    subresource_range: vk::ImageSubresourceRange,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    device: &ash::Device,
) {
    if old_layout == new_layout {
        return;
    }

    let image_barrier = vk::ImageMemoryBarrier2::default()
        .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
        .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .dst_access_mask(vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .subresource_range(subresource_range)
        .image(image);
    let barriers = [image_barrier];

    let dep_info = vk::DependencyInfo::default()
        .image_memory_barriers(&barriers);

    unsafe {
        device.cmd_pipeline_barrier2(cmd, &dep_info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_chain_reaches_one_pixel() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 2), 2);
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(256, 3), 9);
        assert_eq!(mip_level_count(300, 200), 9);
        assert_eq!(mip_level_count(512, 1024), 11);
    }

    #[test]
    fn zero_sized_image_still_has_one_level() {
        assert_eq!(mip_level_count(0, 0), 1);
    }
}
