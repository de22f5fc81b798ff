use ash::prelude::VkResult;
use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;
use crate::renderer::error::{RenderError, ResourceResultExt};

/// Window surface; must outlive every swapchain created from it
pub struct RenderSurface {
    pub handle: vk::SurfaceKHR,
    pub loader: ash::khr::surface::Instance,
}

impl RenderSurface {
    pub fn new(handle: vk::SurfaceKHR, loader: ash::khr::surface::Instance) -> Self {
        Self { handle, loader }
    }
}

impl Drop for RenderSurface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
    }
}

/// Presentation target of the renderer: the swapchain and one view per image
pub struct RenderTarget {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::khr::swapchain::Device,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub present_mode: vk::PresentModeKHR,

    device: ash::Device,
}

impl RenderTarget {
    pub fn new(
        surface: &RenderSurface,
        requested_extent: vk::Extent2D,
        vsync: bool,
        physical_device: vk::PhysicalDevice,
        instance: &ash::Instance,
        device: &ash::Device,
    ) -> Result<Self> {
        let surface_capabilities = unsafe {
            surface.loader
                .get_physical_device_surface_capabilities(physical_device, surface.handle)
        }.or_resource("swapchain")?;

        let surface_formats = unsafe {
            surface.loader
                .get_physical_device_surface_formats(physical_device, surface.handle)
        }.or_resource("swapchain")?;

        let surface_present_modes = unsafe {
            surface.loader
                .get_physical_device_surface_present_modes(physical_device, surface.handle)
        }.or_resource("swapchain")?;

        // Colors are written unconverted, like a UNORM back buffer
        let surface_format = surface_formats
            .iter()
            .find(|format| {
                matches!(format.format, vk::Format::B8G8R8A8_UNORM | vk::Format::R8G8B8A8_UNORM)
                    && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .or_else(|| surface_formats.first())
            .ok_or_eyre("No suitable surface format found")
            .map_err(|e| e.wrap_err(RenderError::resource("swapchain")))?;

        let present_mode = select_present_mode(&surface_present_modes, vsync);
        log::info!("Presenting with {:?} (vsync {})", present_mode, if vsync { "on" } else { "off" });

        let extent = swapchain_extent(&surface_capabilities, requested_extent);

        let min_image_count = {
            let min = surface_capabilities.min_image_count;
            let max = surface_capabilities.max_image_count;
            // Request one more image than the minimum so the driver never stalls
            // acquisition on its own internal work
            if max > 0 && min + 1 > max {
                max
            } else {
                min + 1
            }
        };
        let pre_transform = if surface_capabilities
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            surface_capabilities.current_transform
        };

        let swapchain_loader = ash::khr::swapchain::Device::new(instance, device);
        let swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle)
            .min_image_count(min_image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .image_array_layers(1);

        let swapchain = unsafe {
            swapchain_loader.create_swapchain(&swapchain_info, None)
        }.or_resource("swapchain")?;

        // The target owns the swapchain from here on, so early returns release it
        let mut target = Self {
            swapchain,
            swapchain_loader,
            images: Vec::new(),
            image_views: Vec::new(),
            extent,
            format: surface_format.format,
            present_mode,
            device: device.clone(),
        };

        target.images = unsafe {
            target.swapchain_loader.get_swapchain_images(swapchain)
        }.or_resource("swapchain images")?;
        for image in target.images.clone() {
            let view = create_image_view(image, target.format, device)
                .or_resource("swapchain image view")?;
            target.image_views.push(view);
        }

        log::debug!(
            "Created swapchain with {} images of {}x{} ({:?})",
            target.images.len(),
            extent.width,
            extent.height,
            target.format,
        );

        Ok(target)
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        unsafe {
            for view in self.image_views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// With vsync, present on the vertical blank (FIFO, always available).
/// Without it, present as fast as possible: IMMEDIATE, then MAILBOX, then FIFO.
pub fn select_present_mode(
    available: &[vk::PresentModeKHR],
    vsync: bool,
) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX]
        .into_iter()
        .find(|mode| available.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// The surface dictates the extent unless it reports the "undefined" sentinel,
/// in which case the requested size is clamped to the surface limits
pub fn swapchain_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    requested: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: requested.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: requested.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

fn create_image_view(
    image: vk::Image,
    format: vk::Format,
    device: &ash::Device,
) -> VkResult<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::R,
            g: vk::ComponentSwizzle::G,
            b: vk::ComponentSwizzle::B,
            a: vk::ComponentSwizzle::A,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .image(image);
    unsafe {
        device.create_image_view(&view_info, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vsync_always_uses_fifo() {
        let all = [
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::FIFO,
        ];
        assert_eq!(select_present_mode(&all, true), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn without_vsync_prefers_immediate_then_mailbox() {
        let all = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(select_present_mode(&all, false), vk::PresentModeKHR::IMMEDIATE);
        assert_eq!(
            select_present_mode(&all[..2], false),
            vk::PresentModeKHR::MAILBOX,
        );
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::FIFO], false),
            vk::PresentModeKHR::FIFO,
        );
    }

    #[test]
    fn extent_follows_surface_when_defined() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: 1024, height: 768 },
            ..Default::default()
        };
        let extent = swapchain_extent(&capabilities, vk::Extent2D { width: 800, height: 600 });
        assert_eq!((extent.width, extent.height), (1024, 768));
    }

    #[test]
    fn undefined_extent_clamps_request() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: u32::MAX, height: u32::MAX },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 640, height: 4096 },
            ..Default::default()
        };
        let extent = swapchain_extent(&capabilities, vk::Extent2D { width: 800, height: 600 });
        assert_eq!((extent.width, extent.height), (640, 600));
    }
}
