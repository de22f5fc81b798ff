pub mod frame;
pub mod instance;
pub mod logical;
pub mod queue;
pub mod state;
pub mod target;
pub mod transfer_ctx;

use std::path::Path;
use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::{OptionExt, WrapErr};
use color_eyre::Result;
use glam::Mat4;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use winit::window::{Fullscreen, Window};
use crate::renderer::config::RenderConfig;
use crate::renderer::device::frame::FrameSync;
use crate::renderer::device::instance::RenderInstance;
use crate::renderer::device::logical::{AdapterInfo, LogicalDevice};
use crate::renderer::device::state::FixedState;
use crate::renderer::device::target::{RenderSurface, RenderTarget};
use crate::renderer::device::transfer_ctx::TransferContext;
use crate::renderer::error::{RenderError, ResourceResultExt};
use crate::renderer::resources::image::{transition_image_layout, Image};

/// Responsibilities:
/// - Own the Vulkan instance, device, queue, memory allocator and swapchain
/// - Record and present one frame at a time
/// - Provide the fixed pipeline state and the world/projection/ortho matrices
pub struct RenderDevice {
    inner: Option<DeviceInner>,

    world: Mat4,
    projection: Mat4,
    ortho: Mat4,
    adapter: AdapterInfo,
    refresh_rate_millihertz: Option<u32>,
    fixed_state: FixedState,
}

struct DeviceInner {
    instance: RenderInstance,
    surface: RenderSurface,
    logical: LogicalDevice,
    memory_allocator: Arc<Mutex<Allocator>>,
    target: RenderTarget,
    depth_image: Image,
    transfer_context: TransferContext,
    frame: FrameSync,

    window: Arc<Window>,
    current_image: Option<u32>,
}

impl RenderDevice {
    pub fn new() -> Self {
        Self {
            inner: None,

            world: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            ortho: Mat4::IDENTITY,
            adapter: AdapterInfo {
                name: String::new(),
                dedicated_memory_mb: 0,
            },
            refresh_rate_millihertz: None,
            fixed_state: FixedState::default(),
        }
    }

    pub fn initialize(
        &mut self,
        config: &RenderConfig,
        window: Arc<Window>,
    ) -> Result<()> {
        if self.inner.is_some() {
            log::warn!("Render device is already initialized");
            return Ok(());
        }

        if config.fullscreen {
            window.set_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        self.refresh_rate_millihertz = find_refresh_rate(&window, config.width, config.height);
        match (self.refresh_rate_millihertz, config.vsync) {
            (Some(mhz), true) => log::info!("Display refresh rate {:.2} Hz", mhz as f32 / 1000.0),
            (Some(_), false) => log::debug!("Ignoring display refresh rate, vsync is off"),
            (None, _) => log::debug!("No video mode matches {}x{}", config.width, config.height),
        }

        // Locals drop in reverse order if any step fails
        let instance = RenderInstance::new(&window)?;
        let surface = instance.create_surface(&window)?;
        let logical = LogicalDevice::new(&instance.instance, &surface)?;

        if let Err(e) = write_video_card_info(&config.video_card_info_path, &logical.adapter) {
            log::warn!(
                "Could not write {}: {}",
                config.video_card_info_path.display(),
                e,
            );
        }

        let memory_allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.instance.clone(),
            device: (*logical.logical).clone(),
            physical_device: logical.physical,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        }).or_resource("memory allocator")?;
        let memory_allocator = Arc::new(Mutex::new(memory_allocator));

        let target = RenderTarget::new(
            &surface,
            vk::Extent2D {
                width: config.width,
                height: config.height,
            },
            config.vsync,
            logical.physical,
            &instance.instance,
            &logical.logical,
        )?;

        let depth_format = state::select_depth_stencil_format(|format| {
            let props = unsafe {
                instance.instance.get_physical_device_format_properties(logical.physical, format)
            };
            props.optimal_tiling_features.contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
            .ok_or_eyre("No depth-stencil format supported")
            .wrap_err(RenderError::resource("depth stencil buffer"))?;
        let depth_image = Image::new_depth_image(
            target.extent.width,
            target.extent.height,
            depth_format,
            memory_allocator.clone(),
            logical.logical.clone(),
        )?;

        let transfer_context = TransferContext::new(
            logical.graphics_queue.clone(),
            logical.logical.clone(),
        )?;
        let frame = FrameSync::new(
            logical.graphics_queue.family.index,
            target.images.len(),
            logical.logical.clone(),
        )?;

        self.world = Mat4::IDENTITY;
        self.projection = Self::projection_for(config);
        self.ortho = Self::ortho_for(config);
        self.adapter = logical.adapter.clone();

        self.inner = Some(DeviceInner {
            instance,
            surface,
            logical,
            memory_allocator,
            target,
            depth_image,
            transfer_context,
            frame,

            window,
            current_image: None,
        });

        log::info!("Render device initialized ({}x{})", config.width, config.height);
        Ok(())
    }

    /// Waits for the previous frame, acquires the next swapchain image and
    /// starts rendering into it with cleared color, depth and stencil
    pub fn begin_frame(&mut self, red: f32, green: f32, blue: f32, alpha: f32) -> Result<()> {
        let inner = self.inner
            .as_mut()
            .ok_or(RenderError::NotInitialized("render device"))?;
        let device = inner.logical.logical.clone();
        let frame = &inner.frame;
        let target = &inner.target;

        unsafe {
            device.wait_for_fences(&[frame.in_flight], true, u64::MAX)?;
        }

        let (image_index, _suboptimal) = unsafe {
            target.swapchain_loader.acquire_next_image(
                target.swapchain,
                u64::MAX,
                frame.image_available,
                vk::Fence::null(),
            )
        }.wrap_err("Failed to acquire swapchain image")?;

        let cmd = frame.command_buffer;
        unsafe {
            device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
            device.begin_command_buffer(
                cmd,
                &vk::CommandBufferBeginInfo::default()
                    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
            )?;
        }
        inner.current_image = Some(image_index);

        let color_image = target.images[image_index as usize];
        transition_image_layout(
            cmd,
            color_image,
            color_range(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            &device,
        );
        transition_image_layout(
            cmd,
            inner.depth_image.image,
            inner.depth_image.full_range(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            &device,
        );

        let color_attachments = [
            vk::RenderingAttachmentInfo::default()
                .image_view(target.image_views[image_index as usize])
                .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: [red, green, blue, alpha],
                    },
                }),
        ];
        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(inner.depth_image.view)
            .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            });
        let scissor = state::full_scissor(target.extent);
        let rendering_info = vk::RenderingInfo::default()
            .render_area(scissor)
            .layer_count(1)
            .color_attachments(&color_attachments)
            .depth_attachment(&depth_attachment)
            .stencil_attachment(&depth_attachment);

        unsafe {
            device.cmd_begin_rendering(cmd, &rendering_info);
            device.cmd_set_viewport(cmd, 0, &[state::flipped_viewport(target.extent)]);
            device.cmd_set_scissor(cmd, 0, &[scissor]);
        }

        Ok(())
    }

    /// Submits the recorded frame and presents it.
    /// With vsync on, presentation is paced by the display's vertical blank.
    pub fn end_frame(&mut self) -> Result<()> {
        let inner = self.inner
            .as_mut()
            .ok_or(RenderError::NotInitialized("render device"))?;
        let image_index = inner.current_image
            .take()
            .ok_or_eyre("end_frame called without begin_frame")?;
        let device = inner.logical.logical.clone();
        let frame = &inner.frame;
        let cmd = frame.command_buffer;

        unsafe {
            device.cmd_end_rendering(cmd);
        }
        transition_image_layout(
            cmd,
            inner.target.images[image_index as usize],
            color_range(),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
            &device,
        );

        let render_finished = [frame.render_finished[image_index as usize]];
        let wait_semaphores = [frame.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [cmd];
        let submit = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&render_finished);
        unsafe {
            device.end_command_buffer(cmd)?;
            // Reset only once a submission is about to signal the fence again
            device.reset_fences(&[frame.in_flight])?;
            device.queue_submit(
                inner.logical.graphics_queue.handle,
                &[submit],
                frame.in_flight,
            )?;
        }

        let swapchains = [inner.target.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&render_finished)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        let suboptimal = unsafe {
            inner.target.swapchain_loader
                .queue_present(inner.logical.graphics_queue.handle, &present_info)
        }.wrap_err("Failed to present swapchain image")?;
        if suboptimal {
            log::debug!("Swapchain is suboptimal for the surface");
        }

        Ok(())
    }

    /// Releases everything in reverse creation order. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        let Some(inner) = self.inner.take() else {
            return;
        };
        let DeviceInner {
            instance,
            surface,
            logical,
            memory_allocator,
            target,
            depth_image,
            transfer_context,
            frame,
            window,
            ..
        } = inner;

        unsafe {
            if let Err(e) = logical.logical.device_wait_idle() {
                log::warn!("Failed waiting for the device to go idle: {}", e);
            }
        }

        // The window must leave fullscreen before its swapchain is released
        if window.fullscreen().is_some() {
            window.set_fullscreen(None);
        }

        drop(frame);
        drop(transfer_context);
        drop(depth_image);
        drop(target);

        match Arc::try_unwrap(memory_allocator) {
            Ok(allocator) => drop(allocator),
            Err(allocator) => {
                log::error!(
                    "{} resources still hold device memory, leaking the device",
                    Arc::strong_count(&allocator) - 1,
                );
                std::mem::forget(allocator);
                std::mem::forget(logical);
                std::mem::forget(surface);
                std::mem::forget(instance);
                return;
            }
        }

        drop(logical);
        drop(surface);
        drop(instance);
        log::info!("Render device shut down");
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.is_some()
    }

    pub fn world_matrix(&self) -> Mat4 {
        self.world
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    pub fn ortho_matrix(&self) -> Mat4 {
        self.ortho
    }

    /// Adapter name and dedicated memory in megabytes
    pub fn video_card_info(&self) -> (&str, u64) {
        (&self.adapter.name, self.adapter.dedicated_memory_mb)
    }

    pub fn refresh_rate_millihertz(&self) -> Option<u32> {
        self.refresh_rate_millihertz
    }

    pub fn fixed_state(&self) -> &FixedState {
        &self.fixed_state
    }

    pub fn device(&self) -> Result<Arc<ash::Device>> {
        Ok(self.inner()?.logical.logical.clone())
    }

    pub fn memory_allocator(&self) -> Result<Arc<Mutex<Allocator>>> {
        Ok(self.inner()?.memory_allocator.clone())
    }

    pub fn transfer_context(&self) -> Result<&TransferContext> {
        Ok(&self.inner()?.transfer_context)
    }

    /// Command buffer of the frame being recorded
    pub fn command_buffer(&self) -> Result<vk::CommandBuffer> {
        Ok(self.inner()?.frame.command_buffer)
    }

    pub fn color_format(&self) -> Result<vk::Format> {
        Ok(self.inner()?.target.format)
    }

    pub fn depth_format(&self) -> Result<vk::Format> {
        Ok(self.inner()?.depth_image.format)
    }

    pub fn projection_for(config: &RenderConfig) -> Mat4 {
        Mat4::perspective_lh(
            std::f32::consts::FRAC_PI_4,
            config.aspect_ratio(),
            config.screen_near,
            config.screen_depth,
        )
    }

    /// Centered orthographic projection in pixel units, for 2D overlays
    pub fn ortho_for(config: &RenderConfig) -> Mat4 {
        let half_width = config.width as f32 / 2.0;
        let half_height = config.height as f32 / 2.0;
        Mat4::orthographic_lh(
            -half_width,
            half_width,
            -half_height,
            half_height,
            config.screen_near,
            config.screen_depth,
        )
    }

    fn inner(&self) -> Result<&DeviceInner> {
        Ok(self.inner
            .as_ref()
            .ok_or(RenderError::NotInitialized("render device"))?)
    }
}

impl Default for RenderDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn color_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Refresh rate of the current monitor's video mode matching the requested size
fn find_refresh_rate(window: &Window, width: u32, height: u32) -> Option<u32> {
    window
        .current_monitor()?
        .video_modes()
        .find(|mode| {
            let size = mode.size();
            size.width == width && size.height == height
        })
        .map(|mode| mode.refresh_rate_millihertz())
}

/// Writes the adapter name and its memory in MB on two lines
pub fn write_video_card_info(path: &Path, adapter: &AdapterInfo) -> std::io::Result<()> {
    std::fs::write(
        path,
        format!("{}\n{}\n", adapter.name, adapter.dedicated_memory_mb),
    )
}
