use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use crate::renderer::error::ResourceResultExt;

/// Command recording and synchronization for the single frame in flight
pub struct FrameSync {
    pub command_pool: vk::CommandPool,
    pub command_buffer: vk::CommandBuffer,

    // Signals when the acquired swapchain image can be rendered to.
    pub image_available: vk::Semaphore,

    // Signals when rendering into swapchain image `i` has finished.
    pub render_finished: Vec<vk::Semaphore>,

    // Signals when all rendering commands have finished execution.
    pub in_flight: vk::Fence,

    device: Arc<ash::Device>,
}

impl FrameSync {
    pub fn new(
        queue_family_index: u32,
        swapchain_image_count: usize,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let command_pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe { device.create_command_pool(&command_pool_info, None) }
            .or_resource("frame command pool")?;

        // Every later handle is released by Drop if creation stops early
        let mut sync = Self {
            command_pool,
            command_buffer: vk::CommandBuffer::null(),
            image_available: vk::Semaphore::null(),
            render_finished: Vec::with_capacity(swapchain_image_count),
            in_flight: vk::Fence::null(),
            device,
        };

        let command_buffer_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .command_buffer_count(1)
            .level(vk::CommandBufferLevel::PRIMARY);
        sync.command_buffer = unsafe { sync.device.allocate_command_buffers(&command_buffer_info) }
            .or_resource("frame command buffer")?[0];

        sync.image_available = unsafe {
            sync.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
        }.or_resource("semaphore")?;
        for _ in 0..swapchain_image_count {
            let semaphore = unsafe {
                sync.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
            }.or_resource("semaphore")?;
            sync.render_finished.push(semaphore);
        }

        // Created signaled so the first frame does not wait forever
        sync.in_flight = unsafe {
            sync.device.create_fence(
                &vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED),
                None,
            )
        }.or_resource("frame fence")?;

        Ok(sync)
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            if self.in_flight != vk::Fence::null() {
                self.device.destroy_fence(self.in_flight, None);
            }
            for semaphore in self.render_finished.drain(..) {
                self.device.destroy_semaphore(semaphore, None);
            }
            if self.image_available != vk::Semaphore::null() {
                self.device.destroy_semaphore(self.image_available, None);
            }
            // Frees the command buffer with it
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
