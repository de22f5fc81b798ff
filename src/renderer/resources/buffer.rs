use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::{eyre, Result, WrapErr};
use gpu_allocator::{
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator},
    MemoryLocation,
};
use crate::renderer::device::transfer_ctx::TransferContext;
use crate::renderer::error::{RenderError, ResourceResultExt};

pub struct Buffer {
    pub buffer: vk::Buffer,
    pub size: u64,
    name: String,

    allocation: Option<Allocation>,
    memory_allocator: Arc<Mutex<Allocator>>,
    device: Arc<ash::Device>,
}

impl Buffer {
    pub fn new(
        size: u64,
        usage: vk::BufferUsageFlags,
        name: &str,
        mem_loc: MemoryLocation,
        mem_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let buffer = {
            let buffer_info = vk::BufferCreateInfo::default()
                .size(size.max(1))
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);
            unsafe { device.create_buffer(&buffer_info, None) }.or_resource(name)?
        };

        let requirements = unsafe {
            device.get_buffer_memory_requirements(buffer)
        };
        let allocation = mem_allocator
            .lock()
            .map_err(|e| eyre!(e.to_string()))?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: mem_loc,
                linear: true,
                allocation_scheme: AllocationScheme::DedicatedBuffer(buffer),
            });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e).or_resource(name);
            }
        };

        if let Err(e) = unsafe {
            device.bind_buffer_memory(
                buffer,
                allocation.memory(),
                allocation.offset(),
            )
        } {
            if let Ok(mut allocator) = mem_allocator.lock() {
                let _ = allocator.free(allocation);
            }
            unsafe { device.destroy_buffer(buffer, None) };
            return Err(e).or_resource(name);
        }

        log::debug!("Created buffer \"{}\" ({} bytes, {:?})", name, size, mem_loc);

        Ok(Self {
            buffer,
            size,
            name: name.to_owned(),

            allocation: Some(allocation),
            memory_allocator: mem_allocator,
            device,
        })
    }

    /// Creates a GPU-only buffer and fills it through a staging copy.
    /// The contents are never written again.
    pub fn new_immutable<T>(
        data: &[T],
        usage: vk::BufferUsageFlags,
        name: &str,
        mem_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
        transfer_context: &TransferContext,
    ) -> Result<Self>
    where
        T: Copy,
    {
        let size = size_of_val(data) as u64;
        let mut staging = Self::new(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            &format!("{} staging", name),
            MemoryLocation::CpuToGpu,
            mem_allocator.clone(),
            device.clone(),
        )?;
        staging.write(data, 0)?;

        let buffer = Self::new(
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            name,
            MemoryLocation::GpuOnly,
            mem_allocator,
            device,
        )?;

        if size > 0 {
            transfer_context.immediate_submit(|cmd, device| {
                let region = vk::BufferCopy::default().size(size);
                unsafe {
                    device.cmd_copy_buffer(cmd, staging.buffer, buffer.buffer, &[region]);
                }
                Ok(())
            }).wrap_err_with(|| RenderError::resource(name))?;
        }

        Ok(buffer)
    }

    /// Copies `data` into the mapped allocation.
    /// Fails with [`RenderError::Map`] when the memory is not host visible.
    pub fn write<T>(
        &mut self,
        data: &[T],
        start_offset: usize,
    ) -> Result<presser::CopyRecord>
    where
        T: Copy,
    {
        let allocation = self.allocation
            .as_mut()
            .ok_or_else(|| RenderError::Map(self.name.clone()))?;
        if allocation.mapped_ptr().is_none() {
            return Err(RenderError::Map(self.name.clone()).into());
        }

        presser::copy_from_slice_to_offset(data, allocation, start_offset)
            .map_err(|e| eyre!("{:?}", e))
            .wrap_err(RenderError::Map(self.name.clone()))
    }

    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo::default()
            .buffer(self.buffer)
            .offset(0)
            .range(self.size)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            match self.memory_allocator.lock() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        log::error!("Failed to free buffer \"{}\": {}", self.name, e);
                    }
                }
                Err(e) => log::error!("Memory allocator poisoned: {}", e),
            }
        }
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
        }
    }
}
