use std::ffi::{c_char, CStr};
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;
use crate::renderer::device::queue::{Queue, QueueFamily};
use crate::renderer::device::target::RenderSurface;
use crate::renderer::error::{RenderError, ResourceResultExt};

/// Adapter description reported to the user and written to the diagnostic file
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterInfo {
    pub name: String,
    pub dedicated_memory_mb: u64,
}

/// Physical device, the logical device created on it, and its single graphics queue
pub struct LogicalDevice {
    pub logical: Arc<ash::Device>,
    pub physical: vk::PhysicalDevice,
    pub graphics_queue: Arc<Queue>,
    pub adapter: AdapterInfo,
}

impl LogicalDevice {
    pub fn new(
        instance: &ash::Instance,
        surface: &RenderSurface,
    ) -> Result<Self> {
        let (physical, graphics_family) = Self::select_physical_device(instance, surface)?;

        let adapter = unsafe {
            let props = instance.get_physical_device_properties(physical);
            let memory = instance.get_physical_device_memory_properties(physical);
            AdapterInfo {
                name: props
                    .device_name_as_c_str()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|_| "Unknown adapter".to_owned()),
                dedicated_memory_mb: dedicated_memory_mb(&memory),
            }
        };
        log::info!("Selected adapter {} ({} MB)", adapter.name, adapter.dedicated_memory_mb);

        let queue_priorities = [1.0];
        let queue_create_infos = [
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(graphics_family.index)
                .queue_priorities(&queue_priorities),
        ];

        let enabled_extension_names = Self::get_required_device_extensions()
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();
        let features = vk::PhysicalDeviceFeatures::default();
        let mut vulkan_13_features = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);
        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&enabled_extension_names)
            .enabled_features(&features)
            .push_next(&mut vulkan_13_features);

        let logical = unsafe {
            instance.create_device(physical, &device_create_info, None)
        }.or_resource("logical device")?;

        let graphics_queue = unsafe {
            let handle = logical.get_device_queue(graphics_family.index, 0);
            Queue::new(graphics_family, handle)
        };

        Ok(Self {
            logical: Arc::new(logical),
            physical,
            graphics_queue: Arc::new(graphics_queue),
            adapter,
        })
    }

    fn select_physical_device(
        instance: &ash::Instance,
        surface: &RenderSurface,
    ) -> Result<(vk::PhysicalDevice, QueueFamily)> {
        let req_device_exts = Self::get_required_device_extensions();
        let devices = unsafe { instance.enumerate_physical_devices() }
            .or_resource("physical device list")?;

        devices
            .into_iter()
            .filter(|device| {
                let props = unsafe { instance.get_physical_device_properties(*device) };
                if vk::api_version_minor(props.api_version) < 3
                    && vk::api_version_major(props.api_version) <= 1
                {
                    return false;
                }

                // Filter out devices that do not contain the required device extensions
                let supported_extensions = unsafe {
                    instance.enumerate_device_extension_properties(*device)
                }.unwrap_or_default();
                req_device_exts.iter().all(|req_ext| {
                    let supported = supported_extensions
                        .iter()
                        .any(|sup| sup.extension_name_as_c_str() == Ok(*req_ext));
                    if !supported {
                        log::debug!("Device extension not supported: {:?}", req_ext);
                    }
                    supported
                })
            })
            // Keep devices with a queue that can both draw and present
            .filter_map(|device| {
                let props = unsafe {
                    instance.get_physical_device_queue_family_properties(device)
                };
                props
                    .iter()
                    .enumerate()
                    .find(|(i, q)| {
                        let supports_present = unsafe {
                            surface.loader.get_physical_device_surface_support(
                                device,
                                *i as u32,
                                surface.handle,
                            )
                        }.unwrap_or(false);
                        q.queue_flags.contains(vk::QueueFlags::GRAPHICS) && supports_present
                    })
                    .map(|(i, q)| (device, QueueFamily::new(i as u32, *q)))
            })
            .min_by_key(|(device, _)| {
                let props = unsafe { instance.get_physical_device_properties(*device) };
                device_type_rank(props.device_type)
            })
            .ok_or_eyre("No suitable physical device found")
            .map_err(|e| e.wrap_err(RenderError::resource("physical device")))
    }

    fn get_required_device_extensions() -> Vec<&'static CStr> {
        vec![
            ash::khr::swapchain::NAME,

            #[cfg(target_os = "macos")]
            ash::khr::portability_subset::NAME,
        ]
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            self.logical.destroy_device(None);
        }
    }
}

/// Lower is better; discrete GPUs first
pub fn device_type_rank(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 3,
        vk::PhysicalDeviceType::OTHER => 4,
        _ => 5,
    }
}

/// Size of the largest device-local heap, in megabytes
pub fn dedicated_memory_mb(memory: &vk::PhysicalDeviceMemoryProperties) -> u64 {
    memory.memory_heaps[..memory.memory_heap_count as usize]
        .iter()
        .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|heap| heap.size / 1024 / 1024)
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discrete_gpus_rank_first() {
        let mut types = vec![
            vk::PhysicalDeviceType::CPU,
            vk::PhysicalDeviceType::INTEGRATED_GPU,
            vk::PhysicalDeviceType::DISCRETE_GPU,
            vk::PhysicalDeviceType::VIRTUAL_GPU,
        ];
        types.sort_by_key(|t| device_type_rank(*t));
        assert_eq!(types[0], vk::PhysicalDeviceType::DISCRETE_GPU);
        assert_eq!(types[1], vk::PhysicalDeviceType::INTEGRATED_GPU);
    }

    #[test]
    fn dedicated_memory_uses_largest_device_local_heap() {
        let mut memory = vk::PhysicalDeviceMemoryProperties {
            memory_heap_count: 3,
            ..Default::default()
        };
        memory.memory_heaps[0] = vk::MemoryHeap {
            size: 8 * 1024 * 1024 * 1024,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        memory.memory_heaps[1] = vk::MemoryHeap {
            size: 32 * 1024 * 1024 * 1024,
            flags: vk::MemoryHeapFlags::empty(),
        };
        memory.memory_heaps[2] = vk::MemoryHeap {
            size: 256 * 1024 * 1024,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        // Heaps past the count are ignored
        memory.memory_heaps[3] = vk::MemoryHeap {
            size: 64 * 1024 * 1024 * 1024,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };

        assert_eq!(dedicated_memory_mb(&memory), 8192);
    }

    #[test]
    fn no_device_local_heap_reports_zero() {
        let memory = vk::PhysicalDeviceMemoryProperties::default();
        assert_eq!(dedicated_memory_mb(&memory), 0);
    }
}
