/// GpuContext - Shared GPU state for all Vulkan objects
///
/// Contains everything needed for GPU operations:
/// - Device for Vulkan API calls
/// - Allocator for memory management
/// - Queue for command submission
/// - Command pool for one-shot upload operations

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use gpu_allocator::MemoryLocation;
use ibl_pipeline::ibl::{Error, Result};
use ibl_pipeline::{ibl_err, ibl_error};
use std::mem::ManuallyDrop;
use std::sync::Mutex;

/// Shared GPU context for all resources of one device.
///
/// Device and instance destruction is handled by `VulkanGraphicsDevice::drop()`;
/// this struct only groups the handles resources are created with.
pub struct GpuContext {
    /// Vulkan instance (format and limit queries)
    pub instance: ash::Instance,

    pub physical_device: vk::PhysicalDevice,

    /// Vulkan logical device
    pub device: ash::Device,

    /// GPU memory allocator
    /// Wrapped in ManuallyDrop so it is dropped BEFORE the device is destroyed
    pub allocator: ManuallyDrop<Mutex<Allocator>>,

    /// Graphics queue for command submission (also used for present)
    pub graphics_queue: vk::Queue,

    pub graphics_queue_family: u32,

    /// Reusable command pool for one-shot upload operations
    /// (created with TRANSIENT + RESET_COMMAND_BUFFER flags)
    pub upload_command_pool: vk::CommandPool,

    /// Physical device limits queried at creation
    pub limits: vk::PhysicalDeviceLimits,

    /// samplerAnisotropy was enabled on the device
    pub anisotropy: bool,
}

impl GpuContext {
    /// Optimal-tiling features of `format` on this device
    pub fn format_features(&self, format: vk::Format) -> vk::FormatFeatureFlags {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
                .optimal_tiling_features
        }
    }

    /// Allocate and bind memory for `buffer`
    pub fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        location: MemoryLocation,
        name: &str,
    ) -> Result<Allocation> {
        unsafe {
            let requirements = self.device.get_buffer_memory_requirements(buffer);
            let allocation = self
                .allocator
                .lock()
                .map_err(|_| ibl_err!("ibl::vulkan", "Allocator lock poisoned"))?
                .allocate(&AllocationCreateDesc {
                    name,
                    requirements,
                    location,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|_e| {
                    let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                    ibl_error!("ibl::vulkan", "Out of GPU memory for {} ({:.2} MB)", name, size_mb);
                    Error::OutOfMemory
                })?;

            if let Err(e) = self.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
                self.free(allocation);
                return Err(ibl_err!("ibl::vulkan", "Failed to bind {} memory: {:?}", name, e));
            }
            Ok(allocation)
        }
    }

    /// Allocate and bind device-local memory for `image`
    pub fn bind_image_memory(&self, image: vk::Image, name: &str) -> Result<Allocation> {
        unsafe {
            let requirements = self.device.get_image_memory_requirements(image);
            let allocation = self
                .allocator
                .lock()
                .map_err(|_| ibl_err!("ibl::vulkan", "Allocator lock poisoned"))?
                .allocate(&AllocationCreateDesc {
                    name,
                    requirements,
                    location: MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|_e| {
                    let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                    ibl_error!("ibl::vulkan", "Out of GPU memory for {} ({:.2} MB)", name, size_mb);
                    Error::OutOfMemory
                })?;

            if let Err(e) = self.device.bind_image_memory(image, allocation.memory(), allocation.offset()) {
                self.free(allocation);
                return Err(ibl_err!("ibl::vulkan", "Failed to bind {} memory: {:?}", name, e));
            }
            Ok(allocation)
        }
    }

    /// Return an allocation to the allocator
    pub fn free(&self, allocation: Allocation) {
        // Don't panic if lock fails - the handle still has to be destroyed by the caller
        if let Ok(mut allocator) = self.allocator.lock() {
            allocator.free(allocation).ok();
        }
    }

    /// Record commands into a one-shot command buffer, submit and wait for the queue
    pub fn submit_one_shot<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        unsafe {
            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(self.upload_command_pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);

            let command_buffer = self
                .device
                .allocate_command_buffers(&allocate_info)
                .map_err(|e| ibl_err!("ibl::vulkan", "Failed to allocate upload command buffer: {:?}", e))?[0];

            let result = (|| {
                let begin_info = vk::CommandBufferBeginInfo::default()
                    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
                self.device
                    .begin_command_buffer(command_buffer, &begin_info)
                    .map_err(|e| ibl_err!("ibl::vulkan", "Failed to begin upload command buffer: {:?}", e))?;

                record(&self.device, command_buffer);

                self.device
                    .end_command_buffer(command_buffer)
                    .map_err(|e| ibl_err!("ibl::vulkan", "Failed to end upload command buffer: {:?}", e))?;

                let command_buffers = [command_buffer];
                let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
                self.device
                    .queue_submit(self.graphics_queue, &[submit_info], vk::Fence::null())
                    .map_err(|e| ibl_err!("ibl::vulkan", "Failed to submit upload: {:?}", e))?;
                self.device
                    .queue_wait_idle(self.graphics_queue)
                    .map_err(|e| ibl_err!("ibl::vulkan", "Failed to wait for upload: {:?}", e))
            })();

            self.device.free_command_buffers(self.upload_command_pool, &[command_buffer]);
            result
        }
    }
}
