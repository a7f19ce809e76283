/// Buffer - host-visible Vulkan buffer (vertex, index, uniform, staging)

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use gpu_allocator::MemoryLocation;
use ibl_pipeline::ibl::device::BufferUsage;
use ibl_pipeline::ibl::Result;
use ibl_pipeline::{ibl_bail, ibl_err};

use crate::vulkan_context::GpuContext;

/// Vulkan buffer with its own CPU-visible allocation
pub struct Buffer {
    pub(crate) buffer: vk::Buffer,
    pub(crate) allocation: Option<Allocation>,
    pub(crate) size: u64,
    pub(crate) usage: BufferUsage,
}

/// Convert BufferUsage to Vulkan usage flags
pub(crate) fn buffer_usage_to_vk(usage: BufferUsage) -> vk::BufferUsageFlags {
    match usage {
        BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
        BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER,
        BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
    }
}

impl Buffer {
    /// Create an uninitialized buffer of `size` bytes
    pub fn new(ctx: &GpuContext, usage: BufferUsage, size: u64) -> Result<Self> {
        Self::with_flags(ctx, usage, buffer_usage_to_vk(usage), size, "buffer")
    }

    /// Create a staging buffer for transfers into images
    pub fn staging(ctx: &GpuContext, data: &[u8]) -> Result<Self> {
        let buffer = Self::with_flags(
            ctx,
            BufferUsage::Uniform,
            vk::BufferUsageFlags::TRANSFER_SRC,
            data.len() as u64,
            "staging_buffer",
        )?;
        if let Err(e) = buffer.write(0, data) {
            buffer.destroy(ctx);
            return Err(e);
        }
        Ok(buffer)
    }

    fn with_flags(
        ctx: &GpuContext,
        usage: BufferUsage,
        flags: vk::BufferUsageFlags,
        size: u64,
        name: &str,
    ) -> Result<Self> {
        if size == 0 {
            ibl_bail!("ibl::vulkan", "Cannot create an empty {}", name);
        }
        unsafe {
            let create_info = vk::BufferCreateInfo::default()
                .size(size)
                .usage(flags)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = ctx
                .device
                .create_buffer(&create_info, None)
                .map_err(|e| ibl_err!("ibl::vulkan", "Failed to create {} of size {} bytes: {:?}", name, size, e))?;

            match ctx.bind_buffer_memory(buffer, MemoryLocation::CpuToGpu, name) {
                Ok(allocation) => Ok(Self {
                    buffer,
                    allocation: Some(allocation),
                    size,
                    usage,
                }),
                Err(e) => {
                    ctx.device.destroy_buffer(buffer, None);
                    Err(e)
                }
            }
        }
    }

    /// Copy `data` into the mapped allocation at `offset`
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        if offset + data.len() as u64 > self.size {
            ibl_bail!(
                "ibl::vulkan",
                "Buffer write of {} bytes at {} exceeds size {}",
                data.len(),
                offset,
                self.size
            );
        }
        let Some(allocation) = &self.allocation else {
            ibl_bail!("ibl::vulkan", "Buffer update failed: no GPU allocation");
        };
        let mapped_ptr = allocation
            .mapped_ptr()
            .ok_or_else(|| ibl_err!("ibl::vulkan", "Buffer is not CPU-accessible"))?
            .as_ptr() as *mut u8;

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped_ptr.add(offset as usize), data.len());
        }
        Ok(())
    }

    /// Free memory and destroy the buffer
    pub fn destroy(mut self, ctx: &GpuContext) {
        if let Some(allocation) = self.allocation.take() {
            ctx.free(allocation);
        }
        unsafe {
            ctx.device.destroy_buffer(self.buffer, None);
        }
    }
}
