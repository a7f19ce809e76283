/// Per-frame-in-flight recording state
///
/// Each frame owns a command buffer, the fence that guards it, a descriptor
/// pool reset at the start of the frame, and a uniform ring that draws
/// sub-allocate their uniform blocks from.

use ash::vk;
use ibl_pipeline::ibl::device::BufferUsage;
use ibl_pipeline::ibl::Result;
use ibl_pipeline::{ibl_bail, ibl_err};

use crate::vulkan_buffer::Buffer;
use crate::vulkan_context::GpuContext;

/// Size of each frame's uniform ring
pub(crate) const UNIFORM_RING_SIZE: u64 = 64 * 1024;

/// Descriptor sets available per frame (one per draw)
const MAX_SETS_PER_FRAME: u32 = 64;

/// Round `value` up to a multiple of `alignment` (0 and 1 mean unaligned)
pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}

/// Linear sub-allocator over a fixed-size ring, reset once per frame
#[derive(Debug, Clone, Copy)]
pub(crate) struct RingCursor {
    size: u64,
    offset: u64,
}

impl RingCursor {
    pub(crate) fn new(size: u64) -> Self {
        Self { size, offset: 0 }
    }

    /// Reserve `len` bytes at an `alignment` boundary, `None` when full
    pub(crate) fn allocate(&mut self, len: u64, alignment: u64) -> Option<u64> {
        let start = align_up(self.offset, alignment);
        let end = start.checked_add(len)?;
        if end > self.size {
            return None;
        }
        self.offset = end;
        Some(start)
    }

    pub(crate) fn reset(&mut self) {
        self.offset = 0;
    }

    pub(crate) fn used(&self) -> u64 {
        self.offset
    }
}

/// Recording state of one frame in flight
pub(crate) struct FrameResources {
    pub command_pool: vk::CommandPool,
    pub command_buffer: vk::CommandBuffer,
    /// Signaled when the GPU finished this frame's submission
    pub in_flight: vk::Fence,
    descriptor_pool: vk::DescriptorPool,
    uniform_ring: Option<Buffer>,
    cursor: RingCursor,
}

impl FrameResources {
    pub fn new(ctx: &GpuContext) -> Result<Self> {
        let mut frame = Self {
            command_pool: vk::CommandPool::null(),
            command_buffer: vk::CommandBuffer::null(),
            in_flight: vk::Fence::null(),
            descriptor_pool: vk::DescriptorPool::null(),
            uniform_ring: None,
            cursor: RingCursor::new(UNIFORM_RING_SIZE),
        };
        if let Err(e) = frame.create_objects(ctx) {
            frame.destroy(ctx);
            return Err(e);
        }
        Ok(frame)
    }

    fn create_objects(&mut self, ctx: &GpuContext) -> Result<()> {
        unsafe {
            let pool_info = vk::CommandPoolCreateInfo::default()
                .flags(vk::CommandPoolCreateFlags::TRANSIENT)
                .queue_family_index(ctx.graphics_queue_family);
            self.command_pool = ctx
                .device
                .create_command_pool(&pool_info, None)
                .map_err(|e| ibl_err!("ibl::vulkan", "Failed to create frame command pool: {:?}", e))?;

            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(self.command_pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            self.command_buffer = ctx
                .device
                .allocate_command_buffers(&allocate_info)
                .map_err(|e| ibl_err!("ibl::vulkan", "Failed to allocate frame command buffer: {:?}", e))?[0];

            // Signaled so the first wait returns immediately
            let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
            self.in_flight = ctx
                .device
                .create_fence(&fence_info, None)
                .map_err(|e| ibl_err!("ibl::vulkan", "Failed to create frame fence: {:?}", e))?;

            let pool_sizes = [
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::UNIFORM_BUFFER,
                    descriptor_count: MAX_SETS_PER_FRAME * 2,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    descriptor_count: MAX_SETS_PER_FRAME * 5,
                },
            ];
            let descriptor_pool_info = vk::DescriptorPoolCreateInfo::default()
                .max_sets(MAX_SETS_PER_FRAME)
                .pool_sizes(&pool_sizes);
            self.descriptor_pool = ctx
                .device
                .create_descriptor_pool(&descriptor_pool_info, None)
                .map_err(|e| ibl_err!("ibl::vulkan", "Failed to create frame descriptor pool: {:?}", e))?;
        }

        self.uniform_ring = Some(Buffer::new(ctx, BufferUsage::Uniform, UNIFORM_RING_SIZE)?);
        Ok(())
    }

    /// Wait for the previous use of this frame, then reset its pools
    pub fn reset(&mut self, ctx: &GpuContext) -> Result<()> {
        unsafe {
            ctx.device
                .wait_for_fences(&[self.in_flight], true, u64::MAX)
                .map_err(|e| ibl_err!("ibl::vulkan", "Failed to wait for frame fence: {:?}", e))?;
            ctx.device
                .reset_command_pool(self.command_pool, vk::CommandPoolResetFlags::empty())
                .map_err(|e| ibl_err!("ibl::vulkan", "Failed to reset frame command pool: {:?}", e))?;
            ctx.device
                .reset_descriptor_pool(self.descriptor_pool, vk::DescriptorPoolResetFlags::empty())
                .map_err(|e| ibl_err!("ibl::vulkan", "Failed to reset frame descriptor pool: {:?}", e))?;
        }
        self.cursor.reset();
        Ok(())
    }

    /// Copy a uniform block into the ring, returning (buffer, offset)
    pub fn push_uniform(&mut self, data: &[u8], alignment: u64) -> Result<(vk::Buffer, u64)> {
        let Some(ring) = &self.uniform_ring else {
            ibl_bail!("ibl::vulkan", "Uniform ring is not allocated");
        };
        let Some(offset) = self.cursor.allocate(data.len() as u64, alignment) else {
            ibl_bail!(
                "ibl::vulkan",
                "Uniform ring exhausted ({} of {} bytes used, {} requested)",
                self.cursor.used(),
                UNIFORM_RING_SIZE,
                data.len()
            );
        };
        ring.write(offset, data)?;
        Ok((ring.buffer, offset))
    }

    /// Allocate one descriptor set for this frame
    pub fn allocate_set(&self, ctx: &GpuContext, layout: vk::DescriptorSetLayout) -> Result<vk::DescriptorSet> {
        let layouts = [layout];
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.descriptor_pool)
            .set_layouts(&layouts);
        unsafe {
            ctx.device
                .allocate_descriptor_sets(&allocate_info)
                .map(|sets| sets[0])
                .map_err(|e| ibl_err!("ibl::vulkan", "Failed to allocate descriptor set: {:?}", e))
        }
    }

    /// Destroy everything this frame owns (device must be idle)
    pub fn destroy(&mut self, ctx: &GpuContext) {
        if let Some(ring) = self.uniform_ring.take() {
            ring.destroy(ctx);
        }
        unsafe {
            if self.descriptor_pool != vk::DescriptorPool::null() {
                ctx.device.destroy_descriptor_pool(self.descriptor_pool, None);
                self.descriptor_pool = vk::DescriptorPool::null();
            }
            if self.in_flight != vk::Fence::null() {
                ctx.device.destroy_fence(self.in_flight, None);
                self.in_flight = vk::Fence::null();
            }
            if self.command_pool != vk::CommandPool::null() {
                // Frees the command buffer too
                ctx.device.destroy_command_pool(self.command_pool, None);
                self.command_pool = vk::CommandPool::null();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(300, 64), 320);
        assert_eq!(align_up(13, 0), 13);
    }

    #[test]
    fn test_ring_cursor_aligns_allocations() {
        let mut cursor = RingCursor::new(1024);
        assert_eq!(cursor.allocate(100, 256), Some(0));
        assert_eq!(cursor.allocate(16, 256), Some(256));
        assert_eq!(cursor.used(), 272);
    }

    #[test]
    fn test_ring_cursor_full() {
        let mut cursor = RingCursor::new(512);
        assert_eq!(cursor.allocate(300, 256), Some(0));
        assert_eq!(cursor.allocate(300, 256), None);
        // A failed allocation leaves the cursor untouched
        assert_eq!(cursor.used(), 300);

        cursor.reset();
        assert_eq!(cursor.allocate(512, 256), Some(0));
    }
}
