/// Conversions between core device types and Vulkan enums

use ash::vk;
use ibl_pipeline::ibl::device::{
    CompareOp, CullMode, PrimitiveTopology, TextureFormat, VertexFormat,
};

/// Convert TextureFormat to Vulkan format
pub(crate) fn format_to_vk(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::R8_UNORM => vk::Format::R8_UNORM,
        TextureFormat::RG8_UNORM => vk::Format::R8G8_UNORM,
        TextureFormat::RGBA8_UNORM => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::RGBA8_SRGB => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::BGRA8_UNORM => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::BGRA8_SRGB => vk::Format::B8G8R8A8_SRGB,
        TextureFormat::R16_SFLOAT => vk::Format::R16_SFLOAT,
        TextureFormat::RG16_SFLOAT => vk::Format::R16G16_SFLOAT,
        TextureFormat::RGBA16_SFLOAT => vk::Format::R16G16B16A16_SFLOAT,
        TextureFormat::R32_SFLOAT => vk::Format::R32_SFLOAT,
        TextureFormat::RG32_SFLOAT => vk::Format::R32G32_SFLOAT,
        TextureFormat::RGBA32_SFLOAT => vk::Format::R32G32B32A32_SFLOAT,
        TextureFormat::D32_SFLOAT => vk::Format::D32_SFLOAT,
        TextureFormat::D24_UNORM_S8_UINT => vk::Format::D24_UNORM_S8_UINT,
        TextureFormat::D32_SFLOAT_S8_UINT => vk::Format::D32_SFLOAT_S8_UINT,
    }
}

/// Map a swapchain surface format back to a TextureFormat
///
/// Unknown formats fall back to BGRA8_UNORM, the most common surface format.
pub(crate) fn vk_format_to_format(format: vk::Format) -> TextureFormat {
    match format {
        vk::Format::B8G8R8A8_SRGB => TextureFormat::BGRA8_SRGB,
        vk::Format::R8G8B8A8_SRGB => TextureFormat::RGBA8_SRGB,
        vk::Format::R8G8B8A8_UNORM => TextureFormat::RGBA8_UNORM,
        _ => TextureFormat::BGRA8_UNORM,
    }
}

/// Image aspect of a format (depth formats with stencil get both bits)
pub(crate) fn aspect_of(format: TextureFormat) -> vk::ImageAspectFlags {
    if format.has_stencil() {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else if format.is_depth() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Convert a vertex attribute format to Vulkan
pub(crate) fn vertex_format_to_vk(format: VertexFormat) -> vk::Format {
    match format {
        VertexFormat::Float2 => vk::Format::R32G32_SFLOAT,
        VertexFormat::Float3 => vk::Format::R32G32B32_SFLOAT,
        VertexFormat::Float4 => vk::Format::R32G32B32A32_SFLOAT,
    }
}

pub(crate) fn topology_to_vk(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
    }
}

pub(crate) fn compare_op_to_vk(op: CompareOp) -> vk::CompareOp {
    match op {
        CompareOp::Never => vk::CompareOp::NEVER,
        CompareOp::Less => vk::CompareOp::LESS,
        CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareOp::Always => vk::CompareOp::ALWAYS,
    }
}

pub(crate) fn cull_mode_to_vk(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

/// Convert a sample count to Vulkan flags (None for unsupported counts)
pub(crate) fn samples_to_vk(samples: u32) -> Option<vk::SampleCountFlags> {
    match samples {
        1 => Some(vk::SampleCountFlags::TYPE_1),
        2 => Some(vk::SampleCountFlags::TYPE_2),
        4 => Some(vk::SampleCountFlags::TYPE_4),
        8 => Some(vk::SampleCountFlags::TYPE_8),
        16 => Some(vk::SampleCountFlags::TYPE_16),
        32 => Some(vk::SampleCountFlags::TYPE_32),
        64 => Some(vk::SampleCountFlags::TYPE_64),
        _ => None,
    }
}

/// Highest sample count set in `flags`
pub(crate) fn max_sample_count(flags: vk::SampleCountFlags) -> u32 {
    [64, 32, 16, 8, 4, 2]
        .into_iter()
        .find(|&n| samples_to_vk(n).is_some_and(|f| flags.contains(f)))
        .unwrap_or(1)
}

/// Stage and access masks that cover every use of an image in `layout`
pub(crate) fn layout_sync(layout: vk::ImageLayout) -> (vk::PipelineStageFlags, vk::AccessFlags) {
    match layout {
        vk::ImageLayout::UNDEFINED => (vk::PipelineStageFlags::TOP_OF_PIPE, vk::AccessFlags::empty()),
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => {
            (vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_WRITE)
        }
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => {
            (vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_READ)
        }
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => {
            (vk::PipelineStageFlags::FRAGMENT_SHADER, vk::AccessFlags::SHADER_READ)
        }
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => (
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ),
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => (
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        vk::ImageLayout::PRESENT_SRC_KHR => {
            (vk::PipelineStageFlags::BOTTOM_OF_PIPE, vk::AccessFlags::empty())
        }
        _ => (vk::PipelineStageFlags::ALL_COMMANDS, vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE),
    }
}

/// Record a whole-image layout transition
pub(crate) fn transition_image(
    device: &ash::Device,
    cb: vk::CommandBuffer,
    image: vk::Image,
    aspect_mask: vk::ImageAspectFlags,
    levels: u32,
    layers: u32,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let (src_stage, src_access) = layout_sync(old_layout);
    let (dst_stage, dst_access) = layout_sync(new_layout);

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: levels,
            base_array_layer: 0,
            layer_count: layers,
        })
        .src_access_mask(src_access)
        .dst_access_mask(dst_access);

    unsafe {
        device.cmd_pipeline_barrier(
            cb,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}

#[cfg(test)]
#[path = "vulkan_format_tests.rs"]
mod tests;
