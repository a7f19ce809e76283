//! Unit tests for Vulkan format conversion functions
//!
//! Tests pure conversion functions without requiring GPU.

use super::*;

// ============================================================================
// TEXTURE FORMAT CONVERSION TESTS
// ============================================================================

#[test]
fn test_format_to_vk_color_formats() {
    assert_eq!(format_to_vk(TextureFormat::R8_UNORM), vk::Format::R8_UNORM);
    assert_eq!(format_to_vk(TextureFormat::RGBA8_SRGB), vk::Format::R8G8B8A8_SRGB);
    assert_eq!(format_to_vk(TextureFormat::BGRA8_UNORM), vk::Format::B8G8R8A8_UNORM);
    assert_eq!(format_to_vk(TextureFormat::RGBA16_SFLOAT), vk::Format::R16G16B16A16_SFLOAT);
    assert_eq!(format_to_vk(TextureFormat::RGBA32_SFLOAT), vk::Format::R32G32B32A32_SFLOAT);
}

#[test]
fn test_format_to_vk_depth_formats() {
    assert_eq!(format_to_vk(TextureFormat::D32_SFLOAT), vk::Format::D32_SFLOAT);
    assert_eq!(format_to_vk(TextureFormat::D24_UNORM_S8_UINT), vk::Format::D24_UNORM_S8_UINT);
    assert_eq!(format_to_vk(TextureFormat::D32_SFLOAT_S8_UINT), vk::Format::D32_SFLOAT_S8_UINT);
}

#[test]
fn test_surface_format_round_trip() {
    for format in [
        TextureFormat::BGRA8_SRGB,
        TextureFormat::RGBA8_SRGB,
        TextureFormat::RGBA8_UNORM,
        TextureFormat::BGRA8_UNORM,
    ] {
        assert_eq!(vk_format_to_format(format_to_vk(format)), format);
    }
}

#[test]
fn test_unknown_surface_format_falls_back() {
    assert_eq!(vk_format_to_format(vk::Format::A2B10G10R10_UNORM_PACK32), TextureFormat::BGRA8_UNORM);
}

#[test]
fn test_aspect_of() {
    assert_eq!(aspect_of(TextureFormat::RGBA8_UNORM), vk::ImageAspectFlags::COLOR);
    assert_eq!(aspect_of(TextureFormat::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
    assert_eq!(
        aspect_of(TextureFormat::D24_UNORM_S8_UINT),
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    );
}

// ============================================================================
// PIPELINE STATE CONVERSION TESTS
// ============================================================================

#[test]
fn test_vertex_format_to_vk() {
    assert_eq!(vertex_format_to_vk(VertexFormat::Float2), vk::Format::R32G32_SFLOAT);
    assert_eq!(vertex_format_to_vk(VertexFormat::Float3), vk::Format::R32G32B32_SFLOAT);
    assert_eq!(vertex_format_to_vk(VertexFormat::Float4), vk::Format::R32G32B32A32_SFLOAT);
}

#[test]
fn test_state_conversions() {
    assert_eq!(topology_to_vk(PrimitiveTopology::TriangleStrip), vk::PrimitiveTopology::TRIANGLE_STRIP);
    assert_eq!(compare_op_to_vk(CompareOp::Less), vk::CompareOp::LESS);
    assert_eq!(compare_op_to_vk(CompareOp::Always), vk::CompareOp::ALWAYS);
    assert_eq!(cull_mode_to_vk(CullMode::Back), vk::CullModeFlags::BACK);
    assert_eq!(cull_mode_to_vk(CullMode::None), vk::CullModeFlags::NONE);
}

// ============================================================================
// SAMPLE COUNT TESTS
// ============================================================================

#[test]
fn test_samples_to_vk() {
    assert_eq!(samples_to_vk(1), Some(vk::SampleCountFlags::TYPE_1));
    assert_eq!(samples_to_vk(4), Some(vk::SampleCountFlags::TYPE_4));
    assert_eq!(samples_to_vk(3), None);
    assert_eq!(samples_to_vk(0), None);
}

#[test]
fn test_max_sample_count() {
    let flags = vk::SampleCountFlags::TYPE_1 | vk::SampleCountFlags::TYPE_2 | vk::SampleCountFlags::TYPE_4;
    assert_eq!(max_sample_count(flags), 4);
    assert_eq!(max_sample_count(vk::SampleCountFlags::TYPE_1), 1);
    assert_eq!(max_sample_count(vk::SampleCountFlags::empty()), 1);
}

#[test]
fn test_layout_sync_masks() {
    let (stage, access) = layout_sync(vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    assert_eq!(stage, vk::PipelineStageFlags::TRANSFER);
    assert_eq!(access, vk::AccessFlags::TRANSFER_WRITE);

    let (stage, access) = layout_sync(vk::ImageLayout::UNDEFINED);
    assert_eq!(stage, vk::PipelineStageFlags::TOP_OF_PIPE);
    assert!(access.is_empty());
}
