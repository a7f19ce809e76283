//! Integration tests for the GPU resource manager on the Vulkan backend
//!
//! All tests require a GPU and are marked with #[ignore].
//!
//! Run with: cargo test --test resource_integration_tests -- --ignored

mod gpu_test_utils;

use gpu_test_utils::test_device;
use ibl_pipeline::ibl::device::{PixelFormat, TextureFormat, TextureKind};
use ibl_pipeline::ibl::resource::{
    compute_mip_levels, create_clip_space_quad, create_cube_texture, create_frame_buffer,
    create_texture_from_image, create_vertex_buffer, delete_frame_buffer, delete_texture,
    delete_vertex_buffer, generate_texture_mipmaps, upload_cube_faces, CubeImage, Image, Mesh,
};
use ibl_pipeline::ibl::Error;
use serial_test::serial;

// ============================================================================
// TEXTURES
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_integration_texture_from_ldr_image() {
    let mut device = test_device();
    let image = Image::from_u8(64, 32, 3, vec![200; 64 * 32 * 3]).unwrap();

    let mut texture =
        create_texture_from_image(device.as_mut(), &image, PixelFormat::RGB, TextureFormat::RGBA8_SRGB, 0).unwrap();
    assert_eq!(texture.levels, compute_mip_levels(64, 32));
    assert_eq!((texture.width, texture.height), (64, 32));

    generate_texture_mipmaps(device.as_mut(), &mut texture).unwrap();
    assert!(texture.mipmaps_generated);
    // Second call is skipped
    generate_texture_mipmaps(device.as_mut(), &mut texture).unwrap();

    delete_texture(device.as_mut(), &mut texture);
    assert!(texture.is_null());
    delete_texture(device.as_mut(), &mut texture);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_integration_texture_from_hdr_image() {
    let mut device = test_device();
    let image = Image::from_f32(16, 16, 3, vec![4.5; 16 * 16 * 3]).unwrap();

    let mut texture =
        create_texture_from_image(device.as_mut(), &image, PixelFormat::RGB, TextureFormat::RGBA16_SFLOAT, 1).unwrap();
    assert_eq!(texture.levels, 1);
    assert!(matches!(
        generate_texture_mipmaps(device.as_mut(), &mut texture),
        Err(Error::InvalidResource(_))
    ));
    delete_texture(device.as_mut(), &mut texture);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_integration_hdr_into_ldr_format() {
    let mut device = test_device();
    let image = Image::from_f32(4, 4, 1, vec![0.5; 16]).unwrap();

    let result = create_texture_from_image(device.as_mut(), &image, PixelFormat::R, TextureFormat::R8_UNORM, 1);
    assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_integration_cube_texture() {
    let mut device = test_device();
    let face = || Image::from_f32(32, 32, 3, vec![1.0; 32 * 32 * 3]).unwrap();
    let cube = CubeImage::new([face(), face(), face(), face(), face(), face()]).unwrap();

    let mut texture = create_cube_texture(device.as_mut(), cube.size(), TextureFormat::RGBA16_SFLOAT, 0).unwrap();
    assert_eq!(texture.kind, TextureKind::Cube);
    assert_eq!(texture.levels, 6);

    upload_cube_faces(device.as_mut(), &texture, &cube, PixelFormat::RGB).unwrap();
    generate_texture_mipmaps(device.as_mut(), &mut texture).unwrap();
    delete_texture(device.as_mut(), &mut texture);
}

// ============================================================================
// FRAMEBUFFERS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_integration_framebuffers() {
    let mut device = test_device();
    let samples = device.caps().max_samples.min(4);

    let mut msaa = create_frame_buffer(
        device.as_mut(),
        256,
        128,
        samples,
        TextureFormat::RGBA16_SFLOAT,
        TextureFormat::D24_UNORM_S8_UINT,
    )
    .or_else(|_| {
        // D24S8 is optional in Vulkan
        create_frame_buffer(device.as_mut(), 256, 128, samples, TextureFormat::RGBA16_SFLOAT, TextureFormat::D32_SFLOAT)
    })
    .unwrap();
    let mut resolved =
        create_frame_buffer(device.as_mut(), 256, 128, 1, TextureFormat::RGBA16_SFLOAT, TextureFormat::D32_SFLOAT)
            .unwrap();

    assert_eq!(msaa.samples, samples);
    assert!(resolved.color_texture().is_some());

    delete_frame_buffer(device.as_mut(), &mut resolved);
    delete_frame_buffer(device.as_mut(), &mut msaa);
    assert!(msaa.is_null() && resolved.is_null());
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_integration_framebuffer_color_depth_format() {
    let mut device = test_device();
    let result =
        create_frame_buffer(device.as_mut(), 64, 64, 1, TextureFormat::RGBA16_SFLOAT, TextureFormat::RGBA16_SFLOAT);
    assert!(matches!(result, Err(Error::FramebufferIncomplete(_))));
}

// ============================================================================
// GEOMETRY
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_integration_vertex_buffers() {
    let mut device = test_device();

    let mut cube = create_vertex_buffer(device.as_mut(), &Mesh::unit_cube()).unwrap();
    assert_eq!(cube.num_elements, 36);
    assert!(cube.ibo.is_some());

    let mut quad = create_clip_space_quad(device.as_mut()).unwrap();
    assert_eq!(quad.num_elements, 4);
    assert!(quad.ibo.is_none());

    delete_vertex_buffer(device.as_mut(), &mut quad);
    delete_vertex_buffer(device.as_mut(), &mut cube);
    assert!(cube.is_null() && quad.is_null());
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_integration_empty_mesh() {
    let mut device = test_device();
    let result = create_vertex_buffer(device.as_mut(), &Mesh::default());
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}
