//! Unit tests for uniforms.rs

use glam::{Mat4, Vec3, Vec4};

use crate::renderer::uniforms::*;
use crate::renderer::ViewSettings;

fn approx(a: Vec4, b: Vec4) -> bool {
    (a - b).abs().max_element() < 1e-3
}

#[test]
fn test_std140_sizes() {
    assert_eq!(std::mem::size_of::<TransformUniforms>(), 192);
    assert_eq!(std::mem::size_of::<ShadingUniforms>(), 112);
    assert_eq!(std::mem::size_of::<TonemapUniforms>(), 16);
}

#[test]
fn test_eye_position_follows_distance() {
    let view = ViewSettings { distance: 150.0, ..Default::default() };
    let uniforms = FrameUniforms::compute(&view, 800, 600, false);
    assert!(approx(uniforms.shading.eye_position, Vec4::new(0.0, 0.0, 150.0, 0.0)));
}

#[test]
fn test_eye_position_with_yaw() {
    let view = ViewSettings { yaw: 90.0, distance: 10.0, ..Default::default() };
    let uniforms = FrameUniforms::compute(&view, 800, 600, false);
    // inverse(rotY(90)) moves the camera from +Z to -X
    assert!(approx(uniforms.shading.eye_position, Vec4::new(-10.0, 0.0, 0.0, 0.0)));
}

#[test]
fn test_sky_projection_ignores_distance() {
    let near = FrameUniforms::compute(&ViewSettings { distance: 5.0, ..Default::default() }, 800, 600, false);
    let far = FrameUniforms::compute(&ViewSettings { distance: 500.0, ..Default::default() }, 800, 600, false);
    assert_eq!(near.transform.sky_projection, far.transform.sky_projection);
    assert_ne!(near.transform.view_projection, far.transform.view_projection);
}

#[test]
fn test_flip_y_mirrors_projection() {
    let view = ViewSettings::default();
    let normal = FrameUniforms::compute(&view, 800, 600, false);
    let flipped = FrameUniforms::compute(&view, 800, 600, true);

    let p = Vec4::new(0.0, 10.0, 0.0, 1.0);
    let a = normal.transform.sky_projection * p;
    let b = flipped.transform.sky_projection * p;
    assert!((a.y + b.y).abs() < 1e-4);
    assert!((a.x - b.x).abs() < 1e-4);
}

#[test]
fn test_disabled_lights_have_zero_radiance() {
    let mut view = ViewSettings::default();
    view.lights[1].enabled = true;
    view.lights[1].radiance = Vec3::new(2.0, 3.0, 4.0);

    let uniforms = FrameUniforms::compute(&view, 800, 600, false);

    assert_eq!(uniforms.shading.lights[0].radiance, Vec4::ZERO);
    assert_eq!(uniforms.shading.lights[1].radiance, Vec4::new(2.0, 3.0, 4.0, 0.0));
    assert_eq!(uniforms.shading.lights[2].radiance, Vec4::ZERO);
    assert_eq!(uniforms.shading.lights[1].direction.w, 0.0);
}

#[test]
fn test_scene_rotation_and_tonemap() {
    let view = ViewSettings { scene_yaw: 30.0, exposure: 2.0, gamma: 2.4, ..Default::default() };
    let uniforms = FrameUniforms::compute(&view, 800, 600, false);
    assert!(uniforms
        .transform
        .scene_rotation
        .abs_diff_eq(Mat4::from_rotation_y(30f32.to_radians()), 1e-6));
    assert_eq!(uniforms.tonemap.exposure, 2.0);
    assert_eq!(uniforms.tonemap.gamma, 2.4);
}

#[test]
fn test_zero_height_does_not_produce_nan() {
    let uniforms = FrameUniforms::compute(&ViewSettings::default(), 800, 0, false);
    assert!(!uniforms.transform.view_projection.is_nan());
}
