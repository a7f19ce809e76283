/// Uniform blocks shared with the shaders (std140 layout)

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use crate::renderer::{ViewSettings, NUM_LIGHTS};

/// Near clip plane distance
pub const Z_NEAR: f32 = 1.0;
/// Far clip plane distance
pub const Z_FAR: f32 = 1000.0;

/// Camera and scene transforms (binding 0)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TransformUniforms {
    pub view_projection: Mat4,
    pub sky_projection: Mat4,
    pub scene_rotation: Mat4,
}

/// One light as seen by the PBR shader
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ShadingLight {
    pub direction: Vec4,
    pub radiance: Vec4,
}

/// Lights and eye position (binding 1)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ShadingUniforms {
    pub lights: [ShadingLight; NUM_LIGHTS],
    pub eye_position: Vec4,
}

/// Tonemap parameters
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TonemapUniforms {
    pub exposure: f32,
    pub gamma: f32,
    pub _pad: [f32; 2],
}

/// All uniform blocks for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameUniforms {
    pub transform: TransformUniforms,
    pub shading: ShadingUniforms,
    pub tonemap: TonemapUniforms,
}

impl FrameUniforms {
    /// Compute the uniforms for a `width` x `height` surface
    ///
    /// `flip_y` mirrors the projection for backends whose clip space Y
    /// axis points down.
    pub fn compute(view: &ViewSettings, width: u32, height: u32, flip_y: bool) -> Self {
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        let mut projection = Mat4::perspective_rh(view.fov.to_radians(), aspect, Z_NEAR, Z_FAR);
        if flip_y {
            projection.y_axis.y = -projection.y_axis.y;
        }

        let view_rotation =
            Mat4::from_rotation_x(view.pitch.to_radians()) * Mat4::from_rotation_y(view.yaw.to_radians());
        let scene_rotation = Mat4::from_rotation_x(view.scene_pitch.to_radians())
            * Mat4::from_rotation_y(view.scene_yaw.to_radians());
        let view_matrix = Mat4::from_translation(glam::Vec3::new(0.0, 0.0, -view.distance)) * view_rotation;
        let eye = view_matrix.inverse().w_axis;

        let lights = view.lights.map(|light| ShadingLight {
            direction: light.direction.extend(0.0),
            radiance: if light.enabled { light.radiance.extend(0.0) } else { Vec4::ZERO },
        });

        Self {
            transform: TransformUniforms {
                view_projection: projection * view_matrix,
                sky_projection: projection * view_rotation,
                scene_rotation,
            },
            shading: ShadingUniforms {
                lights,
                eye_position: eye.truncate().extend(0.0),
            },
            tonemap: TonemapUniforms {
                exposure: view.exposure,
                gamma: view.gamma,
                _pad: [0.0; 2],
            },
        }
    }
}

#[cfg(test)]
#[path = "uniforms_tests.rs"]
mod tests;
