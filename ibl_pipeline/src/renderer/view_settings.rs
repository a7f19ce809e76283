/// Per-frame camera, scene and tonemap parameters

use glam::Vec3;

/// Number of analytical lights fed to the PBR pass
pub const NUM_LIGHTS: usize = 3;

/// Directional light
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub direction: Vec3,
    pub radiance: Vec3,
    pub enabled: bool,
}

/// View parameters supplied by the application every frame
///
/// Angles are in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewSettings {
    pub pitch: f32,
    pub yaw: f32,
    pub distance: f32,
    pub fov: f32,
    pub scene_pitch: f32,
    pub scene_yaw: f32,
    pub lights: [Light; NUM_LIGHTS],
    pub exposure: f32,
    pub gamma: f32,
}

impl Default for ViewSettings {
    fn default() -> Self {
        let light = |direction: Vec3| Light {
            direction: direction.normalize(),
            radiance: Vec3::ONE,
            enabled: false,
        };
        Self {
            pitch: 0.0,
            yaw: 0.0,
            distance: 150.0,
            fov: 45.0,
            scene_pitch: 0.0,
            scene_yaw: 0.0,
            lights: [
                light(Vec3::new(-1.0, 0.0, 0.0)),
                light(Vec3::new(1.0, 0.0, 0.0)),
                light(Vec3::new(0.0, -1.0, 0.0)),
            ],
            exposure: 1.0,
            gamma: 2.2,
        }
    }
}
