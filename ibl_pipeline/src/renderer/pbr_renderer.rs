/// PbrRenderer - skybox, PBR model, resolve and tonemap
///
/// Owns the graphics device and every GPU resource of the pipeline.
/// Resources are recorded the moment they are created, so `shutdown`
/// releases exactly what a (possibly failed) `setup` produced.

use crate::device::{
    ClearValues, DeviceConfig, DeviceFactory, DrawCall, DrawState, GraphicsDevice, PassTarget,
    PixelFormat, ProgramId, SampledTexture, ShaderStage, TextureFormat, UniformBlock,
};
use crate::error::{Error, Result};
use crate::renderer::{
    FrameUniforms, RendererConfig, RendererInterface, RendererState, Surface, ViewSettings,
};
use crate::resource::{
    create_clip_space_quad, create_cube_texture, create_frame_buffer, create_texture_from_image,
    create_vertex_buffer, delete_frame_buffer, delete_texture, delete_vertex_buffer,
    generate_texture_mipmaps, resolve_framebuffer, upload_cube_faces, CubeImage, FrameBuffer, Image,
    Mesh, Texture, VertexBuffer,
};
use crate::shader::{build_program, ShaderLibrary};
use crate::{ibl_debug, ibl_error, ibl_info, ibl_warn};

// ===== SHADER NAMES =====

pub const TONEMAP_VS: &str = "tonemap_vs";
pub const TONEMAP_FS: &str = "tonemap_fs";
pub const SKYBOX_VS: &str = "skybox_vs";
pub const SKYBOX_FS: &str = "skybox_fs";
pub const PBR_VS: &str = "pbr_vs";
pub const PBR_FS: &str = "pbr_fs";

// ===== BINDING SLOTS =====

pub const TRANSFORM_BINDING: u32 = 0;
pub const SHADING_BINDING: u32 = 1;
pub const ENVIRONMENT_BINDING: u32 = 2;
pub const ALBEDO_BINDING: u32 = 3;
pub const NORMAL_BINDING: u32 = 4;
pub const METALNESS_BINDING: u32 = 5;
pub const ROUGHNESS_BINDING: u32 = 6;
pub const TONEMAP_UNIFORM_BINDING: u32 = 0;
pub const TONEMAP_COLOR_BINDING: u32 = 1;

/// Decoded inputs of the pipeline
pub struct SceneAssets {
    /// Cube drawn around the camera
    pub skybox: Mesh,
    /// PBR-shaded model
    pub model: Mesh,
    /// Environment cube map (HDR or LDR faces)
    pub environment: CubeImage,
    /// RGB albedo, uploaded as sRGB
    pub albedo: Image,
    /// RGB tangent-space normal map
    pub normal: Image,
    /// Single-channel metalness
    pub metalness: Image,
    /// Single-channel roughness
    pub roughness: Image,
    /// Source of the six shader stages
    pub shaders: Box<dyn ShaderLibrary>,
}

/// Everything created by `setup`
#[derive(Default)]
struct PipelineResources {
    tonemap_program: Option<ProgramId>,
    skybox_program: Option<ProgramId>,
    pbr_program: Option<ProgramId>,

    framebuffer: Option<FrameBuffer>,
    resolve_framebuffer: Option<FrameBuffer>,

    screen_quad: Option<VertexBuffer>,
    skybox: Option<VertexBuffer>,
    pbr_model: Option<VertexBuffer>,

    env_texture: Option<Texture>,
    albedo_texture: Option<Texture>,
    normal_texture: Option<Texture>,
    metalness_texture: Option<Texture>,
    roughness_texture: Option<Texture>,
}

impl PipelineResources {
    /// Release in reverse dependency order: textures, geometry, framebuffers, programs
    fn release(&mut self, device: &mut dyn GraphicsDevice) {
        for slot in [
            &mut self.roughness_texture,
            &mut self.metalness_texture,
            &mut self.normal_texture,
            &mut self.albedo_texture,
            &mut self.env_texture,
        ] {
            if let Some(mut texture) = slot.take() {
                delete_texture(device, &mut texture);
            }
        }
        for slot in [&mut self.pbr_model, &mut self.skybox, &mut self.screen_quad] {
            if let Some(mut buffer) = slot.take() {
                delete_vertex_buffer(device, &mut buffer);
            }
        }
        for slot in [&mut self.resolve_framebuffer, &mut self.framebuffer] {
            if let Some(mut fb) = slot.take() {
                delete_frame_buffer(device, &mut fb);
            }
        }
        for slot in [&mut self.pbr_program, &mut self.skybox_program, &mut self.tonemap_program] {
            if let Some(program) = slot.take() {
                device.destroy_program(program);
            }
        }
    }
}

/// Image-based-lighting PBR renderer over any graphics backend
///
/// With more than one sample per pixel, `setup` creates a multisampled
/// offscreen framebuffer and a single-sample resolve framebuffer. With one
/// sample only the offscreen framebuffer is created: the resolve step is
/// skipped and the tonemap pass samples it directly (see `resolve_target`).
///
/// A frame that fails after it started is aborted on the device, so the
/// next `render` starts clean.
pub struct PbrRenderer<F: DeviceFactory> {
    factory: F,
    config: RendererConfig,
    assets: SceneAssets,
    state: RendererState,
    device: Option<Box<dyn GraphicsDevice>>,
    surface: Option<Surface>,
    resources: PipelineResources,
}

impl<F: DeviceFactory> PbrRenderer<F> {
    pub fn new(factory: F, config: RendererConfig, assets: SceneAssets) -> Self {
        Self {
            factory,
            config,
            assets,
            state: RendererState::Uninitialized,
            device: None,
            surface: None,
            resources: PipelineResources::default(),
        }
    }

    pub fn state(&self) -> RendererState {
        self.state
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Surface returned by the last successful `initialize`
    pub fn surface(&self) -> Option<&Surface> {
        self.surface.as_ref()
    }

    /// The graphics device, while initialized
    pub fn device(&self) -> Option<&dyn GraphicsDevice> {
        self.device.as_deref()
    }

    /// Single-sample framebuffer sampled by the tonemap pass
    ///
    /// This is the offscreen framebuffer itself when rendering with one sample.
    pub fn resolve_target(&self) -> Option<&FrameBuffer> {
        self.resources
            .resolve_framebuffer
            .as_ref()
            .or(self.resources.framebuffer.as_ref())
    }

    fn violation(&self, operation: &str, expected: RendererState) -> Error {
        let message = format!(
            "{} requires state {:?}, renderer is {:?}",
            operation, expected, self.state
        );
        ibl_error!("ibl::renderer", "{}", message);
        Error::ContractViolation(message)
    }

    fn build_resources(&mut self) -> Result<()> {
        let device = self
            .device
            .as_deref_mut()
            .ok_or_else(|| Error::ContractViolation("setup without a device".to_string()))?;
        let (width, height, samples) = match &self.surface {
            Some(surface) => (surface.width, surface.height, surface.samples),
            None => return Err(Error::ContractViolation("setup without a surface".to_string())),
        };
        let assets = &self.assets;
        let res = &mut self.resources;
        let shaders = assets.shaders.as_ref();

        // Leftovers of an earlier failed setup
        res.release(device);

        // Programs
        res.tonemap_program = Some(build_program(
            device,
            shaders,
            &[(TONEMAP_VS, ShaderStage::Vertex), (TONEMAP_FS, ShaderStage::Fragment)],
        )?);
        res.skybox_program = Some(build_program(
            device,
            shaders,
            &[(SKYBOX_VS, ShaderStage::Vertex), (SKYBOX_FS, ShaderStage::Fragment)],
        )?);
        res.pbr_program = Some(build_program(
            device,
            shaders,
            &[(PBR_VS, ShaderStage::Vertex), (PBR_FS, ShaderStage::Fragment)],
        )?);

        // Framebuffers
        let color_format = self.config.color_format;
        let depth_format = self.config.depth_stencil_format;
        res.framebuffer = Some(create_frame_buffer(device, width, height, samples, color_format, depth_format)?);
        if samples > 1 {
            res.resolve_framebuffer = Some(create_frame_buffer(device, width, height, 1, color_format, depth_format)?);
        }

        // Geometry
        res.screen_quad = Some(create_clip_space_quad(device)?);
        res.skybox = Some(create_vertex_buffer(device, &assets.skybox)?);
        res.pbr_model = Some(create_vertex_buffer(device, &assets.model)?);

        // Environment map
        let environment = &assets.environment;
        let env_format = if environment.faces[0].is_hdr() {
            TextureFormat::RGBA16_SFLOAT
        } else {
            TextureFormat::RGBA8_SRGB
        };
        let env_pixels = PixelFormat::from_channels(environment.faces[0].channels).ok_or_else(|| {
            Error::UnsupportedFormat(format!("{} channel environment map", environment.faces[0].channels))
        })?;
        let env_texture = res.env_texture.insert(create_cube_texture(device, environment.size(), env_format, 0)?);
        upload_cube_faces(device, env_texture, environment, env_pixels)?;
        if env_texture.levels > 1 {
            generate_texture_mipmaps(device, env_texture)?;
        }

        // Materials
        for (slot, image, pixels, format) in [
            (&mut res.albedo_texture, &assets.albedo, PixelFormat::RGB, TextureFormat::RGBA8_SRGB),
            (&mut res.normal_texture, &assets.normal, PixelFormat::RGB, TextureFormat::RGBA8_UNORM),
            (&mut res.metalness_texture, &assets.metalness, PixelFormat::R, TextureFormat::R8_UNORM),
            (&mut res.roughness_texture, &assets.roughness, PixelFormat::R, TextureFormat::R8_UNORM),
        ] {
            let texture = slot.insert(create_texture_from_image(device, image, pixels, format, 0)?);
            if texture.levels > 1 {
                generate_texture_mipmaps(device, texture)?;
            }
        }

        Ok(())
    }

    fn record_frame(&mut self, view: &ViewSettings) -> Result<()> {
        let device = self
            .device
            .as_deref_mut()
            .ok_or_else(|| Error::ContractViolation("render without a device".to_string()))?;
        let res = &self.resources;
        let missing = || Error::InvalidResource("pipeline resources incomplete".to_string());

        let framebuffer = res.framebuffer.as_ref().ok_or_else(missing)?;
        // Single-sample rendering skips the resolve and samples the framebuffer directly
        let resolve_target = res.resolve_framebuffer.as_ref().unwrap_or(framebuffer);
        let skybox = res.skybox.as_ref().ok_or_else(missing)?;
        let model = res.pbr_model.as_ref().ok_or_else(missing)?;
        let quad = res.screen_quad.as_ref().ok_or_else(missing)?;
        let env = res.env_texture.as_ref().ok_or_else(missing)?;
        let albedo = res.albedo_texture.as_ref().ok_or_else(missing)?;
        let normal = res.normal_texture.as_ref().ok_or_else(missing)?;
        let metalness = res.metalness_texture.as_ref().ok_or_else(missing)?;
        let roughness = res.roughness_texture.as_ref().ok_or_else(missing)?;
        let resolved_color = resolve_target.color_texture().ok_or_else(missing)?;

        let uniforms = FrameUniforms::compute(
            view,
            framebuffer.width,
            framebuffer.height,
            device.caps().clip_space_y_down,
        );
        let transform = bytemuck::bytes_of(&uniforms.transform);
        let shading = bytemuck::bytes_of(&uniforms.shading);
        let tonemap = bytemuck::bytes_of(&uniforms.tonemap);

        device.begin_frame()?;

        // Skybox and PBR model into the multisampled framebuffer
        device.begin_pass(
            PassTarget::Framebuffer(framebuffer.id),
            &ClearValues { color: self.config.clear_color, ..Default::default() },
        )?;
        device.draw(&DrawCall {
            program: res.skybox_program.ok_or_else(missing)?,
            vertex_array: skybox.vao,
            topology: skybox.topology,
            element_count: skybox.num_elements,
            state: DrawState::BACKGROUND,
            uniforms: &[UniformBlock { binding: TRANSFORM_BINDING, data: transform }],
            textures: &[SampledTexture { binding: ENVIRONMENT_BINDING, texture: env.id }],
        })?;
        device.draw(&DrawCall {
            program: res.pbr_program.ok_or_else(missing)?,
            vertex_array: model.vao,
            topology: model.topology,
            element_count: model.num_elements,
            state: DrawState::OPAQUE,
            uniforms: &[
                UniformBlock { binding: TRANSFORM_BINDING, data: transform },
                UniformBlock { binding: SHADING_BINDING, data: shading },
            ],
            textures: &[
                SampledTexture { binding: ENVIRONMENT_BINDING, texture: env.id },
                SampledTexture { binding: ALBEDO_BINDING, texture: albedo.id },
                SampledTexture { binding: NORMAL_BINDING, texture: normal.id },
                SampledTexture { binding: METALNESS_BINDING, texture: metalness.id },
                SampledTexture { binding: ROUGHNESS_BINDING, texture: roughness.id },
            ],
        })?;
        device.end_pass()?;

        if framebuffer.samples > 1 {
            resolve_framebuffer(device, framebuffer, resolve_target)?;
        }

        // Tonemap the resolved color onto the surface
        device.begin_pass(PassTarget::Surface, &ClearValues::default())?;
        device.draw(&DrawCall {
            program: res.tonemap_program.ok_or_else(missing)?,
            vertex_array: quad.vao,
            topology: quad.topology,
            element_count: quad.num_elements,
            state: DrawState::BACKGROUND,
            uniforms: &[UniformBlock { binding: TONEMAP_UNIFORM_BINDING, data: tonemap }],
            textures: &[SampledTexture { binding: TONEMAP_COLOR_BINDING, texture: resolved_color.id }],
        })?;
        device.end_pass()?;

        device.present()
    }
}

impl<F: DeviceFactory> RendererInterface for PbrRenderer<F> {
    fn initialize(&mut self, width: u32, height: u32, samples: u32) -> Result<Surface> {
        if self.state != RendererState::Uninitialized {
            return Err(self.violation("initialize", RendererState::Uninitialized));
        }
        if width == 0 || height == 0 || samples == 0 || !samples.is_power_of_two() {
            let message = format!("invalid surface {}x{} with {} samples", width, height, samples);
            ibl_error!("ibl::renderer", "{}", message);
            return Err(Error::ContextCreation(message));
        }

        let device = self.factory.create_device(&DeviceConfig {
            app_name: self.config.app_name.clone(),
            width,
            height,
            samples,
            enable_diagnostics: self.config.enable_diagnostics,
            diagnostic_severity: self.config.diagnostic_severity,
        })?;

        let max_samples = device.caps().max_samples;
        if samples > max_samples {
            let message = format!("{} samples requested, device supports {}", samples, max_samples);
            ibl_error!("ibl::renderer", "{}", message);
            return Err(Error::ContextCreation(message));
        }

        ibl_info!(
            "ibl::renderer",
            "Initialized {} device: {}x{}, {} samples",
            device.caps().backend_name,
            width,
            height,
            samples
        );

        let surface = Surface::new(width, height, samples);
        self.device = Some(device);
        self.surface = Some(surface);
        self.state = RendererState::Initialized;
        Ok(surface)
    }

    fn shutdown(&mut self) {
        let Some(mut device) = self.device.take() else {
            self.state = RendererState::Uninitialized;
            return;
        };
        self.state = RendererState::ShuttingDown;

        if let Err(e) = device.wait_idle() {
            ibl_warn!("ibl::renderer", "wait_idle failed during shutdown: {}", e);
        }
        self.resources.release(device.as_mut());
        drop(device);

        self.surface = None;
        self.state = RendererState::Uninitialized;
        ibl_info!("ibl::renderer", "Shutdown complete");
    }

    fn setup(&mut self) -> Result<()> {
        if self.state != RendererState::Initialized {
            return Err(self.violation("setup", RendererState::Initialized));
        }
        if let Err(e) = self.build_resources() {
            ibl_error!("ibl::renderer", "Setup failed: {}", e);
            return Err(e);
        }
        self.state = RendererState::Ready;
        ibl_info!("ibl::renderer", "Setup complete");
        Ok(())
    }

    fn render(&mut self, surface: &Surface, view: &ViewSettings) -> Result<()> {
        if self.state != RendererState::Ready {
            return Err(self.violation("render", RendererState::Ready));
        }
        if self.surface.map(|s| s.id()) != Some(surface.id()) {
            let message = "render called with a surface from another initialize".to_string();
            ibl_error!("ibl::renderer", "{}", message);
            return Err(Error::ContractViolation(message));
        }
        ibl_debug!("ibl::renderer", "Rendering frame");
        let result = self.record_frame(view);
        if let Err(e) = &result {
            ibl_error!("ibl::renderer", "Frame failed: {}", e);
            if let Some(device) = self.device.as_deref_mut() {
                device.abort_frame();
            }
        }
        result
    }
}

impl<F: DeviceFactory> Drop for PbrRenderer<F> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "pbr_renderer_tests.rs"]
mod tests;
