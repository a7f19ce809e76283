/// Mock GraphicsDevice for unit tests (no GPU required)
///
/// Tracks every created and destroyed resource in a shared ledger so tests
/// can check leak-freedom and pass ordering. Validation mirrors what a real
/// backend rejects, and a few failures can be injected.

use slotmap::SlotMap;
use std::sync::{Arc, Mutex};

use crate::device::*;
use crate::diagnostics::{DebugMessage, DiagnosticChannel};
use crate::error::{Error, Result};
use crate::ibl_bail;

// ============================================================================
// Ledger
// ============================================================================

/// Shader stage as seen by the mock
#[derive(Debug, Clone)]
pub struct MockStage {
    pub name: String,
    pub stage: ShaderStage,
}

/// Render target as seen by the mock
#[derive(Debug, Clone, Copy)]
pub struct MockFramebuffer {
    pub width: u32,
    pub height: u32,
    pub samples: u32,
}

/// One recorded device call
#[derive(Debug, Clone, PartialEq)]
pub enum MockCommand {
    Upload { texture: TextureId, layer: u32, bytes: usize },
    GenerateMipmaps(TextureId),
    BeginFrame,
    BeginPass(PassTarget),
    Draw {
        program: ProgramId,
        vertex_array: VertexArrayId,
        element_count: u32,
        state: DrawState,
        uniforms: Vec<(u32, Vec<u8>)>,
        textures: Vec<SampledTexture>,
    },
    EndPass,
    Resolve { src: FramebufferId, dst: FramebufferId },
    Present,
    AbortFrame,
    WaitIdle,
    Destroy(&'static str),
}

/// Shared record of everything a mock device did
#[derive(Debug)]
pub struct MockLedger {
    pub stages: SlotMap<ShaderStageId, MockStage>,
    pub programs: SlotMap<ProgramId, Vec<String>>,
    pub textures: SlotMap<TextureId, TextureDesc>,
    pub render_targets: SlotMap<RenderTargetId, RenderTargetDesc>,
    pub framebuffers: SlotMap<FramebufferId, MockFramebuffer>,
    pub buffers: SlotMap<BufferId, (BufferUsage, usize)>,
    pub vertex_arrays: SlotMap<VertexArrayId, VertexArrayDesc>,
    pub commands: Vec<MockCommand>,
    pub devices_created: usize,
    pub devices_dropped: usize,

    // ===== FAILURE INJECTION =====
    /// Compiling a stage with this logical name fails
    pub fail_compile: Option<String>,
    /// Every link fails
    pub fail_link: bool,
    /// Device creation fails
    pub fail_device_creation: bool,
    /// Sample count reported by caps
    pub max_samples: u32,
    /// Render targets with this format are rejected
    pub reject_format: Option<TextureFormat>,
    /// Number of upcoming draws that fail
    pub fail_draws: usize,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self {
            stages: SlotMap::with_key(),
            programs: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            render_targets: SlotMap::with_key(),
            framebuffers: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            vertex_arrays: SlotMap::with_key(),
            commands: Vec::new(),
            devices_created: 0,
            devices_dropped: 0,
            fail_compile: None,
            fail_link: false,
            fail_device_creation: false,
            max_samples: 8,
            reject_format: None,
            fail_draws: 0,
        }
    }
}

impl MockLedger {
    /// Total number of live GPU objects of every kind
    pub fn live_resources(&self) -> usize {
        self.stages.len()
            + self.programs.len()
            + self.textures.len()
            + self.render_targets.len()
            + self.framebuffers.len()
            + self.buffers.len()
            + self.vertex_arrays.len()
    }

    /// Number of recorded draws
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, MockCommand::Draw { .. }))
            .count()
    }
}

pub type SharedLedger = Arc<Mutex<MockLedger>>;

// ============================================================================
// Mock device
// ============================================================================

/// Mock device that tracks created resources without GPU
pub struct MockGraphicsDevice {
    pub ledger: SharedLedger,
    caps: DeviceCaps,
    config: DeviceConfig,
    diagnostics: Option<DiagnosticChannel>,
    frame_open: bool,
    pass_open: bool,
}

impl MockGraphicsDevice {
    pub fn new(ledger: SharedLedger, config: &DeviceConfig) -> Self {
        let max_samples = ledger.lock().unwrap().max_samples;
        Self {
            ledger,
            caps: DeviceCaps {
                backend_name: "Mock".to_string(),
                max_samples,
                max_texture_size: 16384,
                clip_space_y_down: false,
            },
            config: config.clone(),
            diagnostics: config
                .enable_diagnostics
                .then(|| DiagnosticChannel::new(config.diagnostic_severity)),
            frame_open: false,
            pass_open: false,
        }
    }

    fn framebuffer_of(ledger: &MockLedger, color: ColorAttachment) -> Option<MockFramebuffer> {
        match color {
            ColorAttachment::Texture(id) => ledger.textures.get(id).map(|t| MockFramebuffer {
                width: t.width,
                height: t.height,
                samples: 1,
            }),
            ColorAttachment::RenderTarget(id) => ledger.render_targets.get(id).map(|rt| MockFramebuffer {
                width: rt.width,
                height: rt.height,
                samples: rt.samples,
            }),
        }
    }
}

impl Drop for MockGraphicsDevice {
    fn drop(&mut self) {
        if let Ok(mut ledger) = self.ledger.lock() {
            ledger.devices_dropped += 1;
        }
    }
}

impl GraphicsDevice for MockGraphicsDevice {
    fn caps(&self) -> &DeviceCaps {
        &self.caps
    }

    fn surface_info(&self) -> SurfaceInfo {
        SurfaceInfo {
            width: self.config.width,
            height: self.config.height,
            format: TextureFormat::BGRA8_SRGB,
        }
    }

    fn create_shader_stage(&mut self, name: &str, stage: ShaderStage, code: &[u8]) -> Result<ShaderStageId> {
        let mut ledger = self.ledger.lock().unwrap();
        if ledger.fail_compile.as_deref() == Some(name) || code.is_empty() {
            return Err(Error::ShaderCompile {
                name: name.to_string(),
                stage,
                log: "mock: injected compile failure".to_string(),
            });
        }
        Ok(ledger.stages.insert(MockStage { name: name.to_string(), stage }))
    }

    fn destroy_shader_stage(&mut self, id: ShaderStageId) {
        let mut ledger = self.ledger.lock().unwrap();
        if ledger.stages.remove(id).is_some() {
            ledger.commands.push(MockCommand::Destroy("shader_stage"));
        }
    }

    fn link_program(&mut self, stages: &[ShaderStageId]) -> Result<ProgramId> {
        let mut ledger = self.ledger.lock().unwrap();
        if ledger.fail_link {
            return Err(Error::ShaderLink { log: "mock: injected link failure".to_string() });
        }
        let mut names = Vec::new();
        let (mut vertex, mut fragment) = (0, 0);
        for &id in stages {
            let Some(stage) = ledger.stages.get(id) else {
                return Err(Error::ShaderLink { log: "unknown shader stage".to_string() });
            };
            match stage.stage {
                ShaderStage::Vertex => vertex += 1,
                ShaderStage::Fragment => fragment += 1,
                ShaderStage::Compute => {}
            }
            names.push(stage.name.clone());
        }
        if vertex != 1 || fragment != 1 {
            return Err(Error::ShaderLink {
                log: format!("expected one vertex and one fragment stage, got {:?}", names),
            });
        }
        Ok(ledger.programs.insert(names))
    }

    fn destroy_program(&mut self, id: ProgramId) {
        let mut ledger = self.ledger.lock().unwrap();
        if ledger.programs.remove(id).is_some() {
            ledger.commands.push(MockCommand::Destroy("program"));
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId> {
        if desc.width == 0 || desc.height == 0 || desc.width.max(desc.height) > self.caps.max_texture_size {
            ibl_bail!("ibl::mock", "create_texture: invalid size {}x{}", desc.width, desc.height);
        }
        if desc.format.is_depth() {
            return Err(Error::UnsupportedFormat(format!("{:?} is not a sampled format", desc.format)));
        }
        if desc.kind == TextureKind::Cube && desc.width != desc.height {
            return Err(Error::InvalidResource("cube faces must be square".to_string()));
        }
        if desc.levels == 0 || desc.levels > 32 - desc.width.max(desc.height).leading_zeros() {
            return Err(Error::InvalidResource(format!("invalid level count {}", desc.levels)));
        }
        Ok(self.ledger.lock().unwrap().textures.insert(desc.clone()))
    }

    fn upload_texture(&mut self, id: TextureId, layer: u32, data: &[u8]) -> Result<()> {
        let mut ledger = self.ledger.lock().unwrap();
        let Some(desc) = ledger.textures.get(id) else {
            return Err(Error::InvalidResource("upload_texture: unknown texture".to_string()));
        };
        let expected = (desc.width * desc.height * desc.format.bytes_per_pixel()) as usize;
        if layer >= desc.kind.layers() || data.len() != expected {
            return Err(Error::InvalidResource(format!(
                "upload_texture: layer {} with {} bytes (expected {})",
                layer,
                data.len(),
                expected
            )));
        }
        ledger.commands.push(MockCommand::Upload { texture: id, layer, bytes: data.len() });
        Ok(())
    }

    fn generate_mipmaps(&mut self, id: TextureId) -> Result<()> {
        let mut ledger = self.ledger.lock().unwrap();
        match ledger.textures.get(id) {
            Some(desc) if desc.levels > 1 => {
                ledger.commands.push(MockCommand::GenerateMipmaps(id));
                Ok(())
            }
            Some(_) => Err(Error::InvalidResource("texture has a single level".to_string())),
            None => Err(Error::InvalidResource("generate_mipmaps: unknown texture".to_string())),
        }
    }

    fn destroy_texture(&mut self, id: TextureId) {
        let mut ledger = self.ledger.lock().unwrap();
        if ledger.textures.remove(id).is_some() {
            ledger.commands.push(MockCommand::Destroy("texture"));
        }
    }

    fn create_render_target(&mut self, desc: &RenderTargetDesc) -> Result<RenderTargetId> {
        let mut ledger = self.ledger.lock().unwrap();
        if desc.samples == 0 || !desc.samples.is_power_of_two() || desc.samples > self.caps.max_samples {
            return Err(Error::FramebufferIncomplete(format!("unsupported sample count {}", desc.samples)));
        }
        if ledger.reject_format == Some(desc.format) {
            return Err(Error::FramebufferIncomplete(format!("format {:?} rejected", desc.format)));
        }
        Ok(ledger.render_targets.insert(*desc))
    }

    fn destroy_render_target(&mut self, id: RenderTargetId) {
        let mut ledger = self.ledger.lock().unwrap();
        if ledger.render_targets.remove(id).is_some() {
            ledger.commands.push(MockCommand::Destroy("render_target"));
        }
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> Result<FramebufferId> {
        let mut ledger = self.ledger.lock().unwrap();
        let Some(color) = Self::framebuffer_of(&ledger, desc.color) else {
            return Err(Error::FramebufferIncomplete("missing color attachment".to_string()));
        };
        let Some(depth) = ledger.render_targets.get(desc.depth_stencil).copied() else {
            return Err(Error::FramebufferIncomplete("missing depth/stencil attachment".to_string()));
        };
        if !depth.format.is_depth() {
            return Err(Error::FramebufferIncomplete(format!("{:?} is not a depth format", depth.format)));
        }
        if let ColorAttachment::RenderTarget(id) = desc.color {
            if ledger.render_targets[id].format.is_depth() {
                return Err(Error::FramebufferIncomplete("depth format in color slot".to_string()));
            }
        }
        if color.width != depth.width || color.height != depth.height || color.samples != depth.samples {
            return Err(Error::FramebufferIncomplete("attachment size or sample mismatch".to_string()));
        }
        Ok(ledger.framebuffers.insert(color))
    }

    fn destroy_framebuffer(&mut self, id: FramebufferId) {
        let mut ledger = self.ledger.lock().unwrap();
        if ledger.framebuffers.remove(id).is_some() {
            ledger.commands.push(MockCommand::Destroy("framebuffer"));
        }
    }

    fn resolve_framebuffer(&mut self, src: FramebufferId, dst: FramebufferId) -> Result<()> {
        let mut ledger = self.ledger.lock().unwrap();
        let (Some(s), Some(d)) = (ledger.framebuffers.get(src).copied(), ledger.framebuffers.get(dst).copied()) else {
            return Err(Error::InvalidResource("resolve: unknown framebuffer".to_string()));
        };
        if self.pass_open || s.samples <= 1 || d.samples != 1 || s.width != d.width || s.height != d.height {
            return Err(Error::InvalidResource("resolve: incompatible framebuffers".to_string()));
        }
        ledger.commands.push(MockCommand::Resolve { src, dst });
        Ok(())
    }

    fn create_buffer(&mut self, usage: BufferUsage, data: &[u8]) -> Result<BufferId> {
        if data.is_empty() {
            ibl_bail!("ibl::mock", "create_buffer: empty data");
        }
        Ok(self.ledger.lock().unwrap().buffers.insert((usage, data.len())))
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        let mut ledger = self.ledger.lock().unwrap();
        if ledger.buffers.remove(id).is_some() {
            ledger.commands.push(MockCommand::Destroy("buffer"));
        }
    }

    fn create_vertex_array(&mut self, desc: &VertexArrayDesc) -> Result<VertexArrayId> {
        let mut ledger = self.ledger.lock().unwrap();
        let index_ok = desc.index_buffer.map_or(true, |(id, _)| ledger.buffers.contains_key(id));
        if !ledger.buffers.contains_key(desc.vertex_buffer) || !index_ok {
            return Err(Error::InvalidResource("vertex array references unknown buffer".to_string()));
        }
        Ok(ledger.vertex_arrays.insert(desc.clone()))
    }

    fn destroy_vertex_array(&mut self, id: VertexArrayId) {
        let mut ledger = self.ledger.lock().unwrap();
        if ledger.vertex_arrays.remove(id).is_some() {
            ledger.commands.push(MockCommand::Destroy("vertex_array"));
        }
    }

    fn begin_frame(&mut self) -> Result<()> {
        if self.frame_open {
            ibl_bail!("ibl::mock", "begin_frame: frame already open");
        }
        self.frame_open = true;
        self.ledger.lock().unwrap().commands.push(MockCommand::BeginFrame);
        Ok(())
    }

    fn begin_pass(&mut self, target: PassTarget, _clear: &ClearValues) -> Result<()> {
        if !self.frame_open || self.pass_open {
            ibl_bail!("ibl::mock", "begin_pass: invalid recording state");
        }
        let mut ledger = self.ledger.lock().unwrap();
        if let PassTarget::Framebuffer(id) = target {
            if !ledger.framebuffers.contains_key(id) {
                return Err(Error::InvalidResource("begin_pass: unknown framebuffer".to_string()));
            }
        }
        self.pass_open = true;
        ledger.commands.push(MockCommand::BeginPass(target));
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall) -> Result<()> {
        if !self.pass_open {
            ibl_bail!("ibl::mock", "draw outside of a pass");
        }
        let mut ledger = self.ledger.lock().unwrap();
        if ledger.fail_draws > 0 {
            ledger.fail_draws -= 1;
            ibl_bail!("ibl::mock", "draw: injected failure");
        }
        if !ledger.programs.contains_key(call.program)
            || !ledger.vertex_arrays.contains_key(call.vertex_array)
            || call.textures.iter().any(|t| !ledger.textures.contains_key(t.texture))
        {
            return Err(Error::InvalidResource("draw references a dead resource".to_string()));
        }
        ledger.commands.push(MockCommand::Draw {
            program: call.program,
            vertex_array: call.vertex_array,
            element_count: call.element_count,
            state: call.state,
            uniforms: call.uniforms.iter().map(|u| (u.binding, u.data.to_vec())).collect(),
            textures: call.textures.to_vec(),
        });
        Ok(())
    }

    fn end_pass(&mut self) -> Result<()> {
        if !self.pass_open {
            ibl_bail!("ibl::mock", "end_pass without begin_pass");
        }
        self.pass_open = false;
        self.ledger.lock().unwrap().commands.push(MockCommand::EndPass);
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        if !self.frame_open || self.pass_open {
            ibl_bail!("ibl::mock", "present: invalid recording state");
        }
        self.frame_open = false;
        self.ledger.lock().unwrap().commands.push(MockCommand::Present);
        Ok(())
    }

    fn abort_frame(&mut self) {
        if !self.frame_open {
            return;
        }
        self.frame_open = false;
        self.pass_open = false;
        self.ledger.lock().unwrap().commands.push(MockCommand::AbortFrame);
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.ledger.lock().unwrap().commands.push(MockCommand::WaitIdle);
        Ok(())
    }

    fn emit_diagnostic(&self, message: &DebugMessage) -> bool {
        self.diagnostics
            .as_ref()
            .map_or(false, |channel| channel.report(message))
    }
}

// ============================================================================
// Mock factory
// ============================================================================

/// Factory producing mock devices that share one ledger
#[derive(Default)]
pub struct MockDeviceFactory {
    pub ledger: SharedLedger,
}

impl MockDeviceFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceFactory for MockDeviceFactory {
    fn create_device(&mut self, config: &DeviceConfig) -> Result<Box<dyn GraphicsDevice>> {
        {
            let mut ledger = self.ledger.lock().unwrap();
            if ledger.fail_device_creation {
                return Err(Error::ContextCreation("mock: injected context failure".to_string()));
            }
            ledger.devices_created += 1;
        }
        Ok(Box::new(MockGraphicsDevice::new(self.ledger.clone(), config)))
    }
}

/// Default config used by mock-based tests
pub fn test_config(width: u32, height: u32, samples: u32) -> DeviceConfig {
    DeviceConfig {
        app_name: "ibl-test".to_string(),
        width,
        height,
        samples,
        enable_diagnostics: false,
        diagnostic_severity: Default::default(),
    }
}

#[cfg(test)]
#[path = "mock_device_tests.rs"]
mod tests;
