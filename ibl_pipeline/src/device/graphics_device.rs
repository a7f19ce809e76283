/// GraphicsDevice trait - backend capability interface
///
/// Every graphics backend (Vulkan, the test mock) implements this trait.
/// Resources are referred to by typed slotmap keys; a null key is the
/// zeroed handle and is never handed to a driver.

use bitflags::bitflags;
use slotmap::new_key_type;

use crate::device::{ShaderStage, TextureFormat};
use crate::diagnostics::{DebugMessage, DebugSeverity};
use crate::error::Result;

// ============================================================================
// Handles
// ============================================================================

new_key_type! {
    /// Compiled shader stage
    pub struct ShaderStageId;
    /// Linked shader program
    pub struct ProgramId;
    /// Sampled texture (2D or cube)
    pub struct TextureId;
    /// Non-sampled attachment (multisampled color or depth/stencil)
    pub struct RenderTargetId;
    /// Color + depth/stencil attachment set
    pub struct FramebufferId;
    /// Vertex, index or uniform buffer
    pub struct BufferId;
    /// Vertex layout bound to a vertex buffer and optional index buffer
    pub struct VertexArrayId;
}

// ============================================================================
// Device description
// ============================================================================

/// Device capabilities queried once at creation
#[derive(Debug, Clone)]
pub struct DeviceCaps {
    /// Backend name (e.g. "Vulkan")
    pub backend_name: String,
    /// Highest supported color/depth sample count
    pub max_samples: u32,
    /// Largest supported 2D/cube dimension
    pub max_texture_size: u32,
    /// Clip space Y axis points down (Vulkan convention)
    pub clip_space_y_down: bool,
}

/// Presentable surface properties
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// Parameters handed to a [`DeviceFactory`]
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Application name (reported to the driver)
    pub app_name: String,
    /// Surface width in pixels
    pub width: u32,
    /// Surface height in pixels
    pub height: u32,
    /// Sample count the pipeline will render with
    pub samples: u32,
    /// Install the GPU debug-message callback
    pub enable_diagnostics: bool,
    /// Minimum severity forwarded by the debug callback
    pub diagnostic_severity: DebugSeverity,
}

// ============================================================================
// Resource descriptors
// ============================================================================

/// Texture dimensionality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    Tex2D,
    Cube,
}

impl TextureKind {
    /// Number of array layers backing this kind
    pub fn layers(self) -> u32 {
        match self {
            TextureKind::Tex2D => 1,
            TextureKind::Cube => 6,
        }
    }
}

bitflags! {
    /// How a texture may be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Sampled from shaders
        const SAMPLED = 1 << 0;
        /// Written as a color attachment
        const COLOR_ATTACHMENT = 1 << 1;
        /// Receives uploads
        const UPLOAD = 1 << 2;
    }
}

/// Descriptor for creating a texture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    /// Resolved mip level count (always >= 1)
    pub levels: u32,
    pub usage: TextureUsage,
}

/// Descriptor for creating a render target (non-sampled attachment)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub samples: u32,
}

/// Color attachment of a framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorAttachment {
    /// Single-sample texture that shaders can read after the pass
    Texture(TextureId),
    /// Multisampled render target
    RenderTarget(RenderTargetId),
}

/// Descriptor for creating a framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferDesc {
    pub color: ColorAttachment,
    pub depth_stencil: RenderTargetId,
}

/// Buffer usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
    Uniform,
}

/// Index type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    U16,
    U32,
}

impl IndexType {
    pub fn size(self) -> u32 {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    TriangleList,
    TriangleStrip,
}

/// Vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float2,
    Float3,
    Float4,
}

impl VertexFormat {
    pub fn size(self) -> u32 {
        match self {
            VertexFormat::Float2 => 8,
            VertexFormat::Float3 => 12,
            VertexFormat::Float4 => 16,
        }
    }
}

/// One vertex attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Shader input location
    pub location: u32,
    pub format: VertexFormat,
    /// Byte offset inside the vertex
    pub offset: u32,
}

/// Interleaved vertex layout
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    /// Bytes per vertex
    pub stride: u32,
    pub attributes: Vec<VertexAttribute>,
}

/// Descriptor for creating a vertex array
#[derive(Debug, Clone, PartialEq)]
pub struct VertexArrayDesc {
    pub vertex_buffer: BufferId,
    pub index_buffer: Option<(BufferId, IndexType)>,
    pub layout: VertexLayout,
}

// ============================================================================
// Frame recording
// ============================================================================

/// Destination of a render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassTarget {
    /// The presentable surface's default target
    Surface,
    /// An offscreen framebuffer
    Framebuffer(FramebufferId),
}

/// Clear values applied when a pass begins
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearValues {
    pub color: [f32; 4],
    pub depth: f32,
    pub stencil: u32,
}

impl Default for ClearValues {
    fn default() -> Self {
        Self {
            color: [0.0, 0.0, 0.0, 1.0],
            depth: 1.0,
            stencil: 0,
        }
    }
}

/// Depth comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Never,
    Less,
    LessOrEqual,
    Always,
}

/// Face culling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// Fixed-function state of one draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: CompareOp,
    pub cull_mode: CullMode,
}

impl DrawState {
    /// No depth test, no depth write, no culling (skybox, fullscreen quad)
    pub const BACKGROUND: DrawState = DrawState {
        depth_test: false,
        depth_write: false,
        depth_compare: CompareOp::Always,
        cull_mode: CullMode::None,
    };

    /// Depth test LESS with writes and back-face culling
    pub const OPAQUE: DrawState = DrawState {
        depth_test: true,
        depth_write: true,
        depth_compare: CompareOp::Less,
        cull_mode: CullMode::Back,
    };
}

/// Uniform data bound for one draw
#[derive(Debug, Clone, Copy)]
pub struct UniformBlock<'a> {
    pub binding: u32,
    pub data: &'a [u8],
}

/// Texture sampled by one draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampledTexture {
    pub binding: u32,
    pub texture: TextureId,
}

/// Everything needed to issue one draw
#[derive(Debug, Clone, Copy)]
pub struct DrawCall<'a> {
    pub program: ProgramId,
    pub vertex_array: VertexArrayId,
    pub topology: PrimitiveTopology,
    /// Index count for indexed arrays, vertex count otherwise
    pub element_count: u32,
    pub state: DrawState,
    pub uniforms: &'a [UniformBlock<'a>],
    pub textures: &'a [SampledTexture],
}

// ============================================================================
// GraphicsDevice trait
// ============================================================================

/// Backend capability interface
///
/// All methods run on the thread that owns the device. Creation methods
/// return a fresh handle; destroy methods ignore handles that are null or
/// already destroyed.
pub trait GraphicsDevice {
    /// Capabilities of this device
    fn caps(&self) -> &DeviceCaps;

    /// Presentable surface properties
    fn surface_info(&self) -> SurfaceInfo;

    // ===== SHADERS =====

    /// Compile one shader stage
    ///
    /// # Errors
    ///
    /// `Error::ShaderCompile` with the compiler diagnostic log.
    fn create_shader_stage(&mut self, name: &str, stage: ShaderStage, code: &[u8]) -> Result<ShaderStageId>;

    fn destroy_shader_stage(&mut self, id: ShaderStageId);

    /// Link stages into a program (stages stay owned by the caller)
    ///
    /// # Errors
    ///
    /// `Error::ShaderLink` with the linker diagnostic log.
    fn link_program(&mut self, stages: &[ShaderStageId]) -> Result<ProgramId>;

    fn destroy_program(&mut self, id: ProgramId);

    // ===== TEXTURES =====

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId>;

    /// Write level 0 of one layer (`layer` < 6 for cube maps)
    fn upload_texture(&mut self, id: TextureId, layer: u32, data: &[u8]) -> Result<()>;

    /// Fill levels 1.. of every layer from level 0
    fn generate_mipmaps(&mut self, id: TextureId) -> Result<()>;

    fn destroy_texture(&mut self, id: TextureId);

    // ===== RENDER TARGETS / FRAMEBUFFERS =====

    fn create_render_target(&mut self, desc: &RenderTargetDesc) -> Result<RenderTargetId>;

    fn destroy_render_target(&mut self, id: RenderTargetId);

    /// Bind attachments and validate completeness
    ///
    /// # Errors
    ///
    /// `Error::FramebufferIncomplete` if the attachment combination is rejected.
    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> Result<FramebufferId>;

    /// Destroy the framebuffer object only (attachments are untouched)
    fn destroy_framebuffer(&mut self, id: FramebufferId);

    /// Resolve multisampled color of `src` into the single-sample `dst`
    ///
    /// Must be called outside of a pass.
    fn resolve_framebuffer(&mut self, src: FramebufferId, dst: FramebufferId) -> Result<()>;

    // ===== GEOMETRY =====

    fn create_buffer(&mut self, usage: BufferUsage, data: &[u8]) -> Result<BufferId>;

    fn destroy_buffer(&mut self, id: BufferId);

    fn create_vertex_array(&mut self, desc: &VertexArrayDesc) -> Result<VertexArrayId>;

    /// Destroy the layout object only (buffers are untouched)
    fn destroy_vertex_array(&mut self, id: VertexArrayId);

    // ===== FRAME =====

    /// Start recording a frame
    fn begin_frame(&mut self) -> Result<()>;

    fn begin_pass(&mut self, target: PassTarget, clear: &ClearValues) -> Result<()>;

    fn draw(&mut self, call: &DrawCall) -> Result<()>;

    fn end_pass(&mut self) -> Result<()>;

    /// Submit the frame and present the surface
    fn present(&mut self) -> Result<()>;

    /// Drop the frame being recorded, closing any open pass
    ///
    /// Work recorded so far may still execute, but nothing is shown. Leaves
    /// the device ready for the next `begin_frame`. No-op outside of a frame.
    fn abort_frame(&mut self);

    /// Block until the GPU is idle
    fn wait_idle(&mut self) -> Result<()>;

    // ===== DIAGNOSTICS =====

    /// Route one debug message through the device's diagnostic channel
    ///
    /// Returns true if the message was forwarded to the logger. Devices
    /// created without diagnostics drop every message.
    fn emit_diagnostic(&self, message: &DebugMessage) -> bool;
}

/// Creates graphics devices (the context-creation half of a backend)
pub trait DeviceFactory {
    /// # Errors
    ///
    /// `Error::ContextCreation` if the context cannot be created.
    fn create_device(&mut self, config: &DeviceConfig) -> Result<Box<dyn GraphicsDevice>>;
}
