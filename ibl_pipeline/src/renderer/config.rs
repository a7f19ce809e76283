/// Renderer configuration

use crate::device::TextureFormat;
use crate::diagnostics::DebugSeverity;

/// Renderer configuration
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Application name (reported to the driver)
    pub app_name: String,
    /// Install the GPU debug-message callback at initialize
    pub enable_diagnostics: bool,
    /// Minimum severity forwarded by the debug callback
    pub diagnostic_severity: DebugSeverity,
    /// Color format of the offscreen framebuffers
    pub color_format: TextureFormat,
    /// Depth/stencil format of the offscreen framebuffers
    pub depth_stencil_format: TextureFormat,
    /// Clear color of the offscreen framebuffer
    pub clear_color: [f32; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            app_name: "IBL Pipeline".to_string(),
            enable_diagnostics: cfg!(debug_assertions),
            diagnostic_severity: DebugSeverity::ErrorsAndWarnings,
            color_format: TextureFormat::RGBA16_SFLOAT,
            depth_stencil_format: TextureFormat::D24_UNORM_S8_UINT,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}
