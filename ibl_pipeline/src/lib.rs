/*!
# IBL Pipeline

Core types and the render orchestrator for an image-based-lighting PBR pipeline.

The crate is backend-agnostic: GPU access goes through the [`device::GraphicsDevice`]
trait, and a [`device::DeviceFactory`] creates the device when the renderer is
initialized. The Vulkan backend lives in the `ibl_pipeline_renderer_vulkan` crate.

## Architecture

- **Shader builder**: loads stage sources by name, compiles and links programs
- **Resource manager**: textures, cube maps, framebuffers, vertex buffers
- **PbrRenderer**: skybox, PBR model, MSAA resolve, tonemap, present

A frame renders the skybox and the model into a multisampled HDR framebuffer,
resolves it into a single-sample framebuffer, then tonemaps that onto the surface.
*/

// Internal modules
mod error;
pub mod log;
pub mod diagnostics;
pub mod device;
pub mod resource;
pub mod shader;
pub mod renderer;

// Main ibl namespace module
pub mod ibl {
    // Error types
    pub use crate::error::{Error, Result};

    // Orchestrator
    pub use crate::renderer::{PbrRenderer, RendererInterface, RendererState, SceneAssets, Surface};

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger, set_logger, reset_logger};
    }

    // Backend abstraction
    pub mod device {
        pub use crate::device::*;
    }

    pub mod diagnostics {
        pub use crate::diagnostics::*;
    }

    // Resource sub-module
    pub mod resource {
        pub use crate::resource::*;
    }

    pub mod shader {
        pub use crate::shader::*;
    }

    pub mod render {
        pub use crate::renderer::*;
    }
}

pub use error::{Error, Result};

// Re-export math library at crate root
pub use glam;
