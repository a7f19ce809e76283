/// Renderer module - pipeline orchestrator and its inputs

pub mod config;
pub mod renderer_interface;
pub mod view_settings;
pub mod uniforms;
pub mod pbr_renderer;

pub use config::*;
pub use renderer_interface::*;
pub use view_settings::*;
pub use uniforms::*;
pub use pbr_renderer::*;
