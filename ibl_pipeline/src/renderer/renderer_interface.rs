/// RendererInterface trait - the four entry points every renderer exposes

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;
use crate::renderer::ViewSettings;

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// Presentable surface handed out by `initialize`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Surface {
    id: u64,
    pub width: u32,
    pub height: u32,
    pub samples: u32,
}

impl Surface {
    /// New surface with a process-unique id
    pub fn new(width: u32, height: u32, samples: u32) -> Self {
        Self {
            id: NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed),
            width,
            height,
            samples,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Lifecycle state of a renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    Uninitialized,
    Initialized,
    Ready,
    ShuttingDown,
}

/// Renderer entry points
///
/// Call order: `initialize`, `setup`, any number of `render`, `shutdown`.
pub trait RendererInterface {
    /// Create the graphics context and its presentable surface
    fn initialize(&mut self, width: u32, height: u32, samples: u32) -> Result<Surface>;

    /// Release every GPU resource and the context (idempotent)
    fn shutdown(&mut self);

    /// Build programs, framebuffers, geometry and textures
    fn setup(&mut self) -> Result<()>;

    /// Draw and present one frame
    fn render(&mut self, surface: &Surface, view: &ViewSettings) -> Result<()>;
}
