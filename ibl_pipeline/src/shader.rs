//! Shader builder
//!
//! Compiles shader stages from sources fetched by logical name and links
//! them into programs. What "source" means is up to the backend: the
//! Vulkan device takes SPIR-V binaries.

use rustc_hash::FxHashMap;
use std::path::PathBuf;

use crate::device::{GraphicsDevice, ProgramId, ShaderStage, ShaderStageId};
use crate::error::{Error, Result};
use crate::{ibl_debug, ibl_error};

// ============================================================================
// Shader libraries
// ============================================================================

/// Source of shader code, keyed by logical name (e.g. "pbr_fs")
pub trait ShaderLibrary {
    /// Load the code for `name`
    fn load(&self, name: &str) -> Result<Vec<u8>>;
}

/// In-memory shader library
#[derive(Debug, Clone, Default)]
pub struct MemoryShaderLibrary {
    sources: FxHashMap<String, Vec<u8>>,
}

impl MemoryShaderLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the code for `name`
    pub fn insert(&mut self, name: impl Into<String>, code: impl Into<Vec<u8>>) -> &mut Self {
        self.sources.insert(name.into(), code.into());
        self
    }
}

impl ShaderLibrary for MemoryShaderLibrary {
    fn load(&self, name: &str) -> Result<Vec<u8>> {
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| Error::InvalidResource(format!("no shader named '{}'", name)))
    }
}

/// Shader library reading `<root>/<name><extension>` from disk
#[derive(Debug, Clone)]
pub struct DirectoryShaderLibrary {
    root: PathBuf,
    extension: String,
}

impl DirectoryShaderLibrary {
    /// `extension` includes the dot (e.g. ".spv"), or is empty
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self { root: root.into(), extension: extension.into() }
    }

    /// Path a logical name resolves to
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}{}", name, self.extension))
    }
}

impl ShaderLibrary for DirectoryShaderLibrary {
    fn load(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path_of(name);
        std::fs::read(&path)
            .map_err(|e| Error::InvalidResource(format!("cannot read {}: {}", path.display(), e)))
    }
}

// ============================================================================
// Compile / link
// ============================================================================

/// Compile the shader `name` from `library` for `stage`
///
/// # Errors
///
/// `Error::ShaderCompile` with the compiler log, or naming the missing
/// source when the library cannot provide it.
pub fn compile_shader(
    device: &mut dyn GraphicsDevice,
    library: &dyn ShaderLibrary,
    name: &str,
    stage: ShaderStage,
) -> Result<ShaderStageId> {
    let code = library.load(name).map_err(|e| Error::ShaderCompile {
        name: name.to_string(),
        stage,
        log: e.to_string(),
    })?;

    match device.create_shader_stage(name, stage, &code) {
        Ok(id) => {
            ibl_debug!("ibl::shader", "Compiled {:?} shader '{}'", stage, name);
            Ok(id)
        }
        Err(e) => {
            ibl_error!("ibl::shader", "{}", e);
            Err(e)
        }
    }
}

/// Link `stages` into a program
///
/// The stage handles are released whether or not linking succeeds.
///
/// # Errors
///
/// `Error::ShaderLink` with the linker log.
pub fn link_program(device: &mut dyn GraphicsDevice, stages: &[ShaderStageId]) -> Result<ProgramId> {
    let result = device.link_program(stages);
    for &stage in stages {
        device.destroy_shader_stage(stage);
    }
    match result {
        Ok(program) => {
            ibl_debug!("ibl::shader", "Linked program from {} stages", stages.len());
            Ok(program)
        }
        Err(e) => {
            ibl_error!("ibl::shader", "{}", e);
            Err(e)
        }
    }
}

/// Compile every `(name, stage)` in order, then link
///
/// Stages compiled before a compile failure are released.
pub fn build_program(
    device: &mut dyn GraphicsDevice,
    library: &dyn ShaderLibrary,
    stages: &[(&str, ShaderStage)],
) -> Result<ProgramId> {
    let mut compiled = Vec::with_capacity(stages.len());
    for &(name, stage) in stages {
        match compile_shader(device, library, name, stage) {
            Ok(id) => compiled.push(id),
            Err(e) => {
                for id in compiled {
                    device.destroy_shader_stage(id);
                }
                return Err(e);
            }
        }
    }
    link_program(device, &compiled)
}

#[cfg(test)]
#[path = "shader_tests.rs"]
mod tests;
