//! Error types for the IBL pipeline
//!
//! This module defines the error types used throughout the pipeline,
//! including context creation, shader building and GPU resource management.

use std::fmt;

use crate::device::ShaderStage;

/// Result type for IBL pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// IBL pipeline errors
#[derive(Debug, Clone)]
pub enum Error {
    /// Graphics context or surface cannot be created at the requested parameters
    ContextCreation(String),

    /// A shader stage failed to compile
    ShaderCompile {
        /// Logical shader name (e.g. "pbr_fs")
        name: String,
        /// Stage the source was compiled for
        stage: ShaderStage,
        /// Compiler diagnostic log
        log: String,
    },

    /// Shader stages failed to link into a program
    ShaderLink {
        /// Linker diagnostic log
        log: String,
    },

    /// Image pixel layout cannot be mapped to the requested GPU format
    UnsupportedFormat(String),

    /// Framebuffer attachment combination was rejected
    FramebufferIncomplete(String),

    /// Invalid resource or failed resource precondition
    InvalidResource(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Backend-specific error (Vulkan, etc.)
    BackendError(String),

    /// Renderer entry point called out of state order
    ContractViolation(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ContextCreation(msg) => write!(f, "Context creation failed: {}", msg),
            Error::ShaderCompile { name, stage, log } => {
                write!(f, "Shader compile failed ({} / {:?}): {}", name, stage, log)
            }
            Error::ShaderLink { log } => write!(f, "Shader link failed: {}", log),
            Error::UnsupportedFormat(msg) => write!(f, "Unsupported format: {}", msg),
            Error::FramebufferIncomplete(msg) => write!(f, "Framebuffer incomplete: {}", msg),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::ContractViolation(msg) => write!(f, "Contract violation: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
