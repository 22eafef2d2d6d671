//! Error Types
//!
//! This module defines the error types used throughout the RHI.
//!
//! # Overview
//!
//! The main error type [`RhiError`] covers the fatal failure modes of the
//! device layer:
//! - GPU initialization failures
//! - Shader compile / link failures (with the compiler diagnostic)
//! - Malformed resource descriptors
//! - Frame graph misuse
//!
//! None of these are retried. Callers propagate them up to the application,
//! which typically aborts the frame or the process.
//!
//! # Usage
//!
//! ```rust,ignore
//! use myth_rhi::errors::{RhiError, Result};
//!
//! fn build() -> Result<()> {
//!     Ok(())
//! }
//! ```

use std::fmt;

use thiserror::Error;

/// Programmable pipeline stage, used to label shader diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
            Self::Compute => "compute",
        })
    }
}

/// The main error type for the RHI.
#[derive(Error, Debug)]
pub enum RhiError {
    // ========================================================================
    // Device Errors
    // ========================================================================
    /// Failed to request a compatible GPU adapter.
    #[error("Failed to request adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[cfg(feature = "wgpu")]
    #[error("Failed to create WGPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),

    // ========================================================================
    // Shader Errors
    // ========================================================================
    /// A shader stage failed to compile. `log` holds the compiler output.
    #[error("Failed to compile {stage} shader:\n{log}")]
    ShaderCompilation { stage: ShaderStage, log: String },

    /// Program linking failed. Holds the linker output.
    #[error("Failed to link shader program:\n{0}")]
    ProgramLink(String),

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// Texture descriptor with zero extent, unknown format or an impossible
    /// shape (e.g. non-square cube map).
    #[error("Invalid texture descriptor: {0}")]
    InvalidTextureDesc(String),

    /// Buffer descriptor with zero size.
    #[error("Invalid buffer descriptor: {0}")]
    InvalidBufferDesc(String),

    /// A default / destroyed handle was passed where a live object is needed.
    #[error("Invalid {0} handle")]
    InvalidHandle(&'static str),

    /// The backend cannot express the requested operation.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    // ========================================================================
    // Frame Graph Errors
    // ========================================================================
    /// Misuse of the frame graph (bad handle, wrong resource kind, ...).
    #[error("Frame graph error: {0}")]
    FrameGraph(String),
}

/// Alias for `Result<T, RhiError>`.
pub type Result<T> = std::result::Result<T, RhiError>;
