// error.rs - Error taxonomy for pipeline construction and execution.
//
// Waiting for an asset is NOT an error: the orchestrator reports it as
// `FrameOutcome::WaitingForAssets` and tries again next tick. Everything
// below is fatal for the run that produced it.

use std::path::PathBuf;

use crate::kernel::KernelKind;
use crate::surface::PixelFormat;

/// Result alias used throughout the crate.
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Errors from device setup, program building, surface allocation and
/// per-frame execution.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// No adapter survived the selection filter.
    #[error("no suitable GPU adapter found (only CPU/software renderers visible)")]
    NoSuitableAdapter,

    /// wgpu device request failed (driver issue, unsupported limits, etc.).
    #[error("device request failed: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    /// A kernel's WGSL source failed validation.
    #[error("shader for {kernel} failed to compile: {message}")]
    ShaderCompile { kernel: KernelKind, message: String },

    /// A render pipeline could not be built from a compiled module.
    #[error("program for {kernel} failed to link: {message}")]
    Link { kernel: KernelKind, message: String },

    /// The device rejected a surface allocation.
    #[error("cannot allocate {width}×{height} {format} surface: {reason}")]
    Allocation {
        width: u32,
        height: u32,
        format: PixelFormat,
        reason: String,
    },

    /// A draw was rejected by the device.
    #[error("{kernel} pass failed: {message}")]
    Draw { kernel: KernelKind, message: String },

    /// Mapping a readback buffer failed.
    #[error("readback failed: {0}")]
    Readback(String),

    /// Parameters outside their documented ranges.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// The selected source index does not name a registered source.
    #[error("source index {index} out of range ({count} sources registered)")]
    SourceIndex { index: usize, count: usize },

    /// A source image could not be read or decoded.
    #[error("failed to load {path}: {message}")]
    Asset { path: PathBuf, message: String },

    /// The export collaborator rejected a frame.
    #[error("export failed: {0}")]
    Export(String),

    /// Malformed configuration file.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Shorthand for an allocation failure.
    pub(crate) fn allocation(
        width: u32,
        height: u32,
        format: PixelFormat,
        reason: impl Into<String>,
    ) -> Self {
        PipelineError::Allocation {
            width,
            height,
            format,
            reason: reason.into(),
        }
    }
}
