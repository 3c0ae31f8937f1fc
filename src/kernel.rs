// kernel.rs - The stage catalogue shared by every backend.
//
// A `Kernel` names one full-screen pass together with its parameters.
// Backends turn it into work: `CpuContext` dispatches to the reference
// functions in color.rs / blur.rs / gradient.rs / nms.rs / morphology.rs,
// `GpuContext` binds the matching WGSL program and uploads
// `KernelUniforms` as its uniform block.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::blur;
use crate::error::Result;
use crate::morphology;

/// Parameters of the Sobel-to-normal pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SobelParams {
    /// Gain applied to the gradient magnitude before the `tanh` curve.
    pub scale: f32,
    /// Blue channel written for strong gradients.
    pub z_height: f32,
    /// Negate both gradient components (inverts the apparent relief).
    pub swap_direction: bool,
}

impl Default for SobelParams {
    fn default() -> Self {
        SobelParams {
            scale: 1.0,
            z_height: 1.0,
            swap_direction: false,
        }
    }
}

/// One full-screen pass and its parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kernel {
    /// Copy/resample input 0.
    Passthrough,
    /// Average of R, G, B replicated to all colour channels, alpha 1.
    Grayscale,
    /// Circular Gaussian of the given radius, in (0, `MAX_BLUR_RADIUS`].
    GaussianBlur { radius: f32 },
    /// Sobel gradient encoded as a tangent-space normal.
    SobelNormal(SobelParams),
    /// Raw Sobel gradient: (gx, gy, 0, magnitude), gx/gy in [-1, 1].
    SobelGradient,
    /// Magnitude channel of a gradient image as opaque gray.
    Magnitude,
    /// Edge thinning: input 0 = gradient image, input 1 = magnitude image.
    NonMaxSuppression { threshold: f32 },
    /// Morphological dilation of the red channel within a Euclidean radius,
    /// in [0, `MAX_DILATION_RADIUS`].
    Dilate { radius: f32 },
    /// Source-over compositing: input 0 = src, input 1 = dst.
    AlphaBlend,
}

/// Discriminant of [`Kernel`], used to key programs and label errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KernelKind {
    Passthrough,
    Grayscale,
    GaussianBlur,
    SobelNormal,
    SobelGradient,
    Magnitude,
    NonMaxSuppression,
    Dilate,
    AlphaBlend,
}

impl KernelKind {
    /// Every kernel, in catalogue order.
    pub const ALL: [KernelKind; 9] = [
        KernelKind::Passthrough,
        KernelKind::Grayscale,
        KernelKind::GaussianBlur,
        KernelKind::SobelNormal,
        KernelKind::SobelGradient,
        KernelKind::Magnitude,
        KernelKind::NonMaxSuppression,
        KernelKind::Dilate,
        KernelKind::AlphaBlend,
    ];

    /// Number of input textures the pass samples.
    pub fn input_count(self) -> usize {
        match self {
            KernelKind::NonMaxSuppression | KernelKind::AlphaBlend => 2,
            _ => 1,
        }
    }

    /// Whether the pass reads texels other than the one it writes.
    ///
    /// Such passes only ever render into the `back` half of a pair.
    pub fn samples_neighbourhood(self) -> bool {
        matches!(
            self,
            KernelKind::GaussianBlur
                | KernelKind::SobelNormal
                | KernelKind::SobelGradient
                | KernelKind::NonMaxSuppression
                | KernelKind::Dilate
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            KernelKind::Passthrough => "passthrough",
            KernelKind::Grayscale => "grayscale",
            KernelKind::GaussianBlur => "gaussian-blur",
            KernelKind::SobelNormal => "sobel-normal",
            KernelKind::SobelGradient => "sobel-gradient",
            KernelKind::Magnitude => "magnitude",
            KernelKind::NonMaxSuppression => "non-max-suppression",
            KernelKind::Dilate => "dilate",
            KernelKind::AlphaBlend => "alpha-blend",
        }
    }
}

impl fmt::Display for KernelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Kernel {
    pub fn kind(&self) -> KernelKind {
        match self {
            Kernel::Passthrough => KernelKind::Passthrough,
            Kernel::Grayscale => KernelKind::Grayscale,
            Kernel::GaussianBlur { .. } => KernelKind::GaussianBlur,
            Kernel::SobelNormal(_) => KernelKind::SobelNormal,
            Kernel::SobelGradient => KernelKind::SobelGradient,
            Kernel::Magnitude => KernelKind::Magnitude,
            Kernel::NonMaxSuppression { .. } => KernelKind::NonMaxSuppression,
            Kernel::Dilate { .. } => KernelKind::Dilate,
            Kernel::AlphaBlend => KernelKind::AlphaBlend,
        }
    }

    /// Check the parameters every backend relies on before running a pass.
    ///
    /// # Errors
    /// `InvalidParams` for a blur or dilation radius out of range.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Kernel::GaussianBlur { radius } => blur::check_radius(radius),
            Kernel::Dilate { radius } => morphology::check_radius(radius),
            _ => Ok(()),
        }
    }

    /// Pack this kernel's parameters for upload.
    ///
    /// `texel` is the reciprocal size of input 0.
    pub fn uniforms(&self, texel: [f32; 2]) -> KernelUniforms {
        let mut u = KernelUniforms {
            texel,
            ..KernelUniforms::zeroed()
        };
        match *self {
            Kernel::GaussianBlur { radius } | Kernel::Dilate { radius } => u.radius = radius,
            Kernel::SobelNormal(p) => {
                u.scale = p.scale;
                u.z_height = p.z_height;
                u.swap_direction = p.swap_direction as u32;
            }
            Kernel::NonMaxSuppression { threshold } => u.threshold = threshold,
            _ => {}
        }
        u
    }
}

/// Uniform block shared by every kernel program.
///
/// Layout must match `KernelUniforms` in `common.wgsl`:
///   offset  0: texel          (vec2<f32>)
///   offset  8: radius         (f32)
///   offset 12: scale          (f32)
///   offset 16: z_height       (f32)
///   offset 20: threshold      (f32)
///   offset 24: swap_direction (u32)
///   offset 28: _pad           (u32)
///   total: 32 bytes
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct KernelUniforms {
    pub texel: [f32; 2],
    pub radius: f32,
    pub scale: f32,
    pub z_height: f32,
    pub threshold: f32,
    pub swap_direction: u32,
    pub _pad: u32,
}

impl KernelUniforms {
    fn zeroed() -> Self {
        bytemuck::Zeroable::zeroed()
    }
}
