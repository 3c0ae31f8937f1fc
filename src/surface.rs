// surface.rs - Render surfaces: single targets and ping-pong pairs.
//
// A Surface is a texture that can be both sampled and rendered into. The
// concrete type belongs to the context (`GpuSurface` for wgpu, `CpuSurface`
// for the reference backend); this module holds the backend-neutral parts:
//
//   SurfaceDesc    - size, storage format, filter, wrap, depth
//   Surface        - what every stage needs to know about an input
//   DoubleSurface  - `front` (read) + `back` (write) with an O(1) swap
//   Destination    - where a pointwise stage writes
//
// FEEDBACK HAZARD
// ───────────────
// A pass must never sample the texture it is rendering into. Stages that
// read neighbouring texels take their destination as `&mut DoubleSurface`
// and render into `back` while sampling some other surface; in-place
// variants split the pair into `(&front, &mut back)` before drawing. The
// borrow checker rejects any call that passes the same surface as both
// `&input` and `&mut destination`, so the hazard cannot be expressed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
pub use crate::image::WrapMode;

/// Storage format of a surface.
///
/// Intermediate surfaces must be `Rgba16Float`: gradient and blur passes
/// band visibly when stored in 8 bits, and the Sobel gradient stage stores
/// signed values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 8-bit unsigned normalised RGBA (sources and display targets).
    Rgba8Unorm,
    /// IEEE half-float RGBA (working surfaces).
    Rgba16Float,
}

impl PixelFormat {
    /// Bytes per texel.
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Rgba8Unorm => 4,
            PixelFormat::Rgba16Float => 8,
        }
    }

    /// Round a value through this format's storage precision.
    #[inline]
    pub fn quantize(self, v: f32) -> f32 {
        match self {
            PixelFormat::Rgba8Unorm => crate::image::unorm8_to_f32(crate::image::f32_to_unorm8(v)),
            PixelFormat::Rgba16Float => half::f16::from_f32(v).to_f32(),
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Rgba8Unorm => write!(f, "rgba8unorm"),
            PixelFormat::Rgba16Float => write!(f, "rgba16float"),
        }
    }
}

/// Sampler filtering used when this surface is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Everything needed to allocate a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub filter: FilterMode,
    pub wrap: WrapMode,
    /// Allocate and attach a depth buffer alongside the colour target.
    pub depth: bool,
}

impl SurfaceDesc {
    /// Half-float working surface, mirror-repeat addressing, linear filter.
    pub fn working(width: u32, height: u32) -> Self {
        SurfaceDesc {
            width,
            height,
            format: PixelFormat::Rgba16Float,
            filter: FilterMode::Linear,
            wrap: WrapMode::MirrorRepeat,
            depth: false,
        }
    }

    /// 8-bit presentation target.
    pub fn display(width: u32, height: u32) -> Self {
        SurfaceDesc {
            width,
            height,
            format: PixelFormat::Rgba8Unorm,
            filter: FilterMode::Linear,
            wrap: WrapMode::ClampToEdge,
            depth: false,
        }
    }

    /// Texture holding an uploaded source image.
    pub fn source(width: u32, height: u32) -> Self {
        SurfaceDesc::display(width, height)
    }

    /// Builder-style depth toggle.
    pub fn with_depth(mut self, depth: bool) -> Self {
        self.depth = depth;
        self
    }

    /// Reciprocal texel size `(1/width, 1/height)`.
    pub fn texel(&self) -> [f32; 2] {
        [1.0 / self.width as f32, 1.0 / self.height as f32]
    }

    /// Reject descriptors no backend can allocate.
    pub fn validate(&self, max_dimension: u32) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PipelineError::allocation(
                self.width,
                self.height,
                self.format,
                "surface dimensions must be non-zero",
            ));
        }
        if self.width > max_dimension || self.height > max_dimension {
            return Err(PipelineError::allocation(
                self.width,
                self.height,
                self.format,
                format!("exceeds device limit of {max_dimension} texels per side"),
            ));
        }
        Ok(())
    }
}

/// A single texture + render target.
pub trait Surface {
    fn desc(&self) -> &SurfaceDesc;

    #[inline]
    fn width(&self) -> u32 {
        self.desc().width
    }

    #[inline]
    fn height(&self) -> u32 {
        self.desc().height
    }

    #[inline]
    fn format(&self) -> PixelFormat {
        self.desc().format
    }

    /// `(1/width, 1/height)`, recomputed from this surface's own size.
    #[inline]
    fn texel(&self) -> [f32; 2] {
        self.desc().texel()
    }
}

/// Two identically-shaped surfaces used as a read/write pair.
///
/// `front` is the most recently completed result and the one to sample;
/// `back` is the render target for the next pass.
pub struct DoubleSurface<S> {
    pub front: S,
    pub back: S,
}

impl<S> DoubleSurface<S> {
    pub fn new(front: S, back: S) -> Self {
        DoubleSurface { front, back }
    }

    /// Exchange `front` and `back`. No GPU work, no allocation.
    ///
    /// Only valid right after a pass has finished writing `back`.
    #[inline]
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.front, &mut self.back);
    }

    /// Split into `(read, write)` halves for an in-place pass.
    #[inline]
    pub fn split(&mut self) -> (&S, &mut S) {
        (&self.front, &mut self.back)
    }
}

impl<S: Surface> DoubleSurface<S> {
    pub fn desc(&self) -> &SurfaceDesc {
        self.front.desc()
    }

    pub fn texel(&self) -> [f32; 2] {
        self.front.texel()
    }
}

/// Destination of a pointwise stage.
///
/// Pointwise stages may write into a single surface; writing into a pair
/// targets `back` and swaps once the pass completes.
pub enum Destination<'a, S> {
    Single(&'a mut S),
    Double(&'a mut DoubleSurface<S>),
}

impl<'a, S> Destination<'a, S> {
    pub fn single(surface: &'a mut S) -> Self {
        Destination::Single(surface)
    }

    pub fn double(pair: &'a mut DoubleSurface<S>) -> Self {
        Destination::Double(pair)
    }

    /// The surface the pass renders into.
    pub fn target(&mut self) -> &mut S {
        match self {
            Destination::Single(s) => s,
            Destination::Double(d) => &mut d.back,
        }
    }

    /// Called once the pass has been recorded.
    pub fn finish(self) {
        if let Destination::Double(d) = self {
            d.swap();
        }
    }
}

impl<'a, S> From<&'a mut DoubleSurface<S>> for Destination<'a, S> {
    fn from(pair: &'a mut DoubleSurface<S>) -> Self {
        Destination::Double(pair)
    }
}
