// normap: diffuse texture -> tangent-space normal map
// A short chain of full-screen passes over double-buffered render surfaces,
// run on wgpu or on the CPU reference backend.
//
// Reference pipeline: grayscale -> (blur) -> Sobel -> normal encode -> (blur)

pub mod image;
pub mod error;
pub mod surface;
pub mod kernel;

// CPU reference kernels
pub mod color;
pub mod blur;
pub mod gradient;
pub mod nms;
pub mod morphology;

// Backends
pub mod context;
pub mod cpu;
pub mod gpu;

// Orchestration
pub mod stages;
pub mod params;
pub mod assets;
pub mod export;
pub mod pipeline;
pub mod driver;

pub use context::PipelineContext;
pub use cpu::{CpuContext, CpuSurface};
pub use error::{PipelineError, Result};
pub use gpu::{DeviceProfile, GpuContext, GpuSurface};
pub use kernel::{Kernel, KernelKind, SobelParams};
pub use params::{DisplayMode, PipelineParams, SharedParams};
pub use pipeline::{FrameOutcome, FrameStats, Pipeline};
pub use surface::{Destination, DoubleSurface, PixelFormat, Surface, SurfaceDesc};
