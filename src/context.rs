// context.rs - The rendering capability every stage calls through.
//
// `PipelineContext` is owned by the caller and passed by `&mut` into every
// stage function (see stages.rs). It hides which backend actually runs the
// passes:
//
//   GpuContext  (gpu/context.rs)  wgpu render pipelines, one per kernel
//   CpuContext  (cpu.rs)          reference implementation on Image<Rgba>
//
// Both produce the same numbers up to storage quantisation, which is what
// the GPU tests check.
//
// A context only knows how to run ONE pass. Sequencing, swap discipline
// and the frame lifecycle live in stages.rs and pipeline.rs.

use crate::error::Result;
use crate::image::{Image, Rgba, Rgba8};
use crate::kernel::Kernel;
use crate::surface::{DoubleSurface, Surface, SurfaceDesc};

/// A backend able to allocate surfaces and run full-screen passes.
pub trait PipelineContext {
    type Surface: Surface;

    /// Short backend label for logs ("wgpu", "cpu").
    fn backend_name(&self) -> &str;

    /// Largest width/height a surface may have.
    fn max_surface_dimension(&self) -> u32;

    /// Allocate an uninitialised surface (plus depth buffer if requested).
    ///
    /// # Errors
    /// `PipelineError::Allocation` if the device rejects the size or format.
    fn create_surface(&mut self, desc: SurfaceDesc) -> Result<Self::Surface>;

    /// Two surfaces with identical parameters.
    fn create_double(&mut self, desc: SurfaceDesc) -> Result<DoubleSurface<Self::Surface>> {
        let front = self.create_surface(desc)?;
        let back = self.create_surface(desc)?;
        Ok(DoubleSurface::new(front, back))
    }

    /// Create a source surface holding `image`, row 0 at the top.
    fn upload(&mut self, image: &Image<Rgba8>) -> Result<Self::Surface>;

    /// Fill `target` with a solid colour.
    fn clear(&mut self, target: &mut Self::Surface, color: Rgba) -> Result<()>;

    /// Run one full-screen pass of `kernel`, sampling `inputs` in slot order
    /// and writing every texel of `target`.
    ///
    /// The viewport is the whole of `target`. `inputs` must not contain
    /// `target`; the signature makes that impossible to express.
    fn draw(
        &mut self,
        kernel: &Kernel,
        inputs: &[&Self::Surface],
        target: &mut Self::Surface,
    ) -> Result<()>;

    /// Synchronous copy of `surface` to CPU memory. Export path only.
    fn readback(&mut self, surface: &Self::Surface) -> Result<Image<Rgba>>;

    /// Submit everything recorded since the last flush.
    fn flush(&mut self) -> Result<()>;

    /// Total passes run by this context.
    fn draw_count(&self) -> u64;
}

/// Check a pass before either backend records it: kernel parameters first,
/// then the number of inputs.
pub(crate) fn check_draw(kernel: &Kernel, given: usize) -> Result<()> {
    kernel.validate()?;
    let kind = kernel.kind();
    if given != kind.input_count() {
        return Err(crate::error::PipelineError::Draw {
            kernel: kind,
            message: format!("expected {} input(s), got {given}", kind.input_count()),
        });
    }
    Ok(())
}
