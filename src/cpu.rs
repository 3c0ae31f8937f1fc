// cpu.rs - Reference backend: every pass evaluated on the CPU.
//
// `CpuContext` implements `PipelineContext` with `Image<Rgba>` storage. It
// applies the same sampler state as the GPU (wrap mode, linear vs nearest
// filtering) and rounds every stored texel through the surface's pixel
// format, so an Rgba8Unorm surface holds exactly the values a GPU render
// target of that format would.
//
// It is the authoritative implementation: GPU tests compare against it,
// and the orchestrator runs on it when no adapter is available.

use tracing::trace;

use crate::blur;
use crate::color;
use crate::context::{check_draw, PipelineContext};
use crate::error::Result;
use crate::gradient;
use crate::image::{Image, ImageView, Rgba, Rgba8};
use crate::kernel::Kernel;
use crate::morphology;
use crate::nms;
use crate::surface::{FilterMode, PixelFormat, Surface, SurfaceDesc};

/// wgpu's default `max_texture_dimension_2d`.
pub const DEFAULT_MAX_DIMENSION: u32 = 8192;

/// A CPU-resident surface.
#[derive(Debug, Clone)]
pub struct CpuSurface {
    desc: SurfaceDesc,
    image: Image<Rgba>,
    depth: Option<Image<f32>>,
}

impl CpuSurface {
    /// The stored texels.
    pub fn image(&self) -> &Image<Rgba> {
        &self.image
    }

    pub fn has_depth(&self) -> bool {
        self.depth.is_some()
    }

    /// Bind for sampling: the image together with this surface's sampler.
    pub fn bind_as_read(&self) -> ImageView<'_> {
        ImageView::new(
            &self.image,
            self.desc.wrap,
            self.desc.filter == FilterMode::Linear,
        )
    }

    fn store(&mut self, out: Image<Rgba>) {
        self.image = quantize_image(&out, self.desc.format);
    }
}

impl Surface for CpuSurface {
    fn desc(&self) -> &SurfaceDesc {
        &self.desc
    }
}

/// Reference implementation of [`PipelineContext`].
#[derive(Debug)]
pub struct CpuContext {
    max_dimension: u32,
    draws: u64,
}

impl Default for CpuContext {
    fn default() -> Self {
        CpuContext::new()
    }
}

impl CpuContext {
    pub fn new() -> Self {
        CpuContext::with_max_dimension(DEFAULT_MAX_DIMENSION)
    }

    /// Simulate a device with a smaller texture limit.
    pub fn with_max_dimension(max_dimension: u32) -> Self {
        CpuContext {
            max_dimension,
            draws: 0,
        }
    }

    /// Evaluate `kernel` without touching any surface.
    ///
    /// # Errors
    /// `InvalidParams` when the kernel's parameters fail [`Kernel::validate`].
    pub fn evaluate(kernel: &Kernel, inputs: &[ImageView<'_>], out_w: usize, out_h: usize) -> Result<Image<Rgba>> {
        kernel.validate()?;
        let out = match *kernel {
            Kernel::Passthrough => color::passthrough(inputs[0], out_w, out_h),
            Kernel::Grayscale => color::grayscale(inputs[0], out_w, out_h),
            Kernel::GaussianBlur { radius } => blur::gaussian_blur(inputs[0], radius, out_w, out_h)?,
            Kernel::SobelNormal(ref params) => gradient::sobel_normal(inputs[0], params, out_w, out_h),
            Kernel::SobelGradient => gradient::sobel_gradient(inputs[0], out_w, out_h),
            Kernel::Magnitude => color::magnitude(inputs[0], out_w, out_h),
            Kernel::NonMaxSuppression { threshold } => {
                nms::non_max_suppression(inputs[0], inputs[1], threshold, out_w, out_h)
            }
            Kernel::Dilate { radius } => morphology::dilate(inputs[0], radius, out_w, out_h),
            Kernel::AlphaBlend => color::alpha_blend(inputs[0], inputs[1], out_w, out_h),
        };
        Ok(out)
    }
}

impl PipelineContext for CpuContext {
    type Surface = CpuSurface;

    fn backend_name(&self) -> &str {
        "cpu"
    }

    fn max_surface_dimension(&self) -> u32 {
        self.max_dimension
    }

    fn create_surface(&mut self, desc: SurfaceDesc) -> Result<CpuSurface> {
        desc.validate(self.max_dimension)?;
        let (w, h) = (desc.width as usize, desc.height as usize);
        Ok(CpuSurface {
            desc,
            image: Image::new(w, h),
            depth: desc.depth.then(|| Image::filled(w, h, 1.0)),
        })
    }

    fn upload(&mut self, image: &Image<Rgba8>) -> Result<CpuSurface> {
        let desc = SurfaceDesc::source(image.width() as u32, image.height() as u32);
        let mut surface = self.create_surface(desc)?;
        surface.image = image.convert();
        Ok(surface)
    }

    fn clear(&mut self, target: &mut CpuSurface, color: Rgba) -> Result<()> {
        let (w, h) = (target.width() as usize, target.height() as usize);
        target.store(Image::filled(w, h, color));
        if let Some(depth) = target.depth.as_mut() {
            *depth = Image::filled(w, h, 1.0);
        }
        Ok(())
    }

    fn draw(&mut self, kernel: &Kernel, inputs: &[&CpuSurface], target: &mut CpuSurface) -> Result<()> {
        check_draw(kernel, inputs.len())?;
        let views: Vec<ImageView<'_>> = inputs.iter().map(|s| s.bind_as_read()).collect();
        let (w, h) = (target.width() as usize, target.height() as usize);
        trace!(kernel = %kernel.kind(), w, h, "cpu draw");
        let out = Self::evaluate(kernel, &views, w, h)?;
        target.store(out);
        self.draws += 1;
        Ok(())
    }

    fn readback(&mut self, surface: &CpuSurface) -> Result<Image<Rgba>> {
        Ok(surface.image.clone())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn draw_count(&self) -> u64 {
        self.draws
    }
}

/// Round every channel through `format`'s storage precision.
pub fn quantize_image(image: &Image<Rgba>, format: PixelFormat) -> Image<Rgba> {
    image.map(|p| p.map(|c| format.quantize(c)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::kernel::KernelKind;

    #[test]
    fn test_upload_round_trip() {
        let mut ctx = CpuContext::new();
        let img = Image::from_fn(4, 3, |x, y| [(x * 60) as u8, (y * 80) as u8, 7, 255]);
        let surface = ctx.upload(&img).unwrap();
        let back: Image<Rgba8> = ctx.readback(&surface).unwrap().convert();
        assert_eq!(back, img);
    }

    #[test]
    fn test_store_quantizes_per_format() {
        let mut ctx = CpuContext::new();
        let src = ctx.create_surface(SurfaceDesc::working(2, 2)).unwrap();
        let mut display = ctx.create_surface(SurfaceDesc::display(2, 2)).unwrap();
        ctx.clear(&mut display, [0.3, 0.3, 0.3, 1.0]).unwrap();
        let v = display.image().get(0, 0)[0];
        assert_eq!(v, PixelFormat::Rgba8Unorm.quantize(0.3));
        ctx.draw(&Kernel::Passthrough, &[&src], &mut display).unwrap();
        assert_eq!(display.image().get(1, 1), [0.0; 4]);
    }

    #[test]
    fn test_wrong_input_count_is_draw_error() {
        let mut ctx = CpuContext::new();
        let a = ctx.create_surface(SurfaceDesc::working(2, 2)).unwrap();
        let mut b = ctx.create_surface(SurfaceDesc::working(2, 2)).unwrap();
        let err = ctx.draw(&Kernel::AlphaBlend, &[&a], &mut b).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Draw {
                kernel: KernelKind::AlphaBlend,
                ..
            }
        ));
    }

    #[test]
    fn test_out_of_range_radius_is_rejected() {
        let mut ctx = CpuContext::new();
        let src = ctx.upload(&Image::filled(4, 4, [90, 90, 90, 255])).unwrap();
        let mut out = ctx.create_surface(SurfaceDesc::working(4, 4)).unwrap();
        for kernel in [
            Kernel::GaussianBlur { radius: 0.0 },
            Kernel::GaussianBlur { radius: f32::INFINITY },
            Kernel::GaussianBlur { radius: 1e6 },
            Kernel::Dilate { radius: f32::NAN },
        ] {
            let err = ctx.draw(&kernel, &[&src], &mut out).unwrap_err();
            assert!(matches!(err, PipelineError::InvalidParams(_)), "{kernel:?}");
            assert!(CpuContext::evaluate(&kernel, &[src.bind_as_read()], 4, 4).is_err());
        }
        assert_eq!(ctx.draw_count(), 0);
        assert_eq!(out.image().get(0, 0), [0.0; 4]);
    }

    #[test]
    fn test_allocation_limits() {
        let mut ctx = CpuContext::with_max_dimension(64);
        assert!(ctx.create_surface(SurfaceDesc::working(64, 64)).is_ok());
        let err = ctx.create_surface(SurfaceDesc::working(65, 8)).unwrap_err();
        assert!(matches!(err, PipelineError::Allocation { width: 65, .. }));
    }

    #[test]
    fn test_depth_attachment() {
        let mut ctx = CpuContext::new();
        let s = ctx.create_surface(SurfaceDesc::working(4, 4).with_depth(true)).unwrap();
        assert!(s.has_depth());
        let s = ctx.create_surface(SurfaceDesc::working(4, 4)).unwrap();
        assert!(!s.has_depth());
    }

    #[test]
    fn test_draw_count() {
        let mut ctx = CpuContext::new();
        let a = ctx.create_surface(SurfaceDesc::working(2, 2)).unwrap();
        let mut b = ctx.create_surface(SurfaceDesc::working(2, 2)).unwrap();
        ctx.draw(&Kernel::Grayscale, &[&a], &mut b).unwrap();
        ctx.draw(&Kernel::Grayscale, &[&a], &mut b).unwrap();
        assert_eq!(ctx.draw_count(), 2);
    }
}
