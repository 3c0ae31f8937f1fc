// stages.rs - Typed stage functions over any `PipelineContext`.
//
// Each stage binds its kernel, its inputs and its destination, then runs one
// full-screen pass through the context. The signatures carry the
// destination rules:
//
//   pointwise stages       (passthrough, grayscale, magnitude, alpha blend)
//       write into a `Destination`: a single surface or the back of a pair
//
//   neighbourhood stages   (blur, Sobel, NMS, dilation)
//       write only into `&mut DoubleSurface`, rendering into `back` and
//       swapping once the pass is recorded
//
// The input is always a shared borrow and the destination an exclusive
// one, so a pass that samples the surface it renders into does not
// type-check. In-place variants go through `DoubleSurface::split`.

use tracing::trace;

use crate::blur::{check_radius, should_blur};
use crate::context::PipelineContext;
use crate::error::Result;
use crate::kernel::{Kernel, SobelParams};
use crate::surface::{Destination, DoubleSurface};

fn pointwise<C: PipelineContext>(
    ctx: &mut C,
    kernel: &Kernel,
    inputs: &[&C::Surface],
    mut dst: Destination<'_, C::Surface>,
) -> Result<()> {
    ctx.draw(kernel, inputs, dst.target())?;
    dst.finish();
    Ok(())
}

fn neighbourhood<C: PipelineContext>(
    ctx: &mut C,
    kernel: &Kernel,
    inputs: &[&C::Surface],
    dst: &mut DoubleSurface<C::Surface>,
) -> Result<()> {
    debug_assert!(kernel.kind().samples_neighbourhood(), "{} is pointwise", kernel.kind());
    ctx.draw(kernel, inputs, &mut dst.back)?;
    dst.swap();
    Ok(())
}

fn neighbourhood_in_place<C: PipelineContext>(
    ctx: &mut C,
    kernel: &Kernel,
    pair: &mut DoubleSurface<C::Surface>,
) -> Result<()> {
    debug_assert!(kernel.kind().samples_neighbourhood(), "{} is pointwise", kernel.kind());
    let (front, back) = pair.split();
    ctx.draw(kernel, &[front], back)?;
    pair.swap();
    Ok(())
}

/// Copy `src` into `dst`, resampling when sizes differ.
pub fn passthrough<'a, C: PipelineContext>(
    ctx: &mut C,
    src: &C::Surface,
    dst: impl Into<Destination<'a, C::Surface>>,
) -> Result<()>
where
    C::Surface: 'a,
{
    pointwise(ctx, &Kernel::Passthrough, &[src], dst.into())
}

/// Average of R, G and B into all three channels, alpha 1.
pub fn grayscale<'a, C: PipelineContext>(
    ctx: &mut C,
    src: &C::Surface,
    dst: impl Into<Destination<'a, C::Surface>>,
) -> Result<()>
where
    C::Surface: 'a,
{
    pointwise(ctx, &Kernel::Grayscale, &[src], dst.into())
}

/// Broadcast the magnitude channel of a gradient surface.
pub fn magnitude<'a, C: PipelineContext>(
    ctx: &mut C,
    gradient: &C::Surface,
    dst: impl Into<Destination<'a, C::Surface>>,
) -> Result<()>
where
    C::Surface: 'a,
{
    pointwise(ctx, &Kernel::Magnitude, &[gradient], dst.into())
}

/// Composite `src` over `under` using the alpha of `src`.
pub fn alpha_blend<'a, C: PipelineContext>(
    ctx: &mut C,
    src: &C::Surface,
    under: &C::Surface,
    dst: impl Into<Destination<'a, C::Surface>>,
) -> Result<()>
where
    C::Surface: 'a,
{
    pointwise(ctx, &Kernel::AlphaBlend, &[src, under], dst.into())
}

/// Gaussian blur of `src` into `dst`.
///
/// # Errors
/// `InvalidParams` unless `0 < radius <= MAX_BLUR_RADIUS`; callers decide
/// whether to blur at all with [`should_blur`].
pub fn gaussian_blur<C: PipelineContext>(
    ctx: &mut C,
    src: &C::Surface,
    radius: f32,
    dst: &mut DoubleSurface<C::Surface>,
) -> Result<()> {
    check_radius(radius)?;
    neighbourhood(ctx, &Kernel::GaussianBlur { radius }, &[src], dst)
}

/// Blur `pair.front` in place when `radius` is above the blur epsilon.
///
/// Returns whether a pass ran. Under the epsilon nothing is drawn and
/// `front` is left untouched.
pub fn blur_in_place<C: PipelineContext>(
    ctx: &mut C,
    pair: &mut DoubleSurface<C::Surface>,
    radius: f32,
) -> Result<bool> {
    if !should_blur(radius) {
        trace!(radius, "blur skipped");
        return Ok(false);
    }
    neighbourhood_in_place(ctx, &Kernel::GaussianBlur { radius }, pair)?;
    Ok(true)
}

/// Encode the Sobel gradient of `src` as a tangent-space normal.
pub fn sobel_normal<C: PipelineContext>(
    ctx: &mut C,
    src: &C::Surface,
    params: SobelParams,
    dst: &mut DoubleSurface<C::Surface>,
) -> Result<()> {
    neighbourhood(ctx, &Kernel::SobelNormal(params), &[src], dst)
}

/// Raw Sobel gradient `(gx, gy, 0, mag)`.
pub fn sobel_gradient<C: PipelineContext>(
    ctx: &mut C,
    src: &C::Surface,
    dst: &mut DoubleSurface<C::Surface>,
) -> Result<()> {
    neighbourhood(ctx, &Kernel::SobelGradient, &[src], dst)
}

/// Thin `magnitude` to ridges along `gradient`.
pub fn non_max_suppression<C: PipelineContext>(
    ctx: &mut C,
    gradient: &C::Surface,
    magnitude: &C::Surface,
    threshold: f32,
    dst: &mut DoubleSurface<C::Surface>,
) -> Result<()> {
    neighbourhood(
        ctx,
        &Kernel::NonMaxSuppression { threshold },
        &[gradient, magnitude],
        dst,
    )
}

/// Grow the foreground of `pair.front` by `radius`, in place.
///
/// Same epsilon policy as [`blur_in_place`].
pub fn dilate_in_place<C: PipelineContext>(
    ctx: &mut C,
    pair: &mut DoubleSurface<C::Surface>,
    radius: f32,
) -> Result<bool> {
    if !should_blur(radius) {
        return Ok(false);
    }
    neighbourhood_in_place(ctx, &Kernel::Dilate { radius }, pair)?;
    Ok(true)
}
