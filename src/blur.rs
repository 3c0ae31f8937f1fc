// blur.rs - Circular Gaussian blur with fractional radii.
//
// RADIUS RULE
// ───────────
// For a radius r > 0 the kernel visits the square of side 2R+1 around the
// centre, R = ceil(r). Each offset (dx, dy) at distance d = sqrt(dx²+dy²)
// gets weight exp(-d² / (2r²)); offsets with d > r are skipped. The sum is
// normalised by the total weight, over all four channels.
//
//   r = 1.0  ->  R = 1, 5 taps (the plus shape; corners are at d = 1.41)
//   r = 1.5  ->  R = 2, 9 taps (3×3 block; (2,0) is at d = 2 > 1.5)
//   r = 2.0  ->  R = 2, 13 taps
//
// Radii outside (0, MAX_BLUR_RADIUS] are rejected with `InvalidParams`.
// The orchestrator additionally skips the pass for r <= BLUR_EPSILON, where
// the kernel degenerates to the centre tap plus a handful of near-zero
// weights.
//
// The kernel is not separable (the d > r cut makes it circular), so it is
// evaluated as one 2D pass. Tap weights are precomputed per radius.

use crate::error::{PipelineError, Result};
use crate::image::{Image, ImageView, Rgba};

/// Radii at or below this are treated as "no blur".
pub const BLUR_EPSILON: f32 = 0.6;

/// Largest radius any blur pass accepts.
pub const MAX_BLUR_RADIUS: f32 = 10.0;

/// Reject radii no blur pass can run with.
pub fn check_radius(radius: f32) -> Result<()> {
    if radius > 0.0 && radius <= MAX_BLUR_RADIUS {
        Ok(())
    } else {
        Err(PipelineError::InvalidParams(format!(
            "blur radius must be in (0, {MAX_BLUR_RADIUS}], got {radius}"
        )))
    }
}

/// Whether a blur stage should run for this radius.
#[inline]
pub fn should_blur(radius: f32) -> bool {
    radius > BLUR_EPSILON
}

/// Precomputed taps of a circular Gaussian.
#[derive(Debug, Clone)]
pub struct BlurKernel {
    pub radius: f32,
    /// R = ceil(radius): half-side of the visited square.
    pub reach: usize,
    /// `(dx, dy, weight)` for every offset with d <= radius, unnormalised.
    pub taps: Vec<(isize, isize, f32)>,
    pub weight_sum: f32,
}

impl BlurKernel {
    /// # Errors
    /// `InvalidParams` unless `0 < radius <= MAX_BLUR_RADIUS`.
    pub fn new(radius: f32) -> Result<Self> {
        check_radius(radius)?;
        let reach = radius.ceil() as usize;
        let r = reach as isize;
        let two_r2 = 2.0 * radius * radius;

        let mut taps = Vec::with_capacity((2 * reach + 1) * (2 * reach + 1));
        let mut weight_sum = 0.0;
        for dy in -r..=r {
            for dx in -r..=r {
                let d2 = (dx * dx + dy * dy) as f32;
                if d2.sqrt() > radius {
                    continue;
                }
                let w = (-d2 / two_r2).exp();
                taps.push((dx, dy, w));
                weight_sum += w;
            }
        }

        Ok(BlurKernel {
            radius,
            reach,
            taps,
            weight_sum,
        })
    }

    /// Blurred value of destination pixel `(x, y)`.
    #[inline]
    pub fn apply_at(&self, src: &ImageView<'_>, x: usize, y: usize, out_w: usize, out_h: usize) -> Rgba {
        let mut acc = [0.0f32; 4];
        for &(dx, dy, w) in &self.taps {
            let p = src.neighbour(x, y, out_w, out_h, dx, dy);
            for c in 0..4 {
                acc[c] += p[c] * w;
            }
        }
        acc.map(|v| v / self.weight_sum)
    }
}

/// Blur `src` into a new `out_w × out_h` image.
pub fn gaussian_blur(src: ImageView<'_>, radius: f32, out_w: usize, out_h: usize) -> Result<Image<Rgba>> {
    let kernel = BlurKernel::new(radius)?;
    Ok(Image::from_fn(out_w, out_h, |x, y| kernel.apply_at(&src, x, y, out_w, out_h)))
}
