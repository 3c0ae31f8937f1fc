// morphology.rs - Binary dilation with a circular structuring element.
//
// A texel is foreground when its red channel exceeds 0.5. The output is
// foreground, written as (1, 1, 1, 1), iff any foreground texel lies
// within Euclidean distance `radius`; everything else is (0, 0, 0, 0).
// The visited square uses the same R = ceil(radius) rule as the blur.

use crate::error::{PipelineError, Result};
use crate::image::{Image, ImageView, Rgba};

/// Largest radius a dilation pass accepts.
pub const MAX_DILATION_RADIUS: f32 = 10.0;

pub const FOREGROUND: Rgba = [1.0, 1.0, 1.0, 1.0];
pub const BACKGROUND: Rgba = [0.0, 0.0, 0.0, 0.0];

#[inline]
pub fn is_foreground(p: Rgba) -> bool {
    p[0] > 0.5
}

/// Reject radii outside `[0, MAX_DILATION_RADIUS]`.
pub fn check_radius(radius: f32) -> Result<()> {
    if (0.0..=MAX_DILATION_RADIUS).contains(&radius) {
        Ok(())
    } else {
        Err(PipelineError::InvalidParams(format!(
            "dilation radius must be in [0, {MAX_DILATION_RADIUS}], got {radius}"
        )))
    }
}

/// Offsets inside a disc of the given radius, centre first.
pub fn disc_offsets(radius: f32) -> Vec<(isize, isize)> {
    let reach = radius.max(0.0).ceil() as isize;
    let mut offsets = vec![(0, 0)];
    for dy in -reach..=reach {
        for dx in -reach..=reach {
            if (dx, dy) == (0, 0) {
                continue;
            }
            if (((dx * dx + dy * dy) as f32).sqrt()) <= radius {
                offsets.push((dx, dy));
            }
        }
    }
    offsets
}

pub fn dilate(src: ImageView<'_>, radius: f32, out_w: usize, out_h: usize) -> Image<Rgba> {
    let offsets = disc_offsets(radius);
    Image::from_fn(out_w, out_h, |x, y| {
        let hit = offsets
            .iter()
            .any(|&(dx, dy)| is_foreground(src.neighbour(x, y, out_w, out_h, dx, dy)));
        if hit {
            FOREGROUND
        } else {
            BACKGROUND
        }
    })
}
