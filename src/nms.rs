// nms.rs - Non-maximum suppression along the gradient direction.
//
// Canny-style edge thinning. For each pixel:
//
//   1. Read the gradient (gx, gy) from the gradient image and the
//      magnitude m from the red channel of the magnitude image.
//   2. Step one texel forward and one backward along the gradient
//      direction and sample the magnitude there (bilinear, so diagonal
//      directions interpolate between neighbours).
//   3. The pixel is an edge iff m >= both samples and m > threshold.
//
// gy is "up minus down" while rows grow downward, so the image-space step
// is (dir.x, -dir.y).
//
// Output is a binary mask: (1, 1, 1, 1) on edges, (0, 0, 0, 0) elsewhere,
// ready to be dilated and composited over the diffuse image.

use crate::image::{texel_center, Image, ImageView, Rgba};

pub const EDGE: Rgba = [1.0, 1.0, 1.0, 1.0];
pub const NOT_EDGE: Rgba = [0.0, 0.0, 0.0, 0.0];

/// Unit step in texel units along a gradient, `None` for a zero gradient.
#[inline]
pub fn gradient_step(gx: f32, gy: f32) -> Option<[f32; 2]> {
    let len = (gx * gx + gy * gy).sqrt();
    if len == 0.0 {
        return None;
    }
    Some([gx / len, -gy / len])
}

/// Edge decision for one pixel.
#[inline]
pub fn is_edge(m: f32, forward: f32, backward: f32, threshold: f32) -> bool {
    m >= forward && m >= backward && m > threshold
}

/// Thin `magnitude` to single-pixel ridges along `gradient`.
pub fn non_max_suppression(
    gradient: ImageView<'_>,
    magnitude: ImageView<'_>,
    threshold: f32,
    out_w: usize,
    out_h: usize,
) -> Image<Rgba> {
    let [tx, ty] = gradient.texel();
    Image::from_fn(out_w, out_h, |x, y| {
        let g = gradient.at(x, y, out_w, out_h);
        let Some([sx, sy]) = gradient_step(g[0], g[1]) else {
            return NOT_EDGE;
        };
        let u = texel_center(x, out_w);
        let v = texel_center(y, out_h);
        let m = magnitude.at(x, y, out_w, out_h)[0];
        let forward = magnitude.sample(u + sx * tx, v + sy * ty)[0];
        let backward = magnitude.sample(u - sx * tx, v - sy * ty)[0];
        if is_edge(m, forward, backward, threshold) {
            EDGE
        } else {
            NOT_EDGE
        }
    })
}
