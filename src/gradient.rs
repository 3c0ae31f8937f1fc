// gradient.rs - Sobel gradients and their normal-map encoding.
//
// Sobel on the red channel of a grayscale image. Row 0 is the top row,
// so "up" is y - 1:
//
//   gx = (TR + 2·R + BR) - (TL + 2·L + BL)        right minus left
//   gy = (TL + 2·T + TR) - (BL + 2·B + BR)        up minus down
//
// Both are divided by 4, which maps them into [-1, 1] for inputs in
// [0, 1]. "Up minus down" keeps green pointing along +Y of the normal map
// (Y-up convention).
//
// NORMAL ENCODING
// ───────────────
//   mag  = clamp((gx² + gy²) / 2, 0, 1)
//   g    = (gx, gy), or (1, 0) when both are exactly zero
//   g    = -g                    if swap_direction
//   g    = normalize(g) * 0.5 + 0.5
//   mag' = tanh(scale · mag)
//   out  = mix((g.x, g.y, z_height, 1), (0.5, 0.5, 1, 1), 1 - mag')
//
// A flat region therefore encodes as the straight-up normal (0.5, 0.5, 1, 1).

use crate::image::{Image, ImageView, Rgba};
use crate::kernel::SobelParams;

/// The straight-up normal, what flat regions encode to.
pub const FLAT_NORMAL: Rgba = [0.5, 0.5, 1.0, 1.0];

/// Raw Sobel response at one pixel, already divided by 4.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gradient {
    pub gx: f32,
    pub gy: f32,
}

impl Gradient {
    /// `(gx² + gy²) / 2`, clamped to [0, 1].
    #[inline]
    pub fn magnitude(self) -> f32 {
        ((self.gx * self.gx + self.gy * self.gy) / 2.0).clamp(0.0, 1.0)
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.gx == 0.0 && self.gy == 0.0
    }
}

/// Sobel gradient of the red channel at destination pixel `(x, y)`.
pub fn sobel_at(src: &ImageView<'_>, x: usize, y: usize, out_w: usize, out_h: usize) -> Gradient {
    let r = |dx: isize, dy: isize| src.neighbour(x, y, out_w, out_h, dx, dy)[0];

    let tl = r(-1, -1);
    let t = r(0, -1);
    let tr = r(1, -1);
    let l = r(-1, 0);
    let rr = r(1, 0);
    let bl = r(-1, 1);
    let b = r(0, 1);
    let br = r(1, 1);

    let gx = (tr + 2.0 * rr + br) - (tl + 2.0 * l + bl);
    let gy = (tl + 2.0 * t + tr) - (bl + 2.0 * b + br);

    Gradient {
        gx: gx / 4.0,
        gy: gy / 4.0,
    }
}

/// Direction actually encoded for `g`, before normalisation.
///
/// Zero gradients become `(1, 0)`; `swap` negates both components.
#[inline]
pub fn encoded_direction(g: Gradient, swap: bool) -> [f32; 2] {
    let mut d = if g.is_zero() { [1.0, 0.0] } else { [g.gx, g.gy] };
    if swap {
        d = [-d[0], -d[1]];
    }
    d
}

/// Encode one gradient as a normal-map texel.
pub fn gradient_to_normal(g: Gradient, params: &SobelParams) -> Rgba {
    let [dx, dy] = encoded_direction(g, params.swap_direction);
    let len = (dx * dx + dy * dy).sqrt();
    let nx = dx / len * 0.5 + 0.5;
    let ny = dy / len * 0.5 + 0.5;

    let mag = (params.scale * g.magnitude()).tanh();
    let t = 1.0 - mag;

    let strong = [nx, ny, params.z_height, 1.0];
    let mut out = [0.0; 4];
    for c in 0..4 {
        out[c] = strong[c] * (1.0 - t) + FLAT_NORMAL[c] * t;
    }
    out
}

/// Sobel-to-normal over a whole image.
pub fn sobel_normal(
    src: ImageView<'_>,
    params: &SobelParams,
    out_w: usize,
    out_h: usize,
) -> Image<Rgba> {
    Image::from_fn(out_w, out_h, |x, y| {
        gradient_to_normal(sobel_at(&src, x, y, out_w, out_h), params)
    })
}

/// Raw gradient image: `(gx, gy, 0, magnitude)`.
pub fn sobel_gradient(src: ImageView<'_>, out_w: usize, out_h: usize) -> Image<Rgba> {
    Image::from_fn(out_w, out_h, |x, y| {
        let g = sobel_at(&src, x, y, out_w, out_h);
        [g.gx, g.gy, 0.0, g.magnitude()]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::WrapMode;

    fn gray(v: f32) -> Rgba {
        [v, v, v, 1.0]
    }

    fn mirror(img: &Image<Rgba>) -> ImageView<'_> {
        ImageView::new(img, WrapMode::MirrorRepeat, true)
    }

    #[test]
    fn test_uniform_image_is_flat() {
        let img = Image::filled(6, 5, gray(0.37));
        let out = sobel_normal(mirror(&img), &SobelParams::default(), 6, 5);
        for (_, _, p) in out.pixels() {
            assert_eq!(p, FLAT_NORMAL);
        }
    }

    #[test]
    fn test_horizontal_ramp_points_right() {
        // Brightness increasing to the right -> positive gx.
        let img = Image::from_fn(8, 8, |x, _| gray(x as f32 / 8.0));
        let view = mirror(&img);
        let g = sobel_at(&view, 4, 4, 8, 8);
        assert!(g.gx > 0.0);
        assert!(g.gy.abs() < 1e-6);
        // 8 · (1/8) / 4
        assert!((g.gx - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_vertical_ramp_y_up() {
        // Brighter towards the top (row 0) -> positive gy.
        let img = Image::from_fn(8, 8, |_, y| gray(1.0 - y as f32 / 8.0));
        let view = mirror(&img);
        let g = sobel_at(&view, 3, 3, 8, 8);
        assert!(g.gy > 0.0, "gy = {}", g.gy);
        assert!(g.gx.abs() < 1e-6);
    }

    #[test]
    fn test_zero_gradient_defaults_to_x_axis() {
        let g = Gradient { gx: 0.0, gy: 0.0 };
        assert_eq!(encoded_direction(g, false), [1.0, 0.0]);
        assert_eq!(encoded_direction(g, true), [-1.0, 0.0]);
    }

    #[test]
    fn test_swap_negates_direction() {
        let g = Gradient { gx: 0.3, gy: -0.1 };
        let a = encoded_direction(g, false);
        let b = encoded_direction(g, true);
        assert_eq!(b, [-a[0], -a[1]]);

        let params = SobelParams {
            scale: 50.0,
            z_height: 0.8,
            swap_direction: false,
        };
        let swapped = SobelParams {
            swap_direction: true,
            ..params
        };
        let n = gradient_to_normal(g, &params);
        let s = gradient_to_normal(g, &swapped);
        for c in 0..2 {
            assert!(((s[c] - 0.5) + (n[c] - 0.5)).abs() < 1e-6);
        }
        assert_eq!(n[2], s[2]);
    }

    #[test]
    fn test_magnitude_clamped() {
        let g = Gradient { gx: 1.0, gy: 1.0 };
        assert_eq!(g.magnitude(), 1.0);
        let g = Gradient { gx: 0.5, gy: 0.5 };
        assert!((g.magnitude() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_strong_edge_uses_z_height() {
        let g = Gradient { gx: 1.0, gy: 0.0 };
        let params = SobelParams {
            scale: 300.0,
            z_height: 0.3,
            swap_direction: false,
        };
        let n = gradient_to_normal(g, &params);
        assert!((n[0] - 1.0).abs() < 1e-5);
        assert!((n[1] - 0.5).abs() < 1e-5);
        assert!((n[2] - 0.3).abs() < 1e-5);
        assert_eq!(n[3], 1.0);
    }

    #[test]
    fn test_checkerboard_has_gradient_everywhere() {
        let img = Image::from_fn(2, 2, |x, y| gray(((x + y) % 2) as f32));
        let view = mirror(&img);
        let grad = sobel_gradient(view, 2, 2);
        for (x, y, p) in grad.pixels() {
            assert!(p[3] > 0.0, "zero magnitude at ({x},{y})");
        }
    }
}
