// color.rs - Pointwise kernels: passthrough, grayscale, magnitude, alpha blend.
//
// Pointwise kernels read exactly one texel per input at the destination
// pixel's centre, so they are safe to run with a single-surface
// destination. Each function produces an `out_w × out_h` image; when that
// differs from the input size the input is resampled through its view.

use crate::image::{Image, ImageView, Rgba};

/// Copy (and resample if needed) the input.
pub fn passthrough(src: ImageView<'_>, out_w: usize, out_h: usize) -> Image<Rgba> {
    Image::from_fn(out_w, out_h, |x, y| src.at(x, y, out_w, out_h))
}

/// Luminance as the plain channel average, replicated to R, G and B.
///
/// Alpha is forced to 1.
#[inline]
pub fn grayscale_pixel(p: Rgba) -> Rgba {
    let g = (p[0] + p[1] + p[2]) / 3.0;
    [g, g, g, 1.0]
}

pub fn grayscale(src: ImageView<'_>, out_w: usize, out_h: usize) -> Image<Rgba> {
    Image::from_fn(out_w, out_h, |x, y| grayscale_pixel(src.at(x, y, out_w, out_h)))
}

/// Turn the magnitude channel (alpha) of a gradient image into opaque gray.
pub fn magnitude(gradient: ImageView<'_>, out_w: usize, out_h: usize) -> Image<Rgba> {
    Image::from_fn(out_w, out_h, |x, y| {
        let m = gradient.at(x, y, out_w, out_h)[3];
        [m, m, m, 1.0]
    })
}

/// Porter-Duff source-over with straight (non-premultiplied) alpha.
#[inline]
pub fn blend_pixel(src: Rgba, dst: Rgba) -> Rgba {
    let a = src[3];
    [
        src[0] * a + dst[0] * (1.0 - a),
        src[1] * a + dst[1] * (1.0 - a),
        src[2] * a + dst[2] * (1.0 - a),
        a + dst[3] * (1.0 - a),
    ]
}

/// Composite `src` over `dst`.
pub fn alpha_blend(
    src: ImageView<'_>,
    dst: ImageView<'_>,
    out_w: usize,
    out_h: usize,
) -> Image<Rgba> {
    Image::from_fn(out_w, out_h, |x, y| {
        blend_pixel(src.at(x, y, out_w, out_h), dst.at(x, y, out_w, out_h))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::WrapMode;

    fn view(img: &Image<Rgba>) -> ImageView<'_> {
        ImageView::new(img, WrapMode::ClampToEdge, true)
    }

    #[test]
    fn test_grayscale_averages_channels() {
        let img = Image::from_fn(3, 2, |x, y| [x as f32 * 0.3, y as f32 * 0.5, 0.2, 0.4]);
        let out = grayscale(view(&img), 3, 2);
        for (x, y, p) in out.pixels() {
            let i = img.get(x, y);
            let expected = (i[0] + i[1] + i[2]) / 3.0;
            assert!((p[0] - expected).abs() < 1e-6);
            assert_eq!(p[0], p[1]);
            assert_eq!(p[1], p[2]);
            assert_eq!(p[3], 1.0);
        }
    }

    #[test]
    fn test_passthrough_same_size_is_identity() {
        let img = Image::from_fn(4, 4, |x, y| [x as f32 / 4.0, y as f32 / 4.0, 0.5, 1.0]);
        let out = passthrough(view(&img), 4, 4);
        assert_eq!(out, img);
    }

    #[test]
    fn test_passthrough_downsample_averages() {
        // 2×1 -> 1×1 samples exactly between the two texels.
        let img = Image::from_vec(2, 1, vec![[0.0, 0.0, 0.0, 1.0], [1.0, 0.5, 0.0, 1.0]]);
        let out = passthrough(view(&img), 1, 1);
        let p = out.get(0, 0);
        assert!((p[0] - 0.5).abs() < 1e-6);
        assert!((p[1] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_magnitude_reads_alpha() {
        let img = Image::filled(2, 2, [0.3, -0.2, 0.0, 0.7]);
        let out = magnitude(view(&img), 2, 2);
        assert_eq!(out.get(1, 1), [0.7, 0.7, 0.7, 1.0]);
    }

    #[test]
    fn test_blend_opaque_and_transparent() {
        let dst = [0.2, 0.4, 0.6, 1.0];
        assert_eq!(blend_pixel([1.0, 1.0, 1.0, 1.0], dst), [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(blend_pixel([1.0, 1.0, 1.0, 0.0], dst), dst);
    }

    #[test]
    fn test_blend_half() {
        let p = blend_pixel([1.0, 0.0, 0.0, 0.5], [0.0, 0.0, 1.0, 1.0]);
        assert!((p[0] - 0.5).abs() < 1e-6);
        assert!((p[2] - 0.5).abs() < 1e-6);
        assert_eq!(p[3], 1.0);
    }
}
