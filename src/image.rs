// image.rs - Runtime-sized image container, generic over pixel type.
//
// Every CPU-side pixel buffer in the crate is an `Image<T>`:
//   - decoded source assets          Image<Rgba8>
//   - CPU reference surfaces         Image<Rgba>
//   - readbacks from the GPU         Image<Rgba>
//   - export buffers                 Image<Rgba8>
//
// Row 0 is the TOP row. Normalised coordinates (u, v) follow the wgpu
// texture convention: (0, 0) is the top-left corner of texel (0, 0) and
// texel (x, y) has its centre at ((x + 0.5) / w, (y + 0.5) / h).
//
// ADDRESSING
// ──────────
// The sampling helpers at the bottom of this file reproduce what the GPU
// sampler does with `AddressMode::ClampToEdge` and `AddressMode::MirrorRepeat`
// so the CPU reference kernels agree with the shaders texel for texel:
//
//   index:        -3 -2 -1 | 0 1 2 3 | 4  5  6
//   clamp:         0  0  0 | 0 1 2 3 | 3  3  3
//   mirror (w=4):  2  1  0 | 0 1 2 3 | 3  2  1

use std::fmt;

/// Linear RGBA, one `f32` per channel, nominally in [0, 1].
pub type Rgba = [f32; 4];

/// 8-bit RGBA as decoded from image files and written to PNG.
pub type Rgba8 = [u8; 4];

// ---------------------------------------------------------------------------
// Pixel Trait
// ---------------------------------------------------------------------------

/// Trait for types that can serve as pixel values in an Image.
///
/// Every pixel type converts to and from linear `Rgba` so images can be
/// moved between storage precisions with [`Image::convert`].
pub trait Pixel: Copy + Default + Send + Sync + PartialOrd + 'static {
    /// Expand this pixel to four float channels.
    fn to_rgba(self) -> Rgba;

    /// Build a pixel from four float channels (clamping/rounding as needed).
    fn from_rgba(v: Rgba) -> Self;
}

impl Pixel for f32 {
    /// A scalar is treated as an opaque gray value.
    #[inline]
    fn to_rgba(self) -> Rgba {
        [self, self, self, 1.0]
    }

    /// Takes the red channel.
    #[inline]
    fn from_rgba(v: Rgba) -> Self {
        v[0]
    }
}

impl Pixel for u8 {
    #[inline]
    fn to_rgba(self) -> Rgba {
        let v = unorm8_to_f32(self);
        [v, v, v, 1.0]
    }

    #[inline]
    fn from_rgba(v: Rgba) -> Self {
        f32_to_unorm8(v[0])
    }
}

impl Pixel for Rgba {
    #[inline]
    fn to_rgba(self) -> Rgba {
        self
    }

    #[inline]
    fn from_rgba(v: Rgba) -> Self {
        v
    }
}

impl Pixel for Rgba8 {
    #[inline]
    fn to_rgba(self) -> Rgba {
        self.map(unorm8_to_f32)
    }

    #[inline]
    fn from_rgba(v: Rgba) -> Self {
        v.map(f32_to_unorm8)
    }
}

/// `u8` -> [0, 1], exactly as a `*Unorm` texture read does.
#[inline]
pub fn unorm8_to_f32(v: u8) -> f32 {
    v as f32 / 255.0
}

/// [0, 1] -> `u8`, clamped and rounded to nearest like a `*Unorm` store.
#[inline]
pub fn f32_to_unorm8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

// ---------------------------------------------------------------------------
// Image<T>
// ---------------------------------------------------------------------------
// Row-major, contiguous buffer with explicit stride.
//
// Memory layout (stride = 5, width = 4):
//
//   data index:  0  1  2  3 [4]  5  6  7  8 [9] 10 11 12 13 [14]
//   pixel:       ■  ■  ■  ■  ·   ■  ■  ■  ■  ·   ■  ■  ■  ■  ·
//
// Readbacks from wgpu arrive with rows padded to 256 bytes; keeping the
// stride explicit lets them be wrapped without an extra copy when needed.

/// A 2D image with runtime dimensions, generic over pixel type `T`.
#[derive(Clone, PartialEq)]
pub struct Image<T: Pixel> {
    /// Pixel data in row-major order. Length = height * stride.
    data: Vec<T>,
    width: usize,
    height: usize,
    /// Row stride in *elements* (not bytes). stride >= width.
    stride: usize,
}

impl<T: Pixel> Image<T> {
    /// Create a zero-initialized image. Stride equals width.
    pub fn new(width: usize, height: usize) -> Self {
        Self::new_with_stride(width, height, width)
    }

    /// Create a zero-initialized image with an explicit stride.
    ///
    /// # Panics
    /// Panics if `stride < width`.
    pub fn new_with_stride(width: usize, height: usize, stride: usize) -> Self {
        assert!(
            stride >= width,
            "stride ({stride}) must be >= width ({width})"
        );
        Image {
            data: vec![T::default(); height * stride],
            width,
            height,
            stride,
        }
    }

    /// Create an image filled with a single value.
    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Image {
            data: vec![value; width * height],
            width,
            height,
            stride: width,
        }
    }

    /// Create an image by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Image {
            data,
            width,
            height,
            stride: width,
        }
    }

    /// Create an image from an existing pixel vector (no stride padding).
    ///
    /// # Panics
    /// Panics if `data.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "data length ({}) must equal width * height ({})",
            data.len(),
            width * height,
        );
        Image {
            data,
            width,
            height,
            stride: width,
        }
    }

    /// Create an image from raw data with explicit stride.
    ///
    /// # Panics
    /// Panics if `data.len() != height * stride` or `stride < width`.
    pub fn from_vec_with_stride(width: usize, height: usize, stride: usize, data: Vec<T>) -> Self {
        assert!(stride >= width, "stride ({stride}) must be >= width ({width})");
        assert_eq!(
            data.len(),
            height * stride,
            "data length ({}) must equal height * stride ({})",
            data.len(),
            height * stride,
        );
        Image {
            data,
            width,
            height,
            stride,
        }
    }

    // --- Accessors ---

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// True when the image has no pixels at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Get the pixel value at (x, y). x is column, y is row.
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.bounds_check(x, y);
        self.data[y * self.stride + x]
    }

    /// Get a mutable reference to the pixel at (x, y).
    #[inline]
    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut T {
        self.bounds_check(x, y);
        let idx = y * self.stride + x;
        &mut self.data[idx]
    }

    /// Set the pixel at (x, y) to the given value.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        *self.get_mut(x, y) = value;
    }

    /// Borrow a single row as a slice (padding excluded).
    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    /// Mutable borrow of a single row.
    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.stride;
        &mut self.data[start..start + self.width]
    }

    /// Iterate over all pixels as `(x, y, value)` tuples, skipping padding.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        (0..self.height).flat_map(move |y| {
            (0..self.width).map(move |x| (x, y, self.data[y * self.stride + x]))
        })
    }

    /// Access the underlying data as a flat slice, including stride padding.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Mutable access to the underlying data.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Copy into a tightly packed image (stride == width).
    pub fn compact(&self) -> Image<T> {
        if self.stride == self.width {
            return self.clone();
        }
        Image::from_fn(self.width, self.height, |x, y| self.get(x, y))
    }

    /// Apply `f` to every pixel, producing a new image of possibly different type.
    pub fn map<U: Pixel>(&self, mut f: impl FnMut(T) -> U) -> Image<U> {
        Image::from_fn(self.width, self.height, |x, y| f(self.get(x, y)))
    }

    /// Convert between pixel types through linear `Rgba`.
    pub fn convert<U: Pixel>(&self) -> Image<U> {
        self.map(|p| U::from_rgba(p.to_rgba()))
    }

    #[inline]
    fn bounds_check(&self, x: usize, y: usize) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for image {}×{}",
            self.width,
            self.height,
        );
    }
}

// Debug formatting, useful for small images in tests.
impl<T: Pixel + fmt::Debug> fmt::Debug for Image<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Image<{}> {{ {}×{}, stride={} }}",
            std::any::type_name::<T>(),
            self.width,
            self.height,
            self.stride,
        )?;
        for y in 0..self.height.min(8) {
            write!(f, "  row {y}: [")?;
            for x in 0..self.width.min(8) {
                if x > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:?}", self.get(x, y))?;
            }
            if self.width > 8 {
                write!(f, ", ...")?;
            }
            writeln!(f, "]")?;
        }
        if self.height > 8 {
            writeln!(f, "  ...")?;
        }
        Ok(())
    }
}

impl<T: Pixel> std::ops::Index<(usize, usize)> for Image<T> {
    type Output = T;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &T {
        self.bounds_check(x, y);
        &self.data[y * self.stride + x]
    }
}

impl<T: Pixel> std::ops::IndexMut<(usize, usize)> for Image<T> {
    #[inline]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut T {
        self.bounds_check(x, y);
        let idx = y * self.stride + x;
        &mut self.data[idx]
    }
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

/// How out-of-range texel indices are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum WrapMode {
    /// Repeat the edge texel.
    ClampToEdge,
    /// Reflect about the edge, repeating the edge texel once.
    MirrorRepeat,
}

impl WrapMode {
    /// Resolve a possibly out-of-range texel index into `[0, len)`.
    #[inline]
    pub fn resolve(self, i: isize, len: usize) -> usize {
        debug_assert!(len > 0);
        let n = len as isize;
        match self {
            WrapMode::ClampToEdge => i.clamp(0, n - 1) as usize,
            WrapMode::MirrorRepeat => {
                let period = 2 * n;
                let m = i.rem_euclid(period);
                if m < n {
                    m as usize
                } else {
                    (period - 1 - m) as usize
                }
            }
        }
    }
}

impl<T: Pixel> Image<T> {
    /// Fetch a texel with out-of-range indices resolved by `wrap`.
    #[inline]
    pub fn fetch(&self, x: isize, y: isize, wrap: WrapMode) -> T {
        let xi = wrap.resolve(x, self.width);
        let yi = wrap.resolve(y, self.height);
        self.data[yi * self.stride + xi]
    }

    /// Nearest-texel sample at normalised coordinates.
    pub fn sample_nearest(&self, u: f32, v: f32, wrap: WrapMode) -> Rgba {
        let x = (u * self.width as f32).floor() as isize;
        let y = (v * self.height as f32).floor() as isize;
        self.fetch(x, y, wrap).to_rgba()
    }

    /// Bilinear sample at normalised coordinates.
    ///
    /// Sampling exactly at a texel centre returns that texel unchanged,
    /// which is what the neighbourhood kernels rely on.
    pub fn sample_bilinear(&self, u: f32, v: f32, wrap: WrapMode) -> Rgba {
        let x = u * self.width as f32 - 0.5;
        let y = v * self.height as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (x0, y0) = (x0 as isize, y0 as isize);

        let p00 = self.fetch(x0, y0, wrap).to_rgba();
        let p10 = self.fetch(x0 + 1, y0, wrap).to_rgba();
        let p01 = self.fetch(x0, y0 + 1, wrap).to_rgba();
        let p11 = self.fetch(x0 + 1, y0 + 1, wrap).to_rgba();

        let mut out = [0.0f32; 4];
        for c in 0..4 {
            out[c] = (1.0 - fx) * (1.0 - fy) * p00[c]
                + fx * (1.0 - fy) * p10[c]
                + (1.0 - fx) * fy * p01[c]
                + fx * fy * p11[c];
        }
        out
    }
}

/// Normalised coordinate of the centre of texel `i` in an axis of `len` texels.
#[inline]
pub fn texel_center(i: usize, len: usize) -> f32 {
    (i as f32 + 0.5) / len as f32
}

/// An image plus the sampler state it is read with.
///
/// This is the CPU equivalent of a bound texture + sampler slot. The
/// reference kernels only ever read their inputs through a view.
#[derive(Clone, Copy)]
pub struct ImageView<'a> {
    pub image: &'a Image<Rgba>,
    pub wrap: WrapMode,
    pub linear: bool,
}

impl<'a> ImageView<'a> {
    pub fn new(image: &'a Image<Rgba>, wrap: WrapMode, linear: bool) -> Self {
        ImageView { image, wrap, linear }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.image.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.image.height()
    }

    /// `(1/width, 1/height)` of the viewed image.
    #[inline]
    pub fn texel(&self) -> [f32; 2] {
        [1.0 / self.width() as f32, 1.0 / self.height() as f32]
    }

    /// Sample at normalised coordinates with this view's filter.
    #[inline]
    pub fn sample(&self, u: f32, v: f32) -> Rgba {
        if self.linear {
            self.image.sample_bilinear(u, v, self.wrap)
        } else {
            self.image.sample_nearest(u, v, self.wrap)
        }
    }

    /// Sample the texel `(dx, dy)` texels away from the destination pixel
    /// `(x, y)` of an `out_w × out_h` target.
    ///
    /// When the target matches the input size every offset lands on a texel
    /// centre, so the lookup is an exact fetch.
    #[inline]
    pub fn neighbour(&self, x: usize, y: usize, out_w: usize, out_h: usize, dx: isize, dy: isize) -> Rgba {
        if out_w == self.width() && out_h == self.height() {
            return self
                .image
                .fetch(x as isize + dx, y as isize + dy, self.wrap)
                .to_rgba();
        }
        let [tx, ty] = self.texel();
        self.sample(
            texel_center(x, out_w) + dx as f32 * tx,
            texel_center(y, out_h) + dy as f32 * ty,
        )
    }

    /// Sample at the centre of destination pixel `(x, y)`.
    #[inline]
    pub fn at(&self, x: usize, y: usize, out_w: usize, out_h: usize) -> Rgba {
        self.neighbour(x, y, out_w, out_h, 0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let img: Image<Rgba> = Image::new(10, 5);
        assert_eq!(img.width(), 10);
        assert_eq!(img.height(), 5);
        assert_eq!(img.stride(), 10);
        for (_, _, v) in img.pixels() {
            assert_eq!(v, [0.0; 4]);
        }
    }

    #[test]
    fn test_stride_padding_skipped() {
        let mut img: Image<u8> = Image::new_with_stride(3, 2, 8);
        img.set(2, 1, 7);
        assert_eq!(img.row(1), &[0, 0, 7]);
        assert_eq!(img.pixels().count(), 6);
        let packed = img.compact();
        assert_eq!(packed.stride(), 3);
        assert_eq!(packed.get(2, 1), 7);
    }

    #[test]
    fn test_unorm8_round_trip() {
        for v in 0..=255u8 {
            assert_eq!(f32_to_unorm8(unorm8_to_f32(v)), v);
        }
        assert_eq!(f32_to_unorm8(-1.0), 0);
        assert_eq!(f32_to_unorm8(2.0), 255);
    }

    #[test]
    fn test_convert_rgba8_to_rgba() {
        let img = Image::from_vec(2, 1, vec![[255u8, 0, 51, 255], [0, 0, 0, 0]]);
        let f: Image<Rgba> = img.convert();
        assert_eq!(f.get(0, 0), [1.0, 0.0, 0.2, 1.0]);
        assert_eq!(f.get(1, 0), [0.0; 4]);
    }

    #[test]
    fn test_wrap_clamp() {
        let w = WrapMode::ClampToEdge;
        assert_eq!(w.resolve(-3, 4), 0);
        assert_eq!(w.resolve(2, 4), 2);
        assert_eq!(w.resolve(9, 4), 3);
    }

    #[test]
    fn test_wrap_mirror() {
        let w = WrapMode::MirrorRepeat;
        assert_eq!(w.resolve(-1, 4), 0);
        assert_eq!(w.resolve(-2, 4), 1);
        assert_eq!(w.resolve(-3, 4), 2);
        assert_eq!(w.resolve(4, 4), 3);
        assert_eq!(w.resolve(5, 4), 2);
        assert_eq!(w.resolve(8, 4), 0);
        // Single-texel axis always resolves to 0.
        assert_eq!(w.resolve(-5, 1), 0);
        assert_eq!(w.resolve(5, 1), 0);
    }

    #[test]
    fn test_bilinear_at_texel_centre_is_exact() {
        let img = Image::from_fn(4, 3, |x, y| [x as f32, y as f32, 0.5, 1.0]);
        for y in 0..3 {
            for x in 0..4 {
                let s = img.sample_bilinear(
                    texel_center(x, 4),
                    texel_center(y, 3),
                    WrapMode::MirrorRepeat,
                );
                let p = img.get(x, y);
                for c in 0..4 {
                    assert!((s[c] - p[c]).abs() < 1e-5, "mismatch at ({x},{y}): {s:?} vs {p:?}");
                }
            }
        }
    }

    #[test]
    fn test_bilinear_midpoint() {
        let img = Image::from_vec(2, 1, vec![[0.0, 0.0, 0.0, 1.0], [1.0, 1.0, 1.0, 1.0]]);
        // u = 0.5 lies halfway between the two texel centres.
        let s = img.sample_bilinear(0.5, 0.5, WrapMode::ClampToEdge);
        for c in 0..3 {
            assert!((s[c] - 0.5).abs() < 1e-6);
        }
        assert!((s[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_nearest_sample() {
        let img = Image::from_vec(2, 2, vec![0.1f32, 0.2, 0.3, 0.4]);
        assert_eq!(img.sample_nearest(0.75, 0.75, WrapMode::ClampToEdge)[0], 0.4);
        assert_eq!(img.sample_nearest(0.1, 0.6, WrapMode::ClampToEdge)[0], 0.3);
    }
}
