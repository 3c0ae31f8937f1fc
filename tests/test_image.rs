// tests/test_image.rs - Image<T>, addressing and sampling through the public API.
//
// Run with `cargo test --test test_image`. The sampling rules here are the
// ones the shaders get from the GPU sampler; the CPU kernels depend on them
// agreeing texel for texel.

use normap::image::{texel_center, Image, ImageView, Rgba, Rgba8, WrapMode};

// ===== Construction & access =====

#[test]
fn image_new_zero_initialized() {
    let img: Image<Rgba> = Image::new(7, 3);
    assert_eq!((img.width(), img.height()), (7, 3));
    assert!(img.pixels().all(|(_, _, p)| p == [0.0; 4]));
}

#[test]
fn image_from_vec_is_row_major_top_first() {
    let img = Image::from_vec(2, 2, vec![[1u8, 0, 0, 0], [2, 0, 0, 0], [3, 0, 0, 0], [4, 0, 0, 0]]);
    assert_eq!(img.get(1, 0)[0], 2);
    assert_eq!(img.get(0, 1)[0], 3);
    assert_eq!(img.row(1)[1][0], 4);
}

#[test]
fn image_stride_does_not_affect_pixel_access() {
    let mut img: Image<Rgba8> = Image::new_with_stride(3, 2, 8);
    img.set(2, 1, [9, 9, 9, 9]);
    assert_eq!(img.stride(), 8);
    assert_eq!(img.row(1).len(), 3);
    let compact = img.compact();
    assert_eq!(compact.stride(), 3);
    assert_eq!(compact.get(2, 1), [9, 9, 9, 9]);
    assert_eq!(compact, img.compact());
}

#[test]
#[should_panic]
fn image_from_vec_rejects_wrong_length() {
    let _ = Image::<Rgba8>::from_vec(2, 2, vec![[0; 4]; 3]);
}

// ===== Conversions =====

#[test]
fn rgba8_to_float_and_back() {
    let src = Image::from_fn(16, 16, |x, y| [(x * 16) as u8, (y * 16) as u8, 255, 0]);
    let float: Image<Rgba> = src.convert();
    assert_eq!(float.get(15, 0), [240.0 / 255.0, 0.0, 1.0, 0.0]);
    let back: Image<Rgba8> = float.convert();
    assert_eq!(back, src);
}

#[test]
fn float_to_rgba8_clamps() {
    let img = Image::filled(1, 1, [-1.0f32, 2.0, 0.5, 1.0]);
    let out: Image<Rgba8> = img.convert();
    assert_eq!(out.get(0, 0), [0, 255, 128, 255]);
}

// ===== Addressing =====

#[test]
fn wrap_modes_resolve_like_the_gpu_sampler() {
    let clamp: Vec<usize> = (-3..7).map(|i| WrapMode::ClampToEdge.resolve(i, 4)).collect();
    assert_eq!(clamp, [0, 0, 0, 0, 1, 2, 3, 3, 3, 3]);
    let mirror: Vec<usize> = (-3..7).map(|i| WrapMode::MirrorRepeat.resolve(i, 4)).collect();
    assert_eq!(mirror, [2, 1, 0, 0, 1, 2, 3, 3, 2, 1]);
}

#[test]
fn single_texel_axis_always_resolves_to_zero() {
    for i in -5..5 {
        assert_eq!(WrapMode::MirrorRepeat.resolve(i, 1), 0);
        assert_eq!(WrapMode::ClampToEdge.resolve(i, 1), 0);
    }
}

// ===== Sampling =====

#[test]
fn texel_centres() {
    assert_eq!(texel_center(0, 4), 0.125);
    assert_eq!(texel_center(3, 4), 0.875);
}

#[test]
fn view_neighbour_matches_fetch_at_equal_size() {
    let img = Image::from_fn(5, 4, |x, y| [x as f32, y as f32, 0.0, 1.0]);
    let view = ImageView::new(&img, WrapMode::MirrorRepeat, true);
    assert_eq!(view.neighbour(0, 0, 5, 4, -1, -1), [0.0, 0.0, 0.0, 1.0]);
    assert_eq!(view.neighbour(4, 3, 5, 4, 1, 1), [4.0, 3.0, 0.0, 1.0]);
    assert_eq!(view.neighbour(2, 1, 5, 4, 1, 2), [3.0, 3.0, 0.0, 1.0]);
}

#[test]
fn view_resamples_when_sizes_differ() {
    // 2×1 -> 4×1 with linear filtering and clamped edges.
    let img = Image::from_vec(2, 1, vec![[0.0, 0.0, 0.0, 1.0], [1.0, 1.0, 1.0, 1.0]]);
    let view = ImageView::new(&img, WrapMode::ClampToEdge, true);
    let row: Vec<f32> = (0..4).map(|x| view.at(x, 0, 4, 1)[0]).collect();
    assert_eq!(row, [0.0, 0.25, 0.75, 1.0]);

    let nearest = ImageView::new(&img, WrapMode::ClampToEdge, false);
    let row: Vec<f32> = (0..4).map(|x| nearest.at(x, 0, 4, 1)[0]).collect();
    assert_eq!(row, [0.0, 0.0, 1.0, 1.0]);
}

#[test]
fn bilinear_between_rows() {
    let img = Image::from_vec(1, 2, vec![[0.0, 0.0, 0.0, 0.0], [1.0, 1.0, 1.0, 1.0]]);
    let mid = img.sample_bilinear(0.5, 0.5, WrapMode::ClampToEdge);
    assert_eq!(mid, [0.5; 4]);
}
