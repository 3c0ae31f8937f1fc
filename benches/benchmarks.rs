// benches/benchmarks.rs -- CPU reference kernels and full ticks.
//
//   cargo bench --bench benchmarks
//
// Kernel benchmarks run one pass over a 512×512 working image, the size the
// pipeline renders at. The tick benchmarks run the whole chain on the CPU
// backend for each display mode.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use normap::assets::SourceImage;
use normap::image::{Image, ImageView, Rgba, Rgba8, WrapMode};
use normap::kernel::{Kernel, SobelParams};
use normap::{CpuContext, DisplayMode, Pipeline, PipelineParams};

// ============================================================
// Helpers
// ============================================================

/// Synthetic texture: diagonal gradient with a few bright bricks.
fn make_texture(w: usize, h: usize) -> Image<Rgba8> {
    Image::from_fn(w, h, |x, y| {
        let brick = (x / 64 + y / 32) % 3 == 0 && x % 64 > 4 && y % 32 > 4;
        let base = ((x * 150 / w) + (y * 80 / h)) as u8;
        let v = if brick { 220 } else { base };
        [v, v / 2 + 40, base, 255]
    })
}

fn working(w: usize, h: usize) -> Image<Rgba> {
    make_texture(w, h).convert()
}

// ============================================================
// Per-kernel benchmarks
// ============================================================

fn bench_kernels(c: &mut Criterion) {
    let img = working(512, 512);
    let view = ImageView::new(&img, WrapMode::MirrorRepeat, true);
    let gradient = CpuContext::evaluate(&Kernel::SobelGradient, &[view], 512, 512).expect("gradient");
    let grad_view = ImageView::new(&gradient, WrapMode::MirrorRepeat, true);
    let magnitude = CpuContext::evaluate(&Kernel::Magnitude, &[grad_view], 512, 512).expect("magnitude");
    let mag_view = ImageView::new(&magnitude, WrapMode::MirrorRepeat, true);

    let mut group = c.benchmark_group("kernels");
    group.sample_size(20);

    group.bench_function("grayscale_512", |b| {
        b.iter(|| CpuContext::evaluate(&Kernel::Grayscale, &[view], 512, 512))
    });
    group.bench_function("sobel_normal_512", |b| {
        let k = Kernel::SobelNormal(SobelParams { scale: 50.0, ..Default::default() });
        b.iter(|| CpuContext::evaluate(&k, &[view], 512, 512))
    });
    group.bench_function("non_max_suppression_512", |b| {
        let k = Kernel::NonMaxSuppression { threshold: 0.1 };
        b.iter(|| CpuContext::evaluate(&k, &[grad_view, mag_view], 512, 512))
    });
    group.finish();

    let mut group = c.benchmark_group("gaussian_blur");
    group.sample_size(10);
    for radius in [1.0f32, 2.5, 5.0, 10.0] {
        group.bench_with_input(BenchmarkId::from_parameter(radius), &radius, |b, &r| {
            b.iter(|| CpuContext::evaluate(&Kernel::GaussianBlur { radius: r }, &[view], 512, 512))
        });
    }
    group.finish();
}

// ============================================================
// Full ticks on the CPU backend
// ============================================================

fn bench_tick(c: &mut Criterion) {
    let mut ctx = CpuContext::new();
    let source = SourceImage::from_image("bench", make_texture(512, 512));
    let mut pipeline = Pipeline::new(&mut ctx, vec![source]).expect("allocate pipeline");

    let mut group = c.benchmark_group("cpu_tick");
    group.sample_size(10);
    for mode in [DisplayMode::Normal, DisplayMode::Magnitude, DisplayMode::Edges] {
        let params = PipelineParams {
            mode,
            scale: 30.0,
            pre_blur: 1.5,
            ..Default::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(format!("{mode:?}")), &params, |b, p| {
            b.iter(|| pipeline.tick(&mut ctx, p).expect("tick"))
        });
    }
    group.finish();
}

// ============================================================
// Register
// ============================================================

criterion_group!(benches, bench_kernels, bench_tick);
criterion_main!(benches);
