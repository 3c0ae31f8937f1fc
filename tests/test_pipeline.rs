// tests/test_pipeline.rs - End-to-end behaviour of the orchestrator on the
// CPU reference backend.
//
// Run with `cargo test --test test_pipeline`. Display targets are 8-bit, so
// comparisons against exact values allow one quantisation step.

use std::sync::{Arc, Mutex};

use normap::assets::SourceImage;
use normap::export::{ExportSink, ExportTarget};
use normap::image::{Image, Rgba, Rgba8};
use normap::{
    CpuContext, DisplayMode, FrameOutcome, Pipeline, PipelineContext, PipelineError, PipelineParams,
    Surface,
};

const STEP: f32 = 1.0 / 255.0;

fn render(source: Image<Rgba8>, size: u32, params: &PipelineParams) -> (Image<Rgba>, Image<Rgba>) {
    let mut ctx = CpuContext::new();
    let mut pipeline =
        Pipeline::with_size(&mut ctx, vec![SourceImage::from_image("src", source)], size, size).unwrap();
    assert_eq!(pipeline.tick(&mut ctx, params).unwrap(), FrameOutcome::Rendered);
    let diffuse = pipeline.read_display(&mut ctx, ExportTarget::Diffuse).unwrap();
    let normal = pipeline.read_display(&mut ctx, ExportTarget::Normal).unwrap();
    (diffuse, normal)
}

fn ramp(w: usize, h: usize) -> Image<Rgba8> {
    Image::from_fn(w, h, |x, y| {
        let v = ((x * 13 + y * 5) % 256) as u8;
        [v, v, v, 255]
    })
}

fn assert_close(a: Rgba, b: Rgba, tol: f32, what: &str) {
    for c in 0..4 {
        assert!((a[c] - b[c]).abs() <= tol, "{what}: {a:?} vs {b:?}");
    }
}

// ===== Normal encoding =====

#[test]
fn uniform_source_gives_flat_normal() {
    let (_, normal) = render(Image::filled(12, 12, [90, 140, 30, 255]), 16, &PipelineParams::default());
    for (x, y, p) in normal.pixels() {
        assert_close(p, [0.5, 0.5, 1.0, 1.0], STEP, &format!("texel ({x}, {y})"));
    }
}

#[test]
fn checkerboard_has_gradient_everywhere() {
    let checker = Image::from_vec(2, 2, vec![[0, 0, 0, 255], [255, 255, 255, 255], [255, 255, 255, 255], [0, 0, 0, 255]]);
    let params = PipelineParams {
        scale: 50.0,
        z_height: 0.8,
        swap_direction: false,
        ..Default::default()
    };
    let (_, normal) = render(checker.clone(), 2, &params);
    for (x, y, p) in normal.pixels() {
        assert_eq!(p[3], 1.0, "alpha at ({x}, {y})");
        // Saturated tanh: the flat normal contributes nothing, so blue is
        // the z-height rather than 1.
        assert!((p[2] - 0.8).abs() <= STEP, "blue at ({x}, {y}) = {}", p[2]);
        assert!((p[0] - 0.5).abs() > 0.1 && (p[1] - 0.5).abs() > 0.1, "({x}, {y}) looks flat: {p:?}");
    }

    let magnitude = PipelineParams { mode: DisplayMode::Magnitude, ..params };
    let (_, mag) = render(checker, 2, &magnitude);
    for (x, y, p) in mag.pixels() {
        assert!(p[0] > 0.0, "zero magnitude at ({x}, {y})");
        assert_eq!(p[3], 1.0);
    }
}

#[test]
fn swap_direction_mirrors_the_encoding() {
    let plain = PipelineParams { scale: 5.0, ..Default::default() };
    let swapped = PipelineParams { swap_direction: true, ..plain };
    let (_, a) = render(ramp(16, 16), 16, &plain);
    let (_, b) = render(ramp(16, 16), 16, &swapped);
    for ((x, y, p), (_, _, q)) in a.pixels().zip(b.pixels()) {
        assert!((p[0] + q[0] - 1.0).abs() <= 1.5 * STEP, "red at ({x}, {y}): {} / {}", p[0], q[0]);
        assert!((p[1] + q[1] - 1.0).abs() <= 1.5 * STEP, "green at ({x}, {y}): {} / {}", p[1], q[1]);
        assert_eq!(p[2], q[2]);
    }
}

// ===== Blur policy =====

#[test]
fn blur_under_epsilon_is_skipped() {
    let none = PipelineParams { scale: 10.0, ..Default::default() };
    let tiny = PipelineParams { pre_blur: 0.5, post_blur: 0.6, ..none };
    let (_, a) = render(ramp(16, 16), 16, &none);
    let (_, b) = render(ramp(16, 16), 16, &tiny);
    assert_eq!(a, b);

    let real = PipelineParams { pre_blur: 2.0, ..none };
    let (_, c) = render(ramp(16, 16), 16, &real);
    assert_ne!(a, c);
}

// ===== Diffuse path =====

#[test]
fn diffuse_display_shows_source() {
    let src = Image::from_fn(8, 8, |x, y| [(x * 30) as u8, (y * 30) as u8, 77, 255]);
    let (diffuse, _) = render(src.clone(), 8, &PipelineParams::default());
    assert_eq!(diffuse.convert::<Rgba8>(), src);
}

#[test]
fn edges_mode_marks_a_step() {
    let step = Image::from_fn(16, 16, |x, _| if x < 8 { [20, 20, 20, 255] } else { [230, 230, 230, 255] });
    let params = PipelineParams {
        mode: DisplayMode::Edges,
        edge_threshold: 0.05,
        ..Default::default()
    };
    let (_, out) = render(step.clone(), 16, &params);
    for y in 0..16 {
        // Edge pixels are painted white over the source.
        assert!((6..=9).any(|x| out.get(x, y) == [1.0; 4]), "no edge in row {y}");
        assert_close(out.get(0, y), [20.0 / 255.0, 20.0 / 255.0, 20.0 / 255.0, 1.0], STEP, "left");
        assert_close(out.get(15, y), [230.0 / 255.0, 230.0 / 255.0, 230.0 / 255.0, 1.0], STEP, "right");
    }
}

// ===== Lifecycle =====

#[test]
fn waits_until_every_source_is_ready() {
    let mut ctx = CpuContext::new();
    let pending = SourceImage::request("not-yet.png");
    let sources = vec![SourceImage::from_image("a", ramp(4, 4)), pending];
    let mut pipeline = Pipeline::with_size(&mut ctx, sources, 8, 8).unwrap();
    for _ in 0..3 {
        assert_eq!(
            pipeline.tick(&mut ctx, &PipelineParams::default()).unwrap(),
            FrameOutcome::WaitingForAssets
        );
    }
    assert_eq!(pipeline.stats().frames_waiting, 3);
    assert_eq!(ctx.draw_count(), 0);
}

#[test]
fn failed_source_stops_the_run() {
    let mut ctx = CpuContext::new();
    let broken = SourceImage::load("/no/such/texture.png");
    broken.wait(std::time::Duration::from_secs(10)).unwrap_err();
    let mut pipeline = Pipeline::with_size(&mut ctx, vec![broken], 8, 8).unwrap();
    let err = pipeline.tick(&mut ctx, &PipelineParams::default()).unwrap_err();
    assert!(matches!(err, PipelineError::Asset { .. }));
}

#[test]
fn empty_source_stops_the_run_instead_of_waiting() {
    let mut ctx = CpuContext::new();
    let empty = SourceImage::from_image("blank.png", Image::new(0, 4));
    let mut pipeline = Pipeline::with_size(&mut ctx, vec![empty], 8, 8).unwrap();
    let err = pipeline.tick(&mut ctx, &PipelineParams::default()).unwrap_err();
    assert!(matches!(err, PipelineError::Asset { ref message, .. } if message.contains("empty")));
    assert_eq!(pipeline.stats().frames_waiting, 0);
}

#[test]
fn invalid_params_are_rejected_before_drawing() {
    let mut ctx = CpuContext::new();
    let mut pipeline =
        Pipeline::with_size(&mut ctx, vec![SourceImage::from_image("a", ramp(4, 4))], 8, 8).unwrap();
    let params = PipelineParams { z_height: 3.0, ..Default::default() };
    assert!(matches!(
        pipeline.tick(&mut ctx, &params),
        Err(PipelineError::InvalidParams(_))
    ));
    assert_eq!(ctx.draw_count(), 0);
}

#[test]
fn oversized_pipeline_fails_to_allocate() {
    let mut ctx = CpuContext::with_max_dimension(256);
    let result = Pipeline::new(&mut ctx, Vec::new());
    assert!(matches!(result, Err(PipelineError::Allocation { width: 512, .. })));
}

#[test]
fn default_pipeline_uses_512_displays() {
    let mut ctx = CpuContext::new();
    let pipeline = Pipeline::new(&mut ctx, Vec::new()).unwrap();
    assert_eq!(pipeline.normal_display().width(), 512);
    assert_eq!(pipeline.diffuse_display().height(), 512);
}

// ===== Export =====

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<(ExportTarget, usize, usize)>>>);

impl ExportSink for Recorder {
    fn export(&mut self, target: ExportTarget, image: &Image<Rgba>) -> normap::Result<()> {
        self.0.lock().unwrap().push((target, image.width(), image.height()));
        Ok(())
    }
}

#[test]
fn export_happens_once_per_request() {
    let mut ctx = CpuContext::new();
    let mut pipeline =
        Pipeline::with_size(&mut ctx, vec![SourceImage::from_image("a", ramp(4, 4))], 8, 8).unwrap();
    let recorder = Recorder::default();
    pipeline.set_export_sink(Box::new(recorder.clone()));

    pipeline.request_export(ExportTarget::Diffuse);
    // Superseded before the tick runs.
    pipeline.request_export(ExportTarget::Normal);
    pipeline.tick(&mut ctx, &PipelineParams::default()).unwrap();
    pipeline.tick(&mut ctx, &PipelineParams::default()).unwrap();

    assert_eq!(*recorder.0.lock().unwrap(), vec![(ExportTarget::Normal, 8, 8)]);
    assert_eq!(pipeline.stats().exports, 1);
    assert_eq!(pipeline.export_pending(), None);
}

#[test]
fn export_request_survives_waiting_frames() {
    let mut ctx = CpuContext::new();
    let mut pipeline = Pipeline::with_size(&mut ctx, vec![SourceImage::request("later.png")], 8, 8).unwrap();
    let recorder = Recorder::default();
    pipeline.set_export_sink(Box::new(recorder.clone()));
    pipeline.request_export(ExportTarget::Normal);
    pipeline.tick(&mut ctx, &PipelineParams::default()).unwrap();
    assert_eq!(pipeline.export_pending(), Some(ExportTarget::Normal));
    assert!(recorder.0.lock().unwrap().is_empty());
}
