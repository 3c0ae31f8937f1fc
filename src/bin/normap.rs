// normap - command-line front end.
//
// Loads the sources on decoder threads, drives the pipeline at a fixed
// refresh rate until the requested number of frames has been rendered,
// then exports the chosen display targets as PNG.
//
//   normap --source brick.png --scale 50 --pre-blur 2 --out out/
//   RUST_LOG=normap=debug normap --source a.png --source b.jpg --texture-index 1 --cpu

use std::path::PathBuf;

use anyhow::{bail, Context as _};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use normap::assets::SourceImage;
use normap::driver::{FrameDriver, RefreshClock, Schedule};
use normap::export::{ExportTarget, PngExporter};
use normap::{
    CpuContext, DeviceProfile, DisplayMode, FrameOutcome, GpuContext, Pipeline, PipelineContext,
    PipelineError, PipelineParams, SharedParams,
};

#[derive(Parser, Debug)]
#[command(name = "normap", version, about = "Convert diffuse textures to normal maps")]
struct Cli {
    /// Source image (PNG or JPEG). Repeat for several sources.
    #[arg(long = "source", required = true)]
    sources: Vec<PathBuf>,

    /// JSON parameter file; flags below override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    texture_index: Option<usize>,

    /// Gradient intensity, (0, 300].
    #[arg(long)]
    scale: Option<f32>,

    /// Normal z component, [0, 1].
    #[arg(long)]
    z_height: Option<f32>,

    #[arg(long)]
    pre_blur: Option<f32>,

    #[arg(long)]
    post_blur: Option<f32>,

    /// Invert the gradient direction.
    #[arg(long)]
    swap: bool,

    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Frames to render before exporting.
    #[arg(long, default_value_t = 1)]
    frames: u64,

    /// Refresh rate of the frame loop.
    #[arg(long, default_value_t = 60.0)]
    fps: f64,

    /// Output directory for exported PNGs.
    #[arg(long, default_value = "normap-out")]
    out: PathBuf,

    /// Display targets to export. Repeatable.
    #[arg(long, value_enum, default_values_t = [ExportArg::Normal])]
    export: Vec<ExportArg>,

    /// Run on the CPU reference backend.
    #[arg(long)]
    cpu: bool,

    /// Simulate WebGL2 device limits on the GPU backend.
    #[arg(long)]
    webgl2: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Normal,
    Magnitude,
    Edges,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ExportArg {
    Diffuse,
    Normal,
}

/// Fully resolved run settings, logged at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunConfig {
    params: PipelineParams,
    frames: u64,
    fps: f64,
    out: PathBuf,
    export: Vec<ExportTarget>,
    cpu: bool,
}

impl Cli {
    fn resolve(&self) -> anyhow::Result<RunConfig> {
        let mut params = match &self.config {
            Some(path) => PipelineParams::load(path)
                .with_context(|| format!("load parameters from '{}'", path.display()))?,
            None => PipelineParams::default(),
        };
        if let Some(v) = self.texture_index {
            params.texture_index = v;
        }
        if let Some(v) = self.scale {
            params.scale = v;
        }
        if let Some(v) = self.z_height {
            params.z_height = v;
        }
        if let Some(v) = self.pre_blur {
            params.pre_blur = v;
        }
        if let Some(v) = self.post_blur {
            params.post_blur = v;
        }
        if self.swap {
            params.swap_direction = true;
        }
        if let Some(mode) = self.mode {
            params.mode = match mode {
                ModeArg::Normal => DisplayMode::Normal,
                ModeArg::Magnitude => DisplayMode::Magnitude,
                ModeArg::Edges => DisplayMode::Edges,
            };
        }
        params.validate().context("invalid parameters")?;
        if params.texture_index >= self.sources.len() {
            bail!(
                "--texture-index {} but only {} source(s) given",
                params.texture_index,
                self.sources.len()
            );
        }

        Ok(RunConfig {
            params,
            frames: self.frames.max(1),
            fps: self.fps,
            out: self.out.clone(),
            export: self
                .export
                .iter()
                .map(|e| match e {
                    ExportArg::Diffuse => ExportTarget::Diffuse,
                    ExportArg::Normal => ExportTarget::Normal,
                })
                .collect(),
            cpu: self.cpu,
        })
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();
    let config = cli.resolve()?;
    info!(config = %serde_json::to_string(&config)?, "starting");

    let sources: Vec<SourceImage> = cli.sources.iter().map(SourceImage::load).collect();

    if config.cpu {
        return run(CpuContext::new(), sources, &config);
    }
    let profile = if cli.webgl2 {
        DeviceProfile::WebGl2
    } else {
        DeviceProfile::Native
    };
    match GpuContext::new(profile) {
        Ok(ctx) => run(ctx, sources, &config),
        Err(PipelineError::NoSuitableAdapter) => {
            warn!("no GPU adapter available, falling back to the CPU backend");
            run(CpuContext::new(), sources, &config)
        }
        Err(e) => Err(e).context("initialise GPU backend"),
    }
}

fn run<C: PipelineContext>(mut ctx: C, sources: Vec<SourceImage>, config: &RunConfig) -> anyhow::Result<()> {
    let mut pipeline = Pipeline::new(&mut ctx, sources).context("allocate pipeline surfaces")?;
    let exporter = PngExporter::new(&config.out)
        .with_context(|| format!("create output directory '{}'", config.out.display()))?;
    pipeline.set_export_sink(Box::new(exporter));

    let params = SharedParams::new(config.params);
    let mut driver = FrameDriver::new(Schedule::Continuous);
    let mut clock = RefreshClock::from_fps(config.fps)?;
    let mut exports = config.export.iter().copied();

    loop {
        clock.wait();
        if params.take_dirty() {
            driver.request_render();
        }
        let snapshot = params.snapshot();
        let Some(outcome) = driver.tick(|| pipeline.tick(&mut ctx, &snapshot)) else {
            continue;
        };
        if outcome.context("render frame")? == FrameOutcome::WaitingForAssets {
            continue;
        }

        // Exports ride on the frames after the last requested one, one
        // target per frame.
        if pipeline.stats().frames_rendered >= config.frames {
            match exports.next() {
                Some(target) => pipeline.request_export(target),
                None => break,
            }
        }
    }
    driver.cancel();

    let stats = pipeline.stats();
    info!(
        backend = ctx.backend_name(),
        rendered = stats.frames_rendered,
        waited = stats.frames_waiting,
        draws = stats.draws,
        exports = stats.exports,
        out = %config.out.display(),
        "done"
    );
    Ok(())
}
