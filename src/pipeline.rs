// pipeline.rs - The orchestrator: one parameterised chain of passes per tick.
//
// `Pipeline<C>` owns every surface it renders into for its whole lifetime.
// The context is NOT owned: the caller passes it into `tick` together with
// the parameter snapshot for that frame.
//
// TICK
// ────
//   1  wait      every registered source ready? otherwise WaitingForAssets
//   2  clear     both display targets to opaque black
//   3  diffuse   source -> diffuse display
//   4  working   source -> grayscale working pair (a draw, not a copy)
//   5  pre-blur  in place, only when radius > BLUR_EPSILON
//   6  main pass depends on the display mode:
//                  Normal     Sobel-to-normal -> normal pair
//                  Magnitude  Sobel gradient -> magnitude -> normal pair
//                  Edges      Sobel gradient -> magnitude -> NMS -> dilate
//                             -> edge mask over the source -> normal pair
//   7  post-blur Normal mode only, same epsilon policy
//   8  present   normal pair -> normal display
//   9  export    read back the requested display target, reset the request
//  10  flush     submit; the driver schedules the next tick
//
// All passes of a tick are recorded before anything is submitted. The
// swap after each neighbourhood pass is the only synchronisation between
// them.

use tracing::{debug, info, warn};

use crate::assets::SourceImage;
use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::export::{ExportSink, ExportTarget};
use crate::image::{Image, Rgba};
use crate::params::{DisplayMode, PipelineParams};
use crate::stages;
use crate::surface::{Destination, DoubleSurface, SurfaceDesc};

/// Width and height of both presentation targets.
pub const DISPLAY_SIZE: u32 = 512;

/// Colour both display targets are cleared to.
pub const BACKGROUND: Rgba = [0.0, 0.0, 0.0, 1.0];

/// Result of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Rendered,
    /// A source is still decoding; nothing was drawn.
    WaitingForAssets,
}

/// Running counters, logged every tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames_rendered: u64,
    pub frames_waiting: u64,
    /// Passes issued by the context since it was created.
    pub draws: u64,
    pub exports: u64,
}

/// The normal-map pipeline.
pub struct Pipeline<C: PipelineContext> {
    sources: Vec<SourceImage>,
    /// Uploaded source textures, filled in the first time each is ready.
    uploaded: Vec<Option<C::Surface>>,
    diffuse_display: C::Surface,
    normal_display: C::Surface,
    working: DoubleSurface<C::Surface>,
    normal: DoubleSurface<C::Surface>,
    gradient: DoubleSurface<C::Surface>,
    magnitude: DoubleSurface<C::Surface>,
    edges: DoubleSurface<C::Surface>,
    export_request: Option<ExportTarget>,
    sink: Option<Box<dyn ExportSink>>,
    stats: FrameStats,
}

impl<C: PipelineContext> Pipeline<C> {
    /// Allocate every surface at the standard 512×512 display size.
    ///
    /// # Errors
    /// `Allocation` if any surface is rejected; the pipeline cannot start.
    pub fn new(ctx: &mut C, sources: Vec<SourceImage>) -> Result<Self> {
        Self::with_size(ctx, sources, DISPLAY_SIZE, DISPLAY_SIZE)
    }

    /// Same as [`Pipeline::new`] with a custom display and working size.
    pub fn with_size(ctx: &mut C, sources: Vec<SourceImage>, width: u32, height: u32) -> Result<Self> {
        let display = SurfaceDesc::display(width, height);
        let working = SurfaceDesc::working(width, height);
        // Reject the size before any of the twelve surfaces is allocated.
        display.validate(ctx.max_surface_dimension())?;
        let pipeline = Pipeline {
            uploaded: sources.iter().map(|_| None).collect(),
            sources,
            diffuse_display: ctx.create_surface(display)?,
            normal_display: ctx.create_surface(display)?,
            working: ctx.create_double(working)?,
            normal: ctx.create_double(working)?,
            gradient: ctx.create_double(working)?,
            magnitude: ctx.create_double(working)?,
            edges: ctx.create_double(working)?,
            export_request: None,
            sink: None,
            stats: FrameStats::default(),
        };
        info!(
            backend = ctx.backend_name(),
            width,
            height,
            sources = pipeline.sources.len(),
            "pipeline ready"
        );
        Ok(pipeline)
    }

    /// Register another source. Returns its index.
    pub fn add_source(&mut self, source: SourceImage) -> usize {
        self.sources.push(source);
        self.uploaded.push(None);
        self.sources.len() - 1
    }

    pub fn sources(&self) -> &[SourceImage] {
        &self.sources
    }

    /// Where `request_export` hands frames.
    pub fn set_export_sink(&mut self, sink: Box<dyn ExportSink>) {
        self.sink = Some(sink);
    }

    /// Take the sink back, e.g. to inspect what it received.
    pub fn take_export_sink(&mut self) -> Option<Box<dyn ExportSink>> {
        self.sink.take()
    }

    /// Export `target` at the end of the next rendered tick. A later
    /// request before that tick replaces this one.
    pub fn request_export(&mut self, target: ExportTarget) {
        self.export_request = Some(target);
    }

    pub fn export_pending(&self) -> Option<ExportTarget> {
        self.export_request
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn diffuse_display(&self) -> &C::Surface {
        &self.diffuse_display
    }

    pub fn normal_display(&self) -> &C::Surface {
        &self.normal_display
    }

    fn display(&self, target: ExportTarget) -> &C::Surface {
        match target {
            ExportTarget::Diffuse => &self.diffuse_display,
            ExportTarget::Normal => &self.normal_display,
        }
    }

    /// Whether every registered source has decoded. Surfaces a decode
    /// failure as an error.
    fn sources_ready(&self) -> Result<bool> {
        for source in &self.sources {
            if let Some(e) = source.error() {
                return Err(e);
            }
            if !source.is_ready() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Upload the selected source on first use.
    fn ensure_uploaded(&mut self, ctx: &mut C, index: usize) -> Result<()> {
        if self.uploaded[index].is_some() {
            return Ok(());
        }
        let source = &self.sources[index];
        let Some(image) = source.image() else {
            return Err(PipelineError::Asset {
                path: source.path().to_path_buf(),
                message: "reported ready without pixels".into(),
            });
        };
        debug!(index, width = image.width(), height = image.height(), "uploading source");
        self.uploaded[index] = Some(ctx.upload(&image)?);
        Ok(())
    }

    /// Run one frame with `params`.
    ///
    /// # Errors
    /// Invalid parameters, a bad source index, a failed decode, or any
    /// pass the context rejects. All are fatal for the run.
    pub fn tick(&mut self, ctx: &mut C, params: &PipelineParams) -> Result<FrameOutcome> {
        params.validate()?;
        let index = params.texture_index;
        if index >= self.sources.len() {
            return Err(PipelineError::SourceIndex {
                index,
                count: self.sources.len(),
            });
        }

        // 1
        if !self.sources_ready()? {
            self.stats.frames_waiting += 1;
            debug!(waiting = self.stats.frames_waiting, "sources not ready");
            return Ok(FrameOutcome::WaitingForAssets);
        }
        self.ensure_uploaded(ctx, index)?;
        let Some(source) = self.uploaded[index].as_ref() else {
            return Err(PipelineError::SourceIndex {
                index,
                count: self.sources.len(),
            });
        };

        // 2
        ctx.clear(&mut self.diffuse_display, BACKGROUND)?;
        ctx.clear(&mut self.normal_display, BACKGROUND)?;

        // 3
        stages::passthrough(ctx, source, Destination::single(&mut self.diffuse_display))?;

        // 4, 5
        stages::grayscale(ctx, source, &mut self.working)?;
        stages::blur_in_place(ctx, &mut self.working, params.pre_blur)?;

        // 6, 7
        match params.mode {
            DisplayMode::Normal => {
                stages::sobel_normal(ctx, &self.working.front, params.sobel(), &mut self.normal)?;
                stages::blur_in_place(ctx, &mut self.normal, params.post_blur)?;
            }
            DisplayMode::Magnitude => {
                stages::sobel_gradient(ctx, &self.working.front, &mut self.gradient)?;
                stages::magnitude(ctx, &self.gradient.front, &mut self.normal)?;
            }
            DisplayMode::Edges => {
                stages::sobel_gradient(ctx, &self.working.front, &mut self.gradient)?;
                stages::magnitude(ctx, &self.gradient.front, &mut self.magnitude)?;
                stages::non_max_suppression(
                    ctx,
                    &self.gradient.front,
                    &self.magnitude.front,
                    params.edge_threshold,
                    &mut self.edges,
                )?;
                stages::dilate_in_place(ctx, &mut self.edges, params.edge_dilation)?;
                stages::alpha_blend(ctx, &self.edges.front, source, &mut self.normal)?;
            }
        }

        // 8
        stages::passthrough(ctx, &self.normal.front, Destination::single(&mut self.normal_display))?;

        // 9
        if let Some(target) = self.export_request.take() {
            match self.sink.as_mut() {
                Some(sink) => {
                    let image = ctx.readback(match target {
                        ExportTarget::Diffuse => &self.diffuse_display,
                        ExportTarget::Normal => &self.normal_display,
                    })?;
                    sink.export(target, &image)?;
                    self.stats.exports += 1;
                }
                None => warn!(%target, "export requested without a sink; request dropped"),
            }
        }

        // 10
        ctx.flush()?;
        self.stats.frames_rendered += 1;
        self.stats.draws = ctx.draw_count();
        debug!(
            frame = self.stats.frames_rendered,
            draws = self.stats.draws,
            mode = ?params.mode,
            "frame rendered"
        );
        Ok(FrameOutcome::Rendered)
    }

    /// Read back a display target outside the export path.
    pub fn read_display(&self, ctx: &mut C, target: ExportTarget) -> Result<Image<Rgba>> {
        ctx.readback(self.display(target))
    }
}
