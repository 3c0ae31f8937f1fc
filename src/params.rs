// params.rs - Pipeline parameters and change signalling.
//
// `PipelineParams` is the value the orchestrator reads once at the start of
// every tick. It is owned by whoever drives the UI (or the CLI); the
// pipeline only ever sees snapshots.
//
// `SharedParams` is the hand-off point between the two: the collaborator
// mutates through `update`, which validates and raises a dirty flag; the
// frame loop polls `take_dirty` to decide whether an on-demand render is
// needed. A pass already recorded keeps the values it was recorded with.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::blur::MAX_BLUR_RADIUS;
use crate::error::{PipelineError, Result};
use crate::kernel::SobelParams;
use crate::morphology::MAX_DILATION_RADIUS;

pub const MAX_SCALE: f32 = 300.0;

/// Which chain the orchestrator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Grayscale, blur, Sobel-to-normal, blur.
    #[default]
    Normal,
    /// Gradient magnitude as a grayscale image.
    Magnitude,
    /// Thinned, dilated edges composited over the diffuse image.
    Edges,
}

impl std::str::FromStr for DisplayMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(DisplayMode::Normal),
            "magnitude" => Ok(DisplayMode::Magnitude),
            "edges" => Ok(DisplayMode::Edges),
            other => Err(PipelineError::InvalidParams(format!("unknown display mode '{other}'"))),
        }
    }
}

/// Every user-facing knob of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineParams {
    /// Index into the registered source images.
    pub texture_index: usize,
    pub swap_direction: bool,
    /// Gradient intensity, in (0, 300].
    pub scale: f32,
    /// Z component of the encoded normal, in [0, 1].
    pub z_height: f32,
    /// Blur radius before the Sobel pass; at or under 0.6 means no blur.
    #[serde(rename = "preGauss")]
    pub pre_blur: f32,
    /// Blur radius applied to the encoded normal.
    #[serde(rename = "postGauss")]
    pub post_blur: f32,
    pub mode: DisplayMode,
    /// NMS threshold on the gradient magnitude, in [0, 1].
    pub edge_threshold: f32,
    /// Dilation radius of the edge mask, in [0, 10].
    pub edge_dilation: f32,
}

impl Default for PipelineParams {
    fn default() -> Self {
        PipelineParams {
            texture_index: 0,
            swap_direction: false,
            scale: 1.0,
            z_height: 1.0,
            pre_blur: 0.0,
            post_blur: 0.0,
            mode: DisplayMode::Normal,
            edge_threshold: 0.1,
            edge_dilation: 0.0,
        }
    }
}

fn check_range(name: &str, value: f32, min: f32, max: f32, min_inclusive: bool) -> Result<()> {
    let above_min = if min_inclusive { value >= min } else { value > min };
    if above_min && value <= max {
        Ok(())
    } else {
        let open = if min_inclusive { '[' } else { '(' };
        Err(PipelineError::InvalidParams(format!(
            "{name} = {value} is outside {open}{min}, {max}]"
        )))
    }
}

impl PipelineParams {
    /// Check every field against its documented range.
    pub fn validate(&self) -> Result<()> {
        check_range("scale", self.scale, 0.0, MAX_SCALE, false)?;
        check_range("zHeight", self.z_height, 0.0, 1.0, true)?;
        check_range("preGauss", self.pre_blur, 0.0, MAX_BLUR_RADIUS, true)?;
        check_range("postGauss", self.post_blur, 0.0, MAX_BLUR_RADIUS, true)?;
        check_range("edgeThreshold", self.edge_threshold, 0.0, 1.0, true)?;
        check_range("edgeDilation", self.edge_dilation, 0.0, MAX_DILATION_RADIUS, true)?;
        Ok(())
    }

    /// The Sobel-to-normal stage parameters.
    pub fn sobel(&self) -> SobelParams {
        SobelParams {
            scale: self.scale,
            z_height: self.z_height,
            swap_direction: self.swap_direction,
        }
    }

    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let params: PipelineParams =
            serde_json::from_str(json).map_err(|e| PipelineError::Config(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    /// Read parameters from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))
    }
}

/// Parameters shared between the collaborator that edits them and the
/// frame loop that reads them.
#[derive(Debug, Clone, Default)]
pub struct SharedParams {
    inner: Arc<Mutex<PipelineParams>>,
    dirty: Arc<AtomicBool>,
}

impl SharedParams {
    pub fn new(params: PipelineParams) -> Self {
        SharedParams {
            inner: Arc::new(Mutex::new(params)),
            dirty: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Current values.
    pub fn snapshot(&self) -> PipelineParams {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Edit the parameters. The edit is applied only if the result
    /// validates; either way the previous snapshot stays consistent.
    pub fn update(&self, f: impl FnOnce(&mut PipelineParams)) -> Result<()> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = *guard;
        f(&mut next);
        next.validate()?;
        if next != *guard {
            *guard = next;
            self.dirty.store(true, Ordering::Release);
        }
        Ok(())
    }

    /// Whether anything changed since the last call; clears the flag.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }
}
