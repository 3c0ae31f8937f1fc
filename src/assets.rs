// assets.rs - Source images and their asynchronous decoding.
//
// Lifecycle of a source:
//
//   Requested ──start()──► Decoding ──(worker thread)──► Ready(image)
//                                                   └──► Failed(message)
//
// Decoding is the only work done off the frame thread. The worker publishes
// the decoded pixels and then raises the `ready` flag; the orchestrator only
// polls `is_ready()` and never blocks on a source. A decoded image with a
// zero dimension is a failure, not a ready source.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::image::{Image, Rgba8};

/// Where a source is in its lifecycle.
#[derive(Debug, Clone)]
pub enum LoadState {
    Requested,
    Decoding,
    Ready(Arc<Image<Rgba8>>),
    Failed(String),
}

#[derive(Debug)]
struct Slot {
    ready: AtomicBool,
    state: Mutex<LoadState>,
}

impl Slot {
    fn set(&self, state: LoadState) {
        let ready = matches!(&state, LoadState::Ready(img) if img.width() > 0 && img.height() > 0);
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
        self.ready.store(ready, Ordering::Release);
    }

    fn get(&self) -> LoadState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Store a decoded image, or a failure if it has no texels.
    fn publish(&self, path: &Path, image: Image<Rgba8>) {
        if image.is_empty() {
            warn!(path = %path.display(), width = image.width(), height = image.height(), "decoded image is empty");
            self.set(LoadState::Failed("decoded image is empty".to_string()));
        } else {
            self.set(LoadState::Ready(Arc::new(image)));
        }
    }
}

/// A source image identified by path. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct SourceImage {
    path: PathBuf,
    slot: Arc<Slot>,
}

impl SourceImage {
    /// Register a source without starting to decode it.
    pub fn request(path: impl Into<PathBuf>) -> Self {
        SourceImage {
            path: path.into(),
            slot: Arc::new(Slot {
                ready: AtomicBool::new(false),
                state: Mutex::new(LoadState::Requested),
            }),
        }
    }

    /// Register a source and start decoding it on a worker thread.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let source = Self::request(path);
        source.start();
        source
    }

    /// A source that is ready from the start.
    pub fn from_image(name: impl Into<PathBuf>, image: Image<Rgba8>) -> Self {
        let source = Self::request(name);
        source.slot.publish(&source.path, image);
        source
    }

    /// Spawn the decoder. Does nothing unless the source is `Requested`.
    pub fn start(&self) {
        {
            let mut state = self.slot.state.lock().unwrap_or_else(|e| e.into_inner());
            if !matches!(*state, LoadState::Requested) {
                return;
            }
            *state = LoadState::Decoding;
        }

        let path = self.path.clone();
        let slot = Arc::clone(&self.slot);
        let spawned = std::thread::Builder::new()
            .name(format!("decode {}", path.display()))
            .spawn(move || {
                let started = Instant::now();
                match read_rgba8(&path) {
                    Ok(image) => {
                        debug!(
                            path = %path.display(),
                            width = image.width(),
                            height = image.height(),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "source decoded"
                        );
                        slot.publish(&path, image);
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "source failed to decode");
                        slot.set(LoadState::Failed(e.to_string()));
                    }
                }
            });
        if let Err(e) = spawned {
            self.slot.set(LoadState::Failed(format!("cannot spawn decoder: {e}")));
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decoded, non-empty and safe to upload.
    pub fn is_ready(&self) -> bool {
        self.slot.ready.load(Ordering::Acquire)
    }

    pub fn state(&self) -> LoadState {
        self.slot.get()
    }

    /// The decoded pixels, once ready.
    pub fn image(&self) -> Option<Arc<Image<Rgba8>>> {
        if !self.is_ready() {
            return None;
        }
        match self.slot.get() {
            LoadState::Ready(image) => Some(image),
            _ => None,
        }
    }

    /// The decode error, if decoding failed.
    pub fn error(&self) -> Option<PipelineError> {
        match self.slot.get() {
            LoadState::Failed(message) => Some(PipelineError::Asset {
                path: self.path.clone(),
                message,
            }),
            _ => None,
        }
    }

    /// Block until the source is ready or failed. For the CLI and tests;
    /// the frame loop polls instead.
    pub fn wait(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_ready() {
                return Ok(());
            }
            if let Some(e) = self.error() {
                return Err(e);
            }
            if Instant::now() >= deadline {
                return Err(PipelineError::Asset {
                    path: self.path.clone(),
                    message: format!("not decoded after {timeout:?}"),
                });
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}

/// Decode PNG or JPEG bytes into 8-bit RGBA, row 0 at the top.
pub fn decode_rgba8(bytes: &[u8]) -> std::result::Result<Image<Rgba8>, ::image::ImageError> {
    let rgba = ::image::load_from_memory(bytes)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    let pixels: Vec<Rgba8> = rgba
        .into_raw()
        .chunks_exact(4)
        .map(|c| [c[0], c[1], c[2], c[3]])
        .collect();
    Ok(Image::from_vec(width as usize, height as usize, pixels))
}

/// Read and decode an image file.
pub fn read_rgba8(path: &Path) -> Result<Image<Rgba8>> {
    let bytes = std::fs::read(path).map_err(|e| PipelineError::Asset {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    decode_rgba8(&bytes).map_err(|e| PipelineError::Asset {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
