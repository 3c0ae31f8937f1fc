// export.rs - Handing display targets to the export collaborator.
//
// The orchestrator reads back the requested display target once, after
// presenting, and passes the pixels to an `ExportSink`. Sinks decide what
// "export" means; the two shipped here encode PNG and either keep the bytes
// in memory or write them to a directory.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::image::{Image, Rgba, Rgba8};

/// Which display target to export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportTarget {
    Diffuse,
    Normal,
}

impl fmt::Display for ExportTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportTarget::Diffuse => write!(f, "diffuse"),
            ExportTarget::Normal => write!(f, "normal"),
        }
    }
}

/// Receiver of exported frames.
pub trait ExportSink {
    fn export(&mut self, target: ExportTarget, image: &Image<Rgba>) -> Result<()>;
}

/// PNG-encode an image, rounding every channel to 8 bits.
pub fn encode_png(image: &Image<Rgba>) -> Result<Vec<u8>> {
    let rgba8: Image<Rgba8> = image.convert();
    let mut raw = Vec::with_capacity(rgba8.width() * rgba8.height() * 4);
    for y in 0..rgba8.height() {
        raw.extend_from_slice(bytemuck::cast_slice(rgba8.row(y)));
    }
    let buffer = ::image::RgbaImage::from_raw(rgba8.width() as u32, rgba8.height() as u32, raw)
        .ok_or_else(|| PipelineError::Export("pixel buffer does not match its dimensions".into()))?;
    let mut out = std::io::Cursor::new(Vec::new());
    buffer
        .write_to(&mut out, ::image::ImageFormat::Png)
        .map_err(|e| PipelineError::Export(e.to_string()))?;
    Ok(out.into_inner())
}

/// Keeps encoded PNGs in memory, in export order.
#[derive(Debug, Default)]
pub struct MemoryExporter {
    pub frames: Vec<(ExportTarget, Vec<u8>)>,
}

impl ExportSink for MemoryExporter {
    fn export(&mut self, target: ExportTarget, image: &Image<Rgba>) -> Result<()> {
        self.frames.push((target, encode_png(image)?));
        Ok(())
    }
}

/// Writes `<target>-<n>.png` files into a directory.
#[derive(Debug)]
pub struct PngExporter {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl PngExporter {
    /// Create the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(PngExporter {
            dir,
            written: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every file written so far.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl ExportSink for PngExporter {
    fn export(&mut self, target: ExportTarget, image: &Image<Rgba>) -> Result<()> {
        let bytes = encode_png(image)?;
        let path = self.dir.join(format!("{target}-{:03}.png", self.written.len()));
        std::fs::write(&path, &bytes)?;
        info!(path = %path.display(), bytes = bytes.len(), "exported");
        self.written.push(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::decode_rgba8;

    #[test]
    fn test_png_round_trip() {
        let img = Image::from_fn(5, 3, |x, y| [x as f32 / 4.0, y as f32 / 2.0, 0.5, 1.0]);
        let png = encode_png(&img).unwrap();
        assert_eq!(&png[1..4], b"PNG");
        let back = decode_rgba8(&png).unwrap();
        assert_eq!(back, img.convert::<Rgba8>());
    }

    #[test]
    fn test_out_of_range_values_clamp() {
        let img = Image::filled(1, 1, [-0.5, 2.0, 0.5, 1.0]);
        let back = decode_rgba8(&encode_png(&img).unwrap()).unwrap();
        assert_eq!(back.get(0, 0), [0, 255, 128, 255]);
    }

    #[test]
    fn test_png_exporter_names_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = PngExporter::new(dir.path().join("out")).unwrap();
        let img = Image::filled(2, 2, [0.0, 0.0, 0.0, 1.0]);
        sink.export(ExportTarget::Normal, &img).unwrap();
        sink.export(ExportTarget::Diffuse, &img).unwrap();
        let names: Vec<_> = sink
            .written()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["normal-000.png", "diffuse-001.png"]);
        assert!(sink.written().iter().all(|p| p.exists()));
    }
}
