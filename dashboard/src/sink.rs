use emocam_common::frame::CapturedFrame;
use image::RgbaImage;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Writes rendered frames beneath the output directory.
///
/// `latest.png` always holds the newest frame, overwritten in place;
/// that file is what an external viewer watches. With history enabled
/// every frame is additionally kept under a dated subdirectory, named by
/// capture timestamp and sequence so listings sort chronologically.
pub struct FrameSink {
    dir: PathBuf,
    history: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to create output directory {0}: {1}")]
    CreateDir(String, std::io::Error),
    #[error("failed to encode frame as PNG: {0}")]
    Encode(String),
    #[error("failed to write {0}: {1}")]
    Write(String, std::io::Error),
}

impl FrameSink {
    pub fn new(dir: impl Into<PathBuf>, history: bool) -> Self {
        Self {
            dir: dir.into(),
            history,
        }
    }

    pub fn latest_path(&self) -> PathBuf {
        self.dir.join("latest.png")
    }

    /// Write the rendered image for `frame`. Returns the path of the
    /// latest-frame file.
    pub fn write(&self, frame: &CapturedFrame, img: &RgbaImage) -> Result<PathBuf, SinkError> {
        let png = encode_png(img)?;

        create_dir(&self.dir)?;
        let latest = self.latest_path();
        std::fs::write(&latest, &png)
            .map_err(|e| SinkError::Write(latest.display().to_string(), e))?;
        debug!(path = %latest.display(), bytes = png.len(), seq = frame.seq, "wrote latest frame");

        if self.history {
            let day_dir = self.dir.join(frame.date_dir());
            create_dir(&day_dir)?;
            let archived = day_dir.join(format!("{}.png", frame.file_stem()));
            std::fs::write(&archived, &png)
                .map_err(|e| SinkError::Write(archived.display().to_string(), e))?;
            debug!(path = %archived.display(), "archived frame");
        }

        Ok(latest)
    }
}

fn create_dir(dir: &Path) -> Result<(), SinkError> {
    std::fs::create_dir_all(dir).map_err(|e| SinkError::CreateDir(dir.display().to_string(), e))
}

fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, SinkError> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| SinkError::Encode(e.to_string()))?;
    Ok(buf.into_inner())
}
