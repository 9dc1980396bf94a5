//! Image preparation
//!
//! Re-encodes the user's image as an RGB JPEG at a fixed quality so uploads
//! stay small and every platform can ingest them. The original file is left
//! untouched; platforms that accept raw uploads keep using it.

use image::codecs::jpeg::JpegEncoder;
use image::ImageReader;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ImageConfig;
use crate::error::ImageError;

/// Which file a platform uploads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageVariant {
    /// The file the user picked, byte for byte
    Original,
    /// The shared re-encoded JPEG
    Compressed,
}

/// The user's image plus its re-encoded scratch copy
///
/// The scratch copy is owned by this value. [`PreparedImage::cleanup`] removes
/// it and reports errors; dropping the value without calling it still removes
/// the copy, logging any failure.
#[derive(Debug)]
pub struct PreparedImage {
    original: PathBuf,
    compressed: PathBuf,
    cleaned_up: bool,
}

impl PreparedImage {
    pub fn original(&self) -> &Path {
        &self.original
    }

    pub fn compressed(&self) -> &Path {
        &self.compressed
    }

    pub fn path_for(&self, variant: ImageVariant) -> &Path {
        match variant {
            ImageVariant::Original => &self.original,
            ImageVariant::Compressed => &self.compressed,
        }
    }

    /// Delete the scratch copy
    pub fn cleanup(mut self) -> std::io::Result<()> {
        self.cleaned_up = true;
        remove_scratch_copy(&self.compressed)
    }
}

impl Drop for PreparedImage {
    fn drop(&mut self) {
        if self.cleaned_up {
            return;
        }
        if let Err(e) = remove_scratch_copy(&self.compressed) {
            warn!(
                "Failed to remove prepared image {}: {}",
                self.compressed.display(),
                e
            );
        }
    }
}

fn remove_scratch_copy(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed prepared image {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[derive(Debug, Clone)]
pub struct ImagePreparer {
    quality: u8,
    scratch_dir: PathBuf,
}

impl ImagePreparer {
    pub fn new(quality: u8, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn from_config(config: &ImageConfig) -> Self {
        Self::new(config.quality, config.scratch_dir())
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Decode `source`, convert to RGB and write a JPEG into the scratch dir
    pub fn prepare(&self, source: &Path) -> Result<PreparedImage, ImageError> {
        let decoded = ImageReader::open(source)?
            .with_guessed_format()?
            .decode()
            .map_err(|e| ImageError::Decode {
                path: source.display().to_string(),
                reason: e.to_string(),
            })?;

        let rgb = decoded.to_rgb8();

        std::fs::create_dir_all(&self.scratch_dir)?;
        let target = self
            .scratch_dir
            .join(format!("autopost-{}.jpg", Uuid::new_v4()));

        let encode_err = |reason: String| ImageError::Encode {
            path: target.display().to_string(),
            reason,
        };

        let mut writer = BufWriter::new(File::create(&target)?);
        let encoder = JpegEncoder::new_with_quality(&mut writer, self.quality);
        if let Err(e) = rgb.write_with_encoder(encoder) {
            let _ = std::fs::remove_file(&target);
            return Err(encode_err(e.to_string()));
        }
        writer.flush()?;

        debug!(
            "Prepared {} -> {} ({}x{}, quality {})",
            source.display(),
            target.display(),
            rgb.width(),
            rgb.height(),
            self.quality
        );

        Ok(PreparedImage {
            original: source.to_path_buf(),
            compressed: target,
            cleaned_up: false,
        })
    }

    /// [`prepare`](Self::prepare) on the blocking thread pool
    pub async fn prepare_async(&self, source: &Path) -> Result<PreparedImage, ImageError> {
        let preparer = self.clone();
        let source = source.to_path_buf();
        tokio::task::spawn_blocking(move || preparer.prepare(&source))
            .await
            .map_err(|e| ImageError::Io(std::io::Error::other(e.to_string())))?
    }
}
