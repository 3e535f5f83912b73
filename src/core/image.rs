use chrono::{DateTime, Utc};
use image::{DynamicImage, ImageReader};
use serde::Serialize;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

use crate::core::signature::Signature;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Image has no pixels")]
    Empty,

    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },
}

/// One candidate file as seen by the engine.
///
/// Size, timestamp and path come from the enumerator and are never changed
/// here. The signature is filled in at most once, by the first duplicate scan
/// that decodes the file.
#[derive(Debug, Clone, Serialize)]
pub struct ImageRecord {
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: String,
    #[serde(skip)]
    signature: OnceLock<Signature>,
}

impl ImageRecord {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: DateTime<Utc>) -> Self {
        let path = path.into();
        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("unknown")
            .to_uppercase();

        Self {
            path,
            size,
            modified,
            width: None,
            height: None,
            format,
            signature: OnceLock::new(),
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Build a record from filesystem metadata. Dimensions stay unknown.
    pub fn from_path(path: &Path) -> Result<Self, std::io::Error> {
        let metadata = std::fs::metadata(path)?;
        let modified: DateTime<Utc> = metadata.modified()?.into();
        Ok(Self::new(path, metadata.len(), modified))
    }

    /// The final path component, used for substring matching.
    pub fn display_name(&self) -> Cow<'_, str> {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_else(|| self.path.to_string_lossy())
    }

    /// Seconds between the last modification and `now`. Negative for files
    /// stamped in the future.
    pub fn age_seconds(&self, now: DateTime<Utc>) -> f64 {
        (now - self.modified).num_milliseconds() as f64 / 1000.0
    }

    pub fn pixel_count(&self) -> Option<u64> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(u64::from(w) * u64::from(h)),
            _ => None,
        }
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.get()
    }

    /// Remember `signature` unless one is already cached.
    pub(crate) fn cache_signature(&self, signature: Signature) {
        let _ = self.signature.set(signature);
    }
}

/// Source of decoded pixels for a record path.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<DynamicImage, DecodeError>;
}

impl<F> ImageDecoder for F
where
    F: Fn(&Path) -> Result<DynamicImage, DecodeError> + Send + Sync,
{
    fn decode(&self, path: &Path) -> Result<DynamicImage, DecodeError> {
        self(path)
    }
}

/// Decodes straight from disk with the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsDecoder;

impl ImageDecoder for FsDecoder {
    fn decode(&self, path: &Path) -> Result<DynamicImage, DecodeError> {
        let reader = ImageReader::open(path)?.with_guessed_format()?;
        if reader.format().is_none() {
            return Err(DecodeError::UnsupportedFormat {
                format: path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .unwrap_or("unknown")
                    .to_uppercase(),
            });
        }
        Ok(reader.decode()?)
    }
}
