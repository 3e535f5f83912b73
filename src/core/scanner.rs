use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

use crate::config::EngineConfig;
use crate::core::image::ImageRecord;
use crate::core::progress::CancelToken;

const SUPPORTED_FORMATS: [&str; 8] = ["jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "webp"];

#[derive(Debug, Error)]
pub enum EnumerateError {
    #[error("Invalid path: {path}")]
    InvalidPath { path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Lists the image files of a directory as [`ImageRecord`]s.
pub struct DirectoryEnumerator {
    cancellation_token: CancelToken,
    supported_formats: HashSet<String>,
    recursive: bool,
    show_hidden: bool,
    probe_dimensions: bool,
}

impl DirectoryEnumerator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            cancellation_token: CancelToken::new(),
            supported_formats: SUPPORTED_FORMATS.iter().map(|ext| ext.to_string()).collect(),
            recursive: config.include_subdirectories,
            show_hidden: config.show_hidden,
            probe_dimensions: config.probe_dimensions,
        }
    }

    pub fn get_cancellation_token(&self) -> CancelToken {
        self.cancellation_token.clone()
    }

    pub fn is_supported_format(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.supported_formats.contains(&ext))
    }

    /// Records for every supported file under `dir`, sorted by path.
    pub fn enumerate(&self, dir: &Path) -> Result<Vec<ImageRecord>, EnumerateError> {
        if !dir.is_dir() {
            return Err(EnumerateError::InvalidPath {
                path: format!("{} is not a directory", dir.display()),
            });
        }

        let files = self.discover_files(dir)?;
        log::debug!("Discovered {} image files in {}", files.len(), dir.display());

        let mut records: Vec<ImageRecord> = files
            .into_par_iter()
            .map(|path| {
                if self.cancellation_token.is_cancelled() {
                    return Err(EnumerateError::Cancelled);
                }
                self.process_single_file(&path)
            })
            .collect::<Result<Vec<_>, _>>()?;

        records.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(records)
    }

    fn discover_files(&self, dir: &Path) -> Result<Vec<PathBuf>, EnumerateError> {
        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut discovered = Vec::new();

        let walker = WalkDir::new(dir)
            .follow_links(false)
            .max_depth(max_depth)
            .into_iter()
            .filter_entry(|entry| self.show_hidden || entry.depth() == 0 || !is_hidden(entry));

        for entry in walker {
            if self.cancellation_token.is_cancelled() {
                return Err(EnumerateError::Cancelled);
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("Skipping unreadable entry: {}", err);
                    continue;
                }
            };

            if entry.file_type().is_file() && self.is_supported_format(entry.path()) {
                discovered.push(entry.into_path());
            }
        }

        Ok(discovered)
    }

    fn process_single_file(&self, path: &Path) -> Result<ImageRecord, EnumerateError> {
        let record = ImageRecord::from_path(path)?;
        if !self.probe_dimensions {
            return Ok(record);
        }

        // Header read only; full decoding is left to the duplicate scan
        match image::image_dimensions(path) {
            Ok((width, height)) => Ok(record.with_dimensions(width, height)),
            Err(e) => {
                log::warn!("Could not read dimensions for {}: {}", path.display(), e);
                Ok(record)
            }
        }
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_image(
        path: &Path,
        width: u32,
        height: u32,
    ) -> Result<(), Box<dyn std::error::Error>> {
        use image::{ImageBuffer, Rgb};

        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let intensity = ((x + y) % 256) as u8;
            Rgb([intensity, intensity, intensity])
        });

        img.save(path)?;
        Ok(())
    }

    fn config(recursive: bool, hidden: bool) -> EngineConfig {
        EngineConfig {
            include_subdirectories: recursive,
            show_hidden: hidden,
            ..EngineConfig::default()
        }
    }

    fn names(records: &[ImageRecord]) -> Vec<String> {
        records.iter().map(|r| r.display_name().into_owned()).collect()
    }

    #[test]
    fn test_supported_format_detection() {
        let enumerator = DirectoryEnumerator::new(&EngineConfig::default());

        assert!(enumerator.is_supported_format(Path::new("test.jpg")));
        assert!(enumerator.is_supported_format(Path::new("test.JPEG")));
        assert!(enumerator.is_supported_format(Path::new("test.webp")));
        assert!(!enumerator.is_supported_format(Path::new("test.txt")));
        assert!(!enumerator.is_supported_format(Path::new("test")));
    }

    #[test]
    fn test_enumerate_sorted_with_dimensions() {
        let temp_dir = TempDir::new().unwrap();
        create_test_image(&temp_dir.path().join("b.png"), 40, 30).unwrap();
        create_test_image(&temp_dir.path().join("a.png"), 10, 20).unwrap();
        fs::write(temp_dir.path().join("notes.txt"), b"skip me").unwrap();

        let records = DirectoryEnumerator::new(&EngineConfig::default())
            .enumerate(temp_dir.path())
            .unwrap();

        assert_eq!(names(&records), vec!["a.png", "b.png"]);
        assert_eq!((records[0].width, records[0].height), (Some(10), Some(20)));
        assert_eq!(records[1].pixel_count(), Some(1200));
        assert!(records.iter().all(|r| r.size > 0));
    }

    #[test]
    fn test_unreadable_header_keeps_record() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("broken.jpg"), b"not an image").unwrap();

        let records = DirectoryEnumerator::new(&EngineConfig::default())
            .enumerate(temp_dir.path())
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].width, None);
    }

    #[test]
    fn test_recursion_and_hidden_entries() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested");
        let hidden_dir = temp_dir.path().join(".cache");
        fs::create_dir(&nested).unwrap();
        fs::create_dir(&hidden_dir).unwrap();
        create_test_image(&temp_dir.path().join("top.png"), 8, 8).unwrap();
        create_test_image(&temp_dir.path().join(".secret.png"), 8, 8).unwrap();
        create_test_image(&nested.join("deep.png"), 8, 8).unwrap();
        create_test_image(&hidden_dir.join("thumb.png"), 8, 8).unwrap();

        let flat = DirectoryEnumerator::new(&config(false, false))
            .enumerate(temp_dir.path())
            .unwrap();
        assert_eq!(names(&flat), vec!["top.png"]);

        let recursive = DirectoryEnumerator::new(&config(true, false))
            .enumerate(temp_dir.path())
            .unwrap();
        assert_eq!(names(&recursive), vec!["deep.png", "top.png"]);

        let everything = DirectoryEnumerator::new(&config(true, true))
            .enumerate(temp_dir.path())
            .unwrap();
        assert_eq!(everything.len(), 4);
    }

    #[test]
    fn test_invalid_path() {
        let temp_dir = TempDir::new().unwrap();
        let enumerator = DirectoryEnumerator::new(&EngineConfig::default());

        let result = enumerator.enumerate(&temp_dir.path().join("missing"));
        assert!(matches!(result, Err(EnumerateError::InvalidPath { .. })));
    }

    #[test]
    fn test_cancellation() {
        let temp_dir = TempDir::new().unwrap();
        for i in 0..5 {
            create_test_image(&temp_dir.path().join(format!("test_{}.png", i)), 16, 16).unwrap();
        }

        let enumerator = DirectoryEnumerator::new(&EngineConfig::default());
        enumerator.get_cancellation_token().cancel();

        let result = enumerator.enumerate(temp_dir.path());
        assert!(matches!(result, Err(EnumerateError::Cancelled)));
    }
}
