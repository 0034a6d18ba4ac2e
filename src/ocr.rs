//! # OCR Adapter Module
//!
//! Defines the [`LineRecognizer`] seam between the scan pipeline and the
//! text-recognition engine, and the Tesseract implementation used in
//! production.
//!
//! A recognizer returns the text on the meter display as an ordered list of
//! trimmed, non-empty lines. It does not interpret the text in any way; that
//! is the job of [`crate::measurement_extraction`].

use async_trait::async_trait;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::errors::error_logging;
use crate::instance_manager::OcrInstanceManager;
use crate::observability;
use crate::ocr_config::OcrConfig;
use crate::ocr_errors::OcrError;

/// Bytes read from the file header for format detection
const FORMAT_PROBE_BYTES: usize = 32;

/// Text-recognition collaborator.
///
/// An empty line list and an error are treated the same way by the pipeline:
/// as a recognition failure.
#[async_trait]
pub trait LineRecognizer: Send + Sync {
    async fn recognize(&self, image_path: &Path) -> Result<Vec<String>, OcrError>;
}

/// Validate the photo before it is handed to the engine
pub fn validate_image_path(image_path: &Path, config: &OcrConfig) -> Result<(), OcrError> {
    if !image_path.exists() {
        return Err(OcrError::Validation(format!(
            "file does not exist ({})",
            image_path.display()
        )));
    }

    if !image_path.is_file() {
        return Err(OcrError::Validation(format!(
            "path is not a file ({})",
            image_path.display()
        )));
    }

    let file_size = image_path
        .metadata()
        .map_err(|e| {
            OcrError::Validation(format!(
                "cannot read file metadata ({}) - {}",
                image_path.display(),
                e
            ))
        })?
        .len();

    if file_size == 0 {
        return Err(OcrError::Validation(format!(
            "file is empty ({})",
            image_path.display()
        )));
    }

    if file_size > config.max_file_size {
        return Err(OcrError::Validation(format!(
            "file too large ({} bytes, maximum allowed: {} bytes)",
            file_size, config.max_file_size
        )));
    }

    if !is_supported_image_format(image_path) {
        return Err(OcrError::Validation(format!(
            "unsupported image format ({})",
            image_path.display()
        )));
    }

    Ok(())
}

/// Check the file header for a format Tesseract can read: PNG, JPEG, BMP or TIFF
pub fn is_supported_image_format(image_path: &Path) -> bool {
    let mut buffer = [0u8; FORMAT_PROBE_BYTES];
    let bytes_read = match File::open(image_path) {
        Ok(file) => match BufReader::new(file).read(&mut buffer) {
            Ok(n) => n,
            Err(e) => {
                debug!(image_path = %image_path.display(), error = %e, "Cannot read image header");
                return false;
            }
        },
        Err(e) => {
            debug!(image_path = %image_path.display(), error = %e, "Cannot open image file");
            return false;
        }
    };

    match image::guess_format(&buffer[..bytes_read]) {
        Ok(format) => {
            let supported = matches!(
                format,
                image::ImageFormat::Png
                    | image::ImageFormat::Jpeg
                    | image::ImageFormat::Bmp
                    | image::ImageFormat::Tiff
            );
            debug!(image_path = %image_path.display(), format = ?format, supported, "Detected image format");
            supported
        }
        Err(e) => {
            debug!(image_path = %image_path.display(), error = %e, "Could not determine image format");
            false
        }
    }
}

/// Split engine output into trimmed, non-empty lines
pub fn split_recognized_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// [`LineRecognizer`] backed by Tesseract through `leptess`.
///
/// Recognition runs on the blocking thread pool and is bounded by
/// [`OcrConfig::operation_timeout_secs`].
pub struct TesseractRecognizer {
    config: OcrConfig,
    instance_manager: Arc<OcrInstanceManager>,
}

impl TesseractRecognizer {
    pub fn new(config: OcrConfig, instance_manager: Arc<OcrInstanceManager>) -> Self {
        Self {
            config,
            instance_manager,
        }
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    fn run_engine(
        config: &OcrConfig,
        instance_manager: &OcrInstanceManager,
        image_path: &Path,
    ) -> Result<String, OcrError> {
        let instance = instance_manager
            .get_instance(config)
            .map_err(|e| OcrError::Initialization(e.to_string()))?;

        let image_str = image_path.to_str().ok_or_else(|| {
            OcrError::ImageLoad(format!(
                "image path is not valid UTF-8 ({})",
                image_path.display()
            ))
        })?;

        let mut tess = instance.lock();
        tess.set_image(image_str)
            .map_err(|e| OcrError::ImageLoad(format!("Failed to load image for OCR: {e}")))?;
        tess.get_utf8_text()
            .map_err(|e| OcrError::Extraction(format!("Failed to extract text from image: {e}")))
    }
}

#[async_trait]
impl LineRecognizer for TesseractRecognizer {
    async fn recognize(&self, image_path: &Path) -> Result<Vec<String>, OcrError> {
        let start = Instant::now();

        if let Err(e) = validate_image_path(image_path, &self.config) {
            error_logging::log_ocr_error(
                &e,
                "validate_image",
                image_path.to_str(),
                Some(start.elapsed()),
            );
            return Err(e);
        }

        info!(image_path = %image_path.display(), "Starting OCR text recognition");

        let timeout = Duration::from_secs(self.config.operation_timeout_secs);
        let config = self.config.clone();
        let instance_manager = Arc::clone(&self.instance_manager);
        let owned_path: PathBuf = image_path.to_path_buf();
        let task = tokio::task::spawn_blocking(move || {
            Self::run_engine(&config, &instance_manager, &owned_path)
        });

        let result = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(OcrError::Extraction(format!(
                "OCR worker stopped unexpectedly: {join_error}"
            ))),
            Err(_) => Err(OcrError::Timeout(format!(
                "OCR operation timed out after {} seconds",
                self.config.operation_timeout_secs
            ))),
        };

        let duration = start.elapsed();
        match result {
            Ok(text) => {
                let lines = split_recognized_lines(&text);
                observability::record_ocr_metrics(true, duration, lines.len());
                info!(
                    duration_ms = duration.as_millis(),
                    lines = lines.len(),
                    characters = text.len(),
                    "OCR recognition completed"
                );
                Ok(lines)
            }
            Err(e) => {
                observability::record_ocr_metrics(false, duration, 0);
                warn!(duration_ms = duration.as_millis(), error = %e, "OCR recognition failed");
                error_logging::log_ocr_error(&e, "recognize", image_path.to_str(), Some(duration));
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_split_recognized_lines() {
        let lines = split_recognized_lines("  230 V \n\n 5,2 A\r\n   \n0.45 MΩ\n");
        assert_eq!(lines, vec!["230 V", "5,2 A", "0.45 MΩ"]);
        assert!(split_recognized_lines("\n \n").is_empty());
    }

    #[test]
    fn test_validate_missing_file() {
        let err = validate_image_path(Path::new("/nonexistent/meter.jpg"), &OcrConfig::default())
            .unwrap_err();
        assert!(matches!(err, OcrError::Validation(msg) if msg.contains("does not exist")));
    }

    #[test]
    fn test_validate_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_image_path(dir.path(), &OcrConfig::default()).unwrap_err();
        assert!(matches!(err, OcrError::Validation(msg) if msg.contains("not a file")));
    }

    #[test]
    fn test_validate_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = validate_image_path(file.path(), &OcrConfig::default()).unwrap_err();
        assert!(matches!(err, OcrError::Validation(msg) if msg.contains("empty")));
    }

    #[test]
    fn test_validate_size_limit() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 64]).unwrap();
        let config = OcrConfig {
            max_file_size: 10,
            ..OcrConfig::default()
        };
        let err = validate_image_path(file.path(), &config).unwrap_err();
        assert!(matches!(err, OcrError::Validation(msg) if msg.contains("too large")));
    }

    #[test]
    fn test_unsupported_format_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"230 V 5.2 A, definitely not an image").unwrap();
        assert!(!is_supported_image_format(file.path()));
        assert!(validate_image_path(file.path(), &OcrConfig::default()).is_err());
    }

    #[test]
    fn test_png_is_supported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("display.png");
        image::RgbImage::new(4, 4).save(&path).unwrap();
        assert!(is_supported_image_format(&path));
        assert!(validate_image_path(&path, &OcrConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_tesseract_recognizer_rejects_missing_file_before_engine_start() {
        let recognizer = TesseractRecognizer::new(
            OcrConfig::default(),
            Arc::new(OcrInstanceManager::new()),
        );
        let result = recognizer.recognize(Path::new("/nonexistent/meter.jpg")).await;
        assert!(matches!(result, Err(OcrError::Validation(_))));
    }
}
