//! # Scan Pipeline Tests
//!
//! Drives `MeterScanner` end to end with scripted recognizers: real
//! preprocessing on generated photos, recognizer failures and the output
//! contract of a scan.

use async_trait::async_trait;
use meter_scan::measurement_extraction::{ExtractionStrategy, MeasurementExtractor};
use meter_scan::ocr::LineRecognizer;
use meter_scan::ocr_errors::OcrError;
use meter_scan::pipeline::{MeterScanner, ScanOutcome, RECOGNITION_FAILED_MESSAGE};
use meter_scan::preprocessing::{ImagePreprocessor, PreprocessingConfig};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Returns canned lines and remembers which file it was asked to read
struct ScriptedRecognizer {
    response: Result<Vec<String>, OcrError>,
    seen: Mutex<Vec<(PathBuf, bool)>>,
}

impl ScriptedRecognizer {
    fn lines(lines: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            response: Ok(lines.iter().map(|s| s.to_string()).collect()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn failing(error: OcrError) -> Arc<Self> {
        Arc::new(Self {
            response: Err(error),
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LineRecognizer for ScriptedRecognizer {
    async fn recognize(&self, image_path: &Path) -> Result<Vec<String>, OcrError> {
        self.seen
            .lock()
            .push((image_path.to_path_buf(), image_path.exists()));
        self.response.clone()
    }
}

fn disabled_preprocessing() -> ImagePreprocessor {
    ImagePreprocessor::new(PreprocessingConfig {
        enabled: false,
        ..PreprocessingConfig::default()
    })
}

fn scanner(preprocessor: ImagePreprocessor, recognizer: Arc<ScriptedRecognizer>) -> MeterScanner {
    MeterScanner::new(preprocessor, recognizer, MeasurementExtractor::default())
}

fn write_photo(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let photo = image::RgbImage::from_fn(320, 240, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    photo.save(&path).unwrap();
    path
}

#[tokio::test]
async fn test_preprocessed_image_is_recognized_then_removed() {
    let dir = tempfile::tempdir().unwrap();
    let photo = write_photo(dir.path(), "meter.png");
    let work_dir = dir.path().join("scratch");
    std::fs::create_dir_all(&work_dir).unwrap();

    let recognizer = ScriptedRecognizer::lines(&["230 V", "5,2 A", "0.45 MΩ"]);
    let preprocessor = ImagePreprocessor::new(PreprocessingConfig {
        work_dir: Some(work_dir.clone()),
        ..PreprocessingConfig::default()
    });
    let outcome = scanner(preprocessor, Arc::clone(&recognizer))
        .scan(&photo)
        .await;

    assert!(outcome.is_recognized());
    let seen = recognizer.seen.lock().clone();
    assert_eq!(seen.len(), 1);
    let (recognized_path, existed) = &seen[0];
    assert_ne!(recognized_path, &photo);
    assert!(recognized_path.starts_with(&work_dir));
    assert!(*existed);

    // Scratch directory is gone once the scan finished
    assert!(!recognized_path.exists());
    assert_eq!(std::fs::read_dir(&work_dir).unwrap().count(), 0);
    assert!(photo.exists());
}

#[tokio::test]
async fn test_unreadable_photo_falls_back_to_original() {
    let dir = tempfile::tempdir().unwrap();
    let photo = dir.path().join("broken.jpg");
    std::fs::write(&photo, b"not an image at all").unwrap();

    let recognizer = ScriptedRecognizer::lines(&["789", "5.2", "65"]);
    let preprocessor = ImagePreprocessor::new(PreprocessingConfig {
        work_dir: Some(dir.path().to_path_buf()),
        ..PreprocessingConfig::default()
    });
    let outcome = scanner(preprocessor, Arc::clone(&recognizer))
        .scan(&photo)
        .await;

    assert_eq!(recognizer.seen.lock()[0].0, photo);
    let result = outcome.result();
    assert_eq!(result.voltage, "789");
    assert_eq!(result.current, "5.2");
    assert_eq!(result.resistance, "65");
}

#[tokio::test]
async fn test_recognizer_error_yields_empty_failure() {
    let recognizer = ScriptedRecognizer::failing(OcrError::Timeout(
        "OCR operation timed out after 30 seconds".to_string(),
    ));
    let outcome = scanner(disabled_preprocessing(), recognizer)
        .scan(Path::new("missing.jpg"))
        .await;

    assert!(matches!(
        outcome,
        ScanOutcome::RecognitionFailed(OcrError::Timeout(_))
    ));
    assert!(outcome.result().is_empty());
    assert!(outcome.report().is_none());
    assert_eq!(outcome.user_message(), RECOGNITION_FAILED_MESSAGE);
}

#[tokio::test]
async fn test_empty_recognizer_output_is_failure() {
    let outcome = scanner(disabled_preprocessing(), ScriptedRecognizer::lines(&[]))
        .scan(Path::new("meter.jpg"))
        .await;
    assert!(matches!(
        outcome,
        ScanOutcome::RecognitionFailed(OcrError::NoText(_))
    ));
}

#[tokio::test]
async fn test_partial_result_is_still_recognized() {
    let outcome = scanner(disabled_preprocessing(), ScriptedRecognizer::lines(&["M0 45"]))
        .scan(Path::new("meter.jpg"))
        .await;

    assert!(outcome.is_recognized());
    let report = outcome.report().unwrap();
    assert_eq!(report.normalized_lines, vec!["MΩ 45"]);
    assert_eq!(report.result.resistance, "45");
    assert_eq!(report.result.found_count(), 1);
    assert_eq!(
        report.candidates[0].strategy,
        ExtractionStrategy::UnitAnchored
    );
    assert_eq!(
        outcome.user_message(),
        "voltage: not found, current: not found, resistance: 45 MΩ"
    );
}

#[tokio::test]
async fn test_scans_are_independent() {
    let recognizer = ScriptedRecognizer::lines(&["12 8 V"]);
    let scanner = scanner(disabled_preprocessing(), recognizer);

    let first = scanner.scan(Path::new("a.jpg")).await.result();
    let second = scanner.scan(Path::new("b.jpg")).await.result();
    assert_eq!(first, second);
    assert_eq!(first.voltage, "12.8");
}
