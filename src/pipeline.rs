//! # Scan Pipeline Module
//!
//! One "scan meter" action: preprocess the photo, recognize its text lines and
//! extract the measurement fields. The pipeline never returns an error; a
//! recognizer failure becomes [`ScanOutcome::RecognitionFailed`] with all
//! fields empty, and a preprocessing failure silently falls back to the
//! original photo.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn, Instrument, Span};

use crate::decimal_repair::MeasurementField;
use crate::measurement_extraction::{ExtractionReport, ExtractionResult, MeasurementExtractor};
use crate::observability;
use crate::ocr::LineRecognizer;
use crate::ocr_errors::OcrError;
use crate::preprocessing::{ImagePreprocessor, PreparedImage};

/// Message shown to the user when nothing could be read from the photo
pub const RECOGNITION_FAILED_MESSAGE: &str = "Unable to recognize values from image.";

/// Result of one scan
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    /// Text was recognized; the report may still hold empty fields
    Recognized(ExtractionReport),
    /// The recognizer failed or returned no lines
    RecognitionFailed(OcrError),
}

impl ScanOutcome {
    /// The extracted fields, all empty on recognition failure
    pub fn result(&self) -> ExtractionResult {
        match self {
            ScanOutcome::Recognized(report) => report.result.clone(),
            ScanOutcome::RecognitionFailed(_) => ExtractionResult::default(),
        }
    }

    pub fn is_recognized(&self) -> bool {
        matches!(self, ScanOutcome::Recognized(_))
    }

    pub fn report(&self) -> Option<&ExtractionReport> {
        match self {
            ScanOutcome::Recognized(report) => Some(report),
            ScanOutcome::RecognitionFailed(_) => None,
        }
    }

    /// Short text for the person holding the meter
    pub fn user_message(&self) -> String {
        match self {
            ScanOutcome::RecognitionFailed(_) => RECOGNITION_FAILED_MESSAGE.to_string(),
            ScanOutcome::Recognized(report) => {
                let parts: Vec<String> = MeasurementField::ALL
                    .iter()
                    .map(|field| {
                        let value = report.result.get(*field);
                        if value.is_empty() {
                            format!("{}: not found", field)
                        } else {
                            format!("{}: {} {}", field, value, field.unit())
                        }
                    })
                    .collect();
                parts.join(", ")
            }
        }
    }
}

/// Preprocessor, recognizer and extractor wired together
pub struct MeterScanner {
    preprocessor: Arc<ImagePreprocessor>,
    recognizer: Arc<dyn LineRecognizer>,
    extractor: MeasurementExtractor,
}

impl MeterScanner {
    pub fn new(
        preprocessor: ImagePreprocessor,
        recognizer: Arc<dyn LineRecognizer>,
        extractor: MeasurementExtractor,
    ) -> Self {
        Self {
            preprocessor: Arc::new(preprocessor),
            recognizer,
            extractor,
        }
    }

    pub fn extractor(&self) -> &MeasurementExtractor {
        &self.extractor
    }

    /// Scan one meter photo.
    ///
    /// # Arguments
    ///
    /// * `image_path` - The photo of the meter display
    ///
    /// # Returns
    ///
    /// A [`ScanOutcome`]; this function does not fail.
    pub async fn scan(&self, image_path: &Path) -> ScanOutcome {
        let span = observability::scan_span(image_path);
        async {
            let start = Instant::now();
            let prepared = self.prepare(image_path).await;

            let outcome = match self.recognizer.recognize(prepared.path()).await {
                Ok(lines) => self.extract_lines(&lines),
                Err(e) => ScanOutcome::RecognitionFailed(e),
            };

            // Intermediate images are only needed until recognition is done
            drop(prepared);
            self.finish(outcome, start)
        }
        .instrument(span)
        .await
    }

    /// Image decoding and encoding run on the blocking pool
    async fn prepare(&self, image_path: &Path) -> PreparedImage {
        let preprocessor = Arc::clone(&self.preprocessor);
        let owned_path = image_path.to_path_buf();
        let span = Span::current();
        let task =
            tokio::task::spawn_blocking(move || span.in_scope(|| preprocessor.prepare(&owned_path)));

        match task.await {
            Ok(prepared) => prepared,
            Err(join_error) => {
                warn!(
                    error = %join_error,
                    image_path = %image_path.display(),
                    "Preprocessing worker stopped unexpectedly, using original image"
                );
                PreparedImage::original(image_path)
            }
        }
    }

    /// Run extraction on lines that were already recognized
    pub fn extract_lines<S: AsRef<str>>(&self, lines: &[S]) -> ScanOutcome {
        match self.extractor.extract(lines) {
            Ok(report) => ScanOutcome::Recognized(report),
            Err(e) => ScanOutcome::RecognitionFailed(e),
        }
    }

    fn finish(&self, outcome: ScanOutcome, start: Instant) -> ScanOutcome {
        let duration = start.elapsed();
        match &outcome {
            ScanOutcome::Recognized(report) => {
                for candidate in &report.candidates {
                    observability::record_extraction_strategy(candidate.field, candidate.strategy);
                }
                observability::record_scan_metrics(true, report.result.found_count(), duration);
                info!(
                    duration_ms = duration.as_millis(),
                    voltage = %report.result.voltage,
                    current = %report.result.current,
                    resistance = %report.result.resistance,
                    "Meter scan completed"
                );
            }
            ScanOutcome::RecognitionFailed(e) => {
                observability::record_scan_metrics(false, 0, duration);
                warn!(duration_ms = duration.as_millis(), error = %e, "Meter scan failed: no text recognized");
            }
        }
        outcome
    }
}
