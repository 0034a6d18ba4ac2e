//! # meter-scan
//!
//! Reads voltage, current and insulation resistance from photos of a
//! multimeter display taken while surveying solar strings, and keeps the
//! readings as a survey grouped by inverter and cable that can be exported
//! as text or CSV.

pub mod cable_labels;
pub mod config;
pub mod decimal_repair;
pub mod errors;
pub mod export;
pub mod instance_manager;
pub mod measurement_extraction;
pub mod observability;
pub mod observability_config;
pub mod ocr;
pub mod ocr_config;
pub mod ocr_errors;
pub mod path_validation;
pub mod pipeline;
pub mod preprocessing;
pub mod records;
pub mod store;
pub mod text_normalization;
pub mod validation;

// Re-export types for easier access
pub use measurement_extraction::{ExtractionResult, MeasurementExtractor};
pub use pipeline::{MeterScanner, ScanOutcome};
