//! # Unified Application Configuration
//!
//! Collects every configuration section into one [`AppConfig`], loaded from
//! environment variables (a `.env` file is honoured by the binary) and
//! validated before anything runs.

use crate::decimal_repair::{FieldRange, MeasurementField, RepairRanges};
use crate::errors::{AppError, AppResult};
use crate::observability_config::ObservabilityConfig;
use crate::ocr_config::OcrConfig;
use crate::preprocessing::PreprocessingConfig;
use std::env;
use std::path::PathBuf;
use tracing::warn;

/// Default location of the survey file
pub const DEFAULT_DATA_FILE: &str = "meter-survey.json";
/// Default directory for labeled photos
pub const DEFAULT_PHOTO_DIR: &str = "photos";

/// Where the survey and its photos live
#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    /// JSON file holding measurements and settings
    pub data_file: PathBuf,
    /// Directory receiving `<inverter>-<cable>.jpg` photos
    pub photo_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
            photo_dir: PathBuf::from(DEFAULT_PHOTO_DIR),
        }
    }
}

impl StorageConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = env::var("SURVEY_DATA_FILE") {
            config.data_file = PathBuf::from(path);
        }
        if let Ok(dir) = env::var("SURVEY_PHOTO_DIR") {
            config.photo_dir = PathBuf::from(dir);
        }
        config
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.data_file.as_os_str().is_empty() {
            return Err(AppError::Config("data_file cannot be empty".to_string()));
        }
        if self.data_file.is_dir() {
            return Err(AppError::Config(format!(
                "data_file {} is a directory",
                self.data_file.display()
            )));
        }
        if self.photo_dir.as_os_str().is_empty() {
            return Err(AppError::Config("photo_dir cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Parse `"<min>-<max>"` into a range for `field`
fn parse_range(field: MeasurementField, value: &str) -> AppResult<FieldRange> {
    let invalid = || {
        AppError::Config(format!(
            "{} repair range '{}' must look like <min>-<max>",
            field, value
        ))
    };
    let (min, max) = value.trim().split_once('-').ok_or_else(invalid)?;
    let min: f64 = min.trim().parse().map_err(|_| invalid())?;
    let max: f64 = max.trim().parse().map_err(|_| invalid())?;
    Ok(FieldRange::new(field, min, max))
}

/// Repair ranges from `REPAIR_VOLTAGE_RANGE`, `REPAIR_CURRENT_RANGE` and
/// `REPAIR_RESISTANCE_RANGE`.
///
/// Diagnostics only: these override the fixed plausibility bounds for
/// trying out recognition against unusual test displays. They are not survey
/// settings and have nothing to do with the critical values that raise
/// alerts, which live in the survey file.
fn repair_ranges_from_env() -> AppResult<RepairRanges> {
    let mut ranges = RepairRanges::default();
    let sources = [
        (MeasurementField::Voltage, "REPAIR_VOLTAGE_RANGE"),
        (MeasurementField::Current, "REPAIR_CURRENT_RANGE"),
        (MeasurementField::Resistance, "REPAIR_RESISTANCE_RANGE"),
    ];
    for (field, key) in sources {
        if let Ok(value) = env::var(key) {
            let range = parse_range(field, &value)?;
            warn!(
                field = %field,
                min = range.min,
                max = range.max,
                "Decimal repair range overridden for diagnostics"
            );
            match field {
                MeasurementField::Voltage => ranges.voltage = range,
                MeasurementField::Current => ranges.current = range,
                MeasurementField::Resistance => ranges.resistance = range,
            }
        }
    }
    Ok(ranges)
}

/// Unified application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// OCR engine configuration
    pub ocr: OcrConfig,
    /// Photo preprocessing configuration
    pub preprocessing: PreprocessingConfig,
    /// Fixed plausibility bounds used by decimal repair (diagnostic override only)
    pub repair_ranges: RepairRanges,
    /// Survey and photo locations
    pub storage: StorageConfig,
    /// Logging configuration
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            ocr: OcrConfig::from_env()?,
            preprocessing: PreprocessingConfig::from_env()?,
            repair_ranges: repair_ranges_from_env()?,
            storage: StorageConfig::from_env(),
            observability: ObservabilityConfig::from_env()?,
        })
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> AppResult<()> {
        self.ocr.validate()?;
        self.preprocessing.validate()?;
        self.repair_ranges.validate()?;
        self.storage.validate()?;
        self.observability.validate()?;
        Ok(())
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        let repair_ranges = if self.repair_ranges == RepairRanges::default() {
            "fixed"
        } else {
            "diagnostic-override"
        };
        format!(
            "Configuration: ocr_languages={}, psm={}, preprocessing={}, repair_ranges={}, data_file={}, photo_dir={}, environment={}",
            self.ocr.languages,
            self.ocr.psm_mode.as_str(),
            self.preprocessing.enabled,
            repair_ranges,
            self.storage.data_file.display(),
            self.storage.photo_dir.display(),
            self.observability.environment
        )
    }
}
