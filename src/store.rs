//! # Survey Store Module
//!
//! Persists the survey (measurements plus settings) as a single JSON file and
//! keeps labeled copies of meter photos next to it.
//!
//! Saves write a temporary file in the target directory and rename it over
//! the old one, so an interrupted save never leaves a truncated survey.

use std::fs;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::errors::{error_logging, AppError, AppResult};
use crate::path_validation::{sanitize_filename, validate_filename};
use crate::records::SurveyData;

/// Extension given to every stored photo
pub const PHOTO_EXTENSION: &str = "jpg";

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// JSON file holding one [`SurveyData`]
#[derive(Debug, Clone)]
pub struct SurveyStore {
    path: PathBuf,
}

impl SurveyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the survey, or an empty one when nothing was saved yet
    pub fn load(&self) -> AppResult<SurveyData> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No survey file yet, starting empty");
                return Ok(SurveyData::default());
            }
            Err(e) => {
                error_logging::log_storage_error(&e, "load", self.path.to_str());
                return Err(AppError::Storage(format!(
                    "cannot open {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let survey: SurveyData = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            error_logging::log_storage_error(&e, "load", self.path.to_str());
            AppError::Storage(format!("corrupt survey file {}: {}", self.path.display(), e))
        })?;

        debug!(
            path = %self.path.display(),
            measurements = survey.measurements.len(),
            "Survey loaded"
        );
        Ok(survey)
    }

    /// Replace the stored survey with `survey`
    pub fn save(&self, survey: &SurveyData) -> AppResult<()> {
        let dir = parent_dir(&self.path);
        let result = fs::create_dir_all(dir)
            .and_then(|_| NamedTempFile::new_in(dir))
            .map_err(AppError::from)
            .and_then(|tmp| {
                let mut writer = BufWriter::new(tmp);
                serde_json::to_writer_pretty(&mut writer, survey)?;
                writer.flush()?;
                let tmp = writer
                    .into_inner()
                    .map_err(|e| AppError::Storage(e.to_string()))?;
                tmp.persist(&self.path)
                    .map_err(|e| AppError::Storage(e.error.to_string()))?;
                Ok(())
            });

        match &result {
            Ok(()) => info!(
                path = %self.path.display(),
                measurements = survey.measurements.len(),
                "Survey saved"
            ),
            Err(e) => error_logging::log_storage_error(e, "save", self.path.to_str()),
        }
        result
    }

    /// Load, apply `change`, save; returns what `change` returned
    pub fn update<T>(&self, change: impl FnOnce(&mut SurveyData) -> T) -> AppResult<T> {
        let mut survey = self.load()?;
        let value = change(&mut survey);
        self.save(&survey)?;
        Ok(value)
    }

    /// Drop all measurements, keeping the settings
    pub fn clear(&self) -> AppResult<usize> {
        self.update(|survey| {
            let removed = survey.measurements.len();
            survey.measurements.clear();
            removed
        })
    }
}

/// Directory of photos named after the cable they show
#[derive(Debug, Clone)]
pub struct PhotoStore {
    dir: PathBuf,
}

impl PhotoStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<inverter>-<cable>`, the label a photo is stored under
    pub fn photo_label(inverter: &str, cable_label: &str) -> String {
        format!("{}-{}", inverter.trim(), cable_label.trim())
    }

    /// Copy `source` into the store as `<label>.jpg`, replacing an older photo
    /// of the same label.
    ///
    /// # Returns
    ///
    /// The path of the stored copy
    pub fn save_labeled_photo(&self, source: &Path, label: &str) -> AppResult<PathBuf> {
        let filename = sanitize_filename(&format!("{}.{}", label, PHOTO_EXTENSION));
        validate_filename(&filename)?;
        let target = self.dir.join(&filename);

        let copied = fs::create_dir_all(&self.dir).and_then(|_| fs::copy(source, &target));
        match copied {
            Ok(bytes) => {
                info!(
                    source = %source.display(),
                    target = %target.display(),
                    bytes,
                    "Stored labeled photo"
                );
                Ok(target)
            }
            Err(e) => {
                error_logging::log_filesystem_error(&e, "save_labeled_photo", source.to_str(), None);
                Err(AppError::FileSystem(format!(
                    "cannot store photo {} as {}: {}",
                    source.display(),
                    target.display(),
                    e
                )))
            }
        }
    }
}
