//! # OCR Instance Manager Module
//!
//! Keeps initialized Tesseract engines around so that consecutive scans do not
//! pay the engine start-up cost again. Engines are keyed by everything that is
//! baked into them at creation time: languages, tessdata directory, page
//! segmentation mode and character whitelist.

use leptess::LepTess;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::ocr_config::OcrConfig;

/// Shared, lockable Tesseract engine
pub type SharedEngine = Arc<Mutex<LepTess>>;

/// Thread-safe pool of Tesseract engines.
///
/// The first request for a configuration creates the engine; later requests
/// get a clone of the same `Arc`. Callers lock the engine for the duration of
/// one recognition, so scans using the same configuration are serialized.
pub struct OcrInstanceManager {
    instances: Mutex<HashMap<String, SharedEngine>>,
}

impl OcrInstanceManager {
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the engine for `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if Tesseract cannot be initialized (missing language
    /// data, invalid tessdata path) or rejects one of the variables.
    pub fn get_instance(&self, config: &OcrConfig) -> anyhow::Result<SharedEngine> {
        let key = Self::instance_key(config);

        if let Some(instance) = self.instances.lock().get(&key) {
            return Ok(Arc::clone(instance));
        }

        info!(
            languages = %config.languages,
            psm = config.psm_mode.as_str(),
            tessdata_path = ?config.tessdata_path,
            "Creating new OCR instance"
        );

        let mut tess = LepTess::new(config.tessdata_path.as_deref(), &config.languages)
            .map_err(|e| anyhow::anyhow!("Failed to initialize Tesseract OCR instance: {}", e))?;

        tess.set_variable(
            leptess::Variable::TesseditPagesegMode,
            config.psm_mode.as_str(),
        )
        .map_err(|e| anyhow::anyhow!("Failed to set PSM mode: {}", e))?;

        if let Some(whitelist) = &config.character_whitelist {
            tess.set_variable(leptess::Variable::TesseditCharWhitelist, whitelist)
                .map_err(|e| anyhow::anyhow!("Failed to set character whitelist: {}", e))?;
            info!(
                characters = whitelist.chars().count(),
                "Configured Tesseract with character whitelist"
            );
        }

        let instance = Arc::new(Mutex::new(tess));
        // A concurrent caller may have created one meanwhile; keep the first
        let stored = Arc::clone(
            self.instances
                .lock()
                .entry(key)
                .or_insert_with(|| Arc::clone(&instance)),
        );
        Ok(stored)
    }

    /// Drop the engine for `config`, if any
    pub fn remove_instance(&self, config: &OcrConfig) -> bool {
        let removed = self
            .instances
            .lock()
            .remove(&Self::instance_key(config))
            .is_some();
        if removed {
            info!(languages = %config.languages, "Removed OCR instance");
        }
        removed
    }

    pub fn instance_count(&self) -> usize {
        self.instances.lock().len()
    }

    fn instance_key(config: &OcrConfig) -> String {
        format!(
            "{}|{}|{}|{}",
            config.languages,
            config.tessdata_path.as_deref().unwrap_or("default"),
            config.psm_mode.as_str(),
            config.character_whitelist.as_deref().unwrap_or("")
        )
    }
}

impl Default for OcrInstanceManager {
    fn default() -> Self {
        Self::new()
    }
}
