//! # OCR Configuration Module
//!
//! This module defines configuration structures for meter display OCR,
//! including Tesseract settings, file limits and the recognizer timeout.

use std::env;

// Constants for OCR configuration
pub const DEFAULT_LANGUAGES: &str = "eng";
pub const MAX_FILE_SIZE: u64 = 20 * 1024 * 1024; // 20MB limit for meter photos
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;

/// Characters a meter display can show, including the letters OCR confuses with digits
pub const DEFAULT_CHARACTER_WHITELIST: &str = "0123456789.,VAMΩOobBdD ";

/// Page Segmentation Mode for Tesseract OCR
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PageSegMode {
    /// Fully automatic page segmentation
    Auto = 3,
    /// Assume a single uniform block of text
    SingleBlock = 6,
    /// Treat the image as a single text line
    SingleLine = 7,
    /// Find as much text as possible in no particular order
    #[default]
    SparseText = 11,
}

impl PageSegMode {
    /// Convert PSM mode to string value for Tesseract
    pub fn as_str(&self) -> &'static str {
        match self {
            PageSegMode::Auto => "3",
            PageSegMode::SingleBlock => "6",
            PageSegMode::SingleLine => "7",
            PageSegMode::SparseText => "11",
        }
    }

    /// Parse a numeric PSM value as accepted by the `tesseract` CLI
    pub fn from_number(value: &str) -> Option<Self> {
        match value.trim() {
            "3" => Some(PageSegMode::Auto),
            "6" => Some(PageSegMode::SingleBlock),
            "7" => Some(PageSegMode::SingleLine),
            "11" => Some(PageSegMode::SparseText),
            _ => None,
        }
    }
}

/// Configuration structure for OCR processing
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// OCR language codes (e.g., "eng", "eng+deu")
    pub languages: String,
    /// Optional tessdata directory (None uses the Tesseract default)
    pub tessdata_path: Option<String>,
    /// Maximum allowed file size in bytes
    pub max_file_size: u64,
    /// Timeout for a single recognition call in seconds
    pub operation_timeout_secs: u64,
    /// Page segmentation mode for OCR
    pub psm_mode: PageSegMode,
    /// Character whitelist to restrict OCR output to meter-display characters
    pub character_whitelist: Option<String>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: DEFAULT_LANGUAGES.to_string(),
            tessdata_path: None,
            max_file_size: MAX_FILE_SIZE,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
            psm_mode: PageSegMode::default(),
            character_whitelist: Some(DEFAULT_CHARACTER_WHITELIST.to_string()),
        }
    }
}

impl OcrConfig {
    /// Load OCR configuration from environment variables, falling back to defaults
    pub fn from_env() -> crate::errors::AppResult<Self> {
        let mut config = Self::default();

        if let Ok(languages) = env::var("OCR_LANGUAGES") {
            config.languages = languages;
        }
        config.tessdata_path = env::var("OCR_TESSDATA_PATH").ok();
        if let Ok(timeout) = env::var("OCR_TIMEOUT_SECS") {
            config.operation_timeout_secs = timeout.parse().map_err(|_| {
                crate::errors::AppError::Config(
                    "OCR_TIMEOUT_SECS must be a valid number of seconds".to_string(),
                )
            })?;
        }
        if let Ok(psm) = env::var("OCR_PSM") {
            config.psm_mode = PageSegMode::from_number(&psm).ok_or_else(|| {
                crate::errors::AppError::Config(format!(
                    "OCR_PSM '{}' is not one of 3, 6, 7, 11",
                    psm
                ))
            })?;
        }

        Ok(config)
    }

    /// Validate OCR configuration parameters
    pub fn validate(&self) -> crate::errors::AppResult<()> {
        if self.languages.trim().is_empty() {
            return Err(crate::errors::AppError::Config(
                "languages cannot be empty".to_string(),
            ));
        }

        if self.max_file_size == 0 {
            return Err(crate::errors::AppError::Config(
                "max_file_size must be greater than 0".to_string(),
            ));
        }

        if self.operation_timeout_secs == 0 {
            return Err(crate::errors::AppError::Config(
                "operation_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if let Some(whitelist) = &self.character_whitelist {
            if whitelist.is_empty() {
                return Err(crate::errors::AppError::Config(
                    "character_whitelist cannot be empty if provided".to_string(),
                ));
            }
        }

        Ok(())
    }
}
