//! # Image Preprocessing Module
//!
//! Prepares a meter photo for text recognition. Meter displays photographed
//! in the field are usually large, colored and low in contrast, so the photo
//! is run through three stages, each writing a new intermediate JPEG:
//!
//! 1. resize to a fixed target width, keeping the aspect ratio
//! 2. grayscale
//! 3. contrast boost and a slight brightness reduction
//!
//! Preprocessing is best effort. Any failure is logged and the original photo
//! is handed to the recognizer instead; a scan never fails because of it.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::env;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::errors::{AppError, AppResult};
use crate::observability;

pub const DEFAULT_TARGET_WIDTH: u32 = 800;
pub const DEFAULT_CONTRAST_FACTOR: f32 = 1.4;
pub const DEFAULT_BRIGHTNESS_DELTA: f32 = -0.1;
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Errors that can occur during image preprocessing operations.
#[derive(Debug, Clone)]
pub enum PreprocessingError {
    /// Invalid target width specified
    InvalidTargetWidth { width: u32 },
    /// Image processing operation failed
    ProcessingFailed { message: String },
    /// Failed to load or decode image
    ImageLoad { message: String },
    /// Failed to write an intermediate image
    ImageSave { message: String },
}

impl std::fmt::Display for PreprocessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreprocessingError::InvalidTargetWidth { width } => {
                write!(f, "Invalid target width: {}. Must be greater than 0", width)
            }
            PreprocessingError::ProcessingFailed { message } => {
                write!(f, "Image processing failed: {}", message)
            }
            PreprocessingError::ImageLoad { message } => {
                write!(f, "Failed to load image: {}", message)
            }
            PreprocessingError::ImageSave { message } => {
                write!(f, "Failed to save image: {}", message)
            }
        }
    }
}

impl std::error::Error for PreprocessingError {}

/// A single image transformation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImageOperation {
    /// Resize to `width` pixels, height follows the aspect ratio
    Resize { width: u32 },
    Grayscale,
    /// Multiply the distance of each channel from mid-gray by `factor`
    Contrast { factor: f32 },
    /// Shift every channel by `delta` of the full range (-1.0..=1.0)
    Brightness { delta: f32 },
}

/// Where and how an intermediate image is written
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOptions {
    pub output_dir: PathBuf,
    /// File name without extension; `.jpg` is appended
    pub file_stem: String,
    pub jpeg_quality: u8,
}

/// Image collaborator: applies operations to the image at a path and
/// returns the path of the written result.
pub trait ImageManipulator: Send + Sync {
    fn manipulate(
        &self,
        image_path: &Path,
        operations: &[ImageOperation],
        options: &SaveOptions,
    ) -> Result<PathBuf, PreprocessingError>;
}

/// [`ImageManipulator`] backed by the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterManipulator;

impl ImageManipulator for RasterManipulator {
    fn manipulate(
        &self,
        image_path: &Path,
        operations: &[ImageOperation],
        options: &SaveOptions,
    ) -> Result<PathBuf, PreprocessingError> {
        let mut image = image::open(image_path).map_err(|e| PreprocessingError::ImageLoad {
            message: format!("{}: {}", image_path.display(), e),
        })?;

        for operation in operations {
            image = apply_operation(image, operation)?;
        }

        let output = options
            .output_dir
            .join(format!("{}.jpg", options.file_stem));
        save_jpeg(&image, &output, options.jpeg_quality)?;
        Ok(output)
    }
}

/// Apply one operation to an in-memory image
pub fn apply_operation(
    image: DynamicImage,
    operation: &ImageOperation,
) -> Result<DynamicImage, PreprocessingError> {
    match *operation {
        ImageOperation::Resize { width } => {
            if width == 0 {
                return Err(PreprocessingError::InvalidTargetWidth { width });
            }
            if image.width() == 0 || image.height() == 0 {
                return Err(PreprocessingError::ProcessingFailed {
                    message: "image has no pixels".to_string(),
                });
            }
            let height = scaled_height(image.width(), image.height(), width);
            Ok(image.resize_exact(width, height, FilterType::CatmullRom))
        }
        ImageOperation::Grayscale => Ok(image.grayscale()),
        ImageOperation::Contrast { factor } => {
            if !factor.is_finite() || factor <= 0.0 {
                return Err(PreprocessingError::ProcessingFailed {
                    message: format!("contrast factor must be positive, got {}", factor),
                });
            }
            Ok(image.adjust_contrast(contrast_percent(factor)))
        }
        ImageOperation::Brightness { delta } => Ok(image.brighten(brightness_offset(delta))),
    }
}

/// Height that keeps the aspect ratio when the width becomes `target_width`
pub fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    let scaled = (height as f64 * target_width as f64 / width as f64).round();
    scaled.clamp(1.0, u32::MAX as f64) as u32
}

/// `DynamicImage::adjust_contrast` scales by `((100 + c) / 100)^2`,
/// so a multiplicative factor maps to `100 * (sqrt(factor) - 1)`.
fn contrast_percent(factor: f32) -> f32 {
    100.0 * (factor.sqrt() - 1.0)
}

fn brightness_offset(delta: f32) -> i32 {
    (delta.clamp(-1.0, 1.0) * 255.0).round() as i32
}

fn save_jpeg(image: &DynamicImage, path: &Path, quality: u8) -> Result<(), PreprocessingError> {
    let save_error = |e: &dyn std::fmt::Display| PreprocessingError::ImageSave {
        message: format!("{}: {}", path.display(), e),
    };

    // JPEG has no alpha channel
    let encodable = if image.color().has_color() {
        DynamicImage::ImageRgb8(image.to_rgb8())
    } else {
        DynamicImage::ImageLuma8(image.to_luma8())
    };

    let file = File::create(path).map_err(|e| save_error(&e))?;
    let mut writer = BufWriter::new(file);
    let encoder = JpegEncoder::new_with_quality(&mut writer, quality);
    encodable
        .write_with_encoder(encoder)
        .map_err(|e| save_error(&e))?;
    writer.flush().map_err(|e| save_error(&e))?;
    Ok(())
}

/// Configuration for the preprocessing stages
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    pub enabled: bool,
    pub target_width: u32,
    pub contrast_factor: f32,
    pub brightness_delta: f32,
    pub jpeg_quality: u8,
    /// Parent directory for per-scan scratch directories (system temp if None)
    pub work_dir: Option<PathBuf>,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_width: DEFAULT_TARGET_WIDTH,
            contrast_factor: DEFAULT_CONTRAST_FACTOR,
            brightness_delta: DEFAULT_BRIGHTNESS_DELTA,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            work_dir: None,
        }
    }
}

impl PreprocessingConfig {
    /// Load preprocessing settings from environment variables
    pub fn from_env() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(enabled) = env::var("PREPROCESS_ENABLED") {
            config.enabled = enabled.parse().map_err(|_| {
                AppError::Config("PREPROCESS_ENABLED must be true or false".to_string())
            })?;
        }
        if let Ok(width) = env::var("PREPROCESS_TARGET_WIDTH") {
            config.target_width = width.parse().map_err(|_| {
                AppError::Config("PREPROCESS_TARGET_WIDTH must be a valid number".to_string())
            })?;
        }
        config.work_dir = env::var("PREPROCESS_WORK_DIR").ok().map(PathBuf::from);

        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.target_width == 0 {
            return Err(AppError::Config(
                "target_width must be greater than 0".to_string(),
            ));
        }
        if !self.contrast_factor.is_finite() || self.contrast_factor <= 0.0 {
            return Err(AppError::Config(
                "contrast_factor must be a positive number".to_string(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.brightness_delta) {
            return Err(AppError::Config(
                "brightness_delta must be between -1.0 and 1.0".to_string(),
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(AppError::Config(
                "jpeg_quality must be between 1 and 100".to_string(),
            ));
        }
        Ok(())
    }

    /// Operation groups, one intermediate image per group
    pub fn stages(&self) -> Vec<Vec<ImageOperation>> {
        vec![
            vec![ImageOperation::Resize {
                width: self.target_width,
            }],
            vec![ImageOperation::Grayscale],
            vec![
                ImageOperation::Contrast {
                    factor: self.contrast_factor,
                },
                ImageOperation::Brightness {
                    delta: self.brightness_delta,
                },
            ],
        ]
    }
}

/// The image handed to the recognizer.
///
/// Intermediate files live in a scratch directory that is removed when the
/// value is dropped.
#[derive(Debug)]
pub struct PreparedImage {
    path: PathBuf,
    workspace: Option<TempDir>,
}

impl PreparedImage {
    /// The photo itself, used unchanged
    pub fn original(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            workspace: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// False when the original photo is used unchanged
    pub fn is_preprocessed(&self) -> bool {
        self.workspace.is_some()
    }
}

/// Runs the preprocessing stages through an [`ImageManipulator`]
pub struct ImagePreprocessor {
    config: PreprocessingConfig,
    manipulator: Box<dyn ImageManipulator>,
}

impl ImagePreprocessor {
    pub fn new(config: PreprocessingConfig) -> Self {
        Self::with_manipulator(config, Box::new(RasterManipulator))
    }

    pub fn with_manipulator(
        config: PreprocessingConfig,
        manipulator: Box<dyn ImageManipulator>,
    ) -> Self {
        Self {
            config,
            manipulator,
        }
    }

    pub fn config(&self) -> &PreprocessingConfig {
        &self.config
    }

    /// Prepare a photo for recognition, falling back to the original on any failure.
    ///
    /// # Arguments
    ///
    /// * `image_path` - Path to the photo taken of the meter display
    ///
    /// # Returns
    ///
    /// A [`PreparedImage`] pointing either at the final intermediate JPEG or
    /// at `image_path` itself.
    pub fn prepare(&self, image_path: &Path) -> PreparedImage {
        if !self.config.enabled {
            debug!(image_path = %image_path.display(), "Preprocessing disabled");
            return PreparedImage::original(image_path);
        }

        let start = Instant::now();
        match self.try_prepare(image_path) {
            Ok(prepared) => {
                let duration = start.elapsed();
                observability::record_preprocessing_metrics(duration, true);
                info!(
                    image_path = %image_path.display(),
                    prepared_path = %prepared.path().display(),
                    duration_ms = duration.as_millis(),
                    "Image preprocessing completed"
                );
                prepared
            }
            Err(e) => {
                observability::record_preprocessing_metrics(start.elapsed(), false);
                warn!(
                    error = %e,
                    image_path = %image_path.display(),
                    "Image preprocessing failed, using original image"
                );
                PreparedImage::original(image_path)
            }
        }
    }

    fn try_prepare(&self, image_path: &Path) -> Result<PreparedImage, PreprocessingError> {
        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix("meter-scan-");
            builder
        };
        let workspace = match &self.config.work_dir {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
        .map_err(|e| PreprocessingError::ImageSave {
            message: format!("cannot create scratch directory: {}", e),
        })?;

        let mut current = image_path.to_path_buf();
        for (index, operations) in self.config.stages().iter().enumerate() {
            let options = SaveOptions {
                output_dir: workspace.path().to_path_buf(),
                file_stem: format!("stage-{}", index + 1),
                jpeg_quality: self.config.jpeg_quality,
            };
            current = self.manipulator.manipulate(&current, operations, &options)?;
            debug!(stage = index + 1, path = %current.display(), "Wrote intermediate image");
        }

        Ok(PreparedImage {
            path: current,
            workspace: Some(workspace),
        })
    }
}
