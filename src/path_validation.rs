//! # Path Validation Module
//!
//! Filename checks for files the application writes on the user's behalf,
//! such as labeled meter photos. Labels come from free-form user input
//! (inverter and cable names), so they are sanitized before they become
//! part of a path.

use std::fmt;

/// Errors raised when a filename is unsafe to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathValidationError {
    /// Filename contains a path separator or a `..` component
    PathTraversal,
    /// Filename contains characters not allowed on common filesystems
    InvalidCharacters,
    /// Filename is longer than [`MAX_FILENAME_LENGTH`] bytes
    FilenameTooLong,
    /// Filename (without extension) is a reserved device name
    ReservedName,
    /// Filename is empty
    EmptyName,
}

impl fmt::Display for PathValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathValidationError::PathTraversal => {
                write!(f, "Filename contains a path separator or traversal")
            }
            PathValidationError::InvalidCharacters => {
                write!(f, "Filename contains invalid characters")
            }
            PathValidationError::FilenameTooLong => write!(f, "Filename is too long"),
            PathValidationError::ReservedName => write!(f, "Filename uses a reserved name"),
            PathValidationError::EmptyName => write!(f, "Filename is empty"),
        }
    }
}

impl std::error::Error for PathValidationError {}

pub type PathValidationResult<T> = Result<T, PathValidationError>;

/// Maximum filename length in bytes on most filesystems
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Used when sanitizing leaves nothing behind
pub const FALLBACK_FILENAME: &str = "unnamed";

/// Device names Windows refuses as filenames
pub const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Characters replaced by `_` when sanitizing
pub const FORBIDDEN_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*', '/', '\\'];

fn is_forbidden(c: char) -> bool {
    FORBIDDEN_FILENAME_CHARS.contains(&c) || c.is_control()
}

fn is_reserved(filename: &str) -> bool {
    let stem = filename.split('.').next().unwrap_or("").to_ascii_uppercase();
    RESERVED_NAMES.contains(&stem.as_str())
}

/// Check that `filename` is a single safe path component.
///
/// # Arguments
///
/// * `filename` - The bare filename, without any directory part
///
/// # Returns
///
/// `Ok(())` when the name can be created as-is
pub fn validate_filename(filename: &str) -> PathValidationResult<()> {
    if filename.is_empty() {
        return Err(PathValidationError::EmptyName);
    }
    if filename.len() > MAX_FILENAME_LENGTH {
        return Err(PathValidationError::FilenameTooLong);
    }
    if filename.contains('/') || filename.contains('\\') || filename.split('.').all(str::is_empty)
    {
        return Err(PathValidationError::PathTraversal);
    }
    if filename.chars().any(is_forbidden) {
        return Err(PathValidationError::InvalidCharacters);
    }
    if is_reserved(filename) {
        return Err(PathValidationError::ReservedName);
    }
    Ok(())
}

/// Turn arbitrary text into a filename that passes [`validate_filename`].
///
/// Forbidden and control characters become `_`, surrounding whitespace and
/// dots are trimmed, reserved names get a `_` prefix and overlong names are
/// cut while keeping the extension.
///
/// # Examples
///
/// ```rust
/// use meter_scan::path_validation::sanitize_filename;
///
/// assert_eq!(sanitize_filename("1-A.jpg"), "1-A.jpg");
/// assert_eq!(sanitize_filename("2/B?.jpg"), "2_B_.jpg");
/// ```
pub fn sanitize_filename(filename: &str) -> String {
    let replaced: String = filename
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();

    let mut sanitized = replaced
        .trim()
        .trim_matches('.')
        .trim()
        .to_string();
    if sanitized.is_empty() {
        sanitized = FALLBACK_FILENAME.to_string();
    }
    if is_reserved(&sanitized) {
        sanitized.insert(0, '_');
    }

    if sanitized.len() > MAX_FILENAME_LENGTH {
        let (name, ext) = match sanitized.rfind('.') {
            Some(dot) if sanitized.len() - dot < MAX_FILENAME_LENGTH => {
                sanitized.split_at(dot)
            }
            _ => (sanitized.as_str(), ""),
        };
        let mut cut = MAX_FILENAME_LENGTH - ext.len();
        while !name.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &name[..cut], ext);
    }

    sanitized
}
