//! Validation module for manually entered survey data
//!
//! Readings typed by the user are cleaned rather than rejected, so a manual
//! correction of a bad scan always goes through:
//!
//! - Inverter and cable labels
//! - Reading input sanitizing
//! - Reading checks that only warn

/// Longest accepted inverter or cable label
pub const MAX_LABEL_LENGTH: usize = 64;

/// Validates an inverter or cable label
///
/// # Arguments
/// * `label` - The label as typed by the user
///
/// # Returns
/// * `Ok(&str)` - The trimmed label if valid
/// * `Err(&str)` - Error type: "empty" or "too_long"
///
/// # Examples
/// ```
/// use meter_scan::validation::validate_label;
///
/// assert_eq!(validate_label(" 12 "), Ok("12"));
/// assert_eq!(validate_label("  "), Err("empty"));
/// assert_eq!(validate_label(&"A".repeat(65)), Err("too_long"));
/// ```
pub fn validate_label(label: &str) -> Result<&str, &'static str> {
    let trimmed = label.trim();

    if trimmed.is_empty() {
        return Err("empty");
    }

    if trimmed.chars().count() > MAX_LABEL_LENGTH {
        return Err("too_long");
    }

    Ok(trimmed)
}

/// Clean a typed reading: the first comma becomes the decimal dot and
/// everything except digits and dots is dropped.
///
/// # Examples
/// ```
/// use meter_scan::validation::sanitize_reading_input;
///
/// assert_eq!(sanitize_reading_input("5,2 A"), "5.2");
/// assert_eq!(sanitize_reading_input("230V"), "230");
/// ```
pub fn sanitize_reading_input(input: &str) -> String {
    input
        .replacen(',', ".", 1)
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect()
}

/// Check a sanitized reading
///
/// # Returns
/// * `Ok(())` - Empty (not measured) or a finite number
/// * `Err(&str)` - Error type: "not_a_number"
pub fn validate_reading(value: &str) -> Result<(), &'static str> {
    if value.is_empty() {
        return Ok(());
    }
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(()),
        _ => Err("not_a_number"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_label() {
        assert_eq!(validate_label("A1"), Ok("A1"));
        assert_eq!(validate_label("\tInverter 3\n"), Ok("Inverter 3"));
        assert_eq!(validate_label(""), Err("empty"));
        assert!(validate_label(&"Ω".repeat(MAX_LABEL_LENGTH)).is_ok());
        assert_eq!(
            validate_label(&"Ω".repeat(MAX_LABEL_LENGTH + 1)),
            Err("too_long")
        );
    }

    #[test]
    fn test_sanitize_reading_input() {
        assert_eq!(sanitize_reading_input("12,8"), "12.8");
        assert_eq!(sanitize_reading_input("0,45 MΩ"), "0.45");
        assert_eq!(sanitize_reading_input("1,234,5"), "1.2345");
        assert_eq!(sanitize_reading_input("-5"), "5");
        assert_eq!(sanitize_reading_input("abc"), "");
    }

    #[test]
    fn test_validate_reading() {
        assert!(validate_reading("").is_ok());
        assert!(validate_reading("230").is_ok());
        assert!(validate_reading("0.45").is_ok());
        assert!(validate_reading(".5").is_ok());
        assert_eq!(validate_reading("1.2.3"), Err("not_a_number"));
        assert_eq!(validate_reading("."), Err("not_a_number"));
    }
}
