//! # Decimal Repair Module
//!
//! Meter displays show decimal points as a tiny segment that OCR frequently
//! drops, turns into a comma, or splits into a space. This module restores a
//! plausible decimal point using a per-field plausibility range.
//!
//! The ranges here are fixed sanity bounds for what a string inverter can
//! physically produce. They are unrelated to the user's critical values in
//! [`crate::records::CriticalValues`].

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

use crate::errors::{AppError, AppResult};

lazy_static! {
    static ref DOT_DECIMAL: Regex =
        Regex::new(r"^[0-9]+\.[0-9]+$").expect("Invalid dot decimal regex pattern");
    static ref COMMA_DECIMAL: Regex =
        Regex::new(r"^[0-9]+,[0-9]+$").expect("Invalid comma decimal regex pattern");
    static ref SHORT_INTEGER: Regex =
        Regex::new(r"^[0-9]{1,4}$").expect("Invalid short integer regex pattern");
    static ref SPACE_SPLIT: Regex =
        Regex::new(r"^([0-9]+)\s+([0-9]+)$").expect("Invalid space split regex pattern");
    static ref MULTI_DOT: Regex =
        Regex::new(r"^[0-9]+\.[0-9]+(?:\.[0-9]+)+$").expect("Invalid multi dot regex pattern");
    static ref DECIMAL_NUMERAL: Regex =
        Regex::new(r"^[0-9]+(?:\.[0-9]+)?$").expect("Invalid decimal numeral regex pattern");
}

/// One of the three quantities read from the meter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementField {
    Voltage,
    Current,
    Resistance,
}

impl MeasurementField {
    /// All fields in extraction order
    pub const ALL: [MeasurementField; 3] = [
        MeasurementField::Voltage,
        MeasurementField::Current,
        MeasurementField::Resistance,
    ];

    /// Unit token as it appears on a normalized line
    pub fn unit(&self) -> &'static str {
        match self {
            MeasurementField::Voltage => "V",
            MeasurementField::Current => "A",
            MeasurementField::Resistance => "MΩ",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementField::Voltage => "voltage",
            MeasurementField::Current => "current",
            MeasurementField::Resistance => "resistance",
        }
    }

    /// Position of the field in [`MeasurementField::ALL`]
    pub fn index(&self) -> usize {
        match self {
            MeasurementField::Voltage => 0,
            MeasurementField::Current => 1,
            MeasurementField::Resistance => 2,
        }
    }
}

impl fmt::Display for MeasurementField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive plausibility range for one field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldRange {
    pub field: MeasurementField,
    pub min: f64,
    pub max: f64,
}

impl FieldRange {
    pub const fn new(field: MeasurementField, min: f64, max: f64) -> Self {
        Self { field, min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }

    /// Parse `text` and check it against the range; unparsable text is out of range
    pub fn contains_str(&self, text: &str) -> bool {
        text.parse::<f64>().is_ok_and(|value| self.contains(value))
    }
}

/// Repair ranges for all three fields
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepairRanges {
    pub voltage: FieldRange,
    pub current: FieldRange,
    pub resistance: FieldRange,
}

impl Default for RepairRanges {
    fn default() -> Self {
        Self {
            voltage: FieldRange::new(MeasurementField::Voltage, 50.0, 1500.0),
            current: FieldRange::new(MeasurementField::Current, 0.0, 25.0),
            resistance: FieldRange::new(MeasurementField::Resistance, 0.0, 2000.0),
        }
    }
}

impl RepairRanges {
    pub fn for_field(&self, field: MeasurementField) -> &FieldRange {
        match field {
            MeasurementField::Voltage => &self.voltage,
            MeasurementField::Current => &self.current,
            MeasurementField::Resistance => &self.resistance,
        }
    }

    /// Validate that each range is well formed and tagged with its own field
    pub fn validate(&self) -> AppResult<()> {
        for field in MeasurementField::ALL {
            let range = self.for_field(field);
            if range.field != field {
                return Err(AppError::Config(format!(
                    "repair range for {} is tagged as {}",
                    field, range.field
                )));
            }
            if !range.min.is_finite() || !range.max.is_finite() || range.min > range.max {
                return Err(AppError::Config(format!(
                    "repair range for {} must satisfy min <= max (got {} - {})",
                    field, range.min, range.max
                )));
            }
        }
        Ok(())
    }
}

/// Whether `text` is a bare decimal numeral: digits with at most one inner dot
pub fn is_decimal_numeral(text: &str) -> bool {
    DECIMAL_NUMERAL.is_match(text)
}

/// Restore a missing, misplaced or misread decimal point.
///
/// The first matching rule wins:
///
/// 1. `digits.digits` is returned unchanged
/// 2. `digits,digits` has the comma replaced by a dot
/// 3. 1-4 plain digits: kept if the literal value is in range, otherwise a dot
///    is inserted (`d.dd`, `dd.d` for three digits; `dd.dd`, `d.ddd` for four)
///    and the first in-range candidate wins
/// 4. two digit groups separated by whitespace are joined with a dot when the
///    result is in range
/// 5. a value with two or more dots is cut at the second dot
/// 6. anything else is returned unchanged
///
/// # Arguments
///
/// * `raw` - Numeric-looking text, already trimmed
/// * `range` - Plausibility range of the field the text belongs to
///
/// # Examples
///
/// ```
/// use meter_scan::decimal_repair::{smart_fix_decimal, RepairRanges};
///
/// let ranges = RepairRanges::default();
/// assert_eq!(smart_fix_decimal("520", &ranges.current), "5.20");
/// assert_eq!(smart_fix_decimal("230", &ranges.voltage), "230");
/// assert_eq!(smart_fix_decimal("0,45", &ranges.resistance), "0.45");
/// ```
pub fn smart_fix_decimal(raw: &str, range: &FieldRange) -> String {
    let repaired = repair(raw, range);
    if repaired != raw {
        trace!(field = %range.field, raw = %raw, repaired = %repaired, "Repaired decimal value");
    }
    repaired
}

fn repair(raw: &str, range: &FieldRange) -> String {
    if DOT_DECIMAL.is_match(raw) {
        return raw.to_string();
    }

    if COMMA_DECIMAL.is_match(raw) {
        return raw.replacen(',', ".", 1);
    }

    if SHORT_INTEGER.is_match(raw) {
        if range.contains_str(raw) {
            return raw.to_string();
        }
        return dot_insertions(raw)
            .into_iter()
            .find(|candidate| range.contains_str(candidate))
            .unwrap_or_else(|| raw.to_string());
    }

    if let Some(caps) = SPACE_SPLIT.captures(raw) {
        let joined = format!("{}.{}", &caps[1], &caps[2]);
        if range.contains_str(&joined) {
            return joined;
        }
        return raw.to_string();
    }

    if MULTI_DOT.is_match(raw) {
        if let Some(second_dot) = raw.match_indices('.').nth(1).map(|(i, _)| i) {
            return raw[..second_dot].to_string();
        }
    }

    raw.to_string()
}

/// Dot placements tried for a pure-digit string, in preference order
fn dot_insertions(digits: &str) -> Vec<String> {
    let split_at = |i: usize| format!("{}.{}", &digits[..i], &digits[i..]);
    match digits.len() {
        3 => vec![split_at(1), split_at(2)],
        4 => vec![split_at(2), split_at(1)],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges() -> RepairRanges {
        RepairRanges::default()
    }

    #[test]
    fn test_dot_decimal_unchanged() {
        assert_eq!(smart_fix_decimal("12.8", &ranges().voltage), "12.8");
        assert_eq!(smart_fix_decimal("5.2", &ranges().current), "5.2");
    }

    #[test]
    fn test_comma_decimal_becomes_dot() {
        assert_eq!(smart_fix_decimal("0,45", &ranges().resistance), "0.45");
        // Range is not consulted for rule 2
        assert_eq!(smart_fix_decimal("99,9", &ranges().current), "99.9");
    }

    #[test]
    fn test_short_integer_in_range_kept() {
        assert_eq!(smart_fix_decimal("789", &ranges().voltage), "789");
        assert_eq!(smart_fix_decimal("65", &ranges().resistance), "65");
        assert_eq!(smart_fix_decimal("1000", &ranges().voltage), "1000");
    }

    #[test]
    fn test_three_digit_insertion_order() {
        // 5.20 is tried before 52.0
        assert_eq!(smart_fix_decimal("520", &ranges().current), "5.20");
        // 1.00 is in range for current, so it wins over 10.0
        assert_eq!(smart_fix_decimal("100", &ranges().current), "1.00");
        // 9.99 fits current
        assert_eq!(smart_fix_decimal("999", &ranges().current), "9.99");
    }

    #[test]
    fn test_four_digit_insertion_order() {
        // 12.34 is tried first and fits current
        assert_eq!(smart_fix_decimal("1234", &ranges().current), "12.34");
        // 52.34 is out of current range, 5.234 fits
        assert_eq!(smart_fix_decimal("5234", &ranges().current), "5.234");
    }

    #[test]
    fn test_no_candidate_in_range_keeps_original() {
        // 0.40 and 04.0 are below the voltage minimum
        assert_eq!(smart_fix_decimal("040", &ranges().voltage), "040");
        assert_eq!(smart_fix_decimal("0030", &ranges().voltage), "0030");
        assert_eq!(smart_fix_decimal("9", &ranges().voltage), "9");
        assert_eq!(smart_fix_decimal("52", &ranges().current), "52");
    }

    #[test]
    fn test_space_split_joined_when_in_range() {
        assert_eq!(smart_fix_decimal("5 2", &ranges().current), "5.2");
        assert_eq!(smart_fix_decimal("500 2", &ranges().current), "500 2");
    }

    #[test]
    fn test_multiple_dots_truncated() {
        assert_eq!(smart_fix_decimal("12.3.4", &ranges().voltage), "12.3");
        assert_eq!(smart_fix_decimal("1.2.3.4", &ranges().current), "1.2");
    }

    #[test]
    fn test_other_input_unchanged() {
        assert_eq!(smart_fix_decimal("", &ranges().voltage), "");
        assert_eq!(smart_fix_decimal("12345", &ranges().voltage), "12345");
        assert_eq!(smart_fix_decimal("abc", &ranges().voltage), "abc");
    }

    #[test]
    fn test_in_range_literal_is_never_rewritten() {
        let voltage = ranges().voltage;
        for value in 50..=1500u32 {
            let text = value.to_string();
            assert_eq!(smart_fix_decimal(&text, &voltage), text);
        }
    }

    #[test]
    fn test_repair_ranges_validation() {
        assert!(ranges().validate().is_ok());

        let mut bad = ranges();
        bad.current.min = 30.0;
        assert!(bad.validate().is_err());

        let mut mislabeled = ranges();
        mislabeled.voltage.field = MeasurementField::Current;
        assert!(mislabeled.validate().is_err());
    }

    #[test]
    fn test_is_decimal_numeral() {
        assert!(is_decimal_numeral("230"));
        assert!(is_decimal_numeral("0.45"));
        assert!(!is_decimal_numeral("1.2.3"));
        assert!(!is_decimal_numeral(".5"));
        assert!(!is_decimal_numeral("5."));
        assert!(!is_decimal_numeral(""));
    }
}
