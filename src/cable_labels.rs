//! # Cable Label Module
//!
//! Generates the labels technicians use for the strings (cables) of an
//! inverter, so the next label can be suggested while surveying.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::errors::AppError;

/// Custom ranges stop when the letter part grows beyond this many letters
pub const MAX_CUSTOM_LETTERS: usize = 4;

/// Numeric sub-labels roll over to the next major number after this minor
pub const MAX_MINOR_LABEL: u32 = 99;

lazy_static! {
    static ref FLAT_RANGE: Regex =
        Regex::new(r"^(\d+)\s*-\s*(\d+)$").expect("Invalid flat range regex pattern");
    static ref DOTTED_RANGE: Regex =
        Regex::new(r"^(\d+)\.(\d+)\s*-\s*(\d+)\.(\d+)$").expect("Invalid dotted range regex pattern");
    static ref CUSTOM_RANGE: Regex =
        Regex::new(r"^([A-Za-z]+)(\d+)-([A-Za-z]+)(\d+)$").expect("Invalid custom range regex pattern");
}

/// How cable labels are generated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "range", rename_all = "snake_case")]
pub enum CableLabelMode {
    /// A, B, ... Z, Aa, Ba, ...
    #[default]
    Letters,
    /// A1, A2, B1, B2, ...
    LetterPairs,
    /// `"1-12"` or `"1.1-1.12"`
    Numeric(String),
    /// `"A1-C4"`: every letter block from A to C, numbered 1 to 4
    Custom(String),
}

impl fmt::Display for CableLabelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CableLabelMode::Letters => write!(f, "letters"),
            CableLabelMode::LetterPairs => write!(f, "pairs"),
            CableLabelMode::Numeric(range) => write!(f, "numeric:{}", range),
            CableLabelMode::Custom(range) => write!(f, "custom:{}", range),
        }
    }
}

impl FromStr for CableLabelMode {
    type Err = AppError;

    /// Parse `letters`, `pairs`, `numeric:<range>` or `custom:<range>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (mode, range) = match s.split_once(':') {
            Some((mode, range)) => (mode.trim(), Some(range.trim())),
            None => (s, None),
        };
        match (mode.to_ascii_lowercase().as_str(), range) {
            ("letters", None) => Ok(CableLabelMode::Letters),
            ("pairs", None) => Ok(CableLabelMode::LetterPairs),
            ("numeric", Some(range)) if !range.is_empty() => {
                Ok(CableLabelMode::Numeric(range.to_string()))
            }
            ("custom", Some(range)) if !range.is_empty() => {
                Ok(CableLabelMode::Custom(range.to_string()))
            }
            _ => Err(AppError::Validation(format!(
                "unknown cable label mode '{}' (expected letters, pairs, numeric:<range> or custom:<range>)",
                s
            ))),
        }
    }
}

/// Generate up to `count` labels for `mode`.
///
/// Numeric and custom ranges that do not parse, or whose end comes before
/// their start, produce no labels.
///
/// # Examples
///
/// ```
/// use meter_scan::cable_labels::{generate_cable_labels, CableLabelMode};
///
/// assert_eq!(generate_cable_labels(&CableLabelMode::LetterPairs, 3), vec!["A1", "A2", "B1"]);
/// assert_eq!(
///     generate_cable_labels(&CableLabelMode::Numeric("1.1-1.3".to_string()), 10),
///     vec!["1.1", "1.2", "1.3"]
/// );
/// ```
pub fn generate_cable_labels(mode: &CableLabelMode, count: usize) -> Vec<String> {
    match mode {
        CableLabelMode::Letters => (0..count).map(letter_label).collect(),
        CableLabelMode::LetterPairs => (0..count)
            .map(|i| format!("{}{}", alpha_label(i / 2), i % 2 + 1))
            .collect(),
        CableLabelMode::Numeric(range) => numeric_labels(range, count),
        CableLabelMode::Custom(range) => custom_labels(range, count),
    }
}

fn uppercase(index: usize) -> char {
    char::from(b'A' + (index % 26) as u8)
}

fn lowercase(index: usize) -> char {
    char::from(b'a' + (index % 26) as u8)
}

/// Letter mode: the 27th label is `Aa`, the 53rd `Ab`, and so on
fn letter_label(index: usize) -> String {
    let mut label = String::from(uppercase(index));
    let round = index / 26;
    if round > 0 {
        label.push(lowercase(round - 1));
        if round > 26 {
            let more = (round - 1) / 26;
            label.extend((0..more).map(lowercase));
        }
    }
    label
}

/// Spreadsheet-style column name: A..Z, AA, AB, ...
pub fn alpha_label(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        letters.push(uppercase((n - 1) % 26));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Next uppercase letter block with carry: A -> B, Z -> AA, AZ -> BA
pub fn increment_alpha(alpha: &str) -> String {
    let mut letters: Vec<u8> = alpha.bytes().collect();
    let mut i = letters.len();
    loop {
        if i == 0 {
            letters.insert(0, b'A');
            break;
        }
        i -= 1;
        if letters[i] == b'Z' {
            letters[i] = b'A';
        } else {
            letters[i] += 1;
            break;
        }
    }
    String::from_utf8_lossy(&letters).into_owned()
}

fn numeric_labels(range: &str, count: usize) -> Vec<String> {
    let range = range.trim();

    if let Some(caps) = FLAT_RANGE.captures(range) {
        let (Ok(start), Ok(end)) = (caps[1].parse::<u64>(), caps[2].parse::<u64>()) else {
            return Vec::new();
        };
        return (start..=end).take(count).map(|n| n.to_string()).collect();
    }

    if let Some(caps) = DOTTED_RANGE.captures(range) {
        let parsed: Vec<u32> = (1..=4).filter_map(|i| caps[i].parse().ok()).collect();
        let &[major_start, minor_start, major_end, minor_end] = parsed.as_slice() else {
            return Vec::new();
        };

        let mut labels = Vec::new();
        let (mut major, mut minor) = (major_start, minor_start);
        while labels.len() < count
            && (major < major_end || (major == major_end && minor <= minor_end))
        {
            labels.push(format!("{}.{}", major, minor));
            minor += 1;
            if minor > MAX_MINOR_LABEL {
                minor = 1;
                major += 1;
            }
        }
        return labels;
    }

    Vec::new()
}

/// Order of letter blocks as [`increment_alpha`] walks them: shorter first
fn compare_alpha(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn custom_labels(range: &str, count: usize) -> Vec<String> {
    let Some(caps) = CUSTOM_RANGE.captures(range.trim()) else {
        return Vec::new();
    };
    let start_letters = caps[1].to_ascii_uppercase();
    let end_letters = caps[3].to_ascii_uppercase();
    let (Ok(start_number), Ok(end_number)) = (caps[2].parse::<u64>(), caps[4].parse::<u64>())
    else {
        return Vec::new();
    };
    if start_number > end_number
        || compare_alpha(&start_letters, &end_letters) == Ordering::Greater
    {
        return Vec::new();
    }

    let mut labels = Vec::new();
    let mut letters = start_letters;
    while labels.len() < count && letters.len() <= MAX_CUSTOM_LETTERS {
        let remaining = count - labels.len();
        labels.extend(
            (start_number..=end_number)
                .take(remaining)
                .map(|n| format!("{}{}", letters, n)),
        );
        if letters == end_letters {
            break;
        }
        letters = increment_alpha(&letters);
    }
    labels
}
