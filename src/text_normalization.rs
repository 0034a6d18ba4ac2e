//! # Text Normalization Module
//!
//! Cleans a single raw OCR line read from a meter display so that the
//! measurement extractor only has to deal with digits, decimal points,
//! spaces and the unit tokens `V`, `A` and `MΩ`.
//!
//! ## Rules
//!
//! The rules are tuned for seven-segment and LCD meter fonts, where the
//! recognizer confuses digits with letters and drops or misplaces decimal
//! points. They run as an ordered sequence; later rules see the output of
//! earlier ones:
//!
//! 1. Strip degree signs
//! 2. Collapse "MΩ" misreadings (`M0`, `MO`, `Mohm`, `M0hm`, `M0Ω`, `MQ`) to `MΩ`
//! 3. `O` next to a digit, or standing alone, becomes `0`
//! 4. `b`/`B` next to a digit, or standing alone, becomes `8`
//! 5. `d`/`D` becomes `0`
//! 6. A comma or single whitespace between two digits becomes `.`
//! 7. Whitespace between a number and `V`, `A` or `MΩ` is removed
//! 8. Whitespace runs collapse to one space
//! 9. Characters outside `0-9 . M Ω V A` and space are dropped
//! 10. Leading and trailing whitespace is trimmed
//!
//! The sequence is repeated until the line stops changing, which makes
//! [`normalize_ocr_line`] idempotent.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{trace, warn};

/// Upper bound on rule passes for a single line.
pub const MAX_NORMALIZATION_PASSES: usize = 16;

lazy_static! {
    static ref MEGAOHM_MISREAD: Regex =
        Regex::new(r"(?i)M[0O](?:hm|Ω)?|MQ").expect("Invalid megaohm misread regex pattern");
    static ref DIGIT_SEPARATOR: Regex =
        Regex::new(r"([0-9])[,\s]([0-9])").expect("Invalid digit separator regex pattern");
    static ref VOLT_SPACING: Regex =
        Regex::new(r"([0-9])\s*[vV]").expect("Invalid volt spacing regex pattern");
    static ref AMPERE_SPACING: Regex =
        Regex::new(r"([0-9])\s*[aA]").expect("Invalid ampere spacing regex pattern");
    static ref MEGAOHM_SPACING: Regex =
        Regex::new(r"([0-9])\s*MΩ").expect("Invalid megaohm spacing regex pattern");
    static ref WHITESPACE_RUN: Regex =
        Regex::new(r"\s+").expect("Invalid whitespace regex pattern");
}

/// Normalize one raw OCR line.
///
/// The output contains only ASCII digits, `.`, `M`, `Ω`, `V`, `A` and single
/// spaces, and `normalize_ocr_line(&normalize_ocr_line(s)) == normalize_ocr_line(s)`.
///
/// # Examples
///
/// ```
/// use meter_scan::text_normalization::normalize_ocr_line;
///
/// assert_eq!(normalize_ocr_line("12 8 V"), "12.8V");
/// assert_eq!(normalize_ocr_line("M0 45"), "MΩ 45");
/// assert_eq!(normalize_ocr_line("1O5 v"), "105V");
/// ```
pub fn normalize_ocr_line(raw: &str) -> String {
    let mut current = normalization_pass(raw);

    for _ in 1..MAX_NORMALIZATION_PASSES {
        let next = normalization_pass(&current);
        if next == current {
            trace!(raw = %raw, normalized = %current, "Normalized OCR line");
            return current;
        }
        current = next;
    }

    warn!(
        raw = %raw,
        normalized = %current,
        "OCR line normalization did not settle within {} passes",
        MAX_NORMALIZATION_PASSES
    );
    current
}

/// Normalize every line, keeping cardinality and order (lines may become empty).
pub fn normalize_lines<S: AsRef<str>>(raw_lines: &[S]) -> Vec<String> {
    raw_lines
        .iter()
        .map(|line| normalize_ocr_line(line.as_ref()))
        .collect()
}

/// Whether a character survives the final filter.
pub fn is_retained_char(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '.' | 'M' | 'Ω' | 'V' | 'A' | ' ')
}

/// One pass of the ordered rule sequence.
fn normalization_pass(input: &str) -> String {
    let text = input.replace('°', "");
    let text = MEGAOHM_MISREAD.replace_all(&text, "MΩ");
    let text = repair_confusable(&text, &['O'], '0');
    let text = repair_confusable(&text, &['b', 'B'], '8');
    let text = text.replace(['d', 'D'], "0");
    let text = DIGIT_SEPARATOR.replace_all(&text, "${1}.${2}");
    let text = VOLT_SPACING.replace_all(&text, "${1}V");
    let text = AMPERE_SPACING.replace_all(&text, "${1}A");
    let text = MEGAOHM_SPACING.replace_all(&text, "${1}MΩ");
    let text = WHITESPACE_RUN.replace_all(&text, " ");
    let filtered: String = text.chars().filter(|&c| is_retained_char(c)).collect();

    filtered.trim().to_string()
}

/// Replace `letters` with `digit` when the letter touches a digit or stands alone.
///
/// The left neighbour is read from the already repaired output, so runs like
/// `1OO` resolve in a single pass.
fn repair_confusable(text: &str, letters: &[char], digit: char) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut repaired = String::with_capacity(text.len());
    let mut prev: Option<char> = None;

    for (i, &c) in chars.iter().enumerate() {
        let mut out = c;
        if letters.contains(&c) {
            let next = chars.get(i + 1).copied();
            let touches_digit = prev.is_some_and(|p| p.is_ascii_digit())
                || next.is_some_and(|n| n.is_ascii_digit());
            let standalone = !prev.is_some_and(char::is_alphanumeric)
                && !next.is_some_and(char::is_alphanumeric);
            if touches_digit || standalone {
                out = digit;
            }
        }
        repaired.push(out);
        prev = Some(out);
    }

    repaired
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_inside_number_becomes_decimal_point() {
        assert_eq!(normalize_ocr_line("12 8 V"), "12.8V");
        assert_eq!(normalize_ocr_line("12 8V"), "12.8V");
    }

    #[test]
    fn test_comma_decimal() {
        assert_eq!(normalize_ocr_line("230,5 V"), "230.5V");
    }

    #[test]
    fn test_megaohm_misreads() {
        assert_eq!(normalize_ocr_line("M0 45"), "MΩ 45");
        assert_eq!(normalize_ocr_line("0.45 MQ"), "0.45MΩ");
        assert_eq!(normalize_ocr_line("12.5 Mohm"), "12.5MΩ");
        assert_eq!(normalize_ocr_line("12.5 M0hm"), "12.5MΩ");
        assert_eq!(normalize_ocr_line("7 M0Ω"), "7MΩ");
    }

    #[test]
    fn test_letter_o_repair() {
        assert_eq!(normalize_ocr_line("1O5V"), "105V");
        assert_eq!(normalize_ocr_line("O"), "0");
        assert_eq!(normalize_ocr_line("1OO"), "100");
        // O inside a word is not a digit
        assert_eq!(normalize_ocr_line("VOLT"), "V");
    }

    #[test]
    fn test_letter_b_and_d_repair() {
        assert_eq!(normalize_ocr_line("b5"), "85");
        assert_eq!(normalize_ocr_line("2B"), "28");
        assert_eq!(normalize_ocr_line("1d5"), "105");
    }

    #[test]
    fn test_lowercase_units_are_upper_cased() {
        assert_eq!(normalize_ocr_line("5.2 a"), "5.2A");
        assert_eq!(normalize_ocr_line("230 v"), "230V");
    }

    #[test]
    fn test_degree_sign_and_noise_are_dropped() {
        assert_eq!(normalize_ocr_line("°C 25"), "25");
        assert_eq!(normalize_ocr_line("U= 230 V  I= 5.2 A"), "230V 5.2A");
    }

    #[test]
    fn test_output_only_contains_retained_characters() {
        let out = normalize_ocr_line("Hz: 50 ~ R=0,45 MΩ !! x#");
        assert!(out.chars().all(is_retained_char));
        assert!(!out.starts_with(' ') && !out.ends_with(' '));
        assert!(!out.contains("  "));
    }

    #[test]
    fn test_empty_and_garbage_lines() {
        assert_eq!(normalize_ocr_line(""), "");
        assert_eq!(normalize_ocr_line("~~~"), "");
    }

    #[test]
    fn test_idempotent_on_tricky_inputs() {
        let inputs = [
            "12 8 V",
            "M0 45",
            "MX0 1",
            "1 x 2",
            "1 2 3 4 5",
            "OO1",
            "Md 5",
            "b b b",
            "230V5.2A0.45MΩ",
            " 1 , 2 ; 3 ",
            "Mohm Mohm 0 O o",
            "ΩΩ MM 00",
        ];
        for input in inputs {
            let once = normalize_ocr_line(input);
            assert_eq!(normalize_ocr_line(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn test_normalize_lines_keeps_cardinality() {
        let lines = vec!["230 V".to_string(), "~".to_string(), "5,2 A".to_string()];
        let normalized = normalize_lines(&lines);
        assert_eq!(normalized, vec!["230V", "", "5.2A"]);
    }
}
