//! # Measurement Extraction Module
//!
//! Turns the raw text lines recognized on a meter display into the three
//! fields of an [`ExtractionResult`]: voltage, current and insulation
//! resistance.
//!
//! ## Strategies
//!
//! Extraction is a fold over an ordered list of strategies. Each strategy is
//! a pure function taking the partial result and the normalized lines and
//! returning a new partial result. A strategy only fills fields that are
//! still empty, so earlier (more reliable) strategies always win:
//!
//! 1. **Unit-anchored**: a number directly followed by its unit (`230V`,
//!    `5.2A`, `0.45MΩ`), or for resistance a unit-leading reading (`MΩ 45`)
//! 2. **Positional**: remaining numbers in reading order fill the empty
//!    fields in voltage, current, resistance order
//! 3. **Statistical**: with at least three distinct values on the display,
//!    the largest is taken as voltage, the smallest as resistance and the
//!    first other value as current
//!
//! A final post-pass repairs letter/digit confusions and decimal points once
//! more, and drops any value that is still not a decimal numeral. A field
//! that cannot be determined stays empty; it is never guessed as zero.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::decimal_repair::{
    is_decimal_numeral, smart_fix_decimal, FieldRange, MeasurementField, RepairRanges,
};
use crate::ocr_errors::OcrError;
use crate::text_normalization::normalize_lines;

/// Minimum number of distinct values needed by the statistical strategy
pub const MIN_STATISTICAL_VALUES: usize = 3;

lazy_static! {
    static ref VOLTAGE_READING: Regex =
        Regex::new(r"([0-9]+(?:\.[0-9]+)*)\s*V").expect("Invalid voltage regex pattern");
    static ref CURRENT_READING: Regex =
        Regex::new(r"([0-9]+(?:\.[0-9]+)*)\s*A").expect("Invalid current regex pattern");
    static ref RESISTANCE_READING: Regex =
        Regex::new(r"([0-9]+(?:\.[0-9]+)*)\s*MΩ").expect("Invalid resistance regex pattern");
    static ref RESISTANCE_LEADING_UNIT: Regex =
        Regex::new(r"MΩ\s*([0-9]+(?:\.[0-9]+)*)").expect("Invalid leading unit regex pattern");
    static ref NUMBER_TOKEN: Regex =
        Regex::new(r"[0-9]+(?:[.,\s][0-9]+)?").expect("Invalid number token regex pattern");
    static ref STATISTICAL_NUMBER: Regex =
        Regex::new(r"[0-9]{1,4}(?:\.[0-9]+)?").expect("Invalid statistical number regex pattern");
    static ref INNER_SEPARATOR: Regex =
        Regex::new(r"[,\s]+").expect("Invalid separator regex pattern");
}

/// Which strategy produced a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    UnitAnchored,
    Positional,
    Statistical,
}

impl ExtractionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStrategy::UnitAnchored => "unit_anchored",
            ExtractionStrategy::Positional => "positional",
            ExtractionStrategy::Statistical => "statistical",
        }
    }
}

impl fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value proposed for one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateValue {
    pub field: MeasurementField,
    pub value: String,
    pub strategy: ExtractionStrategy,
    /// Whether `value` lies within the field's repair range
    pub in_range: bool,
}

impl CandidateValue {
    fn new(value: String, strategy: ExtractionStrategy, range: &FieldRange) -> Self {
        let in_range = range.contains_str(&value);
        Self {
            field: range.field,
            value,
            strategy,
            in_range,
        }
    }
}

/// The three extracted fields; an empty string means "not found"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub voltage: String,
    pub current: String,
    pub resistance: String,
}

impl ExtractionResult {
    pub fn get(&self, field: MeasurementField) -> &str {
        match field {
            MeasurementField::Voltage => &self.voltage,
            MeasurementField::Current => &self.current,
            MeasurementField::Resistance => &self.resistance,
        }
    }

    fn slot_mut(&mut self, field: MeasurementField) -> &mut String {
        match field {
            MeasurementField::Voltage => &mut self.voltage,
            MeasurementField::Current => &mut self.current,
            MeasurementField::Resistance => &mut self.resistance,
        }
    }

    /// Number of fields that were found
    pub fn found_count(&self) -> usize {
        MeasurementField::ALL
            .iter()
            .filter(|field| !self.get(**field).is_empty())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.found_count() == 0
    }

    pub fn is_complete(&self) -> bool {
        self.found_count() == MeasurementField::ALL.len()
    }
}

/// Byte span of a number on a normalized line that a strategy already used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumedSpan {
    pub line: usize,
    pub start: usize,
    pub end: usize,
}

impl ConsumedSpan {
    fn overlaps(&self, line: usize, start: usize, end: usize) -> bool {
        self.line == line && start < self.end && self.start < end
    }
}

/// Accumulated state threaded through the strategies
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialExtraction {
    candidates: [Option<CandidateValue>; 3],
    consumed: Vec<ConsumedSpan>,
}

impl PartialExtraction {
    pub fn get(&self, field: MeasurementField) -> Option<&CandidateValue> {
        self.candidates[field.index()].as_ref()
    }

    pub fn is_filled(&self, field: MeasurementField) -> bool {
        self.get(field).is_some()
    }

    /// Fields no strategy has filled yet, in extraction order
    pub fn empty_fields(&self) -> Vec<MeasurementField> {
        MeasurementField::ALL
            .into_iter()
            .filter(|field| !self.is_filled(*field))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.empty_fields().is_empty()
    }

    pub fn candidates(&self) -> impl Iterator<Item = &CandidateValue> {
        self.candidates.iter().flatten()
    }

    pub fn consumed_spans(&self) -> &[ConsumedSpan] {
        &self.consumed
    }

    /// Fill `field` unless a previous strategy already did
    fn fill(&mut self, candidate: CandidateValue) -> bool {
        let slot = &mut self.candidates[candidate.field.index()];
        if slot.is_some() {
            return false;
        }
        debug!(
            field = %candidate.field,
            value = %candidate.value,
            strategy = %candidate.strategy,
            in_range = candidate.in_range,
            "Filled measurement field"
        );
        *slot = Some(candidate);
        true
    }

    fn consume(&mut self, line: usize, start: usize, end: usize) {
        self.consumed.push(ConsumedSpan { line, start, end });
    }

    fn is_consumed(&self, line: usize, start: usize, end: usize) -> bool {
        self.consumed
            .iter()
            .any(|span| span.overlaps(line, start, end))
    }

    fn take(&mut self, field: MeasurementField) -> Option<CandidateValue> {
        self.candidates[field.index()].take()
    }
}

/// A strategy step: `(partial, normalized lines, ranges) -> partial`
pub type ExtractionStage = fn(PartialExtraction, &[String], &RepairRanges) -> PartialExtraction;

/// Strategies in the order they are folded
pub const EXTRACTION_STAGES: [(ExtractionStrategy, ExtractionStage); 3] = [
    (ExtractionStrategy::UnitAnchored, unit_anchored_stage),
    (ExtractionStrategy::Positional, positional_stage),
    (ExtractionStrategy::Statistical, statistical_stage),
];

/// Everything the extractor learned from one set of lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub result: ExtractionResult,
    /// Final value per found field together with the strategy that found it
    pub candidates: Vec<CandidateValue>,
    pub normalized_lines: Vec<String>,
}

/// Pure, synchronous measurement extractor
#[derive(Debug, Clone, Default)]
pub struct MeasurementExtractor {
    ranges: RepairRanges,
}

impl MeasurementExtractor {
    pub fn new(ranges: RepairRanges) -> Self {
        Self { ranges }
    }

    pub fn ranges(&self) -> &RepairRanges {
        &self.ranges
    }

    /// Extract voltage, current and resistance from raw recognizer lines.
    ///
    /// # Arguments
    ///
    /// * `raw_lines` - Lines in the order the recognizer returned them
    ///
    /// # Returns
    ///
    /// An [`ExtractionReport`] whose result may be partial or even empty, or
    /// [`OcrError::NoText`] when the recognizer produced no lines at all.
    pub fn extract<S: AsRef<str>>(&self, raw_lines: &[S]) -> Result<ExtractionReport, OcrError> {
        if raw_lines.is_empty() {
            return Err(OcrError::NoText(
                "recognizer returned no lines".to_string(),
            ));
        }

        let normalized_lines = normalize_lines(raw_lines);
        let partial = self.run_stages(&normalized_lines);
        let partial = post_pass(partial, &self.ranges);

        let mut result = ExtractionResult::default();
        let mut candidates = Vec::new();
        for candidate in partial.candidates() {
            *result.slot_mut(candidate.field) = candidate.value.clone();
            candidates.push(candidate.clone());
        }

        debug!(
            lines = normalized_lines.len(),
            found = result.found_count(),
            voltage = %result.voltage,
            current = %result.current,
            resistance = %result.resistance,
            "Measurement extraction finished"
        );

        Ok(ExtractionReport {
            result,
            candidates,
            normalized_lines,
        })
    }

    /// Fold the strategies over already normalized lines
    pub fn run_stages(&self, normalized_lines: &[String]) -> PartialExtraction {
        EXTRACTION_STAGES
            .iter()
            .fold(PartialExtraction::default(), |partial, (strategy, stage)| {
                if partial.is_complete() {
                    return partial;
                }
                debug!(strategy = %strategy, empty = ?partial.empty_fields(), "Running extraction strategy");
                stage(partial, normalized_lines, &self.ranges)
            })
    }
}

fn unit_regex(field: MeasurementField) -> &'static Regex {
    match field {
        MeasurementField::Voltage => &VOLTAGE_READING,
        MeasurementField::Current => &CURRENT_READING,
        MeasurementField::Resistance => &RESISTANCE_READING,
    }
}

/// Numbers immediately followed by their unit; first line wins per field
pub fn unit_anchored_stage(
    mut partial: PartialExtraction,
    lines: &[String],
    ranges: &RepairRanges,
) -> PartialExtraction {
    for field in MeasurementField::ALL {
        if partial.is_filled(field) {
            continue;
        }
        let range = ranges.for_field(field);
        let mut found = find_unit_reading(&partial, lines, unit_regex(field));
        if found.is_none() && field == MeasurementField::Resistance {
            found = find_unit_reading(&partial, lines, &RESISTANCE_LEADING_UNIT);
        }
        if let Some((line, start, end)) = found {
            let value = smart_fix_decimal(&lines[line][start..end], range);
            partial.consume(line, start, end);
            partial.fill(CandidateValue::new(
                value,
                ExtractionStrategy::UnitAnchored,
                range,
            ));
        }
    }
    partial
}

/// First unconsumed capture of `pattern` in line order
fn find_unit_reading(
    partial: &PartialExtraction,
    lines: &[String],
    pattern: &Regex,
) -> Option<(usize, usize, usize)> {
    lines.iter().enumerate().find_map(|(index, line)| {
        pattern
            .captures_iter(line)
            .filter_map(|caps| caps.get(1))
            .find(|number| !partial.is_consumed(index, number.start(), number.end()))
            .map(|number| (index, number.start(), number.end()))
    })
}

/// Remaining numbers in reading order fill the empty fields in order
pub fn positional_stage(
    mut partial: PartialExtraction,
    lines: &[String],
    ranges: &RepairRanges,
) -> PartialExtraction {
    let mut numbers = Vec::new();
    for (index, line) in lines.iter().enumerate() {
        for token in NUMBER_TOKEN.find_iter(line) {
            if partial.is_consumed(index, token.start(), token.end()) {
                continue;
            }
            numbers.push((index, token.start(), token.end(), token.as_str()));
        }
    }

    let mut remaining = numbers.into_iter();
    for field in partial.empty_fields() {
        let Some((line, start, end, token)) = remaining.next() else {
            break;
        };
        let range = ranges.for_field(field);
        let dotted = INNER_SEPARATOR.replace_all(token, ".");
        let value = smart_fix_decimal(&dotted, range);
        partial.consume(line, start, end);
        partial.fill(CandidateValue::new(value, ExtractionStrategy::Positional, range));
    }
    partial
}

/// Largest value is voltage, smallest is resistance, first other is current
pub fn statistical_stage(
    mut partial: PartialExtraction,
    lines: &[String],
    ranges: &RepairRanges,
) -> PartialExtraction {
    let joined = lines.join(" ");
    let values: Vec<(&str, f64)> = STATISTICAL_NUMBER
        .find_iter(&joined)
        .filter_map(|m| m.as_str().parse::<f64>().ok().map(|v| (m.as_str(), v)))
        .collect();

    let mut distinct: Vec<f64> = values.iter().map(|(_, v)| *v).collect();
    distinct.sort_by(f64::total_cmp);
    distinct.dedup();
    if distinct.len() < MIN_STATISTICAL_VALUES {
        debug!(
            distinct = distinct.len(),
            "Not enough distinct values for statistical extraction"
        );
        return partial;
    }

    let (min, max) = (distinct[0], distinct[distinct.len() - 1]);
    let token_for = |predicate: &dyn Fn(f64) -> bool| {
        values
            .iter()
            .find(|(_, v)| predicate(*v))
            .map(|(text, _)| text.to_string())
    };

    let assignments = [
        (MeasurementField::Voltage, token_for(&|v: f64| v == max)),
        (MeasurementField::Current, token_for(&|v: f64| v != max && v != min)),
        (MeasurementField::Resistance, token_for(&|v: f64| v == min)),
    ];
    for (field, token) in assignments {
        if partial.is_filled(field) {
            continue;
        }
        if let Some(value) = token {
            partial.fill(CandidateValue::new(
                value,
                ExtractionStrategy::Statistical,
                ranges.for_field(field),
            ));
        }
    }
    partial
}

/// Letter/digit repair and decimal repair once more; non-numerals are dropped
fn post_pass(mut partial: PartialExtraction, ranges: &RepairRanges) -> PartialExtraction {
    for field in MeasurementField::ALL {
        let Some(candidate) = partial.take(field) else {
            continue;
        };
        let range = ranges.for_field(field);
        let repaired = smart_fix_decimal(&repair_confusable_characters(&candidate.value), range);
        if is_decimal_numeral(&repaired) {
            partial.fill(CandidateValue::new(repaired, candidate.strategy, range));
        } else {
            debug!(
                field = %field,
                value = %repaired,
                "Dropping value that is not a decimal numeral"
            );
        }
    }
    partial
}

/// Map characters OCR confuses with digits or decimal points
pub fn repair_confusable_characters(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            'O' | 'o' | 'D' | 'd' => '0',
            'b' | 'B' => '8',
            ',' | ';' => '.',
            other => other,
        })
        .collect()
}
