//! # Measurement Records Module
//!
//! A survey is a list of per-cable readings grouped by inverter. Each reading
//! is checked against the user's critical values; readings outside them, and
//! notes that mention a faulty connector or low voltage, raise alerts that
//! end up in the export.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::cable_labels::{generate_cable_labels, CableLabelMode};
use crate::errors::{AppError, AppResult};
use crate::measurement_extraction::ExtractionResult;

/// Cables per inverter assumed until the user says otherwise
pub const DEFAULT_CABLE_COUNT: usize = 6;

/// Note phrases (English and Czech) that mean a bad connector
pub const BAD_CONNECTOR_PHRASES: [&str; 2] = ["bad connector", "spatny konektor"];
/// Note phrases (English and Czech) that mean low voltage
pub const LOW_VOLTAGE_PHRASES: [&str; 2] = ["low voltage", "nizke napeti"];

/// One row of the survey: the readings of a single cable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CableMeasurement {
    pub inverter: String,
    pub cable_label: String,
    #[serde(default)]
    pub voltage: String,
    #[serde(default)]
    pub current: String,
    #[serde(default)]
    pub resistance: String,
    #[serde(default)]
    pub note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_path: Option<PathBuf>,
    /// Alerts computed against the critical values in force when the reading was saved
    #[serde(default)]
    pub alerts: Vec<ReadingAlert>,
    pub recorded_at: DateTime<Utc>,
}

impl CableMeasurement {
    pub fn new(inverter: impl Into<String>, cable_label: impl Into<String>) -> Self {
        Self {
            inverter: inverter.into(),
            cable_label: cable_label.into(),
            voltage: String::new(),
            current: String::new(),
            resistance: String::new(),
            note: String::new(),
            photo_path: None,
            alerts: Vec::new(),
            recorded_at: Utc::now(),
        }
    }

    /// Build a record from a scan result
    pub fn from_extraction(
        inverter: impl Into<String>,
        cable_label: impl Into<String>,
        result: &ExtractionResult,
    ) -> Self {
        Self {
            voltage: result.voltage.clone(),
            current: result.current.clone(),
            resistance: result.resistance.clone(),
            ..Self::new(inverter, cable_label)
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    pub fn with_photo(mut self, photo_path: PathBuf) -> Self {
        self.photo_path = Some(photo_path);
        self
    }

    /// Recompute and store the alerts for `critical`
    pub fn evaluate(&mut self, critical: &CriticalValues) {
        self.alerts = critical.alerts_for(self);
    }

    pub fn has_alerts(&self) -> bool {
        !self.alerts.is_empty()
    }
}

/// Something wrong with a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingAlert {
    LowVoltage,
    HighVoltage,
    LowCurrent,
    HighCurrent,
    LowResistance,
    HighResistance,
    BadConnector,
}

impl ReadingAlert {
    pub fn label(&self) -> &'static str {
        match self {
            ReadingAlert::LowVoltage => "low voltage",
            ReadingAlert::HighVoltage => "high voltage",
            ReadingAlert::LowCurrent => "low current",
            ReadingAlert::HighCurrent => "high current",
            ReadingAlert::LowResistance => "low resistance",
            ReadingAlert::HighResistance => "high resistance",
            ReadingAlert::BadConnector => "bad connector",
        }
    }
}

impl fmt::Display for ReadingAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// User-configured acceptable ranges for the three readings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriticalValues {
    pub min_voltage: f64,
    pub max_voltage: f64,
    pub min_current: f64,
    pub max_current: f64,
    pub min_resistance: f64,
    pub max_resistance: f64,
}

impl Default for CriticalValues {
    fn default() -> Self {
        Self {
            min_voltage: 700.0,
            max_voltage: 1000.0,
            min_current: 0.0,
            max_current: 15.0,
            min_resistance: 1.0,
            max_resistance: 100.0,
        }
    }
}

impl CriticalValues {
    pub fn validate(&self) -> AppResult<()> {
        let pairs = [
            ("voltage", self.min_voltage, self.max_voltage),
            ("current", self.min_current, self.max_current),
            ("resistance", self.min_resistance, self.max_resistance),
        ];
        for (name, min, max) in pairs {
            if !min.is_finite() || !max.is_finite() {
                return Err(AppError::Validation(format!(
                    "critical {} limits must be numbers",
                    name
                )));
            }
            if min > max {
                return Err(AppError::Validation(format!(
                    "critical {} minimum ({}) is greater than maximum ({})",
                    name, min, max
                )));
            }
        }
        Ok(())
    }

    /// Alerts raised by a record's readings and note.
    ///
    /// Empty or unparsable readings raise nothing. A note mentioning low
    /// voltage adds [`ReadingAlert::LowVoltage`] only if the reading did not
    /// already raise it.
    pub fn alerts_for(&self, record: &CableMeasurement) -> Vec<ReadingAlert> {
        let mut alerts = Vec::new();

        let checks = [
            (
                &record.voltage,
                (self.min_voltage, self.max_voltage),
                (ReadingAlert::LowVoltage, ReadingAlert::HighVoltage),
            ),
            (
                &record.current,
                (self.min_current, self.max_current),
                (ReadingAlert::LowCurrent, ReadingAlert::HighCurrent),
            ),
            (
                &record.resistance,
                (self.min_resistance, self.max_resistance),
                (ReadingAlert::LowResistance, ReadingAlert::HighResistance),
            ),
        ];
        for (reading, (min, max), (low, high)) in checks {
            let Some(value) = parse_reading(reading) else {
                continue;
            };
            if value < min {
                alerts.push(low);
            }
            if value > max {
                alerts.push(high);
            }
        }

        let note = record.note.to_lowercase();
        if BAD_CONNECTOR_PHRASES.iter().any(|p| note.contains(p)) {
            alerts.push(ReadingAlert::BadConnector);
        }
        if LOW_VOLTAGE_PHRASES.iter().any(|p| note.contains(p))
            && !alerts.contains(&ReadingAlert::LowVoltage)
        {
            alerts.push(ReadingAlert::LowVoltage);
        }

        alerts
    }
}

/// Everything persisted for one survey
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyData {
    #[serde(default)]
    pub measurements: Vec<CableMeasurement>,
    #[serde(default)]
    pub critical_values: CriticalValues,
    #[serde(default)]
    pub label_mode: CableLabelMode,
    #[serde(default = "default_cable_count")]
    pub cable_count: usize,
}

fn default_cable_count() -> usize {
    DEFAULT_CABLE_COUNT
}

impl Default for SurveyData {
    fn default() -> Self {
        Self {
            measurements: Vec::new(),
            critical_values: CriticalValues::default(),
            label_mode: CableLabelMode::default(),
            cable_count: DEFAULT_CABLE_COUNT,
        }
    }
}

impl SurveyData {
    /// Evaluate `record` against the current critical values and append it
    pub fn add_measurement(&mut self, mut record: CableMeasurement) -> &CableMeasurement {
        record.evaluate(&self.critical_values);
        self.measurements.push(record);
        &self.measurements[self.measurements.len() - 1]
    }

    /// Most recently recorded measurement of `inverter` / `cable_label`
    pub fn find_measurement(&self, inverter: &str, cable_label: &str) -> Option<&CableMeasurement> {
        self.position_of(inverter, cable_label)
            .map(|index| &self.measurements[index])
    }

    fn position_of(&self, inverter: &str, cable_label: &str) -> Option<usize> {
        let (inverter, cable_label) = (inverter.trim(), cable_label.trim());
        self.measurements
            .iter()
            .rposition(|m| m.inverter == inverter && m.cable_label == cable_label)
    }

    /// Apply `change` to the latest measurement of the cable and re-evaluate
    /// its alerts. Returns `None` when the cable was never recorded.
    pub fn edit_measurement(
        &mut self,
        inverter: &str,
        cable_label: &str,
        change: impl FnOnce(&mut CableMeasurement),
    ) -> Option<&CableMeasurement> {
        let index = self.position_of(inverter, cable_label)?;
        let critical = self.critical_values;
        let record = &mut self.measurements[index];
        change(record);
        record.evaluate(&critical);
        Some(&*record)
    }

    /// Remove the latest measurement of the cable
    pub fn remove_measurement(&mut self, inverter: &str, cable_label: &str) -> Option<CableMeasurement> {
        let index = self.position_of(inverter, cable_label)?;
        Some(self.measurements.remove(index))
    }

    /// Re-evaluate every stored record against the current critical values.
    ///
    /// # Returns
    ///
    /// How many records ended up with different alerts
    pub fn recalculate_alerts(&mut self) -> usize {
        let critical = self.critical_values;
        self.measurements
            .iter_mut()
            .map(|record| {
                let before = std::mem::take(&mut record.alerts);
                record.evaluate(&critical);
                record.alerts != before
            })
            .filter(|changed| *changed)
            .count()
    }

    /// Labels of the configured mode and count
    pub fn cable_labels(&self) -> Vec<String> {
        generate_cable_labels(&self.label_mode, self.cable_count)
    }

    /// First configured label not yet recorded for `inverter`
    pub fn next_cable_label(&self, inverter: &str) -> Option<String> {
        self.cable_labels().into_iter().find(|label| {
            !self
                .measurements
                .iter()
                .any(|m| m.inverter == inverter && &m.cable_label == label)
        })
    }
}

/// Parse a stored reading, ignoring any unit or stray characters
pub fn parse_reading(value: &str) -> Option<f64> {
    let numeric: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if numeric.is_empty() {
        return None;
    }
    numeric.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Order inverter keys: numeric keys first in numeric order, then the rest lexically
pub fn compare_inverters(a: &str, b: &str) -> Ordering {
    let numeric = |key: &str| key.trim().parse::<f64>().ok().filter(|v| v.is_finite());
    match (numeric(a), numeric(b)) {
        (Some(na), Some(nb)) => na.total_cmp(&nb).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Group records by inverter, inverters sorted with [`compare_inverters`],
/// records kept in their original order within a group.
pub fn group_by_inverter(records: &[CableMeasurement]) -> Vec<(String, Vec<&CableMeasurement>)> {
    let mut groups: BTreeMap<&str, Vec<&CableMeasurement>> = BTreeMap::new();
    for record in records {
        groups.entry(record.inverter.as_str()).or_default().push(record);
    }

    let mut grouped: Vec<(String, Vec<&CableMeasurement>)> = groups
        .into_iter()
        .map(|(inverter, records)| (inverter.to_string(), records))
        .collect();
    grouped.sort_by(|(a, _), (b, _)| compare_inverters(a, b));
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(voltage: &str, current: &str, resistance: &str) -> CableMeasurement {
        CableMeasurement {
            voltage: voltage.to_string(),
            current: current.to_string(),
            resistance: resistance.to_string(),
            ..CableMeasurement::new("1", "A")
        }
    }

    #[test]
    fn test_readings_within_limits_raise_nothing() {
        let critical = CriticalValues::default();
        assert!(critical.alerts_for(&record("800", "9.5", "45")).is_empty());
    }

    #[test]
    fn test_out_of_range_readings() {
        let critical = CriticalValues::default();
        assert_eq!(
            critical.alerts_for(&record("650", "16", "0.5")),
            vec![
                ReadingAlert::LowVoltage,
                ReadingAlert::HighCurrent,
                ReadingAlert::LowResistance
            ]
        );
        assert_eq!(
            critical.alerts_for(&record("1100", "", "150")),
            vec![ReadingAlert::HighVoltage, ReadingAlert::HighResistance]
        );
    }

    #[test]
    fn test_empty_readings_raise_nothing() {
        let critical = CriticalValues::default();
        assert!(critical.alerts_for(&record("", "", "")).is_empty());
        assert!(critical.alerts_for(&record("--", "n/a", "")).is_empty());
    }

    #[test]
    fn test_note_alerts() {
        let critical = CriticalValues::default();
        let bad = record("800", "5", "50").with_note("Spatny konektor on the left");
        assert_eq!(critical.alerts_for(&bad), vec![ReadingAlert::BadConnector]);

        // Low voltage from the note is not duplicated
        let low = record("600", "5", "50").with_note("LOW VOLTAGE, check fuse");
        assert_eq!(critical.alerts_for(&low), vec![ReadingAlert::LowVoltage]);

        let both = record("", "", "").with_note("bad connector, nizke napeti");
        assert_eq!(
            critical.alerts_for(&both),
            vec![ReadingAlert::BadConnector, ReadingAlert::LowVoltage]
        );
    }

    #[test]
    fn test_evaluate_stores_alerts() {
        let mut r = record("1200", "5", "50");
        r.evaluate(&CriticalValues::default());
        assert!(r.has_alerts());
        assert_eq!(r.alerts, vec![ReadingAlert::HighVoltage]);
    }

    #[test]
    fn test_critical_values_validation() {
        assert!(CriticalValues::default().validate().is_ok());
        let bad = CriticalValues {
            min_current: 20.0,
            ..CriticalValues::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_parse_reading_ignores_units() {
        assert_eq!(parse_reading("65MOhm"), Some(65.0));
        assert_eq!(parse_reading("230"), Some(230.0));
        assert_eq!(parse_reading(""), None);
        assert_eq!(parse_reading("1.2.3"), None);
    }

    #[test]
    fn test_group_by_inverter_sorts_numerically() {
        let records = vec![
            CableMeasurement::new("10", "A"),
            CableMeasurement::new("2", "A"),
            CableMeasurement::new("2", "B"),
            CableMeasurement::new("North", "A"),
            CableMeasurement::new("1", "A"),
        ];
        let grouped = group_by_inverter(&records);
        let order: Vec<&str> = grouped.iter().map(|(inv, _)| inv.as_str()).collect();
        assert_eq!(order, vec!["1", "2", "10", "North"]);

        let cables: Vec<&str> = grouped[1].1.iter().map(|r| r.cable_label.as_str()).collect();
        assert_eq!(cables, vec!["A", "B"]);
    }

    #[test]
    fn test_add_measurement_evaluates_alerts() {
        let mut survey = SurveyData::default();
        let stored = survey.add_measurement(record("650", "5", "50"));
        assert_eq!(stored.alerts, vec![ReadingAlert::LowVoltage]);
        assert_eq!(survey.measurements.len(), 1);
    }

    #[test]
    fn test_next_cable_label_skips_recorded_cables() {
        let mut survey = SurveyData::default();
        assert_eq!(survey.next_cable_label("1").as_deref(), Some("A"));
        survey.add_measurement(CableMeasurement::new("1", "A"));
        survey.add_measurement(CableMeasurement::new("2", "B"));
        assert_eq!(survey.next_cable_label("1").as_deref(), Some("B"));

        survey.cable_count = 1;
        assert_eq!(survey.next_cable_label("1"), None);
    }

    #[test]
    fn test_survey_data_defaults_when_fields_missing() {
        let survey: SurveyData = serde_json::from_str("{}").unwrap();
        assert_eq!(survey, SurveyData::default());
        assert_eq!(survey.cable_count, DEFAULT_CABLE_COUNT);
    }

    #[test]
    fn test_from_extraction_copies_fields() {
        let result = ExtractionResult {
            voltage: "230".to_string(),
            current: "5.2".to_string(),
            resistance: String::new(),
        };
        let r = CableMeasurement::from_extraction("3", "B2", &result);
        assert_eq!(r.inverter, "3");
        assert_eq!(r.cable_label, "B2");
        assert_eq!(r.voltage, "230");
        assert_eq!(r.current, "5.2");
        assert!(r.resistance.is_empty());
    }

    #[test]
    fn test_edit_measurement_reclassifies_alerts() {
        let mut survey = SurveyData::default();
        survey.add_measurement(record("650", "5", "50"));

        let edited = survey
            .edit_measurement("1", " A ", |m| m.voltage = "800".to_string())
            .unwrap();
        assert_eq!(edited.voltage, "800");
        assert!(edited.alerts.is_empty());

        assert!(survey.edit_measurement("1", "B", |m| m.note.clear()).is_none());
    }

    #[test]
    fn test_edit_and_remove_target_latest_record() {
        let mut survey = SurveyData::default();
        survey.add_measurement(record("800", "5", "50"));
        survey.add_measurement(record("900", "5", "50"));

        survey.edit_measurement("1", "A", |m| m.note = "bad connector".to_string());
        assert!(survey.measurements[0].alerts.is_empty());
        assert_eq!(survey.measurements[1].alerts, vec![ReadingAlert::BadConnector]);

        let removed = survey.remove_measurement("1", "A").unwrap();
        assert_eq!(removed.voltage, "900");
        assert_eq!(survey.find_measurement("1", "A").unwrap().voltage, "800");
        assert!(survey.remove_measurement("1", "A").is_some());
        assert!(survey.remove_measurement("1", "A").is_none());
    }

    #[test]
    fn test_recalculate_alerts_after_critical_change() {
        let mut survey = SurveyData::default();
        survey.add_measurement(record("650", "5", "50"));
        survey.add_measurement(record("800", "5", "150"));
        assert_eq!(survey.recalculate_alerts(), 0);

        survey.critical_values.min_voltage = 600.0;
        survey.critical_values.max_resistance = 200.0;
        assert_eq!(survey.recalculate_alerts(), 2);
        assert!(survey.measurements.iter().all(|m| m.alerts.is_empty()));
    }
}
