//! # Survey Tests
//!
//! Records, critical-value alerts, persistence and the three export formats
//! working together on one small survey.

use meter_scan::cable_labels::CableLabelMode;
use meter_scan::export::{render, ExportFormat, UTF8_BOM};
use meter_scan::measurement_extraction::MeasurementExtractor;
use meter_scan::records::{CableMeasurement, ReadingAlert, SurveyData};
use meter_scan::store::{PhotoStore, SurveyStore};

fn reading(inverter: &str, cable: &str, v: &str, a: &str, r: &str) -> CableMeasurement {
    CableMeasurement {
        voltage: v.to_string(),
        current: a.to_string(),
        resistance: r.to_string(),
        ..CableMeasurement::new(inverter, cable)
    }
}

/// Inverter 10 is added first but must be exported after inverter 2
fn sample_survey() -> SurveyData {
    let mut survey = SurveyData::default();
    survey.add_measurement(reading("10", "A", "800", "", "1500"));
    survey.add_measurement(reading("2", "A", "650", "5", "45"));
    survey.add_measurement(reading("2", "B", "800", "5.2", "65").with_note("Spatny konektor"));
    survey
}

#[test]
fn test_alerts_are_computed_when_added() {
    let survey = sample_survey();
    let alerts: Vec<&[ReadingAlert]> = survey
        .measurements
        .iter()
        .map(|m| m.alerts.as_slice())
        .collect();
    assert_eq!(
        alerts,
        vec![
            &[ReadingAlert::HighResistance][..],
            &[ReadingAlert::LowVoltage][..],
            &[ReadingAlert::BadConnector][..],
        ]
    );
}

#[test]
fn test_text_export() {
    let text = render(ExportFormat::Text, &sample_survey()).unwrap();
    assert_eq!(
        text,
        "Inverter 2\n\
         \n\
         2-A-650V-5A-45MOhm - low voltage\n\
         2-B-800V-5.2A-65MOhm - bad connector | bad connector\n\
         \n\
         Inverter 10\n\
         \n\
         10-A-800V-1500MOhm - high resistance\n"
    );
}

#[test]
fn test_single_column_csv_export() {
    let csv = render(ExportFormat::CsvSingleColumn, &sample_survey()).unwrap();
    let expected = [
        "\"Inverter 2\"",
        "\"\"",
        "\"2-A-650V-5A-45MOhm - low voltage\"",
        "\"2-B-800V-5.2A-65MOhm - bad connector | bad connector\"",
        "\"\"",
        "\"Inverter 10\"",
        "\"\"",
        "\"10-A-800V-1500MOhm - high resistance\"",
        "\"\"",
    ]
    .join("\r\n");
    assert_eq!(csv, format!("{}{}", UTF8_BOM, expected));
}

#[test]
fn test_multi_column_csv_export() {
    let csv = render(ExportFormat::CsvColumns, &sample_survey()).unwrap();
    let expected = [
        "Inverter;Cable;Voltage;Current;Resistance;Errors",
        "Inverter 2;;;;;",
        "2;A;650V;5A;45MOhm;low voltage",
        "2;B;800V;5.2A;65MOhm;bad connector",
        ";;;;;",
        "Inverter 10;;;;;",
        "10;A;800V;;1500MOhm;high resistance",
        ";;;;;",
    ]
    .join("\r\n");
    assert_eq!(csv, format!("{}{}", UTF8_BOM, expected));
}

#[test]
fn test_multi_column_csv_uses_current_critical_values() {
    let mut survey = sample_survey();
    survey.critical_values.max_resistance = 2000.0;

    let csv = render(ExportFormat::CsvColumns, &survey).unwrap();
    assert!(csv.contains("\r\n10;A;800V;;1500MOhm;\r\n"));

    // Text export keeps the alerts stored with each reading
    let text = render(ExportFormat::Text, &survey).unwrap();
    assert!(text.contains("10-A-800V-1500MOhm - high resistance"));
}

#[test]
fn test_low_voltage_note_is_not_reported_twice() {
    let mut survey = SurveyData::default();
    let record = survey
        .add_measurement(reading("1", "A", "600", "", "").with_note("nizke napeti"))
        .clone();
    assert_eq!(record.alerts, vec![ReadingAlert::LowVoltage]);
}

#[test]
fn test_next_cable_label_follows_recorded_cables() {
    let mut survey = sample_survey();
    assert_eq!(survey.next_cable_label("2").as_deref(), Some("C"));
    assert_eq!(survey.next_cable_label("10").as_deref(), Some("B"));
    assert_eq!(survey.next_cable_label("7").as_deref(), Some("A"));

    survey.label_mode = CableLabelMode::Numeric("1-2".to_string());
    survey.add_measurement(reading("3", "1", "", "", ""));
    survey.add_measurement(reading("3", "2", "", "", ""));
    assert_eq!(survey.next_cable_label("3"), None);
}

#[test]
fn test_store_keeps_survey_between_runs() {
    let dir = tempfile::tempdir().unwrap();
    let store = SurveyStore::new(dir.path().join("survey.json"));

    let mut survey = sample_survey();
    survey.label_mode = CableLabelMode::Custom("A1-B3".to_string());
    survey.cable_count = 6;
    store.save(&survey).unwrap();

    let loaded = SurveyStore::new(dir.path().join("survey.json")).load().unwrap();
    assert_eq!(loaded, survey);
    assert_eq!(
        loaded.cable_labels(),
        vec!["A1", "A2", "A3", "B1", "B2", "B3"]
    );
    assert_eq!(
        render(ExportFormat::Text, &loaded).unwrap(),
        render(ExportFormat::Text, &survey).unwrap()
    );
}

#[test]
fn test_scanned_reading_recorded_with_labeled_photo() {
    let dir = tempfile::tempdir().unwrap();
    let photo = dir.path().join("IMG_2040.jpg");
    std::fs::write(&photo, b"jpeg").unwrap();

    let report = MeasurementExtractor::default()
        .extract(&["789", "5.2", "65"])
        .unwrap();
    let photos = PhotoStore::new(dir.path().join("photos"));
    let stored = photos
        .save_labeled_photo(&photo, &PhotoStore::photo_label("4", "B"))
        .unwrap();

    let mut survey = SurveyData::default();
    let record = survey
        .add_measurement(CableMeasurement::from_extraction("4", "B", &report.result).with_photo(stored))
        .clone();

    assert_eq!(record.voltage, "789");
    assert_eq!(record.current, "5.2");
    assert_eq!(record.resistance, "65");
    assert!(record.alerts.is_empty());
    assert_eq!(
        record.photo_path.as_deref(),
        Some(dir.path().join("photos").join("4-B.jpg").as_path())
    );
}

#[test]
fn test_recalculated_alerts_reach_every_export() {
    let mut survey = sample_survey();
    survey.critical_values.max_resistance = 2000.0;
    survey.critical_values.min_voltage = 600.0;
    assert_eq!(survey.recalculate_alerts(), 2);

    let text = render(ExportFormat::Text, &survey).unwrap();
    assert!(text.contains("2-A-650V-5A-45MOhm\n"));
    assert!(text.contains("10-A-800V-1500MOhm\n"));

    let single = render(ExportFormat::CsvSingleColumn, &survey).unwrap();
    assert!(!single.contains("high resistance"));
    assert!(!single.contains("low voltage"));
    assert!(single.contains("\"2-B-800V-5.2A-65MOhm - bad connector | bad connector\""));
}

#[test]
fn test_edit_and_delete_through_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = SurveyStore::new(dir.path().join("survey.json"));
    store.save(&sample_survey()).unwrap();

    let alerts = store
        .update(|survey| {
            survey
                .edit_measurement("2", "A", |m| m.voltage = "750".to_string())
                .map(|m| m.alerts.clone())
        })
        .unwrap();
    assert_eq!(alerts, Some(vec![]));

    let removed = store
        .update(|survey| survey.remove_measurement("10", "A"))
        .unwrap()
        .unwrap();
    assert_eq!(removed.resistance, "1500");

    let loaded = store.load().unwrap();
    assert_eq!(loaded.measurements.len(), 2);
    assert_eq!(
        render(ExportFormat::Text, &loaded).unwrap(),
        "Inverter 2\n\
         \n\
         2-A-750V-5A-45MOhm\n\
         2-B-800V-5.2A-65MOhm - bad connector | bad connector\n"
    );
}
