//! # Export Module
//!
//! Renders a survey for sharing: a plain text report, a single-column CSV
//! (one report line per cell) and a CSV with one column per reading. CSV
//! files start with a UTF-8 byte order mark and use CRLF line endings so that
//! spreadsheet applications open them correctly.

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use tracing::info;

use crate::errors::{AppError, AppResult};
use crate::records::{group_by_inverter, CableMeasurement, CriticalValues, SurveyData};

/// Prepended to CSV exports
pub const UTF8_BOM: &str = "\u{FEFF}";

/// Column headers of the multi-column CSV export
pub const CSV_HEADERS: [&str; 6] = ["Inverter", "Cable", "Voltage", "Current", "Resistance", "Errors"];

lazy_static! {
    static ref CZECH_LOW_VOLTAGE: Regex =
        Regex::new(r"(?i)nizke napeti").expect("Invalid note phrase regex pattern");
    static ref CZECH_BAD_CONNECTOR: Regex =
        Regex::new(r"(?i)spatny konektor").expect("Invalid note phrase regex pattern");
}

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Plain text report grouped by inverter
    Text,
    /// CSV with each report line quoted in a single column
    CsvSingleColumn,
    /// `;`-separated CSV with one column per reading
    CsvColumns,
}

impl ExportFormat {
    pub fn file_extension(&self) -> &'static str {
        match self {
            ExportFormat::Text => "txt",
            ExportFormat::CsvSingleColumn | ExportFormat::CsvColumns => "csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Text => write!(f, "txt"),
            ExportFormat::CsvSingleColumn => write!(f, "csv-single"),
            ExportFormat::CsvColumns => write!(f, "csv"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "txt" | "text" => Ok(ExportFormat::Text),
            "csv-single" | "csv1" => Ok(ExportFormat::CsvSingleColumn),
            "csv" | "csv-columns" => Ok(ExportFormat::CsvColumns),
            other => Err(AppError::Validation(format!(
                "unknown export format '{}' (expected txt, csv-single or csv)",
                other
            ))),
        }
    }
}

/// Render `survey` in `format`.
///
/// # Errors
///
/// Returns [`AppError::Export`] when the survey has no measurements or the
/// CSV writer fails.
pub fn render(format: ExportFormat, survey: &SurveyData) -> AppResult<String> {
    if survey.measurements.is_empty() {
        return Err(AppError::Export("nothing to export".to_string()));
    }

    let rendered = match format {
        ExportFormat::Text => render_text(survey),
        ExportFormat::CsvSingleColumn => render_csv_single_column(survey)?,
        ExportFormat::CsvColumns => render_csv_columns(survey)?,
    };

    info!(
        format = %format,
        measurements = survey.measurements.len(),
        bytes = rendered.len(),
        "Rendered survey export"
    );
    Ok(rendered)
}

/// `inverter-cable-230V-5.2A-65MOhm - note | alerts`
pub fn report_line(record: &CableMeasurement) -> String {
    let readings = [
        (record.voltage.as_str(), "V"),
        (record.current.as_str(), "A"),
        (record.resistance.as_str(), "MOhm"),
    ];
    let parts: Vec<String> = [record.inverter.clone(), record.cable_label.clone()]
        .into_iter()
        .chain(
            readings
                .iter()
                .filter(|(value, _)| !value.is_empty())
                .map(|(value, unit)| format!("{}{}", value, unit)),
        )
        .filter(|part| !part.is_empty())
        .collect();
    let mut line = parts.join("-");

    let mut notes = Vec::new();
    if !record.note.trim().is_empty() {
        notes.push(english_note(&record.note));
    }
    if !record.alerts.is_empty() {
        let labels: Vec<&str> = record.alerts.iter().map(|a| a.label()).collect();
        notes.push(labels.join("; "));
    }
    if !notes.is_empty() {
        line.push_str(" - ");
        line.push_str(&notes.join(" | "));
    }
    line
}

/// Replace the Czech note phrases with their English counterparts
pub fn english_note(note: &str) -> String {
    let note = CZECH_LOW_VOLTAGE.replace_all(note, "low voltage");
    CZECH_BAD_CONNECTOR
        .replace_all(&note, "bad connector")
        .into_owned()
}

fn inverter_heading(inverter: &str) -> String {
    format!("Inverter {}", inverter)
}

fn render_text(survey: &SurveyData) -> String {
    let mut lines = Vec::new();
    for (inverter, records) in group_by_inverter(&survey.measurements) {
        lines.push(inverter_heading(&inverter));
        lines.push(String::new());
        lines.extend(records.into_iter().map(report_line));
        lines.push(String::new());
    }
    lines.join("\n")
}

fn csv_error(e: impl fmt::Display) -> AppError {
    AppError::Export(format!("CSV writer failed: {}", e))
}

fn finish_csv(writer: csv::Writer<Vec<u8>>) -> AppResult<String> {
    let bytes = writer.into_inner().map_err(csv_error)?;
    let mut body = String::from_utf8(bytes).map_err(csv_error)?;
    // Rows are separated, not terminated
    if body.ends_with("\r\n") {
        body.truncate(body.len() - 2);
    }
    Ok(format!("{}{}", UTF8_BOM, body))
}

fn render_csv_single_column(survey: &SurveyData) -> AppResult<String> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());

    for (inverter, records) in group_by_inverter(&survey.measurements) {
        writer.write_record([inverter_heading(&inverter)])?;
        writer.write_record([""])?;
        for record in records {
            writer.write_record([report_line(record)])?;
        }
        writer.write_record([""])?;
    }

    finish_csv(writer)
}

/// Alerts for the multi-column export, computed against the current critical values
fn alert_cell(record: &CableMeasurement, critical: &CriticalValues) -> String {
    let labels: Vec<&str> = critical
        .alerts_for(record)
        .iter()
        .map(|a| a.label())
        .collect();
    labels.join("; ")
}

fn with_unit(value: &str, unit: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        format!("{}{}", value, unit)
    }
}

fn render_csv_columns(survey: &SurveyData) -> AppResult<String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());

    writer.write_record(CSV_HEADERS)?;
    let empty_row = [""; 6];

    for (inverter, records) in group_by_inverter(&survey.measurements) {
        let heading = inverter_heading(&inverter);
        writer.write_record([heading.as_str(), "", "", "", "", ""])?;
        for record in records {
            writer.write_record([
                record.inverter.clone(),
                record.cable_label.clone(),
                with_unit(&record.voltage, "V"),
                with_unit(&record.current, "A"),
                with_unit(&record.resistance, "MOhm"),
                alert_cell(record, &survey.critical_values),
            ])?;
        }
        writer.write_record(empty_row)?;
    }

    finish_csv(writer)
}
