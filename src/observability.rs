//! Observability module for tracing setup, spans and metrics.
//!
//! This module provides:
//! - Structured logging with configurable levels and formats
//! - Spans around each meter scan
//! - Metric helpers for OCR, preprocessing and extraction
//!
//! Metrics go through the `metrics` facade. Nothing is exported unless the
//! embedding application installs a recorder.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tracing_subscriber::prelude::*;

use crate::decimal_repair::MeasurementField;
use crate::measurement_extraction::ExtractionStrategy;
use crate::observability_config::{LogFormat, ObservabilityConfig};

/// Initialize structured logging from environment configuration
pub fn init_tracing() -> Result<()> {
    let config = ObservabilityConfig::from_env()?;
    init_tracing_with_config(&config)
}

/// Initialize structured logging with tracing and configuration
pub fn init_tracing_with_config(config: &ObservabilityConfig) -> Result<()> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid observability configuration: {}", e))?;

    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("meter_scan={}", config.log_level).parse()?)
        .add_directive("leptess=warn".parse()?);

    let log_format = config.effective_log_format();
    match log_format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
    }

    tracing::debug!(
        environment = %config.environment,
        log_level = %config.log_level,
        log_format = ?log_format,
        "Tracing initialized with structured logging"
    );
    Ok(())
}

/// Create a span for one meter scan
pub fn scan_span(image_path: &Path) -> tracing::Span {
    tracing::info_span!(
        "meter_scan",
        image_path = %image_path.display(),
        component = "pipeline"
    )
}

fn result_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

/// Record OCR operation metrics
pub fn record_ocr_metrics(success: bool, duration: Duration, line_count: usize) {
    metrics::counter!("ocr_operations_total", "result" => result_label(success)).increment(1);
    metrics::histogram!("ocr_duration_seconds").record(duration.as_secs_f64());
    metrics::histogram!("ocr_recognized_lines").record(line_count as f64);
}

/// Record preprocessing metrics; failures are fallbacks to the original photo
pub fn record_preprocessing_metrics(duration: Duration, success: bool) {
    metrics::counter!("preprocessing_operations_total", "result" => result_label(success))
        .increment(1);
    metrics::histogram!("preprocessing_duration_seconds").record(duration.as_secs_f64());
}

/// Record end-to-end scan metrics
pub fn record_scan_metrics(success: bool, fields_found: usize, duration: Duration) {
    metrics::counter!("meter_scans_total", "result" => result_label(success)).increment(1);
    metrics::histogram!("meter_scan_duration_seconds").record(duration.as_secs_f64());
    metrics::histogram!("meter_scan_fields_found").record(fields_found as f64);
}

/// Record which strategy filled a measurement field
pub fn record_extraction_strategy(field: MeasurementField, strategy: ExtractionStrategy) {
    metrics::counter!(
        "extraction_fields_total",
        "field" => field.as_str(),
        "strategy" => strategy.as_str()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_helpers_without_recorder() {
        record_ocr_metrics(true, Duration::from_millis(120), 3);
        record_preprocessing_metrics(Duration::from_millis(40), false);
        record_scan_metrics(true, 2, Duration::from_millis(200));
        record_extraction_strategy(MeasurementField::Voltage, ExtractionStrategy::UnitAnchored);
    }

    #[test]
    fn test_invalid_config_is_rejected_before_install() {
        let config = ObservabilityConfig {
            log_level: "loud".to_string(),
            ..Default::default()
        };
        assert!(init_tracing_with_config(&config).is_err());
    }
}
