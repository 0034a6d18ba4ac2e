use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use meter_scan::cable_labels::CableLabelMode;
use meter_scan::config::AppConfig;
use meter_scan::errors::error_logging;
use meter_scan::export::{self, ExportFormat};
use meter_scan::instance_manager::OcrInstanceManager;
use meter_scan::measurement_extraction::{ExtractionResult, MeasurementExtractor};
use meter_scan::observability;
use meter_scan::ocr::{split_recognized_lines, TesseractRecognizer};
use meter_scan::pipeline::{MeterScanner, ScanOutcome};
use meter_scan::preprocessing::ImagePreprocessor;
use meter_scan::records::CableMeasurement;
use meter_scan::store::{PhotoStore, SurveyStore};
use meter_scan::validation::{sanitize_reading_input, validate_label, validate_reading};

#[derive(Parser)]
#[command(name = "meter-scan")]
#[command(about = "Read solar string measurements from meter photos and keep a survey")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a meter photo and print the recognized readings
    Scan {
        image: PathBuf,
        /// Print the readings as JSON
        #[arg(long)]
        json: bool,
    },
    /// Extract readings from already recognized text (arguments, --file or stdin)
    Extract {
        lines: Vec<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        /// Print the full extraction report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a cable measurement to the survey
    Record(RecordArgs),
    /// Change readings or the note of a recorded cable
    Edit(EditArgs),
    /// Delete the measurement of a recorded cable
    Delete {
        #[arg(long)]
        inverter: String,
        #[arg(long)]
        cable: String,
    },
    /// Show or change cable labeling
    Labels {
        /// letters, pairs, numeric:<range> or custom:<range>
        #[arg(long)]
        mode: Option<CableLabelMode>,
        /// Cables per inverter
        #[arg(long)]
        count: Option<usize>,
        /// Also print the next free label for this inverter
        #[arg(long)]
        inverter: Option<String>,
    },
    /// Show or change the critical values that raise alerts
    Critical(CriticalArgs),
    /// Export the survey
    Export {
        /// txt, csv-single or csv
        #[arg(long, default_value = "txt")]
        format: ExportFormat,
        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Remove all measurements, keeping the settings
    Clear,
}

#[derive(Args)]
struct RecordArgs {
    #[arg(long)]
    inverter: String,
    /// Defaults to the next free label of the inverter
    #[arg(long)]
    cable: Option<String>,
    /// Scan this photo and use its readings for fields not given explicitly
    #[arg(long)]
    scan: Option<PathBuf>,
    #[arg(long)]
    voltage: Option<String>,
    #[arg(long)]
    current: Option<String>,
    #[arg(long)]
    resistance: Option<String>,
    #[arg(long)]
    note: Option<String>,
    /// Photo to store under the cable label (defaults to the scanned photo)
    #[arg(long)]
    photo: Option<PathBuf>,
}

#[derive(Args)]
struct EditArgs {
    #[arg(long)]
    inverter: String,
    #[arg(long)]
    cable: String,
    #[arg(long)]
    voltage: Option<String>,
    #[arg(long)]
    current: Option<String>,
    #[arg(long)]
    resistance: Option<String>,
    #[arg(long)]
    note: Option<String>,
}

#[derive(Args)]
struct CriticalArgs {
    #[arg(long)]
    min_voltage: Option<f64>,
    #[arg(long)]
    max_voltage: Option<f64>,
    #[arg(long)]
    min_current: Option<f64>,
    #[arg(long)]
    max_current: Option<f64>,
    #[arg(long)]
    min_resistance: Option<f64>,
    #[arg(long)]
    max_resistance: Option<f64>,
}

fn build_scanner(config: &AppConfig) -> MeterScanner {
    let recognizer = TesseractRecognizer::new(config.ocr.clone(), Arc::new(OcrInstanceManager::new()));
    MeterScanner::new(
        ImagePreprocessor::new(config.preprocessing.clone()),
        Arc::new(recognizer),
        MeasurementExtractor::new(config.repair_ranges),
    )
}

fn print_outcome(outcome: &ScanOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.result())?);
    } else {
        println!("{}", outcome.user_message());
    }
    Ok(())
}

fn read_text_lines(lines: Vec<String>, file: Option<&Path>) -> Result<Vec<String>> {
    let text = if !lines.is_empty() {
        lines.join("\n")
    } else if let Some(path) = file {
        std::fs::read_to_string(path)
            .with_context(|| format!("cannot read text from {}", path.display()))?
    } else {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        buffer
    };
    Ok(split_recognized_lines(&text))
}

/// Manual value if given (sanitized), otherwise the scanned one
fn pick_reading(field: &str, manual: Option<&str>, scanned: &str) -> String {
    let Some(manual) = manual else {
        return scanned.to_string();
    };
    let value = sanitize_reading_input(manual);
    if let Err(e) = validate_reading(&value) {
        error_logging::log_validation_error(&e, "record", field, Some(manual));
        warn!(field, value = %value, "Keeping reading that is not a plain number");
    }
    value
}

async fn record(config: &AppConfig, store: &SurveyStore, args: RecordArgs) -> Result<()> {
    let inverter = validate_label(&args.inverter)
        .map_err(|e| anyhow::anyhow!("invalid inverter label: {e}"))?
        .to_string();

    let mut survey = store.load()?;
    let cable = match args.cable.as_deref() {
        Some(cable) => validate_label(cable)
            .map_err(|e| anyhow::anyhow!("invalid cable label: {e}"))?
            .to_string(),
        None => survey.next_cable_label(&inverter).ok_or_else(|| {
            anyhow::anyhow!(
                "all {} cable labels of inverter {} are used; pass --cable",
                survey.cable_count,
                inverter
            )
        })?,
    };

    let scanned = match &args.scan {
        Some(image) => {
            let outcome = build_scanner(config).scan(image).await;
            eprintln!("{}", outcome.user_message());
            outcome.result()
        }
        None => ExtractionResult::default(),
    };

    let mut measurement = CableMeasurement::new(inverter.as_str(), cable.as_str());
    measurement.voltage = pick_reading("voltage", args.voltage.as_deref(), &scanned.voltage);
    measurement.current = pick_reading("current", args.current.as_deref(), &scanned.current);
    measurement.resistance =
        pick_reading("resistance", args.resistance.as_deref(), &scanned.resistance);
    if let Some(note) = args.note {
        measurement = measurement.with_note(note);
    }

    if let Some(photo) = args.photo.as_ref().or(args.scan.as_ref()) {
        let photos = PhotoStore::new(&config.storage.photo_dir);
        let stored = photos.save_labeled_photo(photo, &PhotoStore::photo_label(&inverter, &cable))?;
        measurement = measurement.with_photo(stored);
    }

    let line = export::report_line(survey.add_measurement(measurement));
    store.save(&survey)?;
    info!(inverter = %inverter, cable = %cable, "Measurement recorded");
    println!("{}", line);
    Ok(())
}

fn edit(store: &SurveyStore, args: EditArgs) -> Result<()> {
    let mut survey = store.load()?;
    let edited = survey.edit_measurement(&args.inverter, &args.cable, |m| {
        if let Some(voltage) = args.voltage.as_deref() {
            m.voltage = pick_reading("voltage", Some(voltage), "");
        }
        if let Some(current) = args.current.as_deref() {
            m.current = pick_reading("current", Some(current), "");
        }
        if let Some(resistance) = args.resistance.as_deref() {
            m.resistance = pick_reading("resistance", Some(resistance), "");
        }
        if let Some(note) = args.note.as_deref() {
            m.note = note.trim().to_string();
        }
    });
    let Some(edited) = edited else {
        anyhow::bail!(
            "no measurement recorded for inverter {} cable {}",
            args.inverter.trim(),
            args.cable.trim()
        );
    };
    let line = export::report_line(edited);
    store.save(&survey)?;
    info!(inverter = %args.inverter.trim(), cable = %args.cable.trim(), "Measurement edited");
    println!("{}", line);
    Ok(())
}

fn delete(store: &SurveyStore, inverter: &str, cable: &str) -> Result<()> {
    let removed = store.update(|survey| survey.remove_measurement(inverter, cable))?;
    match removed {
        Some(record) => {
            info!(inverter = %record.inverter, cable = %record.cable_label, "Measurement deleted");
            println!("deleted {}", export::report_line(&record));
            Ok(())
        }
        None => anyhow::bail!(
            "no measurement recorded for inverter {} cable {}",
            inverter.trim(),
            cable.trim()
        ),
    }
}

fn labels(
    store: &SurveyStore,
    mode: Option<CableLabelMode>,
    count: Option<usize>,
    inverter: Option<String>,
) -> Result<()> {
    if count == Some(0) {
        anyhow::bail!("--count must be at least 1");
    }

    let survey = if mode.is_some() || count.is_some() {
        store.update(|survey| {
            if let Some(mode) = mode {
                survey.label_mode = mode;
            }
            if let Some(count) = count {
                survey.cable_count = count;
            }
            survey.clone()
        })?
    } else {
        store.load()?
    };

    println!("mode: {}, cables: {}", survey.label_mode, survey.cable_count);
    println!("{}", survey.cable_labels().join(" "));
    if let Some(inverter) = inverter {
        match survey.next_cable_label(inverter.trim()) {
            Some(next) => println!("next for inverter {}: {}", inverter.trim(), next),
            None => println!("inverter {} is complete", inverter.trim()),
        }
    }
    Ok(())
}

fn critical(store: &SurveyStore, args: CriticalArgs) -> Result<()> {
    let mut survey = store.load()?;
    let values = &mut survey.critical_values;
    let updates = [
        (args.min_voltage, &mut values.min_voltage),
        (args.max_voltage, &mut values.max_voltage),
        (args.min_current, &mut values.min_current),
        (args.max_current, &mut values.max_current),
        (args.min_resistance, &mut values.min_resistance),
        (args.max_resistance, &mut values.max_resistance),
    ];
    let mut changed = false;
    for (update, slot) in updates {
        if let Some(value) = update {
            *slot = value;
            changed = true;
        }
    }

    if changed {
        survey.critical_values.validate()?;
        let reclassified = survey.recalculate_alerts();
        store.save(&survey)?;
        info!(reclassified, "Critical values changed, alerts recalculated");
    }

    let v = &survey.critical_values;
    println!("voltage: {} - {} V", v.min_voltage, v.max_voltage);
    println!("current: {} - {} A", v.min_current, v.max_current);
    println!("resistance: {} - {} MOhm", v.min_resistance, v.max_resistance);
    Ok(())
}

fn export_survey(store: &SurveyStore, format: ExportFormat, output: Option<PathBuf>) -> Result<()> {
    let survey = store.load()?;
    let rendered = export::render(format, &survey)?;
    match output {
        Some(path) => {
            std::fs::write(&path, rendered.as_bytes())
                .with_context(|| format!("cannot write export to {}", path.display()))?;
            info!(path = %path.display(), format = %format, "Export written");
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file first
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    observability::init_tracing_with_config(&config.observability)?;

    if let Err(e) = config.validate() {
        error_logging::log_config_error(&e, "app_config", "startup");
        return Err(e.into());
    }
    info!("{}", config.summary());

    let store = SurveyStore::new(&config.storage.data_file);
    match cli.command {
        Command::Scan { image, json } => {
            let outcome = build_scanner(&config).scan(&image).await;
            print_outcome(&outcome, json)?;
        }
        Command::Extract { lines, file, json } => {
            let lines = read_text_lines(lines, file.as_deref())?;
            let extractor = MeasurementExtractor::new(config.repair_ranges);
            let outcome = match extractor.extract(&lines) {
                Ok(report) => ScanOutcome::Recognized(report),
                Err(e) => ScanOutcome::RecognitionFailed(e),
            };
            match (json, outcome.report()) {
                (true, Some(report)) => println!("{}", serde_json::to_string_pretty(report)?),
                _ => print_outcome(&outcome, json)?,
            }
        }
        Command::Record(args) => record(&config, &store, args).await?,
        Command::Edit(args) => edit(&store, args)?,
        Command::Delete { inverter, cable } => delete(&store, &inverter, &cable)?,
        Command::Labels {
            mode,
            count,
            inverter,
        } => labels(&store, mode, count, inverter)?,
        Command::Critical(args) => critical(&store, args)?,
        Command::Export { format, output } => export_survey(&store, format, output)?,
        Command::Clear => {
            let removed = store.clear()?;
            println!("removed {} measurements", removed);
        }
    }

    Ok(())
}
