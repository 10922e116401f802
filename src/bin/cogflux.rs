//! Flux CLI - Command-line interface for Cogload Flux
//!
//! Commands:
//! - run: Stream gaze samples from stdin into forecast records (streaming mode)
//! - load: Compute the load index of a pupil recording (batch mode)
//! - forecast: Run the forecaster over a measurement series (batch mode)
//! - doctor: Diagnose pipeline health and configuration
//! - config: Print the default configuration

use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufRead, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use cogload_flux::measurement_log::{read_values, MeasurementLog};
use cogload_flux::measurements::wavelet::Wavelet;
use cogload_flux::{
    compute_cognitive_load, forecast_series, ComputeError, CoreConfig, FixationDetector, LoadPipeline, LogConfig,
    LogFormat, FLUX_VERSION, PRODUCER_NAME,
};

/// Flux - Streaming cognitive-load estimation and forecasting
#[derive(Parser)]
#[command(name = "cogflux")]
#[command(author = "Synheart AI Inc")]
#[command(version = FLUX_VERSION)]
#[command(about = "Estimate and forecast cognitive load from pupil data", long_about = None)]
struct Cli {
    /// Configuration file (JSON); defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream NDJSON gaze samples from stdin into forecast records (streaming mode)
    Run {
        /// Append every load measurement to this CSV log
        #[arg(long)]
        measurement_log: Option<PathBuf>,

        /// Write detected fixations to this NDJSON file
        #[arg(long)]
        fixations: Option<PathBuf>,

        /// Flush output after each record (--flush false to batch writes)
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        flush: bool,
    },

    /// Compute the load index of a pupil recording
    Load {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Sampling rate in Hz (overrides the configuration)
        #[arg(long)]
        sampling_rate: Option<f64>,
    },

    /// Run the forecaster over a measurement series
    Forecast {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "lines")]
        input_format: SeriesFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Diagnose pipeline health and configuration
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default configuration as JSON
    Config,
}

#[derive(Clone, ValueEnum)]
enum SeriesFormat {
    /// One number per line
    Lines,
    /// Measurement log CSV (time,value[,features...])
    Csv,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

/// One gaze sample of the streaming input; a missing or null pupil or gaze
/// point is a dropout
#[derive(Deserialize)]
struct GazeLine {
    timestamp: Option<DateTime<Utc>>,
    lpup: Option<f64>,
    rpup: Option<f64>,
    /// Display-area gaze position of each eye, [x, y] in 0..1
    left_gaze: Option<[f64; 2]>,
    right_gaze: Option<[f64; 2]>,
}

/// Pupil recording for the `load` command
#[derive(Deserialize)]
struct PupilRecording {
    lpup: Vec<f64>,
    rpup: Vec<f64>,
}

#[derive(Serialize)]
struct LoadReport {
    load: f64,
    samples: usize,
    sampling_rate_hz: f64,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string()));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), FluxCliError> {
    // Doctor reports on the configuration instead of failing on it
    if let Commands::Doctor { json } = cli.command {
        init_logging(&LogConfig::default());
        return cmd_doctor(cli.config.as_deref(), json);
    }

    let config = match cli.config.as_deref() {
        Some(path) => CoreConfig::from_json(&fs::read_to_string(path)?)?,
        None => CoreConfig::default(),
    };
    init_logging(&config.log);

    match cli.command {
        Commands::Run {
            measurement_log,
            fixations,
            flush,
        } => cmd_run(&config, measurement_log.as_deref(), fixations.as_deref(), flush),

        Commands::Load { input, sampling_rate } => cmd_load(&config, &input, sampling_rate),

        Commands::Forecast {
            input,
            input_format,
            output_format,
        } => cmd_forecast(&config, &input, input_format, output_format),

        Commands::Doctor { json } => cmd_doctor(cli.config.as_deref(), json),

        Commands::Config => {
            println!("{}", CoreConfig::default().to_json()?);
            Ok(())
        }
    }
}

/// Structured logs go to stderr so stdout stays machine-readable
fn init_logging(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr));

    // A subscriber may already be installed; keep it
    let _ = match log.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
}

fn cmd_run(
    config: &CoreConfig,
    measurement_log: Option<&Path>,
    fixations: Option<&Path>,
    flush: bool,
) -> Result<(), FluxCliError> {
    let mut pipeline = LoadPipeline::new(config)?;
    if let Some(path) = measurement_log {
        pipeline = pipeline.with_measurement_sink(MeasurementLog::new(path, Vec::new()));
    }
    let mut fixation_output = match fixations {
        Some(path) => Some((FixationDetector::default(), BufWriter::new(fs::File::create(path)?))),
        None => None,
    };
    info!(session = %pipeline.session_id(), "streaming gaze samples from stdin");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        let sample: GazeLine = serde_json::from_str(trimmed)
            .map_err(|e| FluxCliError::ParseError(format!("Failed to parse gaze sample: {}", e)))?;

        let timestamp = sample.timestamp.unwrap_or_else(Utc::now);
        if let Some((detector, writer)) = fixation_output.as_mut() {
            if sample.left_gaze.is_some() || sample.right_gaze.is_some() {
                let [lx, ly] = sample.left_gaze.unwrap_or([f64::NAN; 2]);
                let [rx, ry] = sample.right_gaze.unwrap_or([f64::NAN; 2]);
                if let Some(fixation) = detector.insert((lx, ly), (rx, ry), timestamp) {
                    writeln!(writer, "{}", serde_json::to_string(&fixation)?)?;
                    if flush {
                        writer.flush()?;
                    }
                }
            }
        }

        let record = pipeline.push_gaze(
            sample.lpup.unwrap_or(f64::NAN),
            sample.rpup.unwrap_or(f64::NAN),
            timestamp,
        );

        match record {
            Ok(Some(record)) => {
                writeln!(stdout, "{}", serde_json::to_string(&record)?)?;
                if flush {
                    stdout.flush()?;
                }
            }
            Ok(None) => {}
            // The pipeline already counted and logged the skipped tick
            Err(e) if e.is_model_fit() => debug!(error = %e, "continuing after failed fit"),
            Err(e) => return Err(e.into()),
        }
    }

    stdout.flush()?;
    let mut detected = 0;
    if let Some((detector, mut writer)) = fixation_output {
        writer.flush()?;
        detected = detector.detected();
    }
    info!(
        ticks = pipeline.ticks(),
        skipped = pipeline.skipped_ticks(),
        degraded_samples = pipeline.degraded_samples(),
        fixations = detected,
        "stream finished"
    );
    Ok(())
}

fn cmd_load(config: &CoreConfig, input: &Path, sampling_rate: Option<f64>) -> Result<(), FluxCliError> {
    let recording: PupilRecording = serde_json::from_str(&read_input(input)?)?;
    if recording.lpup.is_empty() {
        return Err(FluxCliError::NoSamples);
    }

    let sampling_rate_hz = sampling_rate.unwrap_or(config.handler.sampling_rate_hz);
    let load = compute_cognitive_load(&recording.lpup, &recording.rpup, sampling_rate_hz)?;

    let report = LoadReport {
        load,
        samples: recording.lpup.len(),
        sampling_rate_hz,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_forecast(
    config: &CoreConfig,
    input: &Path,
    input_format: SeriesFormat,
    output_format: OutputFormat,
) -> Result<(), FluxCliError> {
    let values = match input_format {
        SeriesFormat::Csv if input.to_string_lossy() != "-" => read_values(input)?,
        SeriesFormat::Csv => parse_series(&read_input(input)?, true)?,
        SeriesFormat::Lines => parse_series(&read_input(input)?, false)?,
    };

    if values.is_empty() {
        return Err(FluxCliError::NoSamples);
    }

    let records = forecast_series(&values, &config.forecasting)?;
    print!("{}", format_output(&records, &output_format)?);
    Ok(())
}

fn cmd_doctor(config_path: Option<&Path>, json: bool) -> Result<(), FluxCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    // Check Flux version
    checks.push(DoctorCheck {
        name: "flux_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Flux version {}", FLUX_VERSION),
    });

    // Check configuration file if provided
    let config = match config_path {
        Some(path) if !path.exists() => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: "Configuration file does not exist".to_string(),
            });
            None
        }
        Some(path) => match fs::read_to_string(path).map_err(ComputeError::from).and_then(|c| CoreConfig::from_json(&c)) {
            Ok(config) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: "Configuration file valid".to_string(),
                });
                Some(config)
            }
            Err(e) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Invalid configuration: {}", e),
                });
                None
            }
        },
        None => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: "Using default configuration".to_string(),
            });
            Some(CoreConfig::default())
        }
    };

    if let Some(config) = config {
        checks.push(window_check(&config));
        checks.push(calibration_check(&config));
    }

    // Check stdin is available (for streaming mode)
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (streaming mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: FLUX_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Flux Doctor Report");
        println!("==================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(FluxCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

/// The load window must allow at least one wavelet decomposition level
fn window_check(config: &CoreConfig) -> DoctorCheck {
    let wavelet = Wavelet::sym16();
    let levels = wavelet.max_level(config.handler.window_length);
    let seconds = config.handler.window_length as f64 / config.handler.sampling_rate_hz;

    if levels == 0 {
        DoctorCheck {
            name: "load_window".to_string(),
            status: CheckStatus::Error,
            message: format!(
                "{} samples cannot be decomposed (need at least {})",
                config.handler.window_length,
                2 * (wavelet.taps() - 1)
            ),
        }
    } else if levels < 2 {
        DoctorCheck {
            name: "load_window".to_string(),
            status: CheckStatus::Warning,
            message: format!(
                "{:.1} s window gives a single decomposition level; low and high bands coincide",
                seconds
            ),
        }
    } else {
        DoctorCheck {
            name: "load_window".to_string(),
            status: CheckStatus::Ok,
            message: format!("{:.1} s window, {} decomposition levels", seconds, levels),
        }
    }
}

/// The calibration window must be long enough to fit the largest order
fn calibration_check(config: &CoreConfig) -> DoctorCheck {
    let forecasting = &config.forecasting;
    let largest = 2 * forecasting.order_max + 2;

    if forecasting.calibration_length <= 2 * forecasting.order_min + 2 {
        DoctorCheck {
            name: "calibration".to_string(),
            status: CheckStatus::Error,
            message: format!(
                "{} calibration measurements cannot fit any order in [{}, {}]",
                forecasting.calibration_length, forecasting.order_min, forecasting.order_max
            ),
        }
    } else if forecasting.calibration_length <= largest {
        DoctorCheck {
            name: "calibration".to_string(),
            status: CheckStatus::Warning,
            message: format!(
                "{} calibration measurements are too few for the largest orders (need more than {})",
                forecasting.calibration_length, largest
            ),
        }
    } else {
        DoctorCheck {
            name: "calibration".to_string(),
            status: CheckStatus::Ok,
            message: format!(
                "{} calibration measurements, orders [{}, {}]",
                forecasting.calibration_length, forecasting.order_min, forecasting.order_max
            ),
        }
    }
}

// Helper functions

fn read_input(input: &Path) -> Result<String, FluxCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

/// Numbers one per line, or the value column of a measurement log
fn parse_series(text: &str, csv: bool) -> Result<Vec<f64>, FluxCliError> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .skip(if csv { 1 } else { 0 })
        .map(|line| {
            let field = if csv { line.split(',').nth(1).unwrap_or("") } else { line };
            field
                .trim()
                .parse::<f64>()
                .map_err(|e| FluxCliError::ParseError(format!("Bad value '{}': {}", line, e)))
        })
        .collect()
}

fn format_output<T: Serialize>(records: &[T], format: &OutputFormat) -> Result<String, FluxCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for record in records {
                lines.push(serde_json::to_string(record)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(records)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(records)?),
    }
}

// Error types

#[derive(Debug)]
enum FluxCliError {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    NoSamples,
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for FluxCliError {
    fn from(e: io::Error) -> Self {
        FluxCliError::Io(e)
    }
}

impl From<ComputeError> for FluxCliError {
    fn from(e: ComputeError) -> Self {
        FluxCliError::Compute(e)
    }
}

impl From<serde_json::Error> for FluxCliError {
    fn from(e: serde_json::Error) -> Self {
        FluxCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FluxCliError> for CliError {
    fn from(e: FluxCliError) -> Self {
        match e {
            FluxCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FluxCliError::Compute(e) => {
                let (code, hint) = match &e {
                    ComputeError::ConfigurationError(_) => {
                        ("CONFIG_ERROR", "Run 'cogflux doctor --config <file>' for details")
                    }
                    ComputeError::ModelFitError(_) | ComputeError::NoUsableOrder(_) => {
                        ("MODEL_FIT_ERROR", "Provide a longer or less degenerate series")
                    }
                    ComputeError::NormalizationError(_) => {
                        ("NORMALIZATION_ERROR", "Calibration or baseline data has no spread")
                    }
                    ComputeError::DataShapeError(_) | ComputeError::UnknownChannel(_) => {
                        ("DATA_SHAPE_ERROR", "Check channel names and series lengths")
                    }
                    _ => ("COMPUTE_ERROR", "Check input format"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            FluxCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            FluxCliError::NoSamples => CliError {
                code: "NO_SAMPLES".to_string(),
                message: "No samples found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            FluxCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            FluxCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
