//! Focus CLI - Command-line interface for Synheart Focus
//!
//! Commands:
//! - simulate: Replay tick records through the engine and emit states
//! - trajectory: Replay tick records, then print predictions and status
//! - doctor: Diagnose configuration and coefficient files
//! - schema: Describe tick records and engine states

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use synheart_focus::store::{CoefficientStore, JsonFileCoefficientStore};
use synheart_focus::types::{EngineState, FpBreakdown, Trajectory, UpdateInput};
use synheart_focus::{
    BioEngine, EngineConfig, EngineError, ManualClock, FOCUS_VERSION, PRODUCER_NAME,
};

/// Focus - On-device Focus Point engine
#[derive(Parser)]
#[command(name = "focus")]
#[command(author = "Synheart AI Inc")]
#[command(version = FOCUS_VERSION)]
#[command(about = "Simulate Focus Points from input telemetry and heart rate", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Engine construction options shared by the replay commands
#[derive(clap::Args, Clone)]
struct EngineArgs {
    /// Engine configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Readiness score (0-100)
    #[arg(long, default_value = "75")]
    readiness: i32,

    /// Sleep score (0-100)
    #[arg(long, default_value = "75")]
    sleep_score: i32,

    /// Wake time (RFC 3339), defaults to the first tick
    #[arg(long)]
    wake_time: Option<DateTime<Utc>>,

    /// Resting heart rate
    #[arg(long)]
    baseline_hr: Option<u32>,

    /// Main sleep duration in seconds
    #[arg(long)]
    main_sleep_seconds: Option<u32>,

    /// Shadow heart-rate coefficients file, loaded at start and saved after learning
    #[arg(long)]
    coefficients: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay tick records through the engine (one state per tick)
    Simulate {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Flush output after each record
        #[arg(long, default_value = "true")]
        flush: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Replay tick records, then print trajectory, break and exhaustion times
    Trajectory {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Prediction horizon in minutes
        #[arg(long, default_value = "240")]
        minutes: u32,

        /// Include the FP calculation breakdown
        #[arg(long)]
        debug: bool,

        /// Output as compact JSON instead of pretty JSON
        #[arg(long)]
        compact: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Diagnose configuration and coefficient files
    Doctor {
        /// Check configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Check shadow heart-rate coefficients file
        #[arg(long)]
        coefficients: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print (input or output)
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one state per line)
    Ndjson,
    /// JSON array of states
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input schema (tick records)
    Input,
    /// Output schema (engine states)
    Output,
}

/// One line of replay input: the clock instant plus everything `update()` takes
#[derive(Debug, Deserialize)]
struct TickRecord {
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    input: UpdateInput,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), FocusCliError> {
    match cli.command {
        Commands::Simulate {
            input,
            output,
            output_format,
            flush,
            engine,
        } => cmd_simulate(&input, &output, output_format, flush, &engine),

        Commands::Trajectory {
            input,
            minutes,
            debug,
            compact,
            engine,
        } => cmd_trajectory(&input, minutes, debug, compact, &engine),

        Commands::Doctor {
            config,
            coefficients,
            json,
        } => cmd_doctor(config.as_deref(), coefficients.as_deref(), json),

        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

/// Engine plus the clock handle that drives it
struct Replay {
    engine: BioEngine,
    clock: ManualClock,
    ticks: usize,
}

impl Replay {
    fn start(args: &EngineArgs, first: DateTime<Utc>) -> Result<Self, FocusCliError> {
        let config = match &args.config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };

        let clock = ManualClock::new(first);
        let mut builder = BioEngine::builder()
            .readiness(args.readiness)
            .sleep_score(args.sleep_score)
            .wake_time(args.wake_time.unwrap_or(first))
            .config(config)
            .clock(clock.clone());
        if let Some(hr) = args.baseline_hr {
            builder = builder.baseline_hr(hr);
        }
        if let Some(seconds) = args.main_sleep_seconds {
            builder = builder.main_sleep_seconds(seconds);
        }
        if let Some(path) = &args.coefficients {
            builder = builder.coefficient_store(JsonFileCoefficientStore::new(path));
        }

        Ok(Self {
            engine: builder.build()?,
            clock,
            ticks: 0,
        })
    }

    fn tick(&mut self, record: TickRecord) -> EngineState {
        self.clock.set(record.timestamp);
        self.ticks += 1;
        self.engine.update(record.input)
    }
}

fn open_input(input: &Path) -> Result<Box<dyn BufRead>, FocusCliError> {
    if input.to_string_lossy() == "-" {
        Ok(Box::new(BufReader::new(io::stdin())))
    } else {
        Ok(Box::new(BufReader::new(fs::File::open(input)?)))
    }
}

fn parse_tick(line: &str, line_number: usize) -> Result<TickRecord, FocusCliError> {
    serde_json::from_str(line).map_err(|e| FocusCliError::Parse {
        line: line_number,
        message: e.to_string(),
    })
}

/// Replay every record of `input`, calling `on_state` after each tick
fn replay(
    input: &Path,
    args: &EngineArgs,
    mut on_state: impl FnMut(&EngineState) -> Result<(), FocusCliError>,
) -> Result<Replay, FocusCliError> {
    let reader = open_input(input)?;
    let mut replay: Option<Replay> = None;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record = parse_tick(trimmed, index + 1)?;

        // The engine clock starts at the first record
        if replay.is_none() {
            replay = Some(Replay::start(args, record.timestamp)?);
        }
        if let Some(session) = replay.as_mut() {
            let state = session.tick(record);
            on_state(&state)?;
        }
    }

    let replay = replay.ok_or(FocusCliError::NoTicks)?;
    tracing::info!(ticks = replay.ticks, "replay complete");
    Ok(replay)
}

fn cmd_simulate(
    input: &Path,
    output: &Path,
    output_format: OutputFormat,
    flush: bool,
    args: &EngineArgs,
) -> Result<(), FocusCliError> {
    let mut writer: Box<dyn Write> = if output.to_string_lossy() == "-" {
        Box::new(io::stdout())
    } else {
        Box::new(fs::File::create(output)?)
    };

    let mut states: Vec<EngineState> = Vec::new();
    replay(input, args, |state| {
        match output_format {
            OutputFormat::Ndjson => {
                writeln!(writer, "{}", serde_json::to_string(state)?)?;
                if flush {
                    writer.flush()?;
                }
            }
            OutputFormat::Json | OutputFormat::JsonPretty => states.push(state.clone()),
        }
        Ok(())
    })?;

    match output_format {
        OutputFormat::Ndjson => {}
        OutputFormat::Json => writeln!(writer, "{}", serde_json::to_string(&states)?)?,
        OutputFormat::JsonPretty => writeln!(writer, "{}", serde_json::to_string_pretty(&states)?)?,
    }
    writer.flush()?;
    Ok(())
}

fn cmd_trajectory(
    input: &Path,
    minutes: u32,
    debug: bool,
    compact: bool,
    args: &EngineArgs,
) -> Result<(), FocusCliError> {
    let replay = replay(input, args, |_| Ok(()))?;
    let engine = &replay.engine;
    let (code, message) = engine.get_status_code();

    let report = TrajectoryReport {
        ticks: replay.ticks,
        state: engine.latest_state(),
        status: StatusReport { code, message },
        recommended_break_time: engine.get_recommended_break_time(),
        exhaustion_time: engine.get_exhaustion_time(),
        trajectory: engine.predict_trajectory(minutes),
        breakdown: debug.then(|| engine.debug_fp_calculation()),
    };

    if compact {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

fn cmd_doctor(
    config: Option<&Path>,
    coefficients: Option<&Path>,
    json: bool,
) -> Result<(), FocusCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "focus_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Focus version {}", FOCUS_VERSION),
    });

    // Check configuration file if provided
    if let Some(config_path) = config {
        if config_path.exists() {
            match EngineConfig::load(config_path) {
                Ok(config) => checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "Configuration valid (history {} snapshots, tick {}s)",
                        config.history_capacity, config.physics_tick_seconds
                    ),
                }),
                Err(e) => checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: e.to_string(),
                }),
            }
        } else {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "Configuration file does not exist, defaults apply".to_string(),
            });
        }
    }

    // Check coefficients file if provided
    if let Some(coefficients_path) = coefficients {
        match JsonFileCoefficientStore::new(coefficients_path).load() {
            Ok(Some(c)) => checks.push(DoctorCheck {
                name: "coefficients".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Coefficients valid (alpha {:.3}, beta {:.3}, gamma {:.3})",
                    c.alpha, c.beta, c.gamma
                ),
            }),
            Ok(None) => checks.push(DoctorCheck {
                name: "coefficients".to_string(),
                status: CheckStatus::Warning,
                message: "Coefficients file does not exist, defaults apply".to_string(),
            }),
            Err(e) => checks.push(DoctorCheck {
                name: "coefficients".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            }),
        }
    }

    // Check stdin is available (for replay from a pipe)
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
            message: "stdin is a pipe (replay ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: FOCUS_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Focus Doctor Report");
        println!("===================");
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

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(FocusCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), FocusCliError> {
    match schema_type {
        SchemaType::Input => {
            if json_schema {
                println!("{}", serde_json::to_string_pretty(&input_json_schema())?);
            } else {
                println!("Input Schema: focus.tick.v1");
                println!();
                println!("One JSON object per line. Only timestamp is required:");
                println!();
                println!("- timestamp: RFC 3339 instant the engine clock is set to");
                println!("- apm: instantaneous actions per minute");
                println!("- counters: {{ mouse_pixels, keystrokes, backspaces, scroll_steps }} (cumulative)");
                println!("- heart_rate: {{ timestamp, bpm, source }} latest real sample");
                println!("- hr_stream: [{{ timestamp, bpm, source }}] delayed samples for correction");
                println!("- total_nap_minutes, phantom_recovery_sum: cumulative totals");
                println!("- relaxation_session_active, break_taken: flags");
                println!("- biometrics: {{ readiness, sleep_score, wake_time, baseline_hr, main_sleep_seconds }}");
                println!();
                println!("Heart-rate source: awake, rest (anything else reads as unknown)");
            }
        }
        SchemaType::Output => {
            if json_schema {
                println!("{}", serde_json::to_string_pretty(&output_json_schema())?);
            } else {
                println!("Output Schema: focus.state.v1");
                println!();
                println!("One engine state per tick:");
                println!();
                println!("- timestamp");
                println!("- base_fp, boost_fp, effective_fp (10-100), debt (0-10)");
                println!("- current_load (0-1), readiness, estimated_readiness");
                println!("- continuous_work_hours, decay_multiplier, hours_since_wake");
                println!("- activity_state: idle, light, moderate, deep_dive, hyperfocus");
                println!("- boost_efficiency, correction_factor");
                println!("- estimated_hr, is_hr_estimated, hr_last_update");
            }
        }
    }
    Ok(())
}

// Helper functions

fn sample_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "required": ["timestamp", "bpm"],
        "properties": {
            "timestamp": { "type": "string", "format": "date-time" },
            "bpm": { "type": "integer", "minimum": 0 },
            "source": { "type": "string", "enum": ["awake", "rest", "unknown"] }
        }
    })
}

fn input_json_schema() -> serde_json::Value {
    serde_json::json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "focus.tick.v1",
        "type": "object",
        "required": ["timestamp"],
        "properties": {
            "timestamp": { "type": "string", "format": "date-time" },
            "apm": { "type": "number", "minimum": 0 },
            "counters": {
                "type": "object",
                "properties": {
                    "mouse_pixels": { "type": "number", "minimum": 0 },
                    "keystrokes": { "type": "integer", "minimum": 0 },
                    "backspaces": { "type": "integer", "minimum": 0 },
                    "scroll_steps": { "type": "integer", "minimum": 0 }
                }
            },
            "heart_rate": sample_schema(),
            "hr_stream": { "type": "array", "items": sample_schema() },
            "total_nap_minutes": { "type": "number", "minimum": 0 },
            "phantom_recovery_sum": { "type": "number", "minimum": 0 },
            "relaxation_session_active": { "type": "boolean" },
            "break_taken": { "type": "boolean" },
            "biometrics": {
                "type": "object",
                "properties": {
                    "readiness": { "type": "integer", "minimum": 0, "maximum": 100 },
                    "sleep_score": { "type": "integer", "minimum": 0, "maximum": 100 },
                    "wake_time": { "type": "string", "format": "date-time" },
                    "baseline_hr": { "type": "integer", "minimum": 1 },
                    "main_sleep_seconds": { "type": "integer", "minimum": 0 }
                }
            }
        }
    })
}

fn output_json_schema() -> serde_json::Value {
    serde_json::json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "focus.state.v1",
        "type": "object",
        "properties": {
            "timestamp": { "type": "string", "format": "date-time" },
            "base_fp": { "type": "number" },
            "boost_fp": { "type": "number" },
            "effective_fp": { "type": "number", "minimum": 10, "maximum": 100 },
            "debt": { "type": "number", "minimum": 0, "maximum": 10 },
            "current_load": { "type": "number", "minimum": 0, "maximum": 1 },
            "readiness": { "type": "integer" },
            "estimated_readiness": { "type": "number" },
            "continuous_work_hours": { "type": "number" },
            "decay_multiplier": { "type": "number" },
            "hours_since_wake": { "type": "number" },
            "activity_state": {
                "type": "string",
                "enum": ["idle", "light", "moderate", "deep_dive", "hyperfocus"]
            },
            "boost_efficiency": { "type": "number" },
            "correction_factor": { "type": "number" },
            "estimated_hr": { "type": ["integer", "null"] },
            "is_hr_estimated": { "type": "boolean" },
            "hr_last_update": { "type": ["string", "null"], "format": "date-time" }
        }
    })
}

// Error types

#[derive(Debug, Error)]
enum FocusCliError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("No tick records found in input")]
    NoTicks,

    #[error("One or more health checks failed")]
    DoctorFailed,
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FocusCliError> for CliError {
    fn from(e: FocusCliError) -> Self {
        let message = e.to_string();
        let (code, hint) = match e {
            FocusCliError::Io(_) => ("IO_ERROR", "Check file paths and permissions"),
            FocusCliError::Engine(_) => ("ENGINE_ERROR", "Run 'focus doctor --config <file>'"),
            FocusCliError::Json(_) => ("JSON_ERROR", "Check JSON syntax"),
            FocusCliError::Parse { .. } => ("PARSE_ERROR", "Run 'focus schema input' for the record format"),
            FocusCliError::NoTicks => ("NO_TICKS", "Ensure input is not empty"),
            FocusCliError::DoctorFailed => ("DOCTOR_FAILED", "Review the doctor report for details"),
        };
        CliError {
            code: code.to_string(),
            message,
            hint: Some(hint.to_string()),
        }
    }
}

// Report types

#[derive(Serialize)]
struct StatusReport {
    code: String,
    message: String,
}

#[derive(Serialize)]
struct TrajectoryReport {
    ticks: usize,
    state: EngineState,
    status: StatusReport,
    recommended_break_time: DateTime<Utc>,
    exhaustion_time: DateTime<Utc>,
    trajectory: Trajectory,
    #[serde(skip_serializing_if = "Option::is_none")]
    breakdown: Option<FpBreakdown>,
}

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
