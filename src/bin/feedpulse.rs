//! Feedpulse CLI - Command-line interface for Feedpulse
//!
//! Commands:
//! - metrics: Compute behavioral metrics for a session
//! - classify: Compute metrics and classify a session into a report
//! - schedule: Classify many sessions through the analysis scheduler
//! - config: Print the effective configuration

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use feedpulse::adapter::{parse_session, session_from_value};
use feedpulse::scheduler::{AnalysisScheduler, Priority};
use feedpulse::types::Session;
use feedpulse::{ComputeError, EngineConfig, FeedProcessor, FEEDPULSE_VERSION};

/// Feedpulse - Behavioral analysis engine for short-form video feeds
#[derive(Parser)]
#[command(name = "feedpulse")]
#[command(version = FEEDPULSE_VERSION)]
#[command(about = "Analyze feed viewing sessions for compulsive usage", long_about = None)]
struct Cli {
    /// Engine configuration file (JSON); defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute behavioral metrics for one session
    Metrics {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },

    /// Compute metrics and classify one session
    Classify {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },

    /// Classify many sessions through the analysis scheduler
    Schedule {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Priority for every scheduled session
        #[arg(long, default_value = "normal")]
        priority: PriorityArg,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one session per line)
    Ndjson,
    /// JSON array of sessions
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum PriorityArg {
    High,
    Normal,
    Low,
}

impl From<PriorityArg> for Priority {
    fn from(p: PriorityArg) -> Self {
        match p {
            PriorityArg::High => Priority::High,
            PriorityArg::Normal => Priority::Normal,
            PriorityArg::Low => Priority::Low,
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let body = serde_json::to_string(&CliError::from(e))
                .unwrap_or_else(|_| "Unknown error".to_string());
            eprintln!("{}", body);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), FeedpulseCliError> {
    let config = match cli.config.as_deref() {
        Some(path) => EngineConfig::load(path).map_err(FeedpulseCliError::Config)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Metrics {
            input,
            output,
            pretty,
        } => cmd_metrics(config, &input, &output, pretty),

        Commands::Classify {
            input,
            output,
            pretty,
        } => cmd_classify(config, &input, &output, pretty),

        Commands::Schedule {
            input,
            output,
            input_format,
            priority,
        } => cmd_schedule(config, &input, &output, input_format, priority.into()),

        Commands::Config => write_output(Path::new("-"), &config.to_json()?),
    }
}

fn cmd_metrics(
    config: EngineConfig,
    input: &Path,
    output: &Path,
    pretty: bool,
) -> Result<(), FeedpulseCliError> {
    let session = parse_session(&read_input(input)?)?;
    let metrics = FeedProcessor::with_config(config).compute_metrics(&session);
    write_output(output, &encode(&metrics, pretty)?)
}

fn cmd_classify(
    config: EngineConfig,
    input: &Path,
    output: &Path,
    pretty: bool,
) -> Result<(), FeedpulseCliError> {
    let session = parse_session(&read_input(input)?)?;
    let report = FeedProcessor::with_config(config).process_session(&session);
    write_output(output, &encode(&report, pretty)?)
}

fn cmd_schedule(
    config: EngineConfig,
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    priority: Priority,
) -> Result<(), FeedpulseCliError> {
    let sessions = read_sessions(&read_input(input)?, input_format)?;
    if sessions.is_empty() {
        return Err(FeedpulseCliError::NoSessions);
    }

    let processor = FeedProcessor::with_config(config.clone());
    let runtime = tokio::runtime::Runtime::new()?;

    let outcomes = runtime.block_on(async {
        let mut classifier = feedpulse::Classifier::new(config.classifier.clone());
        classifier.init();
        let scheduler = AnalysisScheduler::with_classifier(classifier, config.scheduler.clone());
        scheduler.init()?;

        let mut handles = Vec::with_capacity(sessions.len());
        for session in sessions {
            let metrics = processor.compute_metrics(&session);
            handles.push(scheduler.schedule_analysis(session, metrics, priority).await);
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            outcomes.push(handle.wait().await);
        }
        scheduler.dispose().await;
        Ok::<_, ComputeError>(outcomes)
    })?;

    let mut lines = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        match outcome {
            Ok(outcome) => lines.push(serde_json::to_string(&outcome)?),
            // A later line for the same session id replaced this one
            Err(ComputeError::AnalysisCancelled(id)) => {
                log::warn!("analysis of {} was superseded", id)
            }
            Err(e) => return Err(e.into()),
        }
    }
    write_output(output, &lines.join("\n"))
}

fn read_sessions(data: &str, format: InputFormat) -> Result<Vec<Session>, FeedpulseCliError> {
    match format {
        InputFormat::Ndjson => data
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| parse_session(line).map_err(FeedpulseCliError::from))
            .collect(),
        InputFormat::Json => {
            let value: serde_json::Value = serde_json::from_str(data)?;
            let items = value.as_array().ok_or_else(|| {
                FeedpulseCliError::ParseError("Expected a JSON array of sessions".to_string())
            })?;
            items
                .iter()
                .map(|item| session_from_value(item).map_err(FeedpulseCliError::from))
                .collect()
        }
    }
}

fn encode<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String, FeedpulseCliError> {
    Ok(if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    })
}

fn read_input(input: &Path) -> Result<String, FeedpulseCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn write_output(output: &Path, content: &str) -> Result<(), FeedpulseCliError> {
    if output.to_string_lossy() == "-" {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{}", content)?;
        handle.flush()?;
    } else {
        fs::write(output, format!("{}\n", content))?;
    }
    Ok(())
}

// Error handling

#[derive(Debug)]
enum FeedpulseCliError {
    Io(io::Error),
    Compute(ComputeError),
    Config(ComputeError),
    Json(serde_json::Error),
    NoSessions,
    ParseError(String),
}

impl From<io::Error> for FeedpulseCliError {
    fn from(e: io::Error) -> Self {
        FeedpulseCliError::Io(e)
    }
}

impl From<ComputeError> for FeedpulseCliError {
    fn from(e: ComputeError) -> Self {
        FeedpulseCliError::Compute(e)
    }
}

impl From<serde_json::Error> for FeedpulseCliError {
    fn from(e: serde_json::Error) -> Self {
        FeedpulseCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FeedpulseCliError> for CliError {
    fn from(e: FeedpulseCliError) -> Self {
        match e {
            FeedpulseCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FeedpulseCliError::Compute(
                e @ (ComputeError::ParseError(_) | ComputeError::JsonError(_)),
            ) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Ensure input is a session object with id and startTime".to_string()),
            },
            FeedpulseCliError::Compute(e) => CliError {
                code: "COMPUTE_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            FeedpulseCliError::Config(e) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run `feedpulse config` to see the expected layout".to_string()),
            },
            FeedpulseCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            FeedpulseCliError::NoSessions => CliError {
                code: "NO_SESSIONS".to_string(),
                message: "No sessions found in input".to_string(),
                hint: Some("Provide at least one session".to_string()),
            },
            FeedpulseCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: None,
            },
        }
    }
}
