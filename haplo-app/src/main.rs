//! haplo - stereo shape judgement on a two-display haploscope.

mod app;
mod stage;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use haplo_core::PromptPolicy;
use haplo_experiment::{ExperimentConfig, ParticipantInfo};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "haplo")]
#[command(version, long_about = None)]
#[command(about = "Binocular stimulus presentation for a mirror haploscope")]
pub struct Args {
    /// Configuration file (TOML); built-in defaults when omitted
    #[arg(short, long, env = "HAPLO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory containing *_L.png / *_R.png stimulus pairs
    #[arg(long)]
    pub stimuli: Option<PathBuf>,

    /// Folder for CSV and JSON results
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Interpupillary distance override (mm) for all trials
    #[arg(long)]
    pub iod_mm: Option<f64>,

    /// Focal distance override (mm) for all trials
    #[arg(long)]
    pub focal_distance_mm: Option<f64>,

    /// Single shared window with side-by-side eyes
    #[arg(long)]
    pub debug: bool,

    /// IOD used in debug mode when no override is given
    #[arg(long)]
    pub debug_iod_mm: Option<f64>,

    /// Focal distance used in debug mode when no override is given
    #[arg(long)]
    pub debug_focal_distance_mm: Option<f64>,

    /// Serial port of the participant keypad (e.g. /dev/ttyUSB0, COM1)
    #[arg(long, env = "HAPLO_SERIAL_PORT")]
    pub serial_port: Option<String>,

    /// Baud rate of the participant keypad
    #[arg(long)]
    pub serial_baud: Option<u32>,

    /// Whether responses are collected while the prompt is first shown
    #[arg(long, value_parser = parse_prompt_policy)]
    pub prompt_policy: Option<PromptPolicy>,

    /// Participant identifier used in result file names
    #[arg(short, long, default_value = "unknown")]
    pub participant: String,

    /// Session label used in result file names
    #[arg(short, long, default_value = "1")]
    pub session: String,

    /// Load stimuli, print calibration for each and exit
    #[arg(long)]
    pub dry_run: bool,

    /// Open the keypad, wait up to SECONDS for a key and report it
    #[arg(long, value_name = "SECONDS")]
    pub check_keypad: Option<f64>,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format (json|pretty|compact)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    /// Write logs to file (in addition to stdout)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

fn parse_prompt_policy(s: &str) -> Result<PromptPolicy, String> {
    match s {
        "continuous" => Ok(PromptPolicy::Continuous),
        "deferred" => Ok(PromptPolicy::Deferred),
        other => Err(format!("expected 'continuous' or 'deferred', got '{other}'")),
    }
}

impl Args {
    /// Command-line values win over the file.
    pub fn apply_overrides(&self, config: &mut ExperimentConfig) {
        if let Some(dir) = &self.stimuli {
            config.stimulus_directory = dir.clone();
        }
        if let Some(dir) = &self.data_dir {
            config.results_directory = dir.clone();
        }
        if self.iod_mm.is_some() {
            config.calibration.iod_override_mm = self.iod_mm;
        }
        if self.focal_distance_mm.is_some() {
            config.calibration.focal_override_mm = self.focal_distance_mm;
        }
        if self.debug {
            config.debug_mode = true;
        }
        if self.debug_iod_mm.is_some() {
            config.calibration.debug_iod_mm = self.debug_iod_mm;
        }
        if self.debug_focal_distance_mm.is_some() {
            config.calibration.debug_focal_mm = self.debug_focal_distance_mm;
        }
        if let Some(port) = &self.serial_port {
            config.keypad.port = Some(port.clone());
        }
        if let Some(baud) = self.serial_baud {
            config.keypad.baud = baud;
        }
        if let Some(policy) = self.prompt_policy {
            config.prompt.policy = policy;
        }
    }

    pub fn participant_info(&self) -> ParticipantInfo {
        ParticipantInfo {
            participant: self.participant.clone(),
            session: self.session.clone(),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    info!("haplo v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => ExperimentConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ExperimentConfig::default(),
    };
    args.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;
    tracing::debug!("Config: {:?}", config);

    if let Some(seconds) = args.check_keypad {
        return app::check_keypad(&config, seconds);
    }
    if args.dry_run {
        return app::dry_run(&config);
    }
    let participant = args.participant_info();
    participant.validate().context("Invalid participant or session")?;
    app::run_experiment(&config, &participant)
}

fn init_logging(args: &Args) -> Result<()> {
    use std::fs::File;

    let log_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "haplo={level},haplo_app={level},haplo_experiment={level},haplo_input={level},haplo_render={level},haplo_calibration={level},wgpu=warn,winit=warn,warn",
            level = log_level
        ))
    });

    if let Some(log_file_path) = &args.log_file {
        let file = File::create(log_file_path)
            .with_context(|| format!("Failed to create log file {}", log_file_path.display()))?;

        match args.log_format.as_str() {
            "json" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stdout))
                    .with(
                        tracing_subscriber::fmt::layer()
                            .json()
                            .with_writer(file)
                            .with_ansi(false),
                    )
                    .init();
            }
            "compact" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stdout))
                    .with(
                        tracing_subscriber::fmt::layer()
                            .compact()
                            .with_writer(file)
                            .with_ansi(false),
                    )
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stdout))
                    .with(
                        tracing_subscriber::fmt::layer()
                            .with_writer(file)
                            .with_ansi(false),
                    )
                    .init();
            }
        }
        info!("Logging to file: {}", log_file_path.display());
    } else {
        match args.log_format.as_str() {
            "json" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().json())
                    .init();
            }
            "compact" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().compact())
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().pretty())
                    .init();
            }
        }
    }

    Ok(())
}
