//! ExamWatch CLI — Command-line interface for exam monitoring sessions.
//!
//! Usage:
//!   examwatch run [OPTIONS]     Start monitoring (webcam, screen region, input log)
//!   examwatch check             Check system capabilities
//!   examwatch config [--save]   Show or save the effective configuration

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use examwatch_common::config::{config_file_path, AppConfig, CaptureRegion};
use examwatch_common::error::ExamwatchError;

mod commands;

#[derive(Parser)]
#[command(
    name = "examwatch",
    about = "Webcam, screen and input-event monitoring for exam sessions",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a monitoring session (Ctrl+C or `q` + Enter to stop)
    Run {
        #[command(flatten)]
        overrides: ConfigArgs,
    },

    /// Check system capabilities
    Check {
        #[command(flatten)]
        overrides: ConfigArgs,
    },

    /// Print the effective configuration as JSON
    Config {
        #[command(flatten)]
        overrides: ConfigArgs,

        /// Write the configuration to the standard location
        #[arg(long)]
        save: bool,
    },
}

/// Configuration source and per-field overrides.
#[derive(Args)]
struct ConfigArgs {
    /// Config file (defaults to the standard location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Webcam device index
    #[arg(long)]
    webcam_index: Option<u32>,

    /// Target capture rate (frames per second)
    #[arg(long)]
    fps: Option<f64>,

    /// Screen region as left,top,width,height
    #[arg(long, value_parser = parse_region)]
    region: Option<CaptureRegion>,

    /// Behavioral event log (CSV)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Frame classifier weights
    #[arg(long)]
    model: Option<PathBuf>,
}

impl ConfigArgs {
    /// Build the effective config. An explicit `--config` must load; a broken
    /// file at `default_path` falls back to defaults and is returned alongside.
    fn resolve(self, default_path: &Path) -> anyhow::Result<(AppConfig, Option<ExamwatchError>)> {
        let (mut config, fallback) = match &self.config {
            Some(path) => (AppConfig::load_from(path)?, None),
            None => AppConfig::load_or_default(default_path),
        };

        if let Some(index) = self.webcam_index {
            config.capture.webcam_index = index;
        }
        if let Some(fps) = self.fps {
            config.capture.target_fps = fps;
        }
        if let Some(region) = self.region {
            config.capture.region = region;
        }
        if let Some(path) = self.log_file {
            config.event_log.path = path;
        }
        if let Some(path) = self.model {
            config.detection.model_path = path;
        }
        Ok((config, fallback))
    }
}

fn parse_region(value: &str) -> Result<CaptureRegion, String> {
    CaptureRegion::parse(value).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { overrides } => {
            let config = prepare(overrides, cli.verbose)?;
            commands::run::run(config).await
        }
        Commands::Check { overrides } => {
            let config = prepare(overrides, cli.verbose)?;
            commands::check::run(&config)
        }
        Commands::Config { overrides, save } => {
            let config = prepare(overrides, cli.verbose)?;
            commands::config::run(&config, save)
        }
    }
}

/// Resolve the config, start logging from it, then report any fallback.
fn prepare(overrides: ConfigArgs, verbose: bool) -> anyhow::Result<AppConfig> {
    let default_path = config_file_path();
    let (config, fallback) = overrides.resolve(&default_path)?;
    init_logging(&config, verbose);
    if let Some(e) = fallback {
        tracing::warn!(
            path = %default_path.display(),
            error = %e,
            "Ignoring unreadable config file; using defaults"
        );
    }
    Ok(config)
}

fn init_logging(config: &AppConfig, verbose: bool) {
    let mut logging = config.logging.clone();
    if verbose {
        logging.level = "debug".to_string();
    }
    examwatch_common::logging::init_logging(&logging);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(argv: &[&str]) -> ConfigArgs {
        let mut full = vec!["examwatch", "config"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Commands::Config { overrides, .. } => overrides,
            _ => unreachable!(),
        }
    }

    #[test]
    fn broken_default_config_is_reported_not_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();

        let (config, fallback) = args(&["--fps", "5"]).resolve(&path).unwrap();
        assert_eq!(config.capture.target_fps, 5.0);
        assert!(fallback.is_some());
    }

    #[test]
    fn broken_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        std::fs::write(&path, "not json").unwrap();
        let path_arg = path.to_string_lossy().into_owned();

        let absent = dir.path().join("absent.json");
        assert!(args(&["--config", &path_arg]).resolve(&absent).is_err());
    }

    #[test]
    fn missing_default_config_uses_defaults_quietly() {
        let dir = tempfile::tempdir().unwrap();
        let (config, fallback) = args(&["--region", "10,20,300,200"])
            .resolve(&dir.path().join("absent.json"))
            .unwrap();
        assert!(fallback.is_none());
        assert_eq!(config.capture.region.left, 10);
        assert_eq!(config.capture.region.width, 300);
    }
}
