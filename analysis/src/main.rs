use clap::{ArgAction, Parser};
use falcon_analysis::{
    aggregate::Aggregate,
    config::{AnalysisConfig, ConfigErrors},
    report,
};
use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Collect the results of finished batches into report tables
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// YAML file describing the reports
    #[arg(short, long)]
    config: PathBuf,

    /// file receiving the report tables
    #[arg(short, long, default_value = "result.csv")]
    output: PathBuf,

    /// file receiving every consumed record, grouped by batch
    #[arg(short, long, default_value = "data.csv")]
    raw: PathBuf,

    /// raise the log level, ignored if RUST_LOG is set
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

fn load(path: &Path) -> Result<AnalysisConfig, ConfigErrors> {
    let config = AnalysisConfig::load(path)?;

    if config.preflight_checks() {
        Err(ConfigErrors::Preflight)
    } else {
        Ok(config)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let config = match load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(config = ?cli.config, "Failed to load config: {e}");
            if let Some(source) = std::error::Error::source(&e) {
                error!("Caused by: {source}");
            }

            return ExitCode::FAILURE;
        }
    };

    let aggregate = Aggregate::load(&config.results, &config.batches());

    if let Err(e) = report::write_outputs(&config.reports, &aggregate, &cli.output, &cli.raw) {
        error!("Failed to write reports: {e}");
        if let Some(source) = std::error::Error::source(&e) {
            error!("Caused by: {source}");
        }

        return ExitCode::FAILURE;
    }

    info!("Done with processing");

    ExitCode::SUCCESS
}
