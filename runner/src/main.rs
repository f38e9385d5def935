use clap::{ArgAction, Parser, Subcommand};
use falcon_ingest::RunId;
use falcon_runner::{
    batch::{self, BatchRunner},
    config::{ConfigErrors, RunConfig},
    executors::local::LocalExecutor,
};
use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Run every configuration of a benchmark matrix and keep the results
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// YAML file describing the executor and the batches
    #[arg(short, long)]
    config: PathBuf,

    /// raise the log level, ignored if RUST_LOG is set
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// run the selected batches
    Run {
        /// glob selecting batches by name, may be repeated
        #[arg(short, long)]
        batch: Vec<String>,

        /// skip all runs with a smaller id, to continue an interrupted batch
        #[arg(long, default_value_t = 1)]
        resume_from: RunId,
    },
    /// print every invocation of the selected batches without running them
    Plan {
        #[arg(short, long)]
        batch: Vec<String>,
    },
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

fn load(path: &Path) -> Result<RunConfig, ConfigErrors> {
    let config = RunConfig::load(path)?;

    if config.preflight_checks() {
        Err(ConfigErrors::Preflight)
    } else {
        Ok(config)
    }
}

fn run(config: &RunConfig, patterns: &[String], resume_from: RunId) -> ExitCode {
    let batches = match config.select_batches(patterns) {
        Ok(batches) => batches,
        Err(e) => {
            error!("Failed to select batches: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(cores) = &config.executor.cores {
        match affinity::set_thread_affinity(cores) {
            Ok(()) => info!(cores = ?cores, "Pinned runner and benchmarks to cores"),
            Err(e) => warn!(cores = ?cores, "Failed to pin runner to cores: {e}"),
        }
    }

    let catalog = config.catalog();

    for batch in batches {
        let executor = LocalExecutor::load(&config.executor);
        let mut runner = BatchRunner::new(executor, config, &catalog).resume_from(resume_from);

        if let Err(e) = runner.run(batch) {
            error!(batch = %batch.name, "Batch aborted: {e}");
            if let Some(source) = std::error::Error::source(&e) {
                error!("Caused by: {source}");
            }

            return ExitCode::FAILURE;
        }
    }

    info!("Done with processing");

    ExitCode::SUCCESS
}

fn plan(config: &RunConfig, patterns: &[String]) -> ExitCode {
    let catalog = config.catalog();

    let batches = match config.select_batches(patterns) {
        Ok(batches) => batches,
        Err(e) => {
            error!("Failed to select batches: {e}");
            return ExitCode::FAILURE;
        }
    };

    for batch in batches {
        match batch::plan(batch, &config.executor, &catalog) {
            Ok(runs) => {
                println!("# {} ({} runs, {:?} index)", batch.name, runs.len(), batch.index);

                for (run, threads, invocation) in runs {
                    println!("{run}\t{threads}\t{invocation}");
                }
            }
            Err(e) => {
                error!(batch = %batch.name, "Failed to plan batch: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
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

    match cli.command {
        Commands::Run { batch, resume_from } => run(&config, &batch, resume_from),
        Commands::Plan { batch } => plan(&config, &batch),
    }
}
