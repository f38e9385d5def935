use crate::{
    config::{BatchConfig, ConfigErrors, ExecutorConfig, RunConfig, SelectorConfig},
    executors::{Executor, Invocation, RunOutcome},
    matrix::{self, EnumerationContext},
    storage::{ArtifactStore, StorageError},
};
use falcon_ingest::{Catalog, Extractor, RunId};
use std::{
    convert::Infallible,
    path::Path,
    process::{Command, ExitStatus},
};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Batch configuration is invalid")]
    Config(#[from] ConfigErrors),
    #[error("Failed to store run artifacts")]
    Storage(#[from] StorageError),
    #[error("Index selector has no command")]
    EmptySelector,
    #[error("Failed to start index selector")]
    SelectorSpawn(#[source] std::io::Error),
    #[error("Index selector exited with {0}")]
    SelectorFailed(ExitStatus),
}

/// counters collected while running one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub name: String,
    /// run ids handed out, including skipped ones
    pub runs: u64,
    pub skipped: u64,
    pub timeouts: u64,
    /// runs that could not be executed at all
    pub failures: u64,
    pub records: usize,
    /// result lines dropped because they could not be parsed
    pub rejected_lines: usize,
}

/// run the external index-mode selector, e.g. a checkout of the matching index branch
#[instrument(level = "info")]
pub fn select_index(selector: &SelectorConfig) -> Result<(), BatchError> {
    let (program, args) = selector
        .command
        .split_first()
        .ok_or(BatchError::EmptySelector)?;

    let mut command = Command::new(program);
    command.args(args);
    if let Some(dir) = &selector.dir {
        command.current_dir(dir);
    }

    let status = command.status().map_err(BatchError::SelectorSpawn)?;

    if status.success() {
        debug!("Index selector finished");
        Ok(())
    } else {
        Err(BatchError::SelectorFailed(status))
    }
}

/// every run of a batch with its thread count and command line, without running anything
pub fn plan(
    batch: &BatchConfig,
    executor: &ExecutorConfig,
    catalog: &Catalog,
) -> Result<Vec<(RunId, u32, Invocation)>, ConfigErrors> {
    let groups = batch.option_groups(catalog)?;
    let mut context = EnumerationContext::new(executor.default_threads);
    let mut runs = Vec::new();

    matrix::enumerate(&groups, &mut context, batch.repetitions, &mut |run, configuration| {
        runs.push((
            run,
            configuration.threads,
            executor.invocation(&batch.target, &configuration),
        ));

        Ok::<(), Infallible>(())
    })
    .unwrap_or_else(|never| match never {});

    Ok(runs)
}

/// Drives all configurations of a batch through an executor, one run at a time.
///
/// Timeouts and runs that fail to start are recorded and skipped, only failing
/// to write artifacts ends a batch early.
pub struct BatchRunner<'a, E> {
    executor: E,
    config: &'a ExecutorConfig,
    catalog: &'a Catalog,
    output: &'a Path,
    marker: &'a str,
    resume_from: RunId,
}

impl<'a, E: Executor> BatchRunner<'a, E> {
    pub fn new(executor: E, config: &'a RunConfig, catalog: &'a Catalog) -> Self {
        Self {
            executor,
            config: &config.executor,
            catalog,
            output: &config.output,
            marker: &config.marker,
            resume_from: 1,
        }
    }

    /// skip every run with an id below `run`, used to continue an interrupted batch
    pub fn resume_from(mut self, run: RunId) -> Self {
        self.resume_from = run;
        self
    }

    #[instrument(skip(self, batch), fields(batch = %batch.name), level = "info")]
    pub fn run(&mut self, batch: &BatchConfig) -> Result<BatchSummary, BatchError> {
        if let Some(selector) = &batch.selector {
            select_index(selector)?;
        }

        let groups = batch.option_groups(self.catalog)?;
        let store = ArtifactStore::open(self.output, &batch.name)?;
        let extractor = Extractor::new(self.catalog, batch.index).with_marker(self.marker);
        let total = matrix::run_count(&groups, batch.repetitions);

        info!(
            runs = total,
            index = ?batch.index,
            dir = ?store.dir(),
            "Starting batch {}",
            batch.name
        );

        let executor = &mut self.executor;
        let config = self.config;
        let resume_from = self.resume_from;
        let mut summary = BatchSummary {
            name: batch.name.clone(),
            ..Default::default()
        };
        let mut context = EnumerationContext::new(config.default_threads);

        matrix::enumerate(&groups, &mut context, batch.repetitions, &mut |run, configuration| {
            summary.runs += 1;

            if run < resume_from {
                debug!(run = run, "Skipping run before resume point");
                summary.skipped += 1;

                return Ok(());
            }

            let invocation = config.invocation(&batch.target, &configuration);

            match executor.run_once(&invocation) {
                Ok(RunOutcome::Completed(output)) => {
                    let extraction =
                        extractor.extract(configuration.flags, configuration.threads, &output.stdout);

                    for rejected in extraction.rejected.iter() {
                        warn!(
                            run = run,
                            line = rejected.line,
                            content = %rejected.content,
                            "Skipped result line: {}",
                            rejected.error
                        );
                    }

                    if extraction.records.is_empty() {
                        warn!(run = run, "Run reported no results");
                    }

                    summary.records += extraction.records.len();
                    summary.rejected_lines += extraction.rejected.len();

                    store.write(run, &extraction.records, &output.stdout)?;
                }
                Ok(RunOutcome::TimedOut { elapsed }) => {
                    warn!(run = run, elapsed = ?elapsed, "Run timed out: {invocation}");
                    summary.timeouts += 1;

                    store.write_timeout(run, &invocation.to_string())?;
                }
                Err(e) => {
                    error!(run = run, "Run failed: {e}");
                    summary.failures += 1;

                    store.write(run, &[], "")?;
                }
            }

            info!("Done with {run}/{total}");

            Ok::<(), StorageError>(())
        })?;

        if summary.rejected_lines > 0 {
            warn!(
                rejected = summary.rejected_lines,
                "Batch {} skipped malformed result lines", summary.name
            );
        }

        info!(
            records = summary.records,
            timeouts = summary.timeouts,
            failures = summary.failures,
            skipped = summary.skipped,
            "Finished batch {}",
            summary.name
        );

        Ok(summary)
    }
}
