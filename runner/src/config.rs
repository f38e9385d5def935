use crate::{
    executors::Invocation,
    matrix::{Configuration, FlagSet, OptionGroup},
};
use falcon_ingest::{extract::DEFAULT_MARKER, Catalog, CatalogEntry, IndexMode};
use globset::{Glob, GlobSetBuilder};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::Error,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tracing::{error, warn};

const TARGET_PLACEHOLDER: &str = "{target}";
const THREADS_PLACEHOLDER: &str = "{threads}";

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound)
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::MetadataNotFound(e)),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to read config file")]
    ReadConfig(#[source] Error),
    #[error("Failed to parse config file")]
    ParseConfig(#[from] serde_yaml::Error),
    #[error("Globs were invalid")]
    InvalidGlobs(#[from] globset::Error),
    #[error("Config failed preflight checks")]
    Preflight,
    #[error("Unknown system '{0}' referenced by an option group")]
    UnknownSystem(String),
    #[error("File not found")]
    FileNotFound,
    #[error("Metadata not found")]
    MetadataNotFound(#[source] Error),
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub executor: ExecutorConfig,
    // root directory for all batch results
    #[serde(default = "default_output")]
    pub output: PathBuf,
    // substring identifying result lines in the benchmark output
    #[serde(default = "default_marker")]
    pub marker: String,
    // system catalog, falls back to the built-in one
    #[serde(default)]
    pub systems: Option<Vec<CatalogEntry>>,
    // batches in the order they are run
    pub batches: Vec<BatchConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    pub program: PathBuf,
    // leading arguments, may contain {target} and {threads}
    #[serde(default)]
    pub args: Vec<String>,
    // argument placed in front of every flag, empty to pass flags bare
    #[serde(default = "default_flag_arg")]
    pub flag_arg: String,
    #[serde(default)]
    pub trailing_args: Vec<String>,
    // timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    pub threads_env: Option<String>,
    #[serde(default = "default_threads")]
    pub default_threads: u32,
    // storage files removed before every run
    #[serde(default)]
    pub cleanup: Vec<PathBuf>,
    // cores the runner (and with it every benchmark) is pinned to
    pub cores: Option<Vec<usize>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SelectorConfig {
    pub command: Vec<String>,
    pub dir: Option<PathBuf>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    pub name: String,
    // benchmark substituted for {target}
    pub target: String,
    #[serde(default)]
    pub index: IndexMode,
    // switches the engine to the index of this batch before the first run
    pub selector: Option<SelectorConfig>,
    #[serde(default = "default_repetitions")]
    pub repetitions: u32,
    pub groups: Vec<GroupConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct GroupConfig {
    pub name: String,
    pub choices: Vec<Choice>,
}

/// a flag set as written in the config file
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum Choice {
    Threads(u32),
    Tokens(Vec<String>),
    System { system: String },
}

impl Choice {
    fn resolve(&self, catalog: &Catalog) -> Result<FlagSet, ConfigErrors> {
        match self {
            Self::Threads(threads) => Ok(FlagSet::Threads(*threads)),
            Self::Tokens(tokens) => Ok(FlagSet::Tokens(
                tokens
                    .iter()
                    .filter(|token| !token.is_empty())
                    .cloned()
                    .collect(),
            )),
            Self::System { system } => catalog
                .get(system)
                .map(|entry| FlagSet::Tokens(entry.tokens.clone()))
                .ok_or_else(|| ConfigErrors::UnknownSystem(system.clone())),
        }
    }
}

impl BatchConfig {
    /// option groups with all system references replaced by their tokens
    pub fn option_groups(&self, catalog: &Catalog) -> Result<Vec<OptionGroup>, ConfigErrors> {
        self.groups
            .iter()
            .map(|group| {
                Ok(OptionGroup {
                    name: group.name.clone(),
                    flag_sets: group
                        .choices
                        .iter()
                        .map(|choice| choice.resolve(catalog))
                        .collect::<Result<_, _>>()?,
                })
            })
            .collect()
    }
}

impl ExecutorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// command line for one configuration of a batch
    pub fn invocation(&self, target: &str, configuration: &Configuration) -> Invocation {
        let threads = configuration.threads.to_string();
        let substitute = |arg: &String| {
            arg.replace(TARGET_PLACEHOLDER, target)
                .replace(THREADS_PLACEHOLDER, &threads)
        };

        let mut args = self.args.iter().map(substitute).collect_vec();

        for flag in configuration.flags.iter().filter(|flag| !flag.is_empty()) {
            if !self.flag_arg.is_empty() {
                args.push(self.flag_arg.clone());
            }
            args.push(flag.clone());
        }

        args.extend(self.trailing_args.iter().map(substitute));

        Invocation {
            program: self.program.clone(),
            args,
            env: self
                .threads_env
                .iter()
                .map(|name| (name.clone(), threads.clone()))
                .collect(),
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let file = File::open(path).map_err(ConfigErrors::ReadConfig)?;

        Ok(serde_yaml::from_reader(file)?)
    }

    pub fn catalog(&self) -> Catalog {
        match &self.systems {
            Some(entries) => Catalog::new(entries.clone()),
            None => Catalog::builtin(),
        }
    }

    /// batches whose name matches any of `patterns`, all batches if there are none
    pub fn select_batches(&self, patterns: &[String]) -> Result<Vec<&BatchConfig>, ConfigErrors> {
        if patterns.is_empty() {
            return Ok(self.batches.iter().collect());
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(Glob::new(pattern)?);
        }
        let globs = builder.build()?;

        let selected = self
            .batches
            .iter()
            .filter(|batch| globs.is_match(&batch.name))
            .collect_vec();

        if selected.is_empty() {
            warn!(patterns = ?patterns, "No batch matched the selection");
        }

        Ok(selected)
    }

    /// Check the whole config, logging every problem found.
    ///
    /// Returns true if the config contains errors.
    pub fn preflight_checks(&self) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;
        let catalog = self.catalog();

        if self.executor.timeout == 0 {
            error!("executor.timeout cannot be 0, every run would time out");
            contains_error = true;
        }

        if self.executor.poll_interval_ms == 0 {
            warn!("executor.poll_interval_ms is 0, the runner will spin while waiting");
        }

        if self.executor.default_threads == 0 {
            error!("executor.default_threads cannot be 0");
            contains_error = true;
        }

        if self.executor.program.components().count() > 1 {
            match check_executable(&self.executor.program) {
                Ok(true) => {}
                Ok(false) => {
                    error!(
                        "executor.program {} is not executable",
                        self.executor.program.to_string_lossy()
                    );
                    contains_error = true;
                }
                Err(e) => {
                    error!(
                        "Failed to determine if executor.program ({}) is an executable: {e}",
                        self.executor.program.to_string_lossy()
                    );
                    contains_error = true;
                }
            }
        }

        if self.marker.is_empty() {
            error!("marker cannot be empty, every output line would be treated as a result");
            contains_error = true;
        }

        if let Some(entries) = &self.systems {
            for duplicate in entries.iter().map(|entry| &entry.name).duplicates() {
                warn!("systems.{duplicate} is defined more than once, only the first entry is used");
            }
        }

        if self.batches.is_empty() {
            error!("No batch was defined, nothing to run");
            contains_error = true;
        }

        for name in self.batches.iter().map(|batch| &batch.name).duplicates() {
            error!("Batch {name} is defined more than once, runs would overwrite each other");
            contains_error = true;
        }

        for batch in self.batches.iter() {
            let name = &batch.name;

            if name.is_empty() || name.contains('/') {
                error!("Batch name {name:?} must be a non-empty directory name");
                contains_error = true;
            }

            if batch.repetitions == 0 {
                error!("Batch {name}.repetitions cannot be 0");
                contains_error = true;
            }

            if let Some(selector) = &batch.selector {
                if selector.command.is_empty() {
                    error!("Batch {name}.selector.command cannot be empty");
                    contains_error = true;
                }
            }

            if batch.groups.is_empty() {
                warn!("Batch {name} has no option groups and will run a single configuration");
            }

            for group in batch.groups.iter() {
                if group.choices.is_empty() {
                    error!(
                        "Batch {name}.groups.{} has no choices, the batch would be empty",
                        group.name
                    );
                    contains_error = true;
                }

                for choice in group.choices.iter() {
                    match choice {
                        Choice::Threads(0) => {
                            error!("Batch {name}.groups.{} uses a thread count of 0", group.name);
                            contains_error = true;
                        }
                        Choice::System { system } if catalog.get(system).is_none() => {
                            error!(
                                "Batch {name}.groups.{} references {system} but {system} is not a known system",
                                group.name
                            );
                            contains_error = true;
                        }
                        _ => {}
                    }
                }
            }
        }

        contains_error
    }
}

fn default_output() -> PathBuf {
    PathBuf::from("result")
}

fn default_marker() -> String {
    DEFAULT_MARKER.to_string()
}

fn default_flag_arg() -> String {
    "--features".to_string()
}

fn default_timeout() -> u64 {
    600
}

fn default_poll_interval() -> u64 {
    200
}

fn default_threads() -> u32 {
    16
}

fn default_repetitions() -> u32 {
    1
}
