pub mod local;

use itertools::Itertools;
use std::{fmt, path::PathBuf, time::Duration};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to spawn benchmark")]
    Spawn(#[source] std::io::Error),
    #[error("Failed to wait for the benchmark process")]
    Wait(#[source] std::io::Error),
    #[error("Failed to terminate the benchmark process")]
    Kill(#[source] std::io::Error),
    #[error("Failed to read benchmark output")]
    Output(#[source] std::io::Error),
    #[error("Output reader thread panicked")]
    Reader,
}

/// a fully expanded benchmark command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.env.iter() {
            write!(f, "{name}={value} ")?;
        }

        write!(f, "{}", self.program.to_string_lossy())?;

        if !self.args.is_empty() {
            write!(f, " {}", self.args.iter().join(" "))?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// container for information extracted from running a benchmark
pub struct RunOutput {
    pub runtime: Duration,
    pub stdout: String,
    /// exit code, `None` if the process was ended by a signal
    pub status: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunOutput),
    /// the process was killed after exceeding its timeout, its output is gone
    TimedOut { elapsed: Duration },
}

/// Runs one benchmark invocation at a time.
pub trait Executor {
    fn run_once(&mut self, invocation: &Invocation) -> Result<RunOutcome, ExecutorError>;
}

impl<E: Executor + ?Sized> Executor for &mut E {
    fn run_once(&mut self, invocation: &Invocation) -> Result<RunOutcome, ExecutorError> {
        (**self).run_once(invocation)
    }
}
