use super::{Executor, ExecutorError, Invocation, RunOutcome, RunOutput};
use crate::config::ExecutorConfig;
use nix::{
    errno::Errno,
    sys::signal::{killpg, Signal},
    unistd::Pid,
};
use std::{
    fs,
    io::{ErrorKind, Read},
    os::unix::process::{CommandExt, ExitStatusExt},
    path::PathBuf,
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument, trace, warn};
use wait_timeout::ChildExt;

/// Executor running benchmarks as local child processes, one at a time.
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    timeout: Duration,
    poll_interval: Duration,
    cleanup: Vec<PathBuf>,
}

impl LocalExecutor {
    pub fn new(timeout: Duration, poll_interval: Duration, cleanup: Vec<PathBuf>) -> Self {
        Self {
            timeout,
            poll_interval,
            cleanup,
        }
    }

    pub fn load(config: &ExecutorConfig) -> Self {
        Self::new(config.timeout(), config.poll_interval(), config.cleanup.clone())
    }

    /// remove storage files left behind by a previous run
    fn cleanup(&self) {
        for path in self.cleanup.iter() {
            match fs::remove_file(path) {
                Ok(()) => debug!(path = ?path, "Removed stale storage file"),
                Err(error) if error.kind() == ErrorKind::NotFound => {
                    trace!(path = ?path, "No storage file to remove")
                }
                Err(error) => warn!(path = ?path, error = %error, "Failed to remove storage file"),
            }
        }
    }

    /// kill the whole process group of `child` and reap it
    fn terminate(child: &mut Child) -> Result<(), ExecutorError> {
        let group = Pid::from_raw(child.id() as i32);

        if let Err(errno) = killpg(group, Signal::SIGKILL) {
            debug!(errno = %errno, "Failed to kill process group, killing the child only");

            if let Err(error) = child.kill() {
                // the child may have exited between the last poll and the kill
                if error.kind() != ErrorKind::InvalidInput {
                    return Err(ExecutorError::Kill(error));
                }
            }
        }

        child.wait().map_err(ExecutorError::Wait)?;

        Ok(())
    }

    /// kill whatever the exited leader left running in its group, those would keep stdout open
    fn kill_stragglers(group: Pid) {
        match killpg(group, Signal::SIGKILL) {
            Ok(()) => debug!(group = %group, "Killed processes left behind by the benchmark"),
            Err(Errno::ESRCH) => trace!(group = %group, "No processes left in the group"),
            Err(errno) => warn!(group = %group, errno = %errno, "Failed to kill leftover processes"),
        }
    }
}

impl Executor for LocalExecutor {
    #[instrument(skip(self, invocation), level = "debug")]
    fn run_once(&mut self, invocation: &Invocation) -> Result<RunOutcome, ExecutorError> {
        self.cleanup();

        info!("Running: {invocation}");

        let start = Instant::now();
        let mut child = Command::new(&invocation.program)
            .args(invocation.args.iter())
            .envs(invocation.env.iter().map(|(name, value)| (name, value)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            // own process group so a timeout takes down everything the benchmark spawned
            .process_group(0)
            .spawn()
            .map_err(ExecutorError::Spawn)?;
        let group = Pid::from_raw(child.id() as i32);

        // drain stdout concurrently, a full pipe would otherwise stall the benchmark
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecutorError::Output(ErrorKind::BrokenPipe.into()))?;
        let reader = thread::spawn(move || {
            let mut buffer = Vec::new();
            stdout.read_to_end(&mut buffer).map(|_| buffer)
        });

        loop {
            let remaining = self.timeout.saturating_sub(start.elapsed());

            if remaining.is_zero() {
                Self::terminate(&mut child)?;
                let elapsed = start.elapsed();

                // the reader finishes on its own once the pipe is closed
                drop(reader);
                warn!(elapsed = ?elapsed, "Benchmark ran into its timeout and was killed");

                return Ok(RunOutcome::TimedOut { elapsed });
            }

            match child
                .wait_timeout(self.poll_interval.min(remaining))
                .map_err(ExecutorError::Wait)?
            {
                Some(status) => {
                    let runtime = start.elapsed();
                    Self::kill_stragglers(group);
                    let buffer = reader
                        .join()
                        .map_err(|_| ExecutorError::Reader)?
                        .map_err(ExecutorError::Output)?;
                    let stdout = String::from_utf8_lossy(&buffer).into_owned();

                    debug!(
                        "Finished in {} ms | status: {}",
                        runtime.as_millis(),
                        status.success()
                    );
                    if !status.success() {
                        warn!(
                            code = ?status.code(),
                            signal = ?status.signal(),
                            "Benchmark exited unsuccessfully, extracting what it reported"
                        );
                    }
                    trace!("Output: {stdout}");

                    return Ok(RunOutcome::Completed(RunOutput {
                        runtime,
                        stdout,
                        status: status.code(),
                    }));
                }
                None => trace!(elapsed = ?start.elapsed(), "Benchmark still running"),
            }
        }
    }
}
