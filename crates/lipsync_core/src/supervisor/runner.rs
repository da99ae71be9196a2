//! Supervisor: validates, spawns and watches tool runs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use super::errors::{ExecutionFailure, LaunchError, SupervisorError, SupervisorResult};
use super::handle::{EventCallback, ExecutionHandle, ExecutionState};
use super::process::{ProcessLauncher, SystemLauncher, ToolProcess};
use super::record::{classify_line, LineKind, OutputLine, RecordStream, StreamKind, ToolLog, ToolRecord};
use crate::command::Invocation;
use crate::logging::{run_name_for, LogConfig, RunLogger};

/// Supervisor configuration, copied in at construction.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Stream carrying the machine-readable records.
    pub record_stream: RecordStream,
    /// Minimum interval between progress notifications.
    pub progress_interval: Duration,
    /// Folder for per-run log files; `None` keeps run logs in memory only.
    pub log_dir: Option<PathBuf>,
    pub log_config: LogConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            record_stream: RecordStream::default(),
            progress_interval: Duration::from_millis(50),
            log_dir: None,
            log_config: LogConfig::default(),
        }
    }
}

/// Runs the analysis tool, at most one run at a time.
pub struct Supervisor {
    launcher: Arc<dyn ProcessLauncher>,
    config: SupervisorConfig,
    active: Mutex<Option<ExecutionHandle>>,
    next_id: AtomicU64,
    log_callback: Option<Arc<dyn Fn(&str) + Send + Sync>>,
}

impl Supervisor {
    /// Supervisor launching real processes.
    pub fn new(config: SupervisorConfig) -> Self {
        Self::with_launcher(Arc::new(SystemLauncher), config)
    }

    /// Supervisor using a custom launcher.
    pub fn with_launcher(launcher: Arc<dyn ProcessLauncher>, config: SupervisorConfig) -> Self {
        Self {
            launcher,
            config,
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
            log_callback: None,
        }
    }

    /// Forward every run log line to `callback` as well.
    pub fn with_log_callback(mut self, callback: Arc<dyn Fn(&str) + Send + Sync>) -> Self {
        self.log_callback = Some(callback);
        self
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// The most recently started run, if any.
    pub fn active(&self) -> Option<ExecutionHandle> {
        self.active.lock().clone()
    }

    /// Validate the invocation, spawn the tool and start watching it.
    ///
    /// Fails with [`SupervisorError::Busy`] while a previous run is still
    /// active; that run is not affected.
    pub fn start(&self, invocation: Invocation) -> SupervisorResult<ExecutionHandle> {
        let mut active = self.active.lock();
        if let Some(current) = active.as_ref() {
            if !current.is_terminal() {
                tracing::warn!("Rejected start: run {} is still running", current.id());
                return Err(SupervisorError::Busy {
                    active_id: current.id(),
                });
            }
        }

        validate_invocation(&invocation)?;
        remove_stale_output(invocation.output_path())?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let logger = Arc::new(self.create_logger(&invocation));
        logger.phase("Analysis");
        logger.command(&invocation.command_line());

        let process = match self.launcher.spawn(&invocation) {
            Ok(process) => process,
            Err(e) => {
                logger.error(&format!("Failed to start Rhubarb: {}", e));
                return Err(SupervisorError::spawn(invocation.executable(), e));
            }
        };
        let terminator = process.terminator();

        let handle = ExecutionHandle::new(id, invocation, logger, self.config.progress_interval);
        handle.set_terminator(terminator.clone());
        handle.mark_running();

        let worker = Worker {
            handle: handle.clone(),
            record_stream: self.config.record_stream.into(),
        };
        let spawned = thread::Builder::new()
            .name(format!("lipsync-run-{}", id))
            .spawn(move || worker.run(process));

        if let Err(e) = spawned {
            let _ = terminator.terminate();
            handle.finish(
                ExecutionState::Failed,
                None,
                Some(ExecutionFailure::new(
                    None,
                    format!("Failed to start output reader: {}", e),
                    Vec::new(),
                )),
            );
            return Err(SupervisorError::spawn(handle.invocation().executable(), e));
        }

        tracing::info!("Started run {}: {}", id, handle.invocation().preview());
        *active = Some(handle.clone());
        Ok(handle)
    }

    /// Cancel a run. No-op if it already finished.
    pub fn cancel(&self, handle: &ExecutionHandle) -> bool {
        let cancelled = handle.cancel();
        if cancelled {
            handle.logger().warn("Run cancelled");
        }
        cancelled
    }

    /// Register an observer for a run.
    pub fn on_event(&self, handle: &ExecutionHandle, callback: EventCallback) {
        handle.subscribe(callback);
    }

    fn create_logger(&self, invocation: &Invocation) -> RunLogger {
        let run_name = run_name_for(invocation.output_path());
        let callback = self.log_callback.clone().map(|cb| {
            Box::new(move |line: &str| cb(line)) as crate::logging::LogCallback
        });

        match &self.config.log_dir {
            Some(dir) => {
                match RunLogger::new(&run_name, dir, self.config.log_config.clone(), callback) {
                    Ok(logger) => logger,
                    Err(e) => {
                        tracing::warn!("Cannot create run log in {}: {}", dir.display(), e);
                        RunLogger::in_memory(
                            run_name,
                            self.config.log_config.clone(),
                            None,
                        )
                    }
                }
            }
            None => RunLogger::in_memory(run_name, self.config.log_config.clone(), callback),
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(SupervisorConfig::default())
    }
}

/// Check everything that can be checked before spawning.
pub fn validate_invocation(invocation: &Invocation) -> Result<(), LaunchError> {
    let executable = invocation.executable();
    if !executable.is_file() {
        return Err(LaunchError::ExecutableNotFound(executable.to_path_buf()));
    }

    for input in invocation.required_inputs() {
        if !input.is_file() {
            return Err(LaunchError::InputNotFound(input.clone()));
        }
    }

    let output_dir = match invocation.output_path().parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if !output_dir.is_dir() {
        return Err(LaunchError::OutputDirMissing(output_dir));
    }
    probe_writable(&output_dir).map_err(|e| LaunchError::not_writable(&output_dir, e))?;

    Ok(())
}

/// Create and remove a scratch file in `dir`.
/// Delete a cue file left over from an earlier run, so a zero exit is only
/// judged a success when this run wrote the output.
fn remove_stale_output(path: &Path) -> Result<(), LaunchError> {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!("Removed previous output {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(LaunchError::OutputNotReplaceable {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn probe_writable(dir: &Path) -> io::Result<()> {
    let probe = dir.join(format!(".lipsync-write-probe-{}", std::process::id()));
    fs::File::create(&probe)?;
    fs::remove_file(&probe)
}

/// What the record stream said about the outcome.
#[derive(Default)]
struct Reported {
    failure_reason: Option<String>,
    terminal_seen: bool,
}

/// Reads one process's output on a dedicated thread.
struct Worker {
    handle: ExecutionHandle,
    record_stream: StreamKind,
}

impl Worker {
    fn run(self, mut process: Box<dyn ToolProcess>) {
        let mut reported = Reported::default();
        let mut read_error = None;

        loop {
            match process.read_line() {
                Ok(Some(line)) => self.handle_line(line, &mut reported),
                Ok(None) => break,
                Err(e) => {
                    read_error = Some(e);
                    break;
                }
            }
        }

        self.handle.flush_progress();

        if let Some(ref e) = read_error {
            tracing::warn!("Run {}: reading tool output failed: {}", self.handle.id(), e);
            let _ = process.terminator().terminate();
        }

        let exit = process.wait();
        self.complete(exit, read_error, reported);
    }

    fn handle_line(&self, line: OutputLine, reported: &mut Reported) {
        let logger = self.handle.logger();
        let is_stderr = line.stream.is_stderr();

        if line.stream != self.record_stream {
            self.forward_text(line.text, is_stderr);
            return;
        }

        match classify_line(&line.text) {
            LineKind::Text(text) => self.forward_text(text, is_stderr),
            LineKind::Record { record, log } => {
                match &record {
                    ToolRecord::Progress { value } => {
                        if !reported.terminal_seen {
                            self.handle.report_progress(*value);
                            logger.progress((value.clamp(0.0, 1.0) * 100.0).round() as u32);
                        }
                        return;
                    }
                    ToolRecord::Start { file } => {
                        if let Some(file) = file {
                            logger.info(&format!("Processing {}", file));
                        }
                    }
                    ToolRecord::Success => reported.terminal_seen = true,
                    ToolRecord::Failure { reason } => {
                        reported.terminal_seen = true;
                        reported.failure_reason = Some(reason.clone());
                    }
                    ToolRecord::Other { kind } => {
                        tracing::trace!("Run {}: '{}' record", self.handle.id(), kind);
                    }
                }

                if let Some(log) = log {
                    logger.output_line(&log.message, is_stderr);
                    self.handle.report_log(log);
                }
            }
        }
    }

    fn forward_text(&self, text: String, is_stderr: bool) {
        if text.trim().is_empty() {
            return;
        }
        self.handle.logger().output_line(&text, is_stderr);
        self.handle.report_log(ToolLog::text(text));
    }

    fn complete(&self, exit: io::Result<Option<i32>>, read_error: Option<io::Error>, reported: Reported) {
        let logger = self.handle.logger();

        if self.handle.state() == ExecutionState::Cancelled {
            tracing::debug!("Run {}: cancelled process has exited", self.handle.id());
            logger.flush();
            return;
        }

        let exit_code = exit.as_ref().ok().copied().flatten();
        let output_path = self.handle.invocation().output_path();

        let reason = match (&exit, read_error) {
            (_, Some(e)) => Some(format!("Failed to read Rhubarb output: {}", e)),
            (Err(e), None) => Some(format!("Failed to wait for Rhubarb: {}", e)),
            (Ok(Some(0)), None) => match reported.failure_reason {
                Some(reason) => Some(reason),
                None if !output_path.is_file() => Some(format!(
                    "Output file was not created: {}",
                    output_path.display()
                )),
                None => None,
            },
            (Ok(Some(code)), None) => Some(
                reported
                    .failure_reason
                    .unwrap_or_else(|| format!("Rhubarb exited with code {}", code)),
            ),
            (Ok(None), None) => Some(
                reported
                    .failure_reason
                    .unwrap_or_else(|| "Rhubarb was terminated by a signal".to_string()),
            ),
        };

        match reason {
            None => {
                logger.success(&format!("Cues written to {}", output_path.display()));
                logger.flush();
                self.handle
                    .finish(ExecutionState::Succeeded, exit_code, None);
            }
            Some(reason) => {
                logger.error(&reason);
                logger.show_tail("rhubarb");
                logger.flush();
                let failure = ExecutionFailure::new(exit_code, reason, logger.get_tail());
                self.handle
                    .finish(ExecutionState::Failed, exit_code, Some(failure));
            }
        }
    }
}
