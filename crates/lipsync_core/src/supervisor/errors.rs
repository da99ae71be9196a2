//! Supervisor error types.

use std::path::PathBuf;

use thiserror::Error;

/// Problems detected before the tool is spawned.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Rhubarb executable not found: {0}")]
    ExecutableNotFound(PathBuf),

    #[error("Input file not found: {0}")]
    InputNotFound(PathBuf),

    #[error("Output directory does not exist: {0}")]
    OutputDirMissing(PathBuf),

    #[error("Output directory is not writable: {path}: {source}")]
    OutputDirNotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot replace existing output file {path}: {source}")]
    OutputNotReplaceable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid option '{name}': {message}")]
    InvalidOption { name: String, message: String },
}

impl LaunchError {
    pub fn invalid_option(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidOption {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn not_writable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::OutputDirNotWritable {
            path: path.into(),
            source,
        }
    }
}

/// Errors returned synchronously by [`Supervisor::start`](super::Supervisor::start).
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// Another run is still active; it is left untouched.
    #[error("Analysis run {active_id} is still running")]
    Busy { active_id: u64 },

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SupervisorError {
    pub fn spawn(program: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }
}

/// Result type for supervisor operations.
pub type SupervisorResult<T> = Result<T, SupervisorError>;

/// Why a run ended in `Failed`.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Analysis failed ({}): {}", describe_exit(.exit_code), .reason)]
pub struct ExecutionFailure {
    /// Exit code, if the process exited normally.
    pub exit_code: Option<i32>,
    pub reason: String,
    /// Last lines of tool output, oldest first.
    pub log_tail: Vec<String>,
}

impl ExecutionFailure {
    pub fn new(exit_code: Option<i32>, reason: impl Into<String>, log_tail: Vec<String>) -> Self {
        Self {
            exit_code,
            reason: reason.into(),
            log_tail,
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code".to_string(),
    }
}
