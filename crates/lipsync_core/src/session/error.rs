//! Session error types.

use thiserror::Error;

use crate::parsers::ParseError;
use crate::playback::PlaybackError;
use crate::supervisor::{ExecutionFailure, SupervisorError};

/// Errors surfaced by the session facade.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Execution(#[from] ExecutionFailure),

    #[error("Analysis run {run_id} was cancelled")]
    Cancelled { run_id: u64 },

    /// Not the latest run of this session, or its outcome was already taken.
    #[error("No outcome to collect for analysis run {run_id}")]
    OutcomeUnavailable { run_id: u64 },

    #[error("Failed to read cue output: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
