//! Timeline error types.

/// Errors raised when a cue sequence violates the timeline invariants.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimelineError {
    /// A cue time is negative, NaN or infinite.
    #[error("Cue {index} has an invalid time: {value}")]
    InvalidTime { index: usize, value: f64 },

    /// A cue ends at or before its start.
    #[error("Cue {index} is empty or inverted: {start}s .. {end}s")]
    EmptyInterval { index: usize, start: f64, end: f64 },

    /// A cue starts before the previous cue.
    #[error("Cue {index} starts at {start}s, before the previous cue at {previous_start}s")]
    OutOfOrder {
        index: usize,
        previous_start: f64,
        start: f64,
    },

    /// A cue starts before the previous cue has ended.
    #[error("Cue {index} starts at {start}s, overlapping the previous cue ending at {previous_end}s")]
    Overlap {
        index: usize,
        previous_end: f64,
        start: f64,
    },

    /// Unrecognized shape symbol.
    #[error("Unknown mouth shape '{0}'")]
    UnknownShape(String),
}

/// Result type for timeline construction.
pub type TimelineResult<T> = Result<T, TimelineError>;
