//! Cue file parse errors.

use std::path::PathBuf;

use crate::timeline::TimelineError;

/// Errors that can occur while parsing a cue file.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Failed to read the cue file.
    #[error("Failed to read file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Content is not valid UTF-8.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Invalid or non-numeric time value.
    #[error("Invalid time at line {line}: '{value}'")]
    InvalidTime { line: usize, value: String },

    /// A required field is missing.
    #[error("Missing field '{field}' at line {line}")]
    MissingField { line: usize, field: String },

    /// Unrecognized shape symbol.
    #[error("Unknown mouth shape at line {line}: '{value}'")]
    UnknownShape { line: usize, value: String },

    /// A structured document lacks the expected key.
    #[error("Missing required key: {0}")]
    MissingKey(String),

    /// Malformed JSON document.
    #[error("Malformed JSON: {0}")]
    MalformedJson(String),

    /// Malformed XML document.
    #[error("Malformed XML: {0}")]
    MalformedXml(String),

    /// No frame rate in the DAT header and none supplied.
    #[error("Frame-based content declares no frame rate")]
    MissingFrameRate,

    /// Frame rate is not a positive number.
    #[error("Invalid frame rate at line {line}: '{value}'")]
    InvalidFrameRate { line: usize, value: String },

    /// Frame index is not a non-negative integer, or too large to time.
    #[error("Invalid frame index at line {line}: '{value}'")]
    InvalidFrame { line: usize, value: String },

    /// Frame indices must increase strictly.
    #[error("Frame {frame} at line {line} does not follow frame {previous}")]
    FrameOutOfOrder {
        line: usize,
        frame: u64,
        previous: u64,
    },

    /// Cues violate the timeline invariants after normalization.
    #[error("Invalid timeline: {0}")]
    Timeline(#[from] TimelineError),
}

impl ParseError {
    /// Create a read error.
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid time error.
    pub fn invalid_time(line: usize, value: impl Into<String>) -> Self {
        Self::InvalidTime {
            line,
            value: value.into(),
        }
    }

    /// Create a missing field error.
    pub fn missing_field(line: usize, field: impl Into<String>) -> Self {
        Self::MissingField {
            line,
            field: field.into(),
        }
    }

    /// Create an unknown shape error.
    pub fn unknown_shape(line: usize, value: impl Into<String>) -> Self {
        Self::UnknownShape {
            line,
            value: value.into(),
        }
    }
}

/// Result type for parse operations.
pub type ParseResult<T> = Result<T, ParseError>;
