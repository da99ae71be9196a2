//! Classification of machine-readable status records.
//!
//! With `--machineReadable` the tool writes one JSON object per line:
//!
//! ```text
//! {"type":"start","file":"line01.wav","log":{"level":"Info","message":"Application startup."}}
//! {"type":"progress","value":0.42,"log":{"level":"Trace","message":"Progress: 42%"}}
//! {"type":"success","log":{"level":"Info","message":"Application terminating normally."}}
//! {"type":"failure","reason":"Error processing file","log":{"level":"Fatal","message":"..."}}
//! ```
//!
//! Anything that does not parse as such a record is plain log text.

use serde::{Deserialize, Serialize};

/// Which output stream carries the records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStream {
    Stdout,
    /// Rhubarb writes its records to stderr.
    #[default]
    Stderr,
}

/// Output stream of a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn is_stderr(self) -> bool {
        self == StreamKind::Stderr
    }
}

impl From<RecordStream> for StreamKind {
    fn from(stream: RecordStream) -> Self {
        match stream {
            RecordStream::Stdout => StreamKind::Stdout,
            RecordStream::Stderr => StreamKind::Stderr,
        }
    }
}

/// One line of tool output, tagged with its stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: StreamKind,
    pub text: String,
}

impl OutputLine {
    pub fn new(stream: StreamKind, text: impl Into<String>) -> Self {
        Self {
            stream,
            text: text.into(),
        }
    }
}

/// A log message emitted by the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolLog {
    /// Tool log level (`Trace` .. `Fatal`), absent for plain text lines.
    pub level: Option<String>,
    pub message: String,
}

impl ToolLog {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            level: None,
            message: message.into(),
        }
    }
}

/// A recognized status record.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRecord {
    Start { file: Option<String> },
    Progress { value: f64 },
    Success,
    Failure { reason: String },
    /// A record of another type; only its log message matters.
    Other { kind: String },
}

impl ToolRecord {
    /// Whether the tool considers itself done.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ToolRecord::Success | ToolRecord::Failure { .. })
    }
}

/// Result of classifying one output line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    Record {
        record: ToolRecord,
        log: Option<ToolLog>,
    },
    /// Not a status record.
    Text(String),
}

#[derive(Deserialize)]
struct RawRecord {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    value: Option<f64>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    log: Option<RawLog>,
}

#[derive(Deserialize)]
struct RawLog {
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Classify a single line of tool output.
pub fn classify_line(line: &str) -> LineKind {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return LineKind::Text(line.to_string());
    }

    let raw: RawRecord = match serde_json::from_str(trimmed) {
        Ok(raw) => raw,
        Err(_) => return LineKind::Text(line.to_string()),
    };

    let record = match raw.kind.as_str() {
        "start" => ToolRecord::Start { file: raw.file },
        "progress" => match raw.value {
            Some(value) if value.is_finite() => ToolRecord::Progress { value },
            _ => return LineKind::Text(line.to_string()),
        },
        "success" => ToolRecord::Success,
        "failure" => ToolRecord::Failure {
            reason: raw
                .reason
                .unwrap_or_else(|| "Tool reported failure".to_string()),
        },
        other => ToolRecord::Other {
            kind: other.to_string(),
        },
    };

    let log = raw.log.and_then(|log| {
        log.message.map(|message| ToolLog {
            level: log.level,
            message,
        })
    });

    LineKind::Record { record, log }
}
