//! Log levels, run logger configuration and line prefixes.

use serde::{Deserialize, Serialize};

/// Verbosity of application and run logs, as written in the settings file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// How a [`RunLogger`](super::RunLogger) writes one analysis run.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Messages below this level are dropped.
    pub level: LogLevel,
    /// Keep tool output out of the log file (it still reaches the tail)
    /// and only log progress every `progress_step` percent.
    pub compact: bool,
    pub progress_step: u32,
    /// Tool output lines kept for failure reports.
    pub tail_lines: usize,
    pub show_timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            compact: true,
            progress_step: 20,
            tail_lines: 20,
            show_timestamps: true,
        }
    }
}

/// Callback receiving each formatted run log line (e.g. a UI log view).
pub type LogCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Decoration applied to a run log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagePrefix {
    /// `$ rhubarb ...`
    Command,
    /// `=== Analysis ===`
    Phase,
    Success,
    Warning,
    Error,
}

impl MessagePrefix {
    pub fn format(&self, message: &str) -> String {
        let tag = match self {
            MessagePrefix::Command => return format!("$ {}", message),
            MessagePrefix::Phase => return format!("=== {} ===", message),
            MessagePrefix::Success => "SUCCESS",
            MessagePrefix::Warning => "WARNING",
            MessagePrefix::Error => "ERROR",
        };
        format!("[{}] {}", tag, message)
    }
}
