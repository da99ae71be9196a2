//! Logging infrastructure.
//!
//! - [`RunLogger`]: per-run logger with file + callback output, compact
//!   progress filtering and a tail buffer of tool output
//! - [`init_tracing`]: application-wide `tracing` subscriber
//! - [`init_tracing_with_file`]: the same, also appending to a log file
//!
//! # Example
//!
//! ```no_run
//! use lipsync_core::logging::{LogConfig, RunLogger};
//!
//! let logger = RunLogger::new("line01", "/path/to/logs", LogConfig::default(), None).unwrap();
//! logger.phase("Analysis");
//! logger.command("rhubarb -o line01.tsv --machineReadable line01.wav");
//! logger.progress(50);
//! logger.success("Analysis complete");
//! ```

mod run_logger;
mod types;

pub use run_logger::{run_name_for, RunLogger};
pub use types::{LogCallback, LogConfig, LogLevel, MessagePrefix};

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// Respects `RUST_LOG`, falling back to `default_level`. Output goes to
/// stderr. Call once at startup.
pub fn init_tracing(default_level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_filter()));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false),
        )
        .with(filter)
        .init();
}

/// Application log file name inside the logs folder.
pub const APP_LOG_FILE: &str = "lipsync-preview.log";

/// Initialize the global tracing subscriber with an additional file writer.
///
/// Events go to stderr and to [`APP_LOG_FILE`] inside `logs_dir`. Without a
/// logs folder, or if the file cannot be opened, only stderr is used.
///
/// The returned guard flushes the file writer when dropped; keep it alive
/// until the program exits.
pub fn init_tracing_with_file(
    default_level: LogLevel,
    logs_dir: Option<&Path>,
) -> Option<WorkerGuard> {
    let Some(dir) = logs_dir else {
        init_tracing(default_level);
        return None;
    };

    let appender = match RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(APP_LOG_FILE)
        .build(dir)
    {
        Ok(appender) => appender,
        Err(e) => {
            eprintln!("Warning: cannot write {}: {}", dir.join(APP_LOG_FILE).display(), e);
            init_tracing(default_level);
            return None;
        }
    };
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_filter()));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
        .with(filter)
        .init();

    Some(guard)
}

/// Initialize tracing for tests (only logs warnings and above).
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}
