//! Tool invocation building.
//!
//! Turns user-facing [`AnalysisOptions`] into an [`Invocation`] the
//! supervisor can launch.
//!
//! # Example
//!
//! ```no_run
//! use lipsync_core::command::{default_executable_path, AnalysisOptions, Recognizer};
//!
//! let mut options = AnalysisOptions::new("line01.wav", "line01.json");
//! options.recognizer = Recognizer::Phonetic;
//!
//! let invocation = options.to_invocation(default_executable_path("."))?;
//! println!("{}", invocation.preview());
//! # Ok::<(), lipsync_core::supervisor::LaunchError>(())
//! ```

mod invocation;
mod options;

pub use invocation::{default_executable_path, Invocation};
pub use options::{
    AnalysisOptions, Recognizer, ToolLogLevel, DAT_FRAME_RATE_RANGE, DEFAULT_DAT_FRAME_RATE,
    MAX_THREADS,
};
