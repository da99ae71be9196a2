//! Process supervision for the analysis tool.
//!
//! [`Supervisor::start`] validates an [`Invocation`](crate::command::Invocation),
//! spawns the tool once and reads its machine-readable records on a
//! dedicated worker thread. Callers observe the run through an
//! [`ExecutionHandle`]: progress, tool log lines and exactly one terminal
//! event per observer.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lipsync_core::command::AnalysisOptions;
//! use lipsync_core::supervisor::{ExecutionEvent, Supervisor, SupervisorConfig};
//!
//! let supervisor = Supervisor::new(SupervisorConfig::default());
//! let invocation = AnalysisOptions::new("line01.wav", "line01.tsv")
//!     .to_invocation("/opt/rhubarb/rhubarb")?;
//!
//! let handle = supervisor.start(invocation)?;
//! supervisor.on_event(&handle, Arc::new(|event: &ExecutionEvent| {
//!     if let ExecutionEvent::Progress(p) = event {
//!         println!("{:.0}%", p * 100.0);
//!     }
//! }));
//!
//! let outcome = handle.wait();
//! println!("{}", outcome.state);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod errors;
mod handle;
mod process;
mod record;
mod runner;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use errors::{ExecutionFailure, LaunchError, SupervisorError, SupervisorResult};
pub use handle::{EventCallback, ExecutionEvent, ExecutionHandle, ExecutionState, TerminalEvent};
pub use process::{ProcessLauncher, SystemLauncher, Terminate, ToolProcess};
pub use record::{
    classify_line, LineKind, OutputLine, RecordStream, StreamKind, ToolLog, ToolRecord,
};
pub use runner::{validate_invocation, Supervisor, SupervisorConfig};
