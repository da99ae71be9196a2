//! UI-facing session events.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::playback::PlaybackState;
use crate::supervisor::{ExecutionState, ToolLog};
use crate::timeline::{Cue, Timeline};

/// Notification for the front-end.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Analysis progress fraction.
    ProgressChanged(f64),
    ToolLog(ToolLog),
    ExecutionTerminal {
        run_id: u64,
        state: ExecutionState,
        exit_code: Option<i32>,
    },
    /// Analysis succeeded but its output could not be parsed.
    ParseFailed { run_id: u64, message: String },
    TimelineReady(Arc<Timeline>),
    ActiveCueChanged(Option<Cue>),
    PlaybackStateChanged(PlaybackState),
}

/// Session event listener.
///
/// Analysis events arrive on the supervisor's worker thread; playback
/// events on the thread driving the session.
pub type SessionListener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Listeners {
    listeners: Mutex<Vec<SessionListener>>,
}

impl Listeners {
    pub(crate) fn add(&self, listener: SessionListener) {
        self.listeners.lock().push(listener);
    }

    /// Deliver outside the lock so listeners may subscribe more listeners.
    pub(crate) fn emit(&self, event: SessionEvent) {
        let listeners = self.listeners.lock().clone();
        for listener in &listeners {
            listener(&event);
        }
    }
}
