//! Observable, cancellable handle for one tool execution.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, ReentrantMutex};

use super::errors::ExecutionFailure;
use super::process::Terminate;
use super::record::ToolLog;
use crate::command::Invocation;
use crate::logging::RunLogger;

/// Lifecycle of one execution.
///
/// `Pending → Running → {Succeeded, Failed, Cancelled}`; terminal states
/// are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Succeeded | ExecutionState::Failed | ExecutionState::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Pending => "pending",
            ExecutionState::Running => "running",
            ExecutionState::Succeeded => "succeeded",
            ExecutionState::Failed => "failed",
            ExecutionState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final outcome of an execution, delivered once per observer.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalEvent {
    pub run_id: u64,
    pub state: ExecutionState,
    pub exit_code: Option<i32>,
    /// Finished cue file; set only for `Succeeded`.
    pub output_path: Option<PathBuf>,
    /// Set only for `Failed`.
    pub failure: Option<ExecutionFailure>,
}

/// Notification delivered to execution observers.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    /// Progress fraction in `[0, 1]`, never lower than the previous one.
    Progress(f64),
    Log(ToolLog),
    Terminal(TerminalEvent),
}

/// Observer callback. Called on the supervisor's worker thread, or on the
/// subscribing thread when the execution has already finished.
pub type EventCallback = Arc<dyn Fn(&ExecutionEvent) + Send + Sync>;

/// Shared handle to one execution. Cloning is cheap.
#[derive(Clone)]
pub struct ExecutionHandle {
    shared: Arc<Shared>,
}

struct Shared {
    id: u64,
    invocation: Invocation,
    logger: Arc<RunLogger>,
    progress_interval: Duration,
    inner: Mutex<Inner>,
    finished: Condvar,
    /// Held while events are handed to observers, so deliveries from the
    /// worker and from `cancel` never interleave. Reentrant for observers
    /// that call back into the handle.
    delivery: ReentrantMutex<()>,
    terminator: Mutex<Option<Arc<dyn Terminate>>>,
}

struct Inner {
    state: ExecutionState,
    progress: f64,
    exit_code: Option<i32>,
    failure: Option<ExecutionFailure>,
    observers: Vec<EventCallback>,
    last_progress_emit: Option<Instant>,
    /// A progress value was coalesced and not yet delivered.
    progress_pending: bool,
}

impl ExecutionHandle {
    pub(crate) fn new(
        id: u64,
        invocation: Invocation,
        logger: Arc<RunLogger>,
        progress_interval: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                id,
                invocation,
                logger,
                progress_interval,
                inner: Mutex::new(Inner {
                    state: ExecutionState::Pending,
                    progress: 0.0,
                    exit_code: None,
                    failure: None,
                    observers: Vec::new(),
                    last_progress_emit: None,
                    progress_pending: false,
                }),
                finished: Condvar::new(),
                delivery: ReentrantMutex::new(()),
                terminator: Mutex::new(None),
            }),
        }
    }

    /// Run identifier, unique per supervisor.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Whether both handles refer to the same execution.
    pub fn same_run(&self, other: &ExecutionHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub fn invocation(&self) -> &Invocation {
        &self.shared.invocation
    }

    pub fn state(&self) -> ExecutionState {
        self.shared.inner.lock().state
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Highest progress seen so far, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        self.shared.inner.lock().progress
    }

    /// Exit code; present only after a terminal transition where the
    /// process actually exited.
    pub fn exit_code(&self) -> Option<i32> {
        self.shared.inner.lock().exit_code
    }

    pub fn failure(&self) -> Option<ExecutionFailure> {
        self.shared.inner.lock().failure.clone()
    }

    /// Finished cue file, once the execution has succeeded.
    pub fn output_path(&self) -> Option<&Path> {
        (self.state() == ExecutionState::Succeeded).then(|| self.shared.invocation.output_path())
    }

    /// Recent tool output, oldest first.
    pub fn log_tail(&self) -> Vec<String> {
        self.shared.logger.get_tail()
    }

    /// Run log file, if run logs are enabled.
    pub fn log_path(&self) -> Option<&Path> {
        self.shared.logger.log_path()
    }

    /// Terminal event, if the execution has finished.
    pub fn terminal_event(&self) -> Option<TerminalEvent> {
        let inner = self.shared.inner.lock();
        inner
            .state
            .is_terminal()
            .then(|| self.build_terminal_event(&inner))
    }

    /// Register an observer.
    ///
    /// If the execution has already finished, the terminal event is
    /// delivered immediately on the calling thread.
    pub fn subscribe(&self, callback: EventCallback) {
        let terminal = {
            let mut inner = self.shared.inner.lock();
            if inner.state.is_terminal() {
                Some(self.build_terminal_event(&inner))
            } else {
                inner.observers.push(callback.clone());
                None
            }
        };

        if let Some(event) = terminal {
            callback(&ExecutionEvent::Terminal(event));
        }
    }

    /// Subscribe through a channel instead of a callback.
    pub fn events(&self) -> Receiver<ExecutionEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribe(Arc::new(move |event: &ExecutionEvent| {
            let _ = tx.send(event.clone());
        }));
        rx
    }

    /// Block until the execution reaches a terminal state.
    pub fn wait(&self) -> TerminalEvent {
        let mut inner = self.shared.inner.lock();
        while !inner.state.is_terminal() {
            self.shared.finished.wait(&mut inner);
        }
        self.build_terminal_event(&inner)
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<TerminalEvent> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.shared.inner.lock();
        while !inner.state.is_terminal() {
            if self
                .shared
                .finished
                .wait_until(&mut inner, deadline)
                .timed_out()
            {
                break;
            }
        }
        inner
            .state
            .is_terminal()
            .then(|| self.build_terminal_event(&inner))
    }

    /// Request termination. No-op once terminal.
    ///
    /// Returns true if this call moved the execution to `Cancelled`.
    pub fn cancel(&self) -> bool {
        if !self.finish(ExecutionState::Cancelled, None, None) {
            return false;
        }

        let terminator = self.shared.terminator.lock().clone();
        if let Some(terminator) = terminator {
            if let Err(e) = terminator.terminate() {
                tracing::warn!("Failed to terminate run {}: {}", self.id(), e);
            }
        }
        true
    }

    pub(crate) fn logger(&self) -> &RunLogger {
        &self.shared.logger
    }

    pub(crate) fn set_terminator(&self, terminator: Arc<dyn Terminate>) {
        *self.shared.terminator.lock() = Some(terminator);
    }

    /// Pending → Running. Returns false if the execution already left Pending.
    pub(crate) fn mark_running(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        if inner.state != ExecutionState::Pending {
            return false;
        }
        inner.state = ExecutionState::Running;
        true
    }

    /// Raise progress to `value` (last-highest-wins), notifying observers
    /// at most once per progress interval.
    pub(crate) fn report_progress(&self, value: f64) {
        let value = value.clamp(0.0, 1.0);
        {
            let mut inner = self.shared.inner.lock();
            if inner.state != ExecutionState::Running || value <= inner.progress {
                return;
            }
            inner.progress = value;

            let now = Instant::now();
            let due = inner
                .last_progress_emit
                .map_or(true, |last| now.duration_since(last) >= self.shared.progress_interval);
            if !due {
                inner.progress_pending = true;
                return;
            }
            inner.last_progress_emit = Some(now);
            inner.progress_pending = false;
        }

        self.publish(&ExecutionEvent::Progress(value));
    }

    /// Deliver a coalesced progress value, if any.
    pub(crate) fn flush_progress(&self) {
        let value = {
            let mut inner = self.shared.inner.lock();
            if inner.state != ExecutionState::Running || !inner.progress_pending {
                return;
            }
            inner.progress_pending = false;
            inner.last_progress_emit = Some(Instant::now());
            inner.progress
        };

        self.publish(&ExecutionEvent::Progress(value));
    }

    pub(crate) fn report_log(&self, log: ToolLog) {
        self.publish(&ExecutionEvent::Log(log));
    }

    /// Hand a non-terminal event to the observers.
    ///
    /// The terminal state is checked again before each observer: once the
    /// run has finished (possibly while an earlier observer was still
    /// busy), the remaining observers are skipped so nothing reaches them
    /// after their terminal event.
    fn publish(&self, event: &ExecutionEvent) {
        let _delivery = self.shared.delivery.lock();
        let observers = {
            let inner = self.shared.inner.lock();
            if inner.state.is_terminal() {
                return;
            }
            inner.observers.clone()
        };

        for observer in &observers {
            if self.is_terminal() {
                return;
            }
            observer(event);
        }
    }

    /// Perform the single terminal transition.
    ///
    /// Returns false if the execution was already terminal. Observers are
    /// notified outside the state lock, after any delivery already in
    /// flight; a successful run reports full progress before its terminal
    /// event.
    pub(crate) fn finish(
        &self,
        state: ExecutionState,
        exit_code: Option<i32>,
        failure: Option<ExecutionFailure>,
    ) -> bool {
        debug_assert!(state.is_terminal());

        let (observers, final_progress, event) = {
            let mut inner = self.shared.inner.lock();
            if inner.state.is_terminal() {
                return false;
            }

            let final_progress = (state == ExecutionState::Succeeded && inner.progress < 1.0)
                .then_some(1.0);
            if let Some(progress) = final_progress {
                inner.progress = progress;
            }

            inner.state = state;
            inner.exit_code = exit_code;
            inner.failure = failure;
            inner.progress_pending = false;

            let event = self.build_terminal_event(&inner);
            let observers = std::mem::take(&mut inner.observers);
            self.shared.finished.notify_all();
            (observers, final_progress, event)
        };

        tracing::info!(
            "Run {} {} (exit code {:?})",
            self.id(),
            state,
            exit_code
        );

        let _delivery = self.shared.delivery.lock();
        if let Some(progress) = final_progress {
            deliver(&observers, &ExecutionEvent::Progress(progress));
        }
        deliver(&observers, &ExecutionEvent::Terminal(event));
        true
    }

    fn build_terminal_event(&self, inner: &Inner) -> TerminalEvent {
        TerminalEvent {
            run_id: self.shared.id,
            state: inner.state,
            exit_code: inner.exit_code,
            output_path: (inner.state == ExecutionState::Succeeded)
                .then(|| self.shared.invocation.output_path().to_path_buf()),
            failure: inner.failure.clone(),
        }
    }
}

impl fmt::Debug for ExecutionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionHandle")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("progress", &self.progress())
            .finish()
    }
}

fn deliver(observers: &[EventCallback], event: &ExecutionEvent) {
    for observer in observers {
        observer(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn handle(interval: Duration) -> ExecutionHandle {
        let invocation = Invocation::new("rhubarb", Vec::new(), "out.tsv");
        let logger = Arc::new(RunLogger::in_memory("test", LogConfig::default(), None));
        let handle = ExecutionHandle::new(1, invocation, logger, interval);
        assert!(handle.mark_running());
        handle
    }

    fn collect(handle: &ExecutionHandle) -> Arc<Mutex<Vec<ExecutionEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        handle.subscribe(Arc::new(move |event: &ExecutionEvent| {
            sink.lock().push(event.clone());
        }));
        events
    }

    #[test]
    fn progress_is_last_highest_wins() {
        let handle = handle(Duration::ZERO);
        let events = collect(&handle);

        handle.report_progress(0.2);
        handle.report_progress(0.1);
        handle.report_progress(0.5);
        handle.report_progress(0.5);

        assert_eq!(handle.progress(), 0.5);
        assert_eq!(
            *events.lock(),
            vec![ExecutionEvent::Progress(0.2), ExecutionEvent::Progress(0.5)]
        );
    }

    #[test]
    fn progress_is_coalesced_then_flushed() {
        let handle = handle(Duration::from_secs(60));
        let events = collect(&handle);

        handle.report_progress(0.1);
        handle.report_progress(0.2);
        handle.report_progress(0.3);
        assert_eq!(*events.lock(), vec![ExecutionEvent::Progress(0.1)]);

        handle.flush_progress();
        assert_eq!(events.lock().last(), Some(&ExecutionEvent::Progress(0.3)));
    }

    #[test]
    fn terminal_transition_happens_once() {
        let handle = handle(Duration::ZERO);
        let terminal_count = Arc::new(AtomicUsize::new(0));
        let counter = terminal_count.clone();
        handle.subscribe(Arc::new(move |event: &ExecutionEvent| {
            if matches!(event, ExecutionEvent::Terminal(_)) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert!(!handle.finish(ExecutionState::Succeeded, Some(0), None));

        assert_eq!(handle.state(), ExecutionState::Cancelled);
        assert_eq!(handle.exit_code(), None);
        assert_eq!(terminal_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn no_progress_after_terminal() {
        let handle = handle(Duration::ZERO);
        let events = collect(&handle);

        handle.finish(
            ExecutionState::Failed,
            Some(1),
            Some(ExecutionFailure::new(Some(1), "boom", Vec::new())),
        );
        handle.report_progress(0.9);
        handle.report_log(ToolLog::text("late"));

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ExecutionEvent::Terminal(_)));
        assert_eq!(handle.progress(), 0.0);
    }

    #[test]
    fn cancel_during_delivery_keeps_terminal_last() {
        let handle = handle(Duration::ZERO);

        // First observer stalls inside the progress callback until released
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let entered_tx = Mutex::new(entered_tx);
        let release_rx = Mutex::new(release_rx);
        handle.subscribe(Arc::new(move |event: &ExecutionEvent| {
            if matches!(event, ExecutionEvent::Progress(_)) {
                let _ = entered_tx.lock().send(());
                let _ = release_rx.lock().recv_timeout(Duration::from_secs(5));
            }
        }));
        let events = collect(&handle);

        let reporter = handle.clone();
        let worker = thread::spawn(move || reporter.report_progress(0.3));
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let canceller = handle.clone();
        let cancel = thread::spawn(move || canceller.cancel());
        while !handle.is_terminal() {
            thread::yield_now();
        }
        release_tx.send(()).unwrap();

        worker.join().unwrap();
        assert!(cancel.join().unwrap());
        handle.report_log(ToolLog::text("late"));

        let events = events.lock();
        let terminals = events
            .iter()
            .filter(|e| matches!(e, ExecutionEvent::Terminal(_)))
            .count();
        assert_eq!(terminals, 1);
        assert!(
            matches!(events.last(), Some(ExecutionEvent::Terminal(_))),
            "{:?}",
            *events
        );
    }

    #[test]
    fn observer_may_cancel_from_progress_callback() {
        let handle = handle(Duration::ZERO);
        let canceller = handle.clone();
        handle.subscribe(Arc::new(move |event: &ExecutionEvent| {
            if matches!(event, ExecutionEvent::Progress(_)) {
                canceller.cancel();
            }
        }));
        let events = collect(&handle);

        handle.report_progress(0.5);

        assert_eq!(handle.state(), ExecutionState::Cancelled);
        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ExecutionEvent::Terminal(_)));
    }

    #[test]
    fn success_reports_full_progress_first() {
        let handle = handle(Duration::ZERO);
        let events = collect(&handle);

        handle.report_progress(0.4);
        handle.finish(ExecutionState::Succeeded, Some(0), None);

        let events = events.lock();
        assert_eq!(events[1], ExecutionEvent::Progress(1.0));
        match &events[2] {
            ExecutionEvent::Terminal(terminal) => {
                assert_eq!(terminal.state, ExecutionState::Succeeded);
                assert_eq!(terminal.exit_code, Some(0));
                assert_eq!(terminal.output_path, Some(PathBuf::from("out.tsv")));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(handle.output_path(), Some(Path::new("out.tsv")));
    }

    #[test]
    fn late_subscriber_gets_terminal_event() {
        let handle = handle(Duration::ZERO);
        assert!(handle.terminal_event().is_none());
        handle.finish(ExecutionState::Succeeded, Some(0), None);

        let events = collect(&handle);
        let events = events.lock();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ExecutionEvent::Terminal(event) => {
                assert_eq!(Some(event.clone()), handle.terminal_event());
            }
            other => panic!("expected terminal event, got {:?}", other),
        }
    }

    #[test]
    fn wait_returns_after_finish_on_other_thread() {
        let handle = handle(Duration::ZERO);
        assert!(handle.wait_timeout(Duration::from_millis(10)).is_none());

        let worker = handle.clone();
        let thread = std::thread::spawn(move || {
            worker.finish(ExecutionState::Failed, Some(2), None);
        });

        let terminal = handle.wait();
        thread.join().unwrap();
        assert_eq!(terminal.state, ExecutionState::Failed);
        assert_eq!(terminal.exit_code, Some(2));
    }

    #[test]
    fn channel_subscription_receives_events() {
        let handle = handle(Duration::ZERO);
        let rx = handle.events();

        handle.report_progress(0.25);
        handle.finish(ExecutionState::Cancelled, None, None);

        assert_eq!(rx.recv().unwrap(), ExecutionEvent::Progress(0.25));
        assert!(matches!(rx.recv().unwrap(), ExecutionEvent::Terminal(_)));
    }
}
