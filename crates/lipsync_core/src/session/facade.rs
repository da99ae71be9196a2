//! Session facade tying analysis runs to the preview.

use std::path::Path;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use super::error::{SessionError, SessionResult};
use super::events::{Listeners, SessionEvent, SessionListener};
use crate::command::Invocation;
use crate::parsers::{parse_file, parse_file_as, ExportFormat, ParseOptions};
use crate::playback::{ActiveCueChange, AudioPlayer, PlaybackState, Synchronizer};
use crate::supervisor::{
    ExecutionEvent, ExecutionFailure, ExecutionHandle, ExecutionState, Supervisor, TerminalEvent,
};
use crate::timeline::{Cue, Timeline};

struct Preview<P> {
    player: P,
    sync: Synchronizer,
}

enum Outcome {
    Pending,
    Ready(SessionResult<Arc<Timeline>>),
}

/// Parsed outcome of the latest run, waiting to be collected.
///
/// Only the run started last is tracked; starting another run drops an
/// outcome nobody collected.
#[derive(Default)]
struct Outcomes {
    latest: Mutex<Option<(ExecutionHandle, Outcome)>>,
    ready: Condvar,
}

impl Outcomes {
    fn expect(&self, handle: &ExecutionHandle) {
        let previous = self.latest.lock().replace((handle.clone(), Outcome::Pending));
        if let Some((superseded, Outcome::Ready(_))) = previous {
            tracing::debug!("Dropping uncollected outcome of run {}", superseded.id());
        }
        self.ready.notify_all();
    }

    fn store(&self, run_id: u64, result: SessionResult<Arc<Timeline>>) {
        let mut latest = self.latest.lock();
        match latest.as_mut() {
            Some((handle, outcome)) if handle.id() == run_id => {
                *outcome = Outcome::Ready(result);
                self.ready.notify_all();
            }
            _ => tracing::debug!("Run {} was superseded, outcome dropped", run_id),
        }
    }

    fn take(&self, handle: &ExecutionHandle) -> SessionResult<Arc<Timeline>> {
        let mut latest = self.latest.lock();
        loop {
            match latest.take() {
                Some((tracked, Outcome::Ready(result))) if tracked.same_run(handle) => {
                    return result;
                }
                Some((tracked, Outcome::Pending)) if tracked.same_run(handle) => {
                    *latest = Some((tracked, Outcome::Pending));
                    self.ready.wait(&mut latest);
                }
                other => {
                    *latest = other;
                    return Err(SessionError::OutcomeUnavailable {
                        run_id: handle.id(),
                    });
                }
            }
        }
    }
}

/// Runs analyses and previews their cues against an audio player.
///
/// A successful run is parsed with the run's own format and parse
/// options, and the resulting timeline replaces the one being previewed.
pub struct Session<P: AudioPlayer + 'static> {
    supervisor: Supervisor,
    preview: Arc<Mutex<Preview<P>>>,
    listeners: Arc<Listeners>,
    outcomes: Arc<Outcomes>,
}

impl<P: AudioPlayer + 'static> Session<P> {
    pub fn new(supervisor: Supervisor, player: P) -> Self {
        Self {
            supervisor,
            preview: Arc::new(Mutex::new(Preview {
                player,
                sync: Synchronizer::new(),
            })),
            listeners: Arc::new(Listeners::default()),
            outcomes: Arc::new(Outcomes::default()),
        }
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Register a listener for all session events.
    pub fn subscribe(&self, listener: SessionListener) {
        self.listeners.add(listener);
    }

    /// Start an analysis run.
    ///
    /// Progress and the terminal state are forwarded as events. On success
    /// the output is parsed and loaded into the preview.
    pub fn analyze(&self, invocation: Invocation) -> SessionResult<ExecutionHandle> {
        let format = invocation.format();
        let options = invocation.parse_options().clone();
        let handle = self.supervisor.start(invocation)?;
        self.outcomes.expect(&handle);

        let listeners = self.listeners.clone();
        let preview = self.preview.clone();
        let outcomes = self.outcomes.clone();

        handle.subscribe(Arc::new(move |event: &ExecutionEvent| match event {
            ExecutionEvent::Progress(value) => {
                listeners.emit(SessionEvent::ProgressChanged(*value));
            }
            ExecutionEvent::Log(log) => {
                listeners.emit(SessionEvent::ToolLog(log.clone()));
            }
            ExecutionEvent::Terminal(terminal) => {
                listeners.emit(SessionEvent::ExecutionTerminal {
                    run_id: terminal.run_id,
                    state: terminal.state,
                    exit_code: terminal.exit_code,
                });

                let outcome = timeline_for(terminal, format, &options);
                match &outcome {
                    Ok(timeline) => {
                        listeners.emit(SessionEvent::TimelineReady(timeline.clone()));
                        load_into(&preview, &listeners, timeline.clone());
                    }
                    Err(SessionError::Parse(e)) => {
                        tracing::warn!("Run {}: {}", terminal.run_id, e);
                        listeners.emit(SessionEvent::ParseFailed {
                            run_id: terminal.run_id,
                            message: e.to_string(),
                        });
                    }
                    Err(_) => {}
                }
                outcomes.store(terminal.run_id, outcome);
            }
        }));

        Ok(handle)
    }

    /// Cancel a run. No-op if it already finished.
    pub fn cancel(&self, handle: &ExecutionHandle) -> bool {
        self.supervisor.cancel(handle)
    }

    /// Block until the run finishes and its output has been loaded.
    ///
    /// Only the latest run started by this session can be collected, and
    /// only once. Anything else (a handle from another session, an earlier
    /// run, a second call) fails at once with `OutcomeUnavailable`.
    pub fn wait_for_timeline(&self, handle: &ExecutionHandle) -> SessionResult<Arc<Timeline>> {
        self.outcomes.take(handle)
    }

    /// Parse an existing cue file and load it for preview.
    pub fn open_cue_file(
        &self,
        path: impl AsRef<Path>,
        options: &ParseOptions,
    ) -> SessionResult<Arc<Timeline>> {
        let timeline = Arc::new(parse_file(path, options)?);
        self.load_timeline(timeline.clone());
        Ok(timeline)
    }

    /// Replace the previewed timeline (stops playback).
    pub fn load_timeline(&self, timeline: Arc<Timeline>) {
        self.listeners
            .emit(SessionEvent::TimelineReady(timeline.clone()));
        load_into(&self.preview, &self.listeners, timeline);
    }

    pub fn timeline(&self) -> Option<Arc<Timeline>> {
        self.preview.lock().sync.timeline().cloned()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.preview.lock().sync.state()
    }

    pub fn position(&self) -> f64 {
        self.preview.lock().sync.position()
    }

    pub fn active_cue(&self) -> Option<Cue> {
        self.preview.lock().sync.active_cue()
    }

    pub fn play(&self) -> SessionResult<()> {
        let changed = {
            let mut preview = self.preview.lock();
            let before = preview.sync.state();
            preview.sync.play()?;
            preview.player.play();
            before != PlaybackState::Playing
        };
        if changed {
            self.listeners
                .emit(SessionEvent::PlaybackStateChanged(PlaybackState::Playing));
        }
        Ok(())
    }

    pub fn pause(&self) -> SessionResult<()> {
        let changed = {
            let mut preview = self.preview.lock();
            let before = preview.sync.state();
            preview.sync.pause()?;
            preview.player.pause();
            before != PlaybackState::Paused
        };
        if changed {
            self.listeners
                .emit(SessionEvent::PlaybackStateChanged(PlaybackState::Paused));
        }
        Ok(())
    }

    /// Stop and rewind to the start.
    pub fn stop(&self) -> SessionResult<()> {
        let (change, changed) = {
            let mut preview = self.preview.lock();
            let before = preview.sync.state();
            let change = preview.sync.stop()?;
            preview.player.pause();
            preview.player.seek(0.0);
            (change, before != PlaybackState::Loaded)
        };
        if changed {
            self.listeners
                .emit(SessionEvent::PlaybackStateChanged(PlaybackState::Loaded));
        }
        self.emit_change(change);
        Ok(())
    }

    /// Scrub to `position`; the active cue is recomputed immediately.
    pub fn seek(&self, position: f64) -> SessionResult<()> {
        let change = {
            let mut preview = self.preview.lock();
            let change = preview.sync.seek(position)?;
            preview.player.seek(position);
            change
        };
        self.emit_change(change);
        Ok(())
    }

    /// Poll the player and update the active cue.
    ///
    /// Call at the preview tick rate. When the player has reached the end
    /// of the media, the preview pauses.
    pub fn tick(&self) -> Option<ActiveCueChange> {
        let (change, finished) = {
            let mut preview = self.preview.lock();
            if preview.sync.state() != PlaybackState::Playing {
                return None;
            }

            let position = preview.player.position();
            let change = preview.sync.update_position(position);

            let end = preview
                .player
                .duration()
                .or_else(|| preview.sync.timeline().map(|t| t.duration()));
            let finished =
                !preview.player.is_playing() || end.map_or(false, |end| position >= end);
            if finished {
                preview.player.pause();
                // Playing → Paused cannot fail
                let _ = preview.sync.pause();
            }
            (change, finished)
        };

        self.emit_change(change.clone());
        if finished {
            tracing::debug!("Preview reached the end");
            self.listeners
                .emit(SessionEvent::PlaybackStateChanged(PlaybackState::Paused));
        }
        change
    }

    fn emit_change(&self, change: Option<ActiveCueChange>) {
        if let Some(change) = change {
            self.listeners
                .emit(SessionEvent::ActiveCueChanged(change.cue));
        }
    }
}

/// Turn a terminal event into the run's timeline or error.
fn timeline_for(
    terminal: &TerminalEvent,
    format: ExportFormat,
    options: &ParseOptions,
) -> SessionResult<Arc<Timeline>> {
    match terminal.state {
        ExecutionState::Succeeded => {
            let path = terminal
                .output_path
                .as_deref()
                .ok_or_else(|| missing_output(terminal))?;
            let timeline = parse_file_as(path, format, options)?;
            tracing::info!(
                "Run {}: {} cues from {}",
                terminal.run_id,
                timeline.len(),
                path.display()
            );
            Ok(Arc::new(timeline))
        }
        ExecutionState::Cancelled => Err(SessionError::Cancelled {
            run_id: terminal.run_id,
        }),
        _ => Err(terminal
            .failure
            .clone()
            .unwrap_or_else(|| {
                ExecutionFailure::new(terminal.exit_code, "Analysis failed", Vec::new())
            })
            .into()),
    }
}

fn missing_output(terminal: &TerminalEvent) -> SessionError {
    ExecutionFailure::new(terminal.exit_code, "No output file reported", Vec::new()).into()
}

fn load_into<P: AudioPlayer>(
    preview: &Mutex<Preview<P>>,
    listeners: &Listeners,
    timeline: Arc<Timeline>,
) {
    let (change, state_changed) = {
        let mut preview = preview.lock();
        let before = preview.sync.state();
        if before == PlaybackState::Playing {
            preview.player.pause();
        }
        preview.player.seek(0.0);
        let change = preview.sync.load(timeline);
        (change, before != PlaybackState::Loaded)
    };

    if state_changed {
        listeners.emit(SessionEvent::PlaybackStateChanged(PlaybackState::Loaded));
    }
    if let Some(change) = change {
        listeners.emit(SessionEvent::ActiveCueChanged(change.cue));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::testing::{Script, ScriptedLauncher};
    use crate::supervisor::SupervisorConfig;
    use crate::timeline::MouthShape;
    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    /// Player whose position is set by the test.
    #[derive(Clone, Default)]
    struct ManualPlayer {
        state: Arc<Mutex<(f64, bool)>>,
    }

    impl ManualPlayer {
        fn set_position(&self, position: f64) {
            self.state.lock().0 = position;
        }
    }

    impl AudioPlayer for ManualPlayer {
        fn position(&self) -> f64 {
            self.state.lock().0
        }
        fn duration(&self) -> Option<f64> {
            None
        }
        fn is_playing(&self) -> bool {
            self.state.lock().1
        }
        fn play(&mut self) {
            self.state.lock().1 = true;
        }
        fn pause(&mut self) {
            self.state.lock().1 = false;
        }
        fn seek(&mut self, position: f64) {
            self.state.lock().0 = position;
        }
    }

    struct Setup {
        dir: TempDir,
        executable: PathBuf,
        input: PathBuf,
    }

    fn setup() -> Setup {
        crate::logging::init_test_tracing();
        let dir = tempdir().unwrap();
        let executable = dir.path().join("rhubarb");
        let input = dir.path().join("line01.wav");
        fs::write(&executable, b"").unwrap();
        fs::write(&input, b"RIFF").unwrap();
        Setup {
            dir,
            executable,
            input,
        }
    }

    fn session(script: Script) -> (Session<ManualPlayer>, ManualPlayer) {
        let launcher = Arc::new(ScriptedLauncher::new(script));
        let config = SupervisorConfig {
            progress_interval: Duration::ZERO,
            ..SupervisorConfig::default()
        };
        let player = ManualPlayer::default();
        let session = Session::new(Supervisor::with_launcher(launcher, config), player.clone());
        (session, player)
    }

    fn invocation(setup: &Setup, output: &str) -> Invocation {
        let output = setup.dir.path().join(output);
        Invocation::new(&setup.executable, Vec::new(), output).with_required_input(&setup.input)
    }

    fn record(session: &Session<ManualPlayer>) -> Arc<Mutex<Vec<SessionEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        session.subscribe(Arc::new(move |event: &SessionEvent| {
            sink.lock().push(event.clone());
        }));
        events
    }

    #[test]
    fn successful_run_loads_timeline() {
        let setup = setup();
        let (session, _player) = session(
            Script::new()
                .progress(0.5)
                .success()
                .writes_output("0.00\t0.50\tA\n0.50\t1.20\tB\n"),
        );
        let events = record(&session);

        let handle = session.analyze(invocation(&setup, "out.tsv")).unwrap();
        let timeline = session.wait_for_timeline(&handle).unwrap();

        assert_eq!(timeline.len(), 2);
        assert_eq!(session.playback_state(), PlaybackState::Loaded);
        assert_eq!(session.active_cue().map(|c| c.shape), Some(MouthShape::A));

        let events = events.lock();
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::ExecutionTerminal {
                state: ExecutionState::Succeeded,
                exit_code: Some(0),
                ..
            }
        )));
        let ready = events
            .iter()
            .position(|e| matches!(e, SessionEvent::TimelineReady(_)))
            .unwrap();
        let cue = events
            .iter()
            .position(|e| matches!(e, SessionEvent::ActiveCueChanged(Some(_))))
            .unwrap();
        assert!(ready < cue);
    }

    #[test]
    fn failed_run_yields_no_timeline() {
        let setup = setup();
        let (session, _player) = session(Script::new().failure("Bad audio").exit_code(1));

        let handle = session.analyze(invocation(&setup, "out.tsv")).unwrap();
        match session.wait_for_timeline(&handle) {
            Err(SessionError::Execution(failure)) => {
                assert_eq!(failure.exit_code, Some(1));
                assert_eq!(failure.reason, "Bad audio");
            }
            other => panic!("expected execution failure, got {:?}", other),
        }
        assert!(session.timeline().is_none());
    }

    #[test]
    fn malformed_output_is_parse_error() {
        let setup = setup();
        let (session, _player) = session(
            Script::new()
                .success()
                .writes_output("0.00\tnot-a-time\tA\n"),
        );
        let events = record(&session);

        let handle = session.analyze(invocation(&setup, "out.tsv")).unwrap();
        assert!(matches!(
            session.wait_for_timeline(&handle),
            Err(SessionError::Parse(_))
        ));
        assert!(session.timeline().is_none());
        assert!(events
            .lock()
            .iter()
            .any(|e| matches!(e, SessionEvent::ParseFailed { .. })));
    }

    #[test]
    fn cancelled_run_reports_cancellation() {
        let setup = setup();
        let (session, _player) = session(Script::new().hold().success());

        let handle = session.analyze(invocation(&setup, "out.tsv")).unwrap();
        assert!(session.cancel(&handle));
        assert!(matches!(
            session.wait_for_timeline(&handle),
            Err(SessionError::Cancelled { .. })
        ));
    }

    #[test]
    fn outcome_is_collected_once() {
        let setup = setup();
        let (session, _player) = session(Script::new().success().writes_output("0.0\t0.4\tB\n"));

        let handle = session.analyze(invocation(&setup, "out.tsv")).unwrap();
        assert_eq!(session.wait_for_timeline(&handle).unwrap().len(), 1);
        assert!(matches!(
            session.wait_for_timeline(&handle),
            Err(SessionError::OutcomeUnavailable { run_id }) if run_id == handle.id()
        ));
    }

    #[test]
    fn foreign_handle_is_rejected() {
        let setup = setup();
        let script = Script::new().success().writes_output("0.0\t0.4\tB\n");
        let (other, _other_player) = session(script.clone());
        let (session, _player) = session(script);

        let own = session.analyze(invocation(&setup, "own.tsv")).unwrap();
        let foreign = other.analyze(invocation(&setup, "other.tsv")).unwrap();
        foreign.wait();

        // Same run id, different session
        assert_eq!(own.id(), foreign.id());
        assert!(matches!(
            session.wait_for_timeline(&foreign),
            Err(SessionError::OutcomeUnavailable { .. })
        ));
        assert!(session.wait_for_timeline(&own).is_ok());
        assert!(other.wait_for_timeline(&foreign).is_ok());
    }

    #[test]
    fn new_run_drops_uncollected_outcome() {
        let setup = setup();
        let (session, _player) = session(Script::new().success().writes_output("0.0\t0.4\tB\n"));

        let first = session.analyze(invocation(&setup, "out.tsv")).unwrap();
        first.wait();
        let second = session.analyze(invocation(&setup, "out.tsv")).unwrap();

        assert!(matches!(
            session.wait_for_timeline(&first),
            Err(SessionError::OutcomeUnavailable { .. })
        ));
        assert!(session.wait_for_timeline(&second).is_ok());
    }

    #[test]
    fn preview_follows_player_position() {
        let setup = setup();
        let cue_file = setup.dir.path().join("cues.tsv");
        fs::write(&cue_file, "0.0\t0.5\tA\n0.5\t1.2\tB\n").unwrap();

        let (session, player) = session(Script::new());
        session
            .open_cue_file(&cue_file, &ParseOptions::default())
            .unwrap();
        let events = record(&session);

        session.play().unwrap();
        player.set_position(0.6);
        let change = session.tick().unwrap();
        assert_eq!(change.cue.map(|c| c.shape), Some(MouthShape::B));
        assert!(session.tick().is_none());

        session.pause().unwrap();
        player.set_position(0.1);
        assert!(session.tick().is_none());
        assert_eq!(session.active_cue().map(|c| c.shape), Some(MouthShape::B));

        session.seek(0.2).unwrap();
        assert_eq!(session.active_cue().map(|c| c.shape), Some(MouthShape::A));
        assert_eq!(session.playback_state(), PlaybackState::Paused);

        let events = events.lock();
        assert_eq!(
            events[0],
            SessionEvent::PlaybackStateChanged(PlaybackState::Playing)
        );
        assert!(events.contains(&SessionEvent::PlaybackStateChanged(PlaybackState::Paused)));
    }

    #[test]
    fn preview_pauses_at_end_of_timeline() {
        let (session, player) = session(Script::new());
        session.load_timeline(Arc::new(
            Timeline::new(vec![Cue::new(0.0, 1.0, MouthShape::X)]).unwrap(),
        ));

        session.play().unwrap();
        player.set_position(1.5);
        let change = session.tick().unwrap();

        assert_eq!(change.cue, None);
        assert_eq!(session.playback_state(), PlaybackState::Paused);
        assert!(!player.is_playing());
    }

    #[test]
    fn loading_while_playing_stops_playback() {
        let (session, player) = session(Script::new());
        session.load_timeline(Arc::new(
            Timeline::new(vec![Cue::new(0.0, 5.0, MouthShape::C)]).unwrap(),
        ));
        session.play().unwrap();
        player.set_position(2.0);
        session.tick();

        session.load_timeline(Arc::new(
            Timeline::new(vec![Cue::new(0.0, 1.0, MouthShape::D)]).unwrap(),
        ));
        assert_eq!(session.playback_state(), PlaybackState::Loaded);
        assert!(!player.is_playing());
        assert_eq!(player.position(), 0.0);
        assert_eq!(session.active_cue().map(|c| c.shape), Some(MouthShape::D));
    }

    #[test]
    fn play_without_timeline_is_error() {
        let (session, _player) = session(Script::new());
        assert!(matches!(session.play(), Err(SessionError::Playback(_))));
    }
}
