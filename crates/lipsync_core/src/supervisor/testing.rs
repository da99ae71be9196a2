//! Scripted process doubles.
//!
//! [`ScriptedLauncher`] replays a fixed [`Script`] of output lines instead
//! of running the real tool, so supervisor behavior can be exercised
//! without an executable. Only built for tests or with the `testing`
//! feature.
//!
//! ```
//! use std::sync::Arc;
//! use lipsync_core::supervisor::testing::{Script, ScriptedLauncher};
//!
//! let launcher = Arc::new(ScriptedLauncher::new(
//!     Script::new()
//!         .progress(0.5)
//!         .success()
//!         .writes_output("0.00\t0.40\tX\n"),
//! ));
//! assert_eq!(launcher.spawn_count(), 0);
//! ```

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::process::{ProcessLauncher, Terminate, ToolProcess};
use super::record::{OutputLine, StreamKind};
use crate::command::Invocation;

#[derive(Debug, Clone)]
enum Step {
    Line(OutputLine),
    Sleep(Duration),
    /// Block until the launcher is released or the process is terminated.
    Hold,
}

/// Output and exit behavior of one scripted process.
#[derive(Debug, Clone)]
pub struct Script {
    steps: Vec<Step>,
    exit_code: i32,
    output: Option<String>,
}

impl Default for Script {
    fn default() -> Self {
        Self::new()
    }
}

impl Script {
    /// Empty script exiting with code 0.
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            exit_code: 0,
            output: None,
        }
    }

    /// A line on stderr, where the tool writes its records.
    pub fn record(mut self, line: impl Into<String>) -> Self {
        self.steps
            .push(Step::Line(OutputLine::new(StreamKind::Stderr, line)));
        self
    }

    /// A line on stdout.
    pub fn stdout(mut self, line: impl Into<String>) -> Self {
        self.steps
            .push(Step::Line(OutputLine::new(StreamKind::Stdout, line)));
        self
    }

    pub fn progress(self, value: f64) -> Self {
        self.record(serde_json::json!({ "type": "progress", "value": value }).to_string())
    }

    pub fn success(self) -> Self {
        self.record(r#"{"type":"success"}"#)
    }

    pub fn failure(self, reason: &str) -> Self {
        self.record(serde_json::json!({ "type": "failure", "reason": reason }).to_string())
    }

    pub fn sleep(mut self, duration: Duration) -> Self {
        self.steps.push(Step::Sleep(duration));
        self
    }

    /// Pause here until [`ScriptedLauncher::release`] or termination.
    pub fn hold(mut self) -> Self {
        self.steps.push(Step::Hold);
        self
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// Write `content` to the invocation's output path on exit.
    pub fn writes_output(mut self, content: impl Into<String>) -> Self {
        self.output = Some(content.into());
        self
    }
}

#[derive(Default)]
struct GateState {
    released: bool,
    killed: HashSet<usize>,
}

#[derive(Default)]
struct Gate {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl Gate {
    fn is_killed(&self, id: usize) -> bool {
        self.state.lock().killed.contains(&id)
    }

    fn hold(&self, id: usize) {
        let mut state = self.state.lock();
        while !state.released && !state.killed.contains(&id) {
            self.changed.wait(&mut state);
        }
    }
}

/// Launcher replaying scripts instead of spawning processes.
pub struct ScriptedLauncher {
    scripts: Mutex<VecDeque<Script>>,
    spawn_error: Option<io::ErrorKind>,
    spawned: AtomicUsize,
    gate: Arc<Gate>,
}

impl ScriptedLauncher {
    /// Every spawn replays `script`.
    pub fn new(script: Script) -> Self {
        Self::with_scripts(vec![script])
    }

    /// Spawns replay `scripts` in order; the last one repeats.
    pub fn with_scripts(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            spawn_error: None,
            spawned: AtomicUsize::new(0),
            gate: Arc::new(Gate::default()),
        }
    }

    /// Every spawn fails with `kind`.
    pub fn failing(kind: io::ErrorKind) -> Self {
        Self {
            spawn_error: Some(kind),
            ..Self::with_scripts(Vec::new())
        }
    }

    /// Number of processes spawned so far.
    pub fn spawn_count(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    /// Let all current and future `hold` steps continue.
    pub fn release(&self) {
        self.gate.state.lock().released = true;
        self.gate.changed.notify_all();
    }

    /// Whether any spawned process was terminated.
    pub fn was_terminated(&self) -> bool {
        !self.gate.state.lock().killed.is_empty()
    }

    fn next_script(&self) -> Option<Script> {
        let mut scripts = self.scripts.lock();
        if scripts.len() > 1 {
            scripts.pop_front()
        } else {
            scripts.front().cloned()
        }
    }
}

impl ProcessLauncher for ScriptedLauncher {
    fn spawn(&self, invocation: &Invocation) -> io::Result<Box<dyn ToolProcess>> {
        if let Some(kind) = self.spawn_error {
            return Err(io::Error::new(kind, "scripted spawn failure"));
        }

        let script = self
            .next_script()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no script to replay"))?;
        let id = self.spawned.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(ScriptedProcess {
            id,
            steps: script.steps.into(),
            exit_code: script.exit_code,
            output: script
                .output
                .map(|content| (invocation.output_path().to_path_buf(), content)),
            gate: self.gate.clone(),
        }))
    }
}

struct ScriptedProcess {
    id: usize,
    steps: VecDeque<Step>,
    exit_code: i32,
    output: Option<(PathBuf, String)>,
    gate: Arc<Gate>,
}

impl ToolProcess for ScriptedProcess {
    fn read_line(&mut self) -> io::Result<Option<OutputLine>> {
        loop {
            if self.gate.is_killed(self.id) {
                return Ok(None);
            }
            match self.steps.pop_front() {
                None => return Ok(None),
                Some(Step::Line(line)) => return Ok(Some(line)),
                Some(Step::Sleep(duration)) => thread::sleep(duration),
                Some(Step::Hold) => self.gate.hold(self.id),
            }
        }
    }

    fn wait(&mut self) -> io::Result<Option<i32>> {
        if self.gate.is_killed(self.id) {
            return Ok(None);
        }
        if let Some((path, content)) = self.output.take() {
            fs::write(path, content)?;
        }
        Ok(Some(self.exit_code))
    }

    fn terminator(&self) -> Arc<dyn Terminate> {
        Arc::new(ScriptedTerminator {
            id: self.id,
            gate: self.gate.clone(),
        })
    }
}

struct ScriptedTerminator {
    id: usize,
    gate: Arc<Gate>,
}

impl Terminate for ScriptedTerminator {
    fn terminate(&self) -> io::Result<()> {
        self.gate.state.lock().killed.insert(self.id);
        self.gate.changed.notify_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_lines_and_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.tsv");
        let launcher = ScriptedLauncher::new(
            Script::new()
                .stdout("hello")
                .progress(0.5)
                .exit_code(2)
                .writes_output("0.00\t0.10\tA\n"),
        );

        let invocation = Invocation::new("rhubarb", Vec::new(), &output);
        let mut process = launcher.spawn(&invocation).unwrap();

        assert_eq!(
            process.read_line().unwrap(),
            Some(OutputLine::new(StreamKind::Stdout, "hello"))
        );
        let progress = process.read_line().unwrap().unwrap();
        assert_eq!(progress.stream, StreamKind::Stderr);
        assert!(progress.text.contains("\"progress\""));
        assert_eq!(process.read_line().unwrap(), None);
        assert_eq!(process.wait().unwrap(), Some(2));
        assert!(output.is_file());
        assert_eq!(launcher.spawn_count(), 1);
    }

    #[test]
    fn terminate_unblocks_hold() {
        let launcher = ScriptedLauncher::new(Script::new().hold().stdout("never"));
        let invocation = Invocation::new("rhubarb", Vec::new(), "out.tsv");
        let mut process = launcher.spawn(&invocation).unwrap();
        let terminator = process.terminator();

        let reader = thread::spawn(move || {
            let line = process.read_line().unwrap();
            (line, process.wait().unwrap())
        });
        thread::sleep(Duration::from_millis(20));
        terminator.terminate().unwrap();

        let (line, exit) = reader.join().unwrap();
        assert_eq!(line, None);
        assert_eq!(exit, None);
        assert!(launcher.was_terminated());
    }

    #[test]
    fn scripts_are_consumed_in_order() {
        let launcher = ScriptedLauncher::with_scripts(vec![
            Script::new().exit_code(1),
            Script::new().exit_code(0),
        ]);
        let invocation = Invocation::new("rhubarb", Vec::new(), "out.tsv");

        let codes: Vec<_> = (0..3)
            .map(|_| launcher.spawn(&invocation).unwrap().wait().unwrap())
            .collect();
        assert_eq!(codes, vec![Some(1), Some(0), Some(0)]);
    }
}
