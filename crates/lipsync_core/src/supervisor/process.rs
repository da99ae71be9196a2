//! Process capability interface and the `std::process` implementation.
//!
//! The supervisor only talks to [`ProcessLauncher`] / [`ToolProcess`], so
//! tests can drive it with a scripted process instead of the real tool.

use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use super::record::{OutputLine, StreamKind};
use crate::command::Invocation;

/// How often a running child is polled for exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Starts tool processes.
pub trait ProcessLauncher: Send + Sync {
    /// Spawn the invocation's executable with its arguments.
    fn spawn(&self, invocation: &Invocation) -> io::Result<Box<dyn ToolProcess>>;
}

/// A running tool process.
pub trait ToolProcess: Send {
    /// Next output line from either stream, in per-stream order.
    ///
    /// Returns `None` once both streams are closed.
    fn read_line(&mut self) -> io::Result<Option<OutputLine>>;

    /// Block until the process exits.
    ///
    /// Returns the exit code, or `None` if the process was killed by a
    /// signal.
    fn wait(&mut self) -> io::Result<Option<i32>>;

    /// Handle that can kill the process from another thread.
    fn terminator(&self) -> Arc<dyn Terminate>;
}

/// Requests termination of a running process.
pub trait Terminate: Send + Sync {
    fn terminate(&self) -> io::Result<()>;
}

/// Launches the real tool with `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn spawn(&self, invocation: &Invocation) -> io::Result<Box<dyn ToolProcess>> {
        let mut child = Command::new(invocation.executable())
            .args(invocation.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let (tx, rx) = mpsc::channel();
        let mut readers = Vec::with_capacity(2);

        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, StreamKind::Stdout, tx.clone())?);
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, StreamKind::Stderr, tx)?);
        }

        tracing::debug!(
            "Spawned {} (pid {})",
            invocation.executable().display(),
            child.id()
        );

        Ok(Box::new(SystemProcess {
            child: Arc::new(ChildKiller {
                child: Mutex::new(child),
            }),
            lines: rx,
            readers,
        }))
    }
}

/// Forward lines from one pipe into the shared channel.
///
/// Bytes that are not valid UTF-8 (file names in the system code page,
/// decoder noise) are replaced rather than treated as a read failure.
fn spawn_reader<R: Read + Send + 'static>(
    pipe: R,
    stream: StreamKind,
    tx: Sender<io::Result<OutputLine>>,
) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("rhubarb-{:?}", stream).to_lowercase())
        .spawn(move || {
            let mut reader = BufReader::new(pipe);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.send(Ok(OutputLine::new(stream, decode_line(&buf)))).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        })
}

/// Line text without its terminator, lossily decoded.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

struct ChildKiller {
    child: Mutex<Child>,
}

impl Terminate for ChildKiller {
    fn terminate(&self) -> io::Result<()> {
        let mut child = self.child.lock();
        if child.try_wait()?.is_some() {
            return Ok(());
        }
        child.kill()
    }
}

struct SystemProcess {
    child: Arc<ChildKiller>,
    lines: Receiver<io::Result<OutputLine>>,
    readers: Vec<thread::JoinHandle<()>>,
}

impl ToolProcess for SystemProcess {
    fn read_line(&mut self) -> io::Result<Option<OutputLine>> {
        match self.lines.recv() {
            Ok(Ok(line)) => Ok(Some(line)),
            Ok(Err(e)) => Err(e),
            // All reader threads finished
            Err(_) => Ok(None),
        }
    }

    fn wait(&mut self) -> io::Result<Option<i32>> {
        // Poll instead of Child::wait so terminate() can take the lock
        let status = loop {
            if let Some(status) = self.child.child.lock().try_wait()? {
                break status;
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        };

        for reader in self.readers.drain(..) {
            let _ = reader.join();
        }

        Ok(status.code())
    }

    fn terminator(&self) -> Arc<dyn Terminate> {
        self.child.clone()
    }
}
