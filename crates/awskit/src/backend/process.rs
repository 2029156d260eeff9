//! Real process backend using [`std::process::Command`].

use crate::backend::{AttemptOutput, AttemptStatus, Backend, Invocation};
use std::io::Read;
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Upper bound on captured stderr.
const MAX_STDERR_SIZE: usize = 1024 * 1024;

/// Default interval between status polls of the child.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long to keep draining pipes after the child is gone.
///
/// Descendants that outlive the child can hold the pipes open; whatever was
/// read by then is kept.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

struct Capture {
    buffer: Arc<Mutex<Captured>>,
    handle: JoinHandle<()>,
}

/// Backend that spawns the program with an explicit environment.
///
/// The argument vector is passed straight to the program, never through a
/// shell, and the child environment is cleared before the resolved map is
/// applied.
pub struct ProcessBackend {
    poll_interval: Duration,
}

impl ProcessBackend {
    /// Create a new ProcessBackend.
    pub fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Wait for the child, enforcing timeout and cancellation.
    fn supervise(&self, child: &mut Child, invocation: &Invocation<'_>) -> AttemptStatus {
        let started = Instant::now();
        loop {
            if invocation.cancel.is_cancelled() {
                kill(child);
                return AttemptStatus::Interrupted;
            }

            match child.try_wait() {
                Ok(Some(status)) => return exit_status(status),
                Ok(None) => {}
                Err(e) => {
                    kill(child);
                    return AttemptStatus::LaunchFailed(format!("failed to wait for process: {e}"));
                }
            }

            if started.elapsed() >= invocation.timeout {
                log::debug!("Killing process after {:?}", invocation.timeout);
                kill(child);
                return AttemptStatus::TimedOut;
            }

            thread::sleep(self.poll_interval);
        }
    }
}

impl Default for ProcessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for ProcessBackend {
    fn run(&self, invocation: &Invocation<'_>) -> AttemptOutput {
        let Some((program, args)) = invocation.argv.split_first() else {
            return AttemptOutput::with_status(AttemptStatus::LaunchFailed(
                "empty command line".to_string(),
            ));
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .env_clear()
            .envs(invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group, so a kill reaches everything the CLI started.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let spawned = command.spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                return AttemptOutput::with_status(AttemptStatus::LaunchFailed(format!(
                    "failed to execute {program}: {e}"
                )));
            }
        };

        let stdout = child
            .stdout
            .take()
            .map(|s: ChildStdout| spawn_capture(s, invocation.max_output_size));
        let stderr = child
            .stderr
            .take()
            .map(|s: ChildStderr| spawn_capture(s, MAX_STDERR_SIZE));

        let status = self.supervise(&mut child, invocation);

        let drain_deadline = Instant::now() + DRAIN_GRACE;
        let (stdout, truncated) = join_capture(stdout, drain_deadline);
        let (stderr, _) = join_capture(stderr, drain_deadline);
        if truncated {
            log::warn!(
                "Output of {program} exceeded {} bytes and was truncated",
                invocation.max_output_size
            );
        }

        AttemptOutput {
            status,
            stdout: decode_bounded(&stdout, invocation.max_output_size),
            stderr: decode_bounded(&stderr, MAX_STDERR_SIZE),
            truncated,
        }
    }
}

fn kill(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: killpg only sends a signal; the group was created at spawn
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    }
    // The child may already have exited; either way reap it.
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn exit_status(status: ExitStatus) -> AttemptStatus {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => AttemptStatus::Exited(code),
        (None, Some(signal)) => AttemptStatus::Signaled(signal),
        (None, None) => AttemptStatus::Exited(-1),
    }
}

#[cfg(not(unix))]
fn exit_status(status: ExitStatus) -> AttemptStatus {
    AttemptStatus::Exited(status.code().unwrap_or(-1))
}

/// Read a pipe to the end on a separate thread, keeping at most `limit` bytes.
///
/// The pipe keeps being drained past the limit so the child never blocks on
/// a full pipe.
fn spawn_capture<R: Read + Send + 'static>(mut source: R, limit: usize) -> Capture {
    let buffer = Arc::new(Mutex::new(Captured::default()));
    let sink = Arc::clone(&buffer);
    let handle = thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            let n = match source.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            let mut captured = sink.lock().unwrap_or_else(PoisonError::into_inner);
            let room = limit.saturating_sub(captured.bytes.len());
            if n > room {
                captured.truncated = true;
            }
            captured.bytes.extend_from_slice(&buf[..n.min(room)]);
        }
    });
    Capture { buffer, handle }
}

/// Wait for a reader until `deadline`, then take what it has read.
fn join_capture(capture: Option<Capture>, deadline: Instant) -> (Vec<u8>, bool) {
    let Some(capture) = capture else {
        return (Vec::new(), false);
    };

    while !capture.handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    if capture.handle.is_finished() {
        let _ = capture.handle.join();
    } else {
        log::debug!("Output pipe still open after the process ended; detaching reader");
    }

    let mut captured = capture.buffer.lock().unwrap_or_else(PoisonError::into_inner);
    (std::mem::take(&mut captured.bytes), captured.truncated)
}

/// Decode captured bytes, never exceeding `limit` bytes of UTF-8.
///
/// A cut through a multi-byte character decodes to U+FFFD, which is wider
/// than the bytes it replaces, so the text is trimmed back to a character
/// boundary.
fn decode_bounded(bytes: &[u8], limit: usize) -> String {
    let mut text = String::from_utf8_lossy(bytes).into_owned();
    if text.len() > limit {
        let mut end = limit;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}
