//! Backend abstraction for running one attempt of an external call.
//!
//! The [`Backend`] trait is the seam between the retry loop and the operating
//! system, allowing for different implementations:
//! - Real process execution via [`process::ProcessBackend`]
//! - Scripted backends that inject faults in tests

pub mod process;

use crate::cancel::CancelToken;
use std::collections::BTreeMap;
use std::time::Duration;

/// Everything needed to run one attempt.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    /// Full argument vector, `argv[0]` is the program
    pub argv: &'a [String],
    /// Complete child environment; nothing else is inherited
    pub env: &'a BTreeMap<String, String>,
    /// Kill the process after this long
    pub timeout: Duration,
    /// Keep at most this many bytes of stdout
    pub max_output_size: usize,
    /// Kill the process when this fires
    pub cancel: &'a CancelToken,
}

/// How an attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptStatus {
    /// The process exited with a code
    Exited(i32),
    /// The process was killed by a signal it did not handle
    Signaled(i32),
    /// The attempt exceeded its timeout and was killed
    TimedOut,
    /// The cancel token fired and the process was killed
    Interrupted,
    /// The process could not be started
    LaunchFailed(String),
}

/// Captured result of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOutput {
    /// How the attempt ended
    pub status: AttemptStatus,
    /// Captured stdout, at most `max_output_size` bytes
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
    /// Stdout was longer than the limit
    pub truncated: bool,
}

impl AttemptOutput {
    /// An attempt that exited with `code`.
    pub fn exited(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            status: AttemptStatus::Exited(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
            truncated: false,
        }
    }

    /// An attempt that ended without output.
    pub fn with_status(status: AttemptStatus) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: String::new(),
            truncated: false,
        }
    }

    /// Whether the process exited 0.
    pub fn is_success(&self) -> bool {
        self.status == AttemptStatus::Exited(0)
    }
}

/// Runs one attempt of an external call.
pub trait Backend: Send + Sync {
    /// Run the invocation to completion, timeout or cancellation.
    fn run(&self, invocation: &Invocation<'_>) -> AttemptOutput;
}

impl<T: Backend + ?Sized> Backend for std::sync::Arc<T> {
    fn run(&self, invocation: &Invocation<'_>) -> AttemptOutput {
        (**self).run(invocation)
    }
}

/// Get the default backend (real processes).
pub fn default_backend() -> process::ProcessBackend {
    process::ProcessBackend::new()
}
