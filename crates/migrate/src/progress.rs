//! Progress Buffer
//!
//! A single owned, line-oriented output stream shared between the worker
//! (the only writer) and any number of request handlers. The worker holds a
//! [`ProgressWriter`]; dropping it marks the worker as no longer alive.

use crate::error::{MigrationError, MigrationResult};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use strata_store::{MigrationIndex, MigrationState};
use tracing::warn;

/// Failure captured from a worker, kept until `reset` or the next run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalError {
    /// Index of the failing unit, if the failure was unit-specific
    pub index: Option<MigrationIndex>,
    pub message: String,
}

impl TerminalError {
    pub fn new<T: Into<String>>(message: T) -> Self {
        Self {
            index: None,
            message: message.into(),
        }
    }

    pub fn for_unit<T: Into<String>>(index: MigrationIndex, message: T) -> Self {
        Self {
            index: Some(index),
            message: message.into(),
        }
    }
}

impl fmt::Display for TerminalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<MigrationError> for TerminalError {
    fn from(err: MigrationError) -> Self {
        match err {
            MigrationError::Unit { index, message } => TerminalError::for_unit(index, message),
            other => TerminalError::new(other.to_string()),
        }
    }
}

#[derive(Debug, Default)]
struct ProgressState {
    text: Option<String>,
    exception: Option<TerminalError>,
    worker_alive: bool,
    phase: Option<MigrationState>,
}

/// Process-wide progress record of the current or most recent worker
#[derive(Debug, Clone, Default)]
pub struct ProgressBuffer {
    state: Arc<Mutex<ProgressState>>,
}

impl ProgressBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh buffer for a new worker and hand out its writer
    ///
    /// Fails while a worker is alive. Unread output of an earlier run is
    /// discarded with a warning; any captured exception is cleared.
    pub fn start_new(&self, phase: MigrationState, verbose: bool) -> MigrationResult<ProgressWriter> {
        let mut state = self.state.lock();
        if state.worker_alive {
            return Err(MigrationError::WorkerActive);
        }
        if let Some(stale) = state.text.take() {
            warn!(
                bytes = stale.len(),
                "Discarding unread progress output of a previous migration run"
            );
        }
        state.text = Some(String::new());
        state.exception = None;
        state.worker_alive = true;
        state.phase = Some(phase);

        Ok(ProgressWriter {
            buffer: self.clone(),
            verbose,
        })
    }

    /// Append `line` followed by a newline
    pub fn write_line(&self, line: &str) {
        let mut state = self.state.lock();
        let text = state.text.get_or_insert_with(String::new);
        text.push_str(line);
        text.push('\n');
    }

    /// Everything written so far, without consuming it
    pub fn snapshot(&self) -> Option<String> {
        self.state.lock().text.clone()
    }

    /// Take the buffered output and deallocate the buffer
    pub fn drain(&self) -> MigrationResult<Option<String>> {
        let mut state = self.state.lock();
        if state.worker_alive {
            return Err(MigrationError::WorkerActive);
        }
        Ok(state.text.take())
    }

    /// Drop buffered output without reading it
    pub fn discard(&self) {
        self.state.lock().text = None;
    }

    pub fn set_exception(&self, error: TerminalError) {
        self.state.lock().exception = Some(error);
    }

    pub fn exception(&self) -> Option<TerminalError> {
        self.state.lock().exception.clone()
    }

    pub fn clear_exception(&self) {
        self.state.lock().exception = None;
    }

    pub fn is_worker_alive(&self) -> bool {
        self.state.lock().worker_alive
    }

    /// Running state of the live worker's current phase
    pub fn running_state(&self) -> Option<MigrationState> {
        let state = self.state.lock();
        if state.worker_alive {
            state.phase
        } else {
            None
        }
    }

    fn set_phase(&self, phase: MigrationState) {
        self.state.lock().phase = Some(phase);
    }

    fn release(&self) {
        let mut state = self.state.lock();
        if std::thread::panicking() && state.exception.is_none() {
            state.exception = Some(TerminalError::new("Migration worker panicked"));
        }
        state.worker_alive = false;
        state.phase = None;
    }
}

/// Write capability handed to the worker and to migration unit bodies
#[derive(Debug)]
pub struct ProgressWriter {
    buffer: ProgressBuffer,
    verbose: bool,
}

impl ProgressWriter {
    pub fn write_line<T: AsRef<str>>(&self, line: T) {
        self.buffer.write_line(line.as_ref());
    }

    /// Write only when the command asked for verbose output
    pub fn write_verbose<T: AsRef<str>>(&self, line: T) {
        if self.verbose {
            self.buffer.write_line(line.as_ref());
        }
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub(crate) fn enter_phase(&self, phase: MigrationState) {
        self.buffer.set_phase(phase);
    }

    pub(crate) fn fail(&self, error: TerminalError) {
        self.buffer.set_exception(error);
    }
}

impl Drop for ProgressWriter {
    fn drop(&mut self) {
        self.buffer.release();
    }
}
