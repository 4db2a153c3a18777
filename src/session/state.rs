//! Session states, events and the worker-owned session aggregate

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::audio::{CaptureBackend, CaptureSession};
use crate::config::CaptureConfig;
use crate::error::{Error, Result};
use crate::network::{Connector, NetworkEndpoint, Transport};

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Streaming,
    Stopping,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Streaming => "streaming",
            SessionState::Stopping => "stopping",
        };
        f.write_str(label)
    }
}

/// Counters for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Frame size the capture session settled on
    pub frame_bytes: usize,
    pub frames_read: u64,
    pub frames_sent: u64,
    pub empty_reads: u64,
    pub bytes_sent: u64,
}

/// Reported to whoever drives the controller
#[derive(Debug)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// Capture, connect or write failure that ended the session
    Failed(Error),
    /// Sent once per session, after teardown and the return to Idle.
    /// Always the last event of its session.
    Finished(SessionStats),
}

/// Shared state cell plus the event sink
#[derive(Clone)]
pub(crate) struct Reporter {
    state: Arc<Mutex<SessionState>>,
    events: Sender<SessionEvent>,
}

impl Reporter {
    pub(crate) fn new(state: Arc<Mutex<SessionState>>, events: Sender<SessionEvent>) -> Self {
        Self { state, events }
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub(crate) fn set(&self, next: SessionState) {
        let previous = std::mem::replace(&mut *self.state.lock(), next);
        if previous != next {
            tracing::debug!("Session {} -> {}", previous, next);
            self.emit(SessionEvent::StateChanged(next));
        }
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }
}

/// Returns the controller to Idle when the worker exits, unwinding included.
/// A session that got as far as [`IdleOnExit::finish`] then reports `Finished`.
pub(crate) struct IdleOnExit {
    reporter: Reporter,
    finished: Option<SessionStats>,
}

impl IdleOnExit {
    pub(crate) fn new(reporter: Reporter) -> Self {
        Self {
            reporter,
            finished: None,
        }
    }

    /// Go Idle, then emit `Finished(stats)`
    pub(crate) fn finish(mut self, stats: SessionStats) {
        self.finished = Some(stats);
    }
}

impl Drop for IdleOnExit {
    fn drop(&mut self) {
        self.reporter.set(SessionState::Idle);
        if let Some(stats) = self.finished.take() {
            self.reporter.emit(SessionEvent::Finished(stats));
        }
    }
}

/// Everything one streaming attempt owns. Lives only on the worker thread.
pub struct RecordingSession {
    endpoint: NetworkEndpoint,
    capture: Option<Box<dyn CaptureSession>>,
    transport: Option<Box<dyn Transport>>,
    cancel: Arc<AtomicBool>,
    stats: SessionStats,
}

impl RecordingSession {
    pub fn new(endpoint: NetworkEndpoint, cancel: Arc<AtomicBool>) -> Self {
        Self {
            endpoint,
            capture: None,
            transport: None,
            cancel,
            stats: SessionStats::default(),
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Connecting and Streaming. Returns when cancelled or on the first error.
    pub(crate) fn run(
        &mut self,
        backend: &dyn CaptureBackend,
        connector: &dyn Connector,
        config: &CaptureConfig,
        reporter: &Reporter,
    ) -> Result<()> {
        let capture = self.capture.insert(backend.open(config)?);
        capture.start()?;
        self.stats.frame_bytes = capture.frame_size();

        if self.cancelled() {
            tracing::debug!("Cancelled before connecting");
            return Ok(());
        }

        self.transport = Some(connector.connect(&self.endpoint)?);
        reporter.set(SessionState::Streaming);
        tracing::info!(
            "Streaming audio to {} in {}-byte frames",
            self.endpoint,
            self.stats.frame_bytes
        );

        self.stream()
    }

    fn stream(&mut self) -> Result<()> {
        let (Some(capture), Some(transport)) = (self.capture.as_mut(), self.transport.as_mut())
        else {
            return Ok(());
        };

        while !self.cancel.load(Ordering::Acquire) {
            let frame = capture.read()?;
            if frame.is_empty() {
                self.stats.empty_reads += 1;
                tracing::trace!("No data to send (read = 0)");
                continue;
            }
            self.stats.frames_read += 1;

            tracing::debug!("read: {}, first 10 bytes: {:?}", frame.len(), frame.head(10));

            transport.write_all(frame.as_bytes())?;
            self.stats.frames_sent += 1;
            self.stats.bytes_sent += frame.len() as u64;
        }

        Ok(())
    }

    /// Release capture, close transport. Idempotent.
    pub fn teardown(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
            capture.release();
        }
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
