//! Recording controller
//!
//! Drives `Idle -> Connecting -> Streaming -> Stopping -> Idle` from two
//! commands, [`RecordingController::begin`] and [`RecordingController::end`].
//! Each session runs on its own worker thread that exclusively owns the
//! capture and transport handles; the controller only keeps the cancel flag
//! and the join handle.

use crossbeam_channel::{unbounded, Receiver};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::CaptureBackend;
use crate::config::CaptureConfig;
use crate::error::Result;
use crate::network::{Connector, NetworkEndpoint};
use crate::recent::RecentAddressStore;
use crate::session::state::{
    IdleOnExit, RecordingSession, Reporter, SessionEvent, SessionState,
};

/// What `begin` did with the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginOutcome {
    Started,
    IgnoredEmptyAddress,
    /// A session is already running
    IgnoredBusy,
}

struct ActiveWorker {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Start/stop state machine for live capture streaming
pub struct RecordingController {
    capture_config: CaptureConfig,
    audio_port: u16,
    backend: Arc<dyn CaptureBackend>,
    connector: Arc<dyn Connector>,
    store: Arc<RecentAddressStore>,
    reporter: Reporter,
    state: Arc<Mutex<SessionState>>,
    /// Also serializes begin/end
    active: Mutex<Option<ActiveWorker>>,
}

impl RecordingController {
    /// Returns the controller and the receiving end of its event channel
    pub fn new(
        capture_config: CaptureConfig,
        audio_port: u16,
        backend: Arc<dyn CaptureBackend>,
        connector: Arc<dyn Connector>,
        store: Arc<RecentAddressStore>,
    ) -> (Self, Receiver<SessionEvent>) {
        let (events_tx, events_rx) = unbounded();
        let state = Arc::new(Mutex::new(SessionState::Idle));

        let controller = Self {
            capture_config,
            audio_port,
            backend,
            connector,
            store,
            reporter: Reporter::new(state.clone(), events_tx),
            state,
            active: Mutex::new(None),
        };
        (controller, events_rx)
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn store(&self) -> &RecentAddressStore {
        &self.store
    }

    /// Start streaming to `address`. Never blocks on capture or network.
    pub fn begin(&self, address: &str) -> Result<BeginOutcome> {
        let address = address.trim();
        if address.is_empty() {
            tracing::debug!("Ignoring begin with empty address");
            return Ok(BeginOutcome::IgnoredEmptyAddress);
        }

        let mut active = self.active.lock();
        if self.reporter.state() != SessionState::Idle {
            tracing::debug!("Ignoring begin({}) while {}", address, self.state());
            return Ok(BeginOutcome::IgnoredBusy);
        }

        // The previous worker already reported Idle; reap it
        if let Some(previous) = active.take() {
            let _ = previous.handle.join();
        }

        if let Err(e) = self.store.push(address) {
            tracing::warn!("Failed to remember {}: {}", address, e);
        }

        let endpoint = NetworkEndpoint::new(address, self.audio_port);
        let cancel = Arc::new(AtomicBool::new(false));
        self.reporter.set(SessionState::Connecting);

        let worker = Worker {
            backend: self.backend.clone(),
            connector: self.connector.clone(),
            capture_config: self.capture_config.clone(),
            endpoint,
            cancel: cancel.clone(),
            reporter: self.reporter.clone(),
        };

        let handle = match thread::Builder::new()
            .name("audio-stream".to_string())
            .spawn(move || worker.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                self.reporter.set(SessionState::Idle);
                return Err(e.into());
            }
        };

        *active = Some(ActiveWorker { cancel, handle });
        Ok(BeginOutcome::Started)
    }

    /// Ask the running session to stop. Returns false when idle.
    pub fn end(&self) -> bool {
        let active = self.active.lock();
        match active.as_ref() {
            Some(worker) if self.reporter.state() != SessionState::Idle => {
                worker.cancel.store(true, Ordering::Release);
                tracing::debug!("Stop requested");
                true
            }
            _ => false,
        }
    }

    /// Wait for the current worker, if any, to finish
    pub fn join(&self) {
        let worker = self.active.lock().take();
        if let Some(worker) = worker {
            let _ = worker.handle.join();
        }
    }

    /// Stop and wait
    pub fn shutdown(&self) {
        self.end();
        self.join();
    }
}

impl Drop for RecordingController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Everything the worker thread needs, moved in at spawn
struct Worker {
    backend: Arc<dyn CaptureBackend>,
    connector: Arc<dyn Connector>,
    capture_config: CaptureConfig,
    endpoint: NetworkEndpoint,
    cancel: Arc<AtomicBool>,
    reporter: Reporter,
}

impl Worker {
    fn run(self) {
        // Declared first so it drops last, after the session's teardown
        let idle = IdleOnExit::new(self.reporter.clone());
        let mut session = RecordingSession::new(self.endpoint, self.cancel);

        let result = session.run(
            self.backend.as_ref(),
            self.connector.as_ref(),
            &self.capture_config,
            &self.reporter,
        );

        self.reporter.set(SessionState::Stopping);
        session.teardown();
        let stats = session.stats();

        if let Err(e) = result {
            tracing::warn!("Session ended: {}", e);
            self.reporter.emit(SessionEvent::Failed(e));
        }
        tracing::info!(
            "Session finished: {} frames, {} bytes sent",
            stats.frames_sent,
            stats.bytes_sent
        );
        drop(session);
        idle.finish(stats);
    }
}
