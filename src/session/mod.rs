//! Capture-to-socket session lifecycle

pub mod controller;
pub mod state;

pub use controller::{BeginOutcome, RecordingController};
pub use state::{RecordingSession, SessionEvent, SessionState, SessionStats};
