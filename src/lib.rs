//! # MJPEG Voice
//!
//! Push-to-talk microphone streaming to a server that also publishes an
//! MJPEG camera feed.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                               CLIENT                                 │
//! │                                                                      │
//! │   begin(address) / end()                                             │
//! │          │                                                           │
//! │          ▼                                                           │
//! │  ┌─────────────────────────┐   push   ┌────────────────────────┐     │
//! │  │  RecordingController    │ ───────▶ │  RecentAddressStore    │     │
//! │  │  (session::controller)  │          │  (recent_ips.json)     │     │
//! │  └───────────┬─────────────┘          └────────────────────────┘     │
//! │              │ spawns                                                │
//! │              ▼                                                       │
//! │  ┌─────────────────────────────────────────────────────────────┐     │
//! │  │  Worker thread: RecordingSession                            │     │
//! │  │                                                             │     │
//! │  │   ┌──────────────┐  AudioFrame  ┌───────────────────────┐   │     │
//! │  │   │ CaptureSession│ ──────────▶ │ Transport (raw TCP)   │   │     │
//! │  │   │ (cpal input)  │             │ write_all, no framing │   │     │
//! │  │   └──────────────┘              └───────────┬───────────┘   │     │
//! │  └─────────────────────────────────────────────┼───────────────┘     │
//! │                                                │                     │
//! │  ┌──────────────────┐   same Transport         │                     │
//! │  │ TestStreamSource │ ─────────────────────────┤                     │
//! │  │ (embedded PCM)   │                          │                     │
//! │  └──────────────────┘                          │                     │
//! └────────────────────────────────────────────────┼─────────────────────┘
//!                                                  │ TCP :50005
//!                                                  ▼
//!                                   ┌─────────────────────────────┐
//!                                   │ SERVER                      │
//!                                   │  :50005 raw PCM sink        │
//!                                   │  :8080/video MJPEG feed     │
//!                                   └─────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod network;
pub mod recent;
pub mod session;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default capture sample rate
    pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

    /// TCP port the server listens on for raw PCM
    pub const AUDIO_PORT: u16 = 50005;

    /// HTTP port serving the MJPEG feed
    pub const VIDEO_PORT: u16 = 8080;

    /// HTTP path of the MJPEG feed
    pub const VIDEO_PATH: &str = "/video";

    /// Default connect timeout in milliseconds
    pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

    /// Nominal frame length used when the device reports no minimum buffer
    pub const DEFAULT_FALLBACK_FRAME_MS: u32 = 40;

    /// Device minimum buffers below this many bytes are ignored
    pub const MIN_FRAME_BYTES: usize = 256;

    /// Pending chunk capacity between the capture callback and the reader
    pub const CAPTURE_CHANNEL_CAPACITY: usize = 256;

    /// How long a single read waits for samples before reporting "no data yet"
    pub const CAPTURE_POLL_MS: u64 = 100;

    /// Number of addresses kept in the recent list
    pub const RECENT_ADDRESS_CAPACITY: usize = 5;

    /// Storage key (and file stem) of the recent address list
    pub const RECENT_ADDRESSES_KEY: &str = "recent_ips";
}
