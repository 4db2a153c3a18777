//! Application configuration
//!
//! Loaded from `config.toml` in the platform config directory. Every field
//! has a default, so a missing file or a partial file is fine.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};

const CONFIG_FILENAME: &str = "config.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub capture: CaptureConfig,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
}

/// Channel layout of captured audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

impl ChannelLayout {
    pub fn count(self) -> u16 {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }
}

/// Sample encoding put on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleEncoding {
    /// Signed 16-bit little-endian PCM
    Pcm16,
}

impl SampleEncoding {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleEncoding::Pcm16 => 2,
        }
    }
}

/// Capture parameters, fixed for the process lifetime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Input device name; the host default when unset
    pub device: Option<String>,
    pub sample_rate: u32,
    pub channels: ChannelLayout,
    pub encoding: SampleEncoding,
    /// Overrides the device-reported minimum frame size
    pub buffer_bytes: Option<usize>,
    /// Frame length used when the device reports no usable minimum
    pub fallback_frame_ms: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: ChannelLayout::Mono,
            encoding: SampleEncoding::Pcm16,
            buffer_bytes: None,
            fallback_frame_ms: DEFAULT_FALLBACK_FRAME_MS,
        }
    }
}

impl CaptureConfig {
    /// Bytes per interleaved sample frame
    pub fn bytes_per_frame(&self) -> usize {
        self.channels.count() as usize * self.encoding.bytes_per_sample()
    }

    /// Frame size in bytes for `fallback_frame_ms` of audio
    pub fn nominal_frame_bytes(&self) -> usize {
        let frames = self.sample_rate as u64 * self.fallback_frame_ms as u64 / 1000;
        (frames as usize * self.bytes_per_frame()).max(self.bytes_per_frame())
    }

    /// Resolve the frame size given the device minimum in sample frames
    pub fn frame_bytes(&self, device_min_frames: Option<u32>) -> usize {
        if let Some(bytes) = self.buffer_bytes.filter(|b| *b > 0) {
            return bytes;
        }
        match device_min_frames {
            Some(frames) => {
                let bytes = frames as usize * self.bytes_per_frame();
                if bytes >= MIN_FRAME_BYTES {
                    bytes
                } else {
                    self.nominal_frame_bytes()
                }
            }
            None => self.nominal_frame_bytes(),
        }
    }
}

/// Server ports and connect behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub audio_port: u16,
    pub video_port: u16,
    pub video_path: String,
    /// `None` blocks until the OS gives up
    pub connect_timeout_ms: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            audio_port: AUDIO_PORT,
            video_port: VIDEO_PORT,
            video_path: VIDEO_PATH.to_string(),
            connect_timeout_ms: Some(DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }
}

impl NetworkConfig {
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}

/// Where persistent state lives
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `recent_ips.json`; platform data dir when unset
    pub data_dir: Option<PathBuf>,
    /// Raw PCM file replayed by the test stream instead of the bundled asset
    pub test_asset: Option<PathBuf>,
}

impl AppConfig {
    /// Load from the platform config directory, falling back to defaults
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load from an explicit path. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config = Self::parse(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Directory for persisted state, created if needed
    pub fn data_dir(&self) -> Result<PathBuf> {
        let dir = match &self.storage.data_dir {
            Some(dir) => dir.clone(),
            None => project_dirs()
                .map(|dirs| dirs.data_dir().to_path_buf())
                .ok_or_else(|| Error::Config("No home directory for app data".to_string()))?,
        };
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "example", "mjpeg-voice")
}

/// Default location of `config.toml`
pub fn config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILENAME))
}
