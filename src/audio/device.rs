//! Input device lookup and capability probing

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{SampleFormat, SupportedBufferSize, SupportedStreamConfigRange};

use crate::config::CaptureConfig;
use crate::error::AudioError;

/// Wrapper around a cpal input device
pub struct AudioDevice {
    inner: cpal::Device,
    pub name: String,
}

impl AudioDevice {
    pub fn from_cpal(device: cpal::Device) -> Self {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        Self {
            inner: device,
            name,
        }
    }

    pub fn into_inner(self) -> cpal::Device {
        self.inner
    }

    /// Get supported input configurations
    pub fn supported_input_configs(&self) -> Result<Vec<SupportedStreamConfigRange>, AudioError> {
        self.inner
            .supported_input_configs()
            .map(|iter| iter.collect())
            .map_err(|e| AudioError::Unavailable(e.to_string()))
    }

    /// Pick an input format matching the capture config
    pub fn negotiate(&self, config: &CaptureConfig) -> Result<DeviceFormat, AudioError> {
        let rate = cpal::SampleRate(config.sample_rate);
        let channels = config.channels.count();

        let candidates: Vec<_> = self
            .supported_input_configs()?
            .into_iter()
            .filter(|range| {
                range.channels() == channels
                    && rate >= range.min_sample_rate()
                    && rate <= range.max_sample_rate()
            })
            .collect();

        // Native i16 avoids a conversion in the callback
        let chosen = candidates
            .iter()
            .find(|range| range.sample_format() == SampleFormat::I16)
            .or_else(|| {
                candidates
                    .iter()
                    .find(|range| range.sample_format() == SampleFormat::F32)
            })
            .ok_or_else(|| {
                AudioError::Unavailable(format!(
                    "{} has no {}Hz {}-channel i16/f32 input",
                    self.name, config.sample_rate, channels
                ))
            })?;

        let min_frames = match chosen.buffer_size() {
            SupportedBufferSize::Range { min, .. } => Some(*min),
            SupportedBufferSize::Unknown => None,
        };

        Ok(DeviceFormat {
            sample_format: chosen.sample_format(),
            min_buffer_frames: min_frames,
            frame_bytes: config.frame_bytes(min_frames),
        })
    }
}

/// Resolved device format for one capture configuration
#[derive(Debug, Clone, Copy)]
pub struct DeviceFormat {
    pub sample_format: SampleFormat,
    /// Minimum buffer reported by the driver, in sample frames
    pub min_buffer_frames: Option<u32>,
    /// Bytes per [`AudioFrame`](crate::audio::AudioFrame) for this session
    pub frame_bytes: usize,
}

/// Get default input device
pub fn get_default_input_device() -> Result<AudioDevice, AudioError> {
    let host = cpal::default_host();
    host.default_input_device()
        .map(AudioDevice::from_cpal)
        .ok_or_else(|| AudioError::Unavailable("No default input device".to_string()))
}

/// Get an input device by name
pub fn get_input_device(name: &str) -> Result<AudioDevice, AudioError> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| AudioError::Unavailable(e.to_string()))?;

    for device in devices {
        if let Ok(device_name) = device.name() {
            if device_name == name {
                return Ok(AudioDevice::from_cpal(device));
            }
        }
    }

    Err(AudioError::Unavailable(format!("Input device not found: {}", name)))
}

/// Names of all input devices
pub fn list_input_devices() -> Vec<String> {
    let host = cpal::default_host();
    match host.input_devices() {
        Ok(devices) => devices.filter_map(|d| d.name().ok()).collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate input devices: {}", e);
            Vec::new()
        }
    }
}
