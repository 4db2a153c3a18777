//! Audio capture from the input device
//!
//! The cpal stream lives on its own dedicated thread and pushes converted
//! 16-bit little-endian chunks through a bounded channel. The session owner
//! pulls fixed-size frames from the other end with [`CaptureSession::read`].

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::buffer::{AudioFrame, FrameAssembler};
use crate::audio::device::{get_default_input_device, get_input_device, AudioDevice, DeviceFormat};
use crate::config::CaptureConfig;
use crate::constants::{CAPTURE_CHANNEL_CAPACITY, CAPTURE_POLL_MS};
use crate::error::AudioError;

/// Opens capture sessions. Implemented by the cpal backend and by test doubles.
pub trait CaptureBackend: Send + Sync {
    /// Open a session for `config`, stopping and releasing any prior one
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureSession>, AudioError>;
}

/// One open capture device handle
pub trait CaptureSession: Send {
    /// Fixed frame size in bytes for this session
    fn frame_size(&self) -> usize;

    fn start(&mut self) -> Result<(), AudioError>;

    /// Next frame, or an empty frame when nothing is ready or capture stopped.
    /// Fails once the device has been taken by a newer session.
    fn read(&mut self) -> Result<AudioFrame, AudioError>;

    fn stop(&mut self);

    /// Free the device. Safe to call more than once.
    fn release(&mut self);
}

/// Run/revoke flags shared between a session and its capture thread
#[derive(Default)]
struct Lease {
    running: AtomicBool,
    revoked: AtomicBool,
}

impl Lease {
    fn is_live(&self) -> bool {
        self.running.load(Ordering::Acquire) && !self.revoked.load(Ordering::Acquire)
    }

    fn ensure_not_revoked(&self) -> Result<(), AudioError> {
        if self.revoked.load(Ordering::Acquire) {
            return Err(AudioError::Unavailable("capture session revoked".to_string()));
        }
        Ok(())
    }
}

/// cpal-backed capture; at most one session holds the device at a time
#[derive(Default)]
pub struct CpalBackend {
    active: Mutex<Option<Arc<Lease>>>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame size the device would use for `config`
    pub fn frame_size(&self, config: &CaptureConfig) -> Result<usize, AudioError> {
        let device = resolve_device(config)?;
        Ok(device.negotiate(config)?.frame_bytes)
    }
}

impl CaptureBackend for CpalBackend {
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureSession>, AudioError> {
        let mut active = self.active.lock();

        if let Some(previous) = active.take() {
            previous.revoked.store(true, Ordering::Release);
            tracing::info!("Released previous capture session");
        }

        let device = resolve_device(config)?;
        let format = device.negotiate(config)?;

        tracing::info!(
            "Opened input '{}': {}Hz, {} channel(s), {:?}, min buffer {:?} frames, frame {} bytes",
            device.name,
            config.sample_rate,
            config.channels.count(),
            format.sample_format,
            format.min_buffer_frames,
            format.frame_bytes
        );

        let lease = Arc::new(Lease::default());
        *active = Some(lease.clone());

        Ok(Box::new(CpalCaptureSession::new(device, format, config, lease)))
    }
}

fn resolve_device(config: &CaptureConfig) -> Result<AudioDevice, AudioError> {
    match &config.device {
        Some(name) => get_input_device(name),
        None => get_default_input_device(),
    }
}

/// Capture session for a single cpal input device
pub struct CpalCaptureSession {
    /// Moved into the capture thread on start
    device: Option<AudioDevice>,

    format: DeviceFormat,

    config: StreamConfig,

    lease: Arc<Lease>,

    chunk_rx: Option<Receiver<Vec<u8>>>,

    /// Channel for fatal stream errors
    error_rx: Option<Receiver<AudioError>>,

    assembler: FrameAssembler,

    thread_handle: Option<JoinHandle<()>>,

    /// Chunks dropped because the reader fell behind
    dropped_chunks: Arc<AtomicU64>,

    released: bool,
}

impl CpalCaptureSession {
    fn new(device: AudioDevice, format: DeviceFormat, config: &CaptureConfig, lease: Arc<Lease>) -> Self {
        let stream_config = StreamConfig {
            channels: config.channels.count(),
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        Self {
            device: Some(device),
            format,
            config: stream_config,
            lease,
            chunk_rx: None,
            error_rx: None,
            assembler: FrameAssembler::new(format.frame_bytes),
            thread_handle: None,
            dropped_chunks: Arc::new(AtomicU64::new(0)),
            released: false,
        }
    }

    /// Chunks lost to a full channel
    pub fn dropped_chunks(&self) -> u64 {
        self.dropped_chunks.load(Ordering::Relaxed)
    }

    fn check_errors(&self) -> Option<AudioError> {
        self.error_rx.as_ref().and_then(|rx| rx.try_recv().ok())
    }
}

impl CaptureSession for CpalCaptureSession {
    fn frame_size(&self) -> usize {
        self.format.frame_bytes
    }

    fn start(&mut self) -> Result<(), AudioError> {
        if self.released || self.lease.revoked.load(Ordering::Acquire) {
            return Err(AudioError::Unavailable("capture session already released".to_string()));
        }
        if self.lease.running.load(Ordering::Acquire) {
            return Ok(());
        }

        let device = self
            .device
            .take()
            .ok_or_else(|| AudioError::StreamError("capture session cannot be restarted".to_string()))?;

        let (chunk_tx, chunk_rx) = bounded::<Vec<u8>>(CAPTURE_CHANNEL_CAPACITY);
        let (error_tx, error_rx) = bounded::<AudioError>(16);
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);

        let lease = self.lease.clone();
        let config = self.config.clone();
        let sample_format = self.format.sample_format;
        let dropped = self.dropped_chunks.clone();

        self.lease.running.store(true, Ordering::Release);

        let handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                let cpal_device = device.into_inner();

                let stream = match sample_format {
                    SampleFormat::I16 => {
                        build_stream::<i16>(&cpal_device, &config, chunk_tx, error_tx, dropped)
                    }
                    SampleFormat::F32 => {
                        build_stream::<f32>(&cpal_device, &config, chunk_tx, error_tx, dropped)
                    }
                    other => Err(AudioError::Unavailable(format!(
                        "Unsupported sample format {:?}",
                        other
                    ))),
                };

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::Unavailable(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Keep thread alive while running
                while lease.is_live() {
                    thread::sleep(Duration::from_millis(10));
                }

                // Stream is dropped here, stopping capture
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        self.thread_handle = Some(handle);

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.chunk_rx = Some(chunk_rx);
                self.error_rx = Some(error_rx);
                tracing::debug!("Capture stream started");
                Ok(())
            }
            Ok(Err(e)) => {
                self.stop();
                Err(e)
            }
            Err(_) => {
                self.stop();
                Err(AudioError::StreamError(
                    "capture thread exited before starting".to_string(),
                ))
            }
        }
    }

    fn read(&mut self) -> Result<AudioFrame, AudioError> {
        if let Some(err) = self.check_errors() {
            return Err(err);
        }
        next_frame(self.chunk_rx.as_ref(), &mut self.assembler, &self.lease)
    }

    fn stop(&mut self) {
        self.lease.running.store(false, Ordering::Release);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
        self.chunk_rx = None;
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.stop();
        self.lease.revoked.store(true, Ordering::Release);
        self.device = None;
        self.error_rx = None;
        self.assembler.clear();
        self.released = true;

        let dropped = self.dropped_chunks();
        if dropped > 0 {
            tracing::warn!("Capture dropped {} chunk(s) while the reader was behind", dropped);
        }
        tracing::debug!("Capture session released");
    }
}

impl Drop for CpalCaptureSession {
    fn drop(&mut self) {
        self.release();
    }
}

/// Pull chunks until a full frame is assembled or `CAPTURE_POLL_MS` passes
fn next_frame(
    rx: Option<&Receiver<Vec<u8>>>,
    assembler: &mut FrameAssembler,
    lease: &Lease,
) -> Result<AudioFrame, AudioError> {
    lease.ensure_not_revoked()?;
    if let Some(frame) = assembler.pop_frame() {
        return Ok(frame);
    }
    let Some(rx) = rx else {
        return Ok(AudioFrame::empty());
    };

    let deadline = Instant::now() + Duration::from_millis(CAPTURE_POLL_MS);
    while lease.is_live() {
        match rx.recv_deadline(deadline) {
            Ok(chunk) => {
                assembler.push(&chunk);
                if let Some(frame) = assembler.pop_frame() {
                    return Ok(frame);
                }
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // Revoked while waiting
    lease.ensure_not_revoked()?;
    Ok(AudioFrame::empty())
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    chunk_tx: Sender<Vec<u8>>,
    error_tx: Sender<AudioError>,
    dropped: Arc<AtomicU64>,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mut chunk = Vec::with_capacity(data.len() * 2);
                for &sample in data {
                    chunk.extend_from_slice(&i16::from_sample(sample).to_le_bytes());
                }

                // Push to channel (may fail when the reader falls behind)
                if chunk_tx.try_send(chunk).is_err() {
                    dropped.fetch_add(1, Ordering::Relaxed);
                }
            },
            move |err| match err {
                cpal::StreamError::DeviceNotAvailable => {
                    let _ = error_tx.try_send(AudioError::Unavailable(err.to_string()));
                }
                other => tracing::warn!("Capture stream error: {}", other),
            },
            None,
        )
        .map_err(|e| AudioError::Unavailable(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_lease() -> Lease {
        let lease = Lease::default();
        lease.running.store(true, Ordering::Release);
        lease
    }

    #[test]
    fn test_next_frame_reassembles_chunks() {
        let (tx, rx) = bounded::<Vec<u8>>(8);
        let mut assembler = FrameAssembler::new(4);
        let lease = running_lease();

        tx.send(vec![1, 2, 3]).unwrap();
        tx.send(vec![4, 5, 6]).unwrap();

        let frame = next_frame(Some(&rx), &mut assembler, &lease).unwrap();
        assert_eq!(frame.as_bytes(), &[1, 2, 3, 4]);
        assert_eq!(assembler.pending(), 2);
    }

    #[test]
    fn test_next_frame_times_out_empty() {
        let (_tx, rx) = bounded::<Vec<u8>>(8);
        let mut assembler = FrameAssembler::new(4);
        let lease = running_lease();

        let frame = next_frame(Some(&rx), &mut assembler, &lease).unwrap();
        assert!(frame.is_empty());

        // Stopped but not revoked is still "no data"
        lease.running.store(false, Ordering::Release);
        assert!(next_frame(Some(&rx), &mut assembler, &lease).unwrap().is_empty());
    }

    #[test]
    fn test_revoked_session_read_fails() {
        let (tx, rx) = bounded::<Vec<u8>>(8);
        let mut assembler = FrameAssembler::new(4);
        let lease = running_lease();
        tx.send(vec![1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert!(next_frame(Some(&rx), &mut assembler, &lease).is_ok());

        lease.revoked.store(true, Ordering::Release);

        let started = Instant::now();
        let err = next_frame(Some(&rx), &mut assembler, &lease).unwrap_err();
        assert!(matches!(err, AudioError::Unavailable(_)));
        assert!(started.elapsed() < Duration::from_millis(CAPTURE_POLL_MS));

        // No channel at all behaves the same
        assert!(next_frame(None, &mut assembler, &lease).is_err());
    }
}
