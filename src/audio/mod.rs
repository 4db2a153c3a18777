//! Audio subsystem module

pub mod buffer;
pub mod capture;
pub mod device;

pub use buffer::{AudioFrame, FrameAssembler};
pub use capture::{CaptureBackend, CaptureSession, CpalBackend, CpalCaptureSession};
pub use device::{get_default_input_device, list_input_devices, AudioDevice};
