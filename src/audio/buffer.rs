//! Captured audio frames and the byte accumulator that produces them
//!
//! The capture callback hands over chunks of whatever size the driver
//! delivers. [`FrameAssembler`] re-slices them into fixed-size frames so
//! every non-empty read has the session's frame length.

use bytes::{Bytes, BytesMut};

/// One read of raw PCM bytes, possibly empty ("no data yet")
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AudioFrame {
    data: Bytes,
}

impl AudioFrame {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Leading bytes for diagnostics
    pub fn head(&self, n: usize) -> &[u8] {
        &self.data[..n.min(self.data.len())]
    }
}

/// Accumulates incoming chunks and yields fixed-size frames
pub struct FrameAssembler {
    pending: BytesMut,
    frame_size: usize,
}

impl FrameAssembler {
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            pending: BytesMut::with_capacity(frame_size * 2),
            frame_size,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Take one full frame if enough bytes are pending
    pub fn pop_frame(&mut self) -> Option<AudioFrame> {
        if self.pending.len() >= self.frame_size {
            Some(AudioFrame::new(self.pending.split_to(self.frame_size).freeze()))
        } else {
            None
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assembler_slices_fixed_frames() {
        let mut assembler = FrameAssembler::new(4);

        assembler.push(&[1, 2, 3]);
        assert!(assembler.pop_frame().is_none());

        assembler.push(&[4, 5, 6, 7, 8, 9]);
        assert_eq!(assembler.pop_frame().unwrap().as_bytes(), &[1, 2, 3, 4]);
        assert_eq!(assembler.pop_frame().unwrap().as_bytes(), &[5, 6, 7, 8]);
        assert!(assembler.pop_frame().is_none());
        assert_eq!(assembler.pending(), 1);

        assembler.clear();
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn test_frame_head() {
        let frame = AudioFrame::new(vec![9u8; 3]);
        assert_eq!(frame.head(10), &[9, 9, 9]);
        assert!(AudioFrame::empty().is_empty());
        assert_eq!(AudioFrame::empty().head(10), &[] as &[u8]);
    }
}
