//! Wire check without the microphone
//!
//! Replays a bundled mono 16-bit PCM clip through the same [`Transport`] the
//! live capture loop uses, so the server side can be validated on its own.

use bytes::Bytes;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::Result;
use crate::network::endpoint::NetworkEndpoint;
use crate::network::transport::{Connector, Transport};

/// 0.5s of a 440Hz tone, 44.1kHz mono, signed 16-bit little-endian
pub static TEST_ASSET: &[u8] = include_bytes!("../../assets/test_audio_mono.pcm");

/// What a replay put on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestStreamReport {
    pub chunks: usize,
    pub bytes_sent: usize,
}

/// One-shot replay of the reference asset
pub struct TestStreamSource {
    connector: Arc<dyn Connector>,
    asset: Bytes,
    chunk_size: usize,
}

impl TestStreamSource {
    pub fn new(connector: Arc<dyn Connector>, chunk_size: usize) -> Self {
        Self {
            connector,
            asset: Bytes::from_static(TEST_ASSET),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Replay `asset` instead of the bundled clip
    pub fn with_asset(mut self, asset: impl Into<Bytes>) -> Self {
        self.asset = asset.into();
        self
    }

    /// Connect, send every chunk, flush, close
    pub fn run(&self, endpoint: &NetworkEndpoint) -> Result<TestStreamReport> {
        tracing::info!("Test stream: sending {} bytes to {}", self.asset.len(), endpoint);

        let mut transport = self.connector.connect(endpoint)?;
        let result = self.replay(transport.as_mut());
        transport.close();

        match &result {
            Ok(report) => tracing::info!(
                "Test stream complete: {} chunks, {} bytes",
                report.chunks,
                report.bytes_sent
            ),
            Err(e) => tracing::warn!("Test stream aborted: {}", e),
        }
        result
    }

    /// Run on a dedicated thread
    pub fn spawn(self, endpoint: NetworkEndpoint) -> Result<JoinHandle<Result<TestStreamReport>>> {
        let handle = thread::Builder::new()
            .name("test-stream".to_string())
            .spawn(move || self.run(&endpoint))?;
        Ok(handle)
    }

    fn replay(&self, transport: &mut dyn Transport) -> Result<TestStreamReport> {
        let mut report = TestStreamReport {
            chunks: 0,
            bytes_sent: 0,
        };

        for chunk in self.asset.chunks(self.chunk_size) {
            tracing::debug!(
                "test chunk: {} bytes, first 10 bytes: {:?}",
                chunk.len(),
                &chunk[..chunk.len().min(10)]
            );
            transport.write_all(chunk)?;
            report.chunks += 1;
            report.bytes_sent += chunk.len();
        }

        transport.flush()?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, NetworkError};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorded {
        writes: Vec<Vec<u8>>,
        flushed: bool,
        closed: usize,
    }

    struct RecordingTransport {
        log: Arc<Mutex<Recorded>>,
        fail_after: Option<usize>,
    }

    impl Transport for RecordingTransport {
        fn write_all(&mut self, bytes: &[u8]) -> std::result::Result<(), NetworkError> {
            let mut log = self.log.lock();
            if Some(log.writes.len()) == self.fail_after {
                return Err(NetworkError::SendFailed("broken pipe".to_string()));
            }
            log.writes.push(bytes.to_vec());
            Ok(())
        }

        fn flush(&mut self) -> std::result::Result<(), NetworkError> {
            self.log.lock().flushed = true;
            Ok(())
        }

        fn close(&mut self) {
            self.log.lock().closed += 1;
        }
    }

    struct RecordingConnector {
        log: Arc<Mutex<Recorded>>,
        fail_after: Option<usize>,
    }

    impl Connector for RecordingConnector {
        fn connect(
            &self,
            _endpoint: &NetworkEndpoint,
        ) -> std::result::Result<Box<dyn Transport>, NetworkError> {
            Ok(Box::new(RecordingTransport {
                log: self.log.clone(),
                fail_after: self.fail_after,
            }))
        }
    }

    #[test]
    fn test_bundled_asset_is_mono_pcm16() {
        assert_eq!(TEST_ASSET.len(), 44100);
        assert_eq!(TEST_ASSET.len() % 2, 0);
    }

    #[test]
    fn test_replay_chunks_in_order() {
        let log = Arc::new(Mutex::new(Recorded::default()));
        let connector = Arc::new(RecordingConnector {
            log: log.clone(),
            fail_after: None,
        });

        let asset: Vec<u8> = (0..10u8).collect();
        let source = TestStreamSource::new(connector, 4).with_asset(asset.clone());
        let report = source.run(&NetworkEndpoint::new("10.0.0.5", 50005)).unwrap();

        assert_eq!(report, TestStreamReport { chunks: 3, bytes_sent: 10 });

        let log = log.lock();
        assert_eq!(log.writes, vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7], vec![8, 9]]);
        assert!(log.flushed);
        assert_eq!(log.closed, 1);
    }

    #[test]
    fn test_write_failure_aborts_and_closes() {
        let log = Arc::new(Mutex::new(Recorded::default()));
        let connector = Arc::new(RecordingConnector {
            log: log.clone(),
            fail_after: Some(1),
        });

        let source = TestStreamSource::new(connector, 1024);
        let err = source
            .run(&NetworkEndpoint::new("10.0.0.5", 50005))
            .unwrap_err();

        assert!(matches!(err, Error::Network(NetworkError::SendFailed(_))));
        let log = log.lock();
        assert_eq!(log.writes.len(), 1);
        assert!(!log.flushed);
        assert_eq!(log.closed, 1);
    }

    #[test]
    fn test_spawned_replay_reports_on_join() {
        let log = Arc::new(Mutex::new(Recorded::default()));
        let connector = Arc::new(RecordingConnector {
            log: log.clone(),
            fail_after: None,
        });

        let handle = TestStreamSource::new(connector, 4096)
            .spawn(NetworkEndpoint::new("10.0.0.5", 50005))
            .unwrap();
        assert_eq!(handle.thread().name(), Some("test-stream"));

        let report = handle.join().unwrap().unwrap();
        assert_eq!(report.bytes_sent, TEST_ASSET.len());
        assert_eq!(report.chunks, TEST_ASSET.len().div_ceil(4096));

        let log = log.lock();
        assert_eq!(log.writes.concat(), TEST_ASSET);
        assert_eq!(log.closed, 1);
    }
}
