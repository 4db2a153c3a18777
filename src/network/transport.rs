//! Raw TCP transport
//!
//! No framing and no handshake: bytes handed to [`Transport::write_all`] go
//! to the socket exactly as they are.

use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::NetworkError;
use crate::network::endpoint::NetworkEndpoint;

/// Opens transports. Shared by the live capture loop and the test stream.
pub trait Connector: Send + Sync {
    fn connect(&self, endpoint: &NetworkEndpoint) -> Result<Box<dyn Transport>, NetworkError>;
}

/// One open connection to the server
pub trait Transport: Send {
    /// Write the whole buffer or fail
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), NetworkError>;

    fn flush(&mut self) -> Result<(), NetworkError>;

    /// Close the connection. Safe to call more than once.
    fn close(&mut self);
}

/// Blocking TCP connector built on socket2
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        Self { connect_timeout }
    }

    fn connect_addr(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

        // Small frames should leave immediately
        socket.set_nodelay(true)?;

        match self.connect_timeout {
            Some(timeout) => socket.connect_timeout(&addr.into(), timeout)?,
            None => socket.connect(&addr.into())?,
        }

        Ok(socket.into())
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Connector for TcpConnector {
    fn connect(&self, endpoint: &NetworkEndpoint) -> Result<Box<dyn Transport>, NetworkError> {
        let mut last_error = None;

        for addr in endpoint.resolve()? {
            match self.connect_addr(addr) {
                Ok(stream) => {
                    tracing::info!("Connected to server at {}", addr);
                    return Ok(Box::new(TcpTransport::new(stream, addr)));
                }
                Err(e) => {
                    tracing::debug!("Connect to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        Err(NetworkError::ConnectionFailed(match last_error {
            Some(e) => format!("{}: {}", endpoint, e),
            None => endpoint.to_string(),
        }))
    }
}

/// Connected TCP stream
pub struct TcpTransport {
    stream: Option<TcpStream>,
    peer: SocketAddr,
    bytes_written: u64,
}

impl TcpTransport {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream: Some(stream),
            peer,
            bytes_written: 0,
        }
    }

    fn stream(&mut self) -> Result<&mut TcpStream, NetworkError> {
        self.stream
            .as_mut()
            .ok_or_else(|| NetworkError::SendFailed("transport closed".to_string()))
    }
}

impl Transport for TcpTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), NetworkError> {
        let peer = self.peer;
        self.stream()?
            .write_all(bytes)
            .map_err(|e| NetworkError::SendFailed(format!("{}: {}", peer, e)))?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), NetworkError> {
        let peer = self.peer;
        self.stream()?
            .flush()
            .map_err(|e| NetworkError::SendFailed(format!("{}: {}", peer, e)))
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                if e.kind() != io::ErrorKind::NotConnected {
                    tracing::debug!("Shutdown of {} failed: {}", self.peer, e);
                }
            }
            tracing::info!("Closed connection to {} ({} bytes sent)", self.peer, self.bytes_written);
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_write_all_reaches_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).unwrap();
            received
        });

        let connector = TcpConnector::new(Some(Duration::from_secs(2)));
        let mut transport = connector
            .connect(&NetworkEndpoint::new("127.0.0.1", port))
            .unwrap();
        transport.write_all(&[1, 2, 3]).unwrap();
        transport.write_all(&[4, 5]).unwrap();
        transport.flush().unwrap();
        transport.close();
        transport.close();

        assert_eq!(server.join().unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_write_after_close_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let connector = TcpConnector::default();
        let mut transport = connector
            .connect(&NetworkEndpoint::new("127.0.0.1", port))
            .unwrap();
        transport.close();

        assert!(matches!(
            transport.write_all(&[0; 4]),
            Err(NetworkError::SendFailed(_))
        ));
        drop(listener);
    }

    #[test]
    fn test_refused_connect() {
        // Grab a free port, then close it so nothing listens there
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let connector = TcpConnector::new(Some(Duration::from_secs(2)));
        let result = connector.connect(&NetworkEndpoint::new("127.0.0.1", port));
        assert!(matches!(result, Err(NetworkError::ConnectionFailed(_))));
    }

    #[test]
    fn test_unresolvable_host() {
        let connector = TcpConnector::new(Some(Duration::from_secs(2)));
        let result = connector.connect(&NetworkEndpoint::new("bad-host.invalid", 50005));
        assert!(matches!(result, Err(NetworkError::ConnectionFailed(_))));
    }
}
