//! Network subsystem for raw TCP audio transport

pub mod endpoint;
pub mod test_stream;
pub mod transport;

pub use endpoint::{video_url, NetworkEndpoint};
pub use test_stream::{TestStreamReport, TestStreamSource, TEST_ASSET};
pub use transport::{Connector, TcpConnector, TcpTransport, Transport};
