//! Server endpoints and the MJPEG viewer URL

use std::fmt;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

use crate::error::NetworkError;

/// Host + port of the server, built fresh for every attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEndpoint {
    host: String,
    port: u16,
}

impl NetworkEndpoint {
    /// Surrounding whitespace and IPv6 brackets are stripped from `host`
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: normalize_host(host).to_string(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolve to socket addresses, in resolver order
    pub fn resolve(&self) -> Result<Vec<SocketAddr>, NetworkError> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| NetworkError::ConnectionFailed(format!("cannot resolve {}: {}", self, e)))?
            .collect();

        if addrs.is_empty() {
            return Err(NetworkError::ConnectionFailed(format!(
                "{} resolved to no addresses",
                self
            )));
        }
        Ok(addrs)
    }
}

impl fmt::Display for NetworkEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", url_host(&self.host), self.port)
    }
}

/// `http://{host}:{port}{path}` for the MJPEG feed
pub fn video_url(host: &str, port: u16, path: &str) -> String {
    let host = normalize_host(host);
    if path.starts_with('/') {
        format!("http://{}:{}{}", url_host(host), port, path)
    } else {
        format!("http://{}:{}/{}", url_host(host), port, path)
    }
}

fn normalize_host(host: &str) -> &str {
    let host = host.trim();
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

fn url_host(host: &str) -> String {
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(_)) => format!("[{}]", host),
        _ => host.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_brackets_ipv6() {
        assert_eq!(NetworkEndpoint::new("10.0.0.5", 50005).to_string(), "10.0.0.5:50005");
        assert_eq!(NetworkEndpoint::new("[::1]", 50005).to_string(), "[::1]:50005");
        assert_eq!(NetworkEndpoint::new(" ::1 ", 50005).host(), "::1");
    }

    #[test]
    fn test_video_url() {
        assert_eq!(video_url("192.168.0.7", 8080, "/video"), "http://192.168.0.7:8080/video");
        assert_eq!(video_url("fe80::1", 8080, "video"), "http://[fe80::1]:8080/video");
        assert_eq!(video_url("cam.local", 8080, "/video"), "http://cam.local:8080/video");
    }

    #[test]
    fn test_resolve_literal() {
        let addrs = NetworkEndpoint::new("127.0.0.1", 50005).resolve().unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:50005".parse::<SocketAddr>().unwrap()]);

        let addrs = NetworkEndpoint::new("::1", 50005).resolve().unwrap();
        assert_eq!(addrs, vec!["[::1]:50005".parse::<SocketAddr>().unwrap()]);
    }
}
