use std::fmt;

use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::LinkStream;

/// Default TCP port of the Labnode firmware.
pub const DEFAULT_PORT: u16 = 4223;

/// TCP link to an Ethernet-attached Labnode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpEndpoint {
    pub host: String,
    pub port: u16,
}

impl TcpEndpoint {
    /// Create an endpoint for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Create an endpoint on the default port.
    pub fn with_default_port(host: impl Into<String>) -> Self {
        Self::new(host, DEFAULT_PORT)
    }

    /// Connect to the device.
    pub async fn open(&self) -> Result<LinkStream> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|source| TransportError::Connect {
                endpoint: self.to_string(),
                source,
            })?;
        // Frames are tiny; do not let Nagle hold them back.
        if let Err(err) = stream.set_nodelay(true) {
            debug!(error = %err, "failed to set TCP_NODELAY");
        }
        info!(endpoint = %self, "connected to labnode over tcp");
        Ok(LinkStream::from_tcp(stream, self.to_string()))
    }
}

impl fmt::Display for TcpEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "tcp://[{}]:{}", self.host, self.port)
        } else {
            write!(f, "tcp://{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn open_connects_and_transfers_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            socket.read_exact(&mut buf).await.unwrap();
            buf
        });

        let mut link = TcpEndpoint::new("127.0.0.1", port).open().await.unwrap();
        assert_eq!(link.transport_name(), "tcp");
        assert_eq!(link.peer(), format!("tcp://127.0.0.1:{port}"));
        link.write_all(b"hello").await.unwrap();

        assert_eq!(&server.await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn open_refused_reports_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = TcpEndpoint::new("127.0.0.1", port).open().await.unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
        assert!(err.is_connection_refused());
    }

    #[test]
    fn display_brackets_ipv6_hosts() {
        assert_eq!(
            TcpEndpoint::with_default_port("::1").to_string(),
            "tcp://[::1]:4223"
        );
        assert_eq!(
            TcpEndpoint::new("labnode.local", 4224).to_string(),
            "tcp://labnode.local:4224"
        );
    }
}
