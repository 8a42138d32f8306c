/// Errors that can occur in link transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to connect to the specified TCP endpoint.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        source: std::io::Error,
    },

    /// The serial device does not exist.
    #[error("serial device not found: {path}: {message}")]
    DeviceNotFound { path: String, message: String },

    /// The serial device exists but could not be opened or configured.
    #[error("failed to open serial port {path}: {message}")]
    Serial { path: String, message: String },

    /// The endpoint string could not be parsed.
    #[error("invalid endpoint '{input}': {reason}")]
    InvalidEndpoint { input: String, reason: String },

    /// An I/O error occurred on the link.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// True if the remote end actively refused the connection.
    pub fn is_connection_refused(&self) -> bool {
        match self {
            TransportError::Connect { source, .. } | TransportError::Io(source) => {
                source.kind() == std::io::ErrorKind::ConnectionRefused
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
