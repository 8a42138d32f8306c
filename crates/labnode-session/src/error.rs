use std::time::Duration;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error, e.g. the connection was refused.
    #[error("transport error: {0}")]
    Transport(#[from] labnode_transport::TransportError),

    /// Frame-level error while writing a request.
    #[error("frame error: {0}")]
    Frame(#[from] labnode_frame::FrameError),

    /// The session has no open connection.
    #[error("not connected")]
    NotConnected,

    /// No response arrived in time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The connection was torn down while the request was outstanding.
    #[error("connection closed")]
    ConnectionClosed,

    /// The device answered with something this client cannot interpret.
    #[error("invalid reply: {0}")]
    InvalidReply(String),

    /// The session configuration is unusable.
    #[error("invalid session config: {0}")]
    InvalidConfig(String),
}

impl SessionError {
    /// True if retrying after a reconnect may help.
    pub fn is_connection_loss(&self) -> bool {
        match self {
            SessionError::NotConnected | SessionError::ConnectionClosed => true,
            SessionError::Frame(err) => err.is_end_of_stream(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
