use labnode_transport::is_disconnect;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame is not valid COBS.
    #[error("invalid COBS stuffing in {len}-byte frame")]
    Cobs { len: usize },

    /// The payload is not a CBOR map with integer keys, or could not be encoded.
    #[error("invalid payload: {0}")]
    Payload(String),

    /// A frame exceeded the configured maximum size and was discarded.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The peer closed the stream.
    #[error("connection closed")]
    ConnectionClosed,

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// True if the stream is gone and no further frames can arrive.
    ///
    /// Decode errors affect a single frame; the stream stays usable.
    pub fn is_end_of_stream(&self) -> bool {
        match self {
            FrameError::ConnectionClosed => true,
            FrameError::Io(err) => is_disconnect(err),
            _ => false,
        }
    }

    /// True if only the current frame was lost.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            FrameError::Cobs { .. } | FrameError::Payload(_) | FrameError::FrameTooLarge { .. }
        )
    }
}

impl From<labnode_transport::TransportError> for FrameError {
    fn from(err: labnode_transport::TransportError) -> Self {
        match err {
            labnode_transport::TransportError::Io(io)
            | labnode_transport::TransportError::Connect { source: io, .. } => FrameError::Io(io),
            other => FrameError::Io(std::io::Error::other(other.to_string())),
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    fn end_of_stream_classification() {
        assert!(FrameError::ConnectionClosed.is_end_of_stream());
        assert!(FrameError::Io(ErrorKind::ConnectionReset.into()).is_end_of_stream());
        assert!(FrameError::Io(ErrorKind::BrokenPipe.into()).is_end_of_stream());
        assert!(!FrameError::Io(ErrorKind::TimedOut.into()).is_end_of_stream());
        assert!(!FrameError::Cobs { len: 3 }.is_end_of_stream());
    }

    #[test]
    fn frame_local_errors() {
        assert!(FrameError::Payload("x".into()).is_frame_local());
        assert!(FrameError::FrameTooLarge { size: 9, max: 4 }.is_frame_local());
        assert!(!FrameError::ConnectionClosed.is_frame_local());
    }
}
