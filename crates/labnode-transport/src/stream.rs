use std::io::ErrorKind;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Result, TransportError};

/// Any bidirectional async byte stream a session can run on.
///
/// Implemented for every `AsyncRead + AsyncWrite` type, so a [`LinkStream`],
/// a `tokio::io::DuplexStream` or a TLS wrapper can all back a session.
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ByteStream for T {}

/// A connected link to a Labnode, either TCP or serial.
///
/// This is the fundamental I/O type returned by [`crate::Endpoint::open`].
pub struct LinkStream {
    inner: LinkStreamInner,
    peer: String,
}

enum LinkStreamInner {
    Tcp(TcpStream),
    #[cfg(feature = "serial")]
    Serial(tokio_serial::SerialStream),
}

impl LinkStream {
    pub(crate) fn from_tcp(stream: TcpStream, peer: String) -> Self {
        Self {
            inner: LinkStreamInner::Tcp(stream),
            peer,
        }
    }

    #[cfg(feature = "serial")]
    pub(crate) fn from_serial(stream: tokio_serial::SerialStream, peer: String) -> Self {
        Self {
            inner: LinkStreamInner::Serial(stream),
            peer,
        }
    }

    /// Human-readable name of the remote end, e.g. `tcp://10.0.0.5:4223`.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Link kind for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            LinkStreamInner::Tcp(_) => "tcp",
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(_) => "serial",
        }
    }
}

impl AsyncRead for LinkStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match &mut self.get_mut().inner {
            LinkStreamInner::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for LinkStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match &mut self.get_mut().inner {
            LinkStreamInner::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match &mut self.get_mut().inner {
            LinkStreamInner::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match &mut self.get_mut().inner {
            LinkStreamInner::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

impl std::fmt::Debug for LinkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkStream")
            .field("type", &self.transport_name())
            .field("peer", &self.peer)
            .finish()
    }
}

/// Returns true for I/O errors meaning the other side is already gone.
pub fn is_disconnect(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::UnexpectedEof
    )
}

/// Best-effort close of the write side of a link.
///
/// Flushes pending bytes, then signals end-of-output. Errors meaning the
/// peer is already disconnected are swallowed. Any other error is returned,
/// but both steps are always attempted; the caller releases the handle by
/// dropping it afterwards. Calling this twice is harmless.
pub async fn close_writer<W: AsyncWrite + Unpin + ?Sized>(writer: &mut W) -> Result<()> {
    let flushed = writer.flush().await;
    let shutdown = writer.shutdown().await;

    let mut first_error = None;
    for result in [flushed, shutdown] {
        match result {
            Ok(()) => {}
            Err(err) if is_disconnect(&err) => {
                debug!(error = %err, "peer already disconnected while closing");
            }
            Err(err) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }

    match first_error {
        Some(err) => Err(TransportError::Io(err)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ShutdownFails {
        kind: ErrorKind,
        flushed: bool,
    }

    impl AsyncWrite for ShutdownFails {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            self.get_mut().flushed = true;
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Err(std::io::Error::from(self.kind)))
        }
    }

    #[tokio::test]
    async fn close_swallows_not_connected() {
        let mut writer = ShutdownFails {
            kind: ErrorKind::NotConnected,
            flushed: false,
        };
        close_writer(&mut writer).await.unwrap();
        assert!(writer.flushed);
    }

    #[tokio::test]
    async fn close_reports_other_errors_after_flushing() {
        let mut writer = ShutdownFails {
            kind: ErrorKind::PermissionDenied,
            flushed: false,
        };
        let err = close_writer(&mut writer).await.unwrap_err();
        assert!(matches!(err, TransportError::Io(e) if e.kind() == ErrorKind::PermissionDenied));
        assert!(writer.flushed, "flush must run even when shutdown fails");
    }

    #[tokio::test]
    async fn close_is_idempotent_on_duplex() {
        let (mut left, _right) = tokio::io::duplex(64);
        close_writer(&mut left).await.unwrap();
        close_writer(&mut left).await.unwrap();
    }

    #[test]
    fn disconnect_kinds() {
        assert!(is_disconnect(&std::io::Error::from(ErrorKind::BrokenPipe)));
        assert!(is_disconnect(&std::io::Error::from(ErrorKind::UnexpectedEof)));
        assert!(!is_disconnect(&std::io::Error::from(ErrorKind::TimedOut)));
    }
}
