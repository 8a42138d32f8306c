use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Encoder;
use tracing::{debug, trace};

use crate::codec::{FrameCodec, FrameConfig, TERMINATOR};
use crate::error::Result;
use crate::payload::Fields;

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Writes complete frames to any `AsyncWrite` stream.
pub struct FrameWriter<W> {
    inner: W,
    buf: BytesMut,
    codec: FrameCodec,
    // A previous write was abandoned part way through.
    torn: bool,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: W) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: W, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            codec: FrameCodec::with_config(&config),
            torn: false,
        }
    }

    /// Encode a field map, write it as one frame and flush.
    pub async fn write_frame(&mut self, fields: &Fields) -> Result<()> {
        self.buf.clear();
        self.codec.encode(fields, &mut self.buf)?;
        self.flush_buffer().await
    }

    /// Write an already encoded payload as one frame and flush.
    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.buf.clear();
        self.codec.encode(payload, &mut self.buf)?;
        self.flush_buffer().await
    }

    async fn flush_buffer(&mut self) -> Result<()> {
        if self.torn {
            // Terminate the partial frame so the peer drops it instead of
            // merging it with this one.
            debug!("delimiting previously interrupted frame");
            let mut delimited = BytesMut::with_capacity(self.buf.len() + 1);
            delimited.put_u8(TERMINATOR);
            delimited.extend_from_slice(&self.buf);
            self.buf = delimited;
        }

        self.torn = true;
        self.inner.write_all(&self.buf).await?;
        self.torn = false;
        trace!(bytes = self.buf.len(), "frame written");
        self.inner.flush().await?;
        Ok(())
    }

    /// Flush pending bytes and shut the stream down.
    ///
    /// Disconnect errors are ignored. Calling this twice is harmless.
    pub async fn close(&mut self) -> Result<()> {
        labnode_transport::close_writer(&mut self.inner).await?;
        Ok(())
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use super::*;
    use crate::error::FrameError;
    use crate::payload::Value;
    use crate::reader::FrameReader;

    fn getter(id: i64, function: i32) -> Fields {
        let mut fields = Fields::new();
        fields.insert(-1, Value::Integer(id));
        fields.insert(function, Value::Null);
        fields
    }

    #[tokio::test]
    async fn writes_exact_frame_bytes() {
        let mut writer = FrameWriter::new(Vec::new());
        let mut fields = Fields::new();
        fields.insert(-1, Value::Integer(5));
        writer.write_frame(&fields).await.unwrap();
        assert_eq!(writer.get_ref().as_slice(), &[0x04, 0xa1, 0x20, 0x05, 0x00]);
    }

    #[tokio::test]
    async fn roundtrip_over_duplex() {
        let (left, right) = tokio::io::duplex(256);
        let mut writer = FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        for id in 0..24 {
            writer.write_frame(&getter(id, -17)).await.unwrap();
        }
        for id in 0..24 {
            assert_eq!(reader.read_frame().await.unwrap(), getter(id, -17));
        }
    }

    #[tokio::test]
    async fn rejects_oversized_frame_without_writing() {
        let mut writer =
            FrameWriter::with_config(Vec::new(), FrameConfig { max_frame_size: 8 });
        let err = writer.send(&[0xaa; 32]).await.unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { .. }));
        assert!(writer.get_ref().is_empty());
    }

    #[tokio::test]
    async fn close_shuts_down_and_is_idempotent() {
        let (left, right) = tokio::io::duplex(64);
        let mut writer = FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        writer.write_frame(&getter(1, -2)).await.unwrap();
        writer.close().await.unwrap();
        writer.close().await.unwrap();

        assert_eq!(reader.read_frame().await.unwrap(), getter(1, -2));
        assert!(matches!(
            reader.read_frame().await,
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn interrupted_write_is_delimited_on_next_frame() {
        let mut writer = FrameWriter::new(StallAfter {
            written: Vec::new(),
            budget: 2,
        });
        let first = getter(1, -9);
        let stalled = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            writer.write_frame(&first),
        )
        .await;
        assert!(stalled.is_err());

        writer.inner.budget = usize::MAX;
        writer.write_frame(&getter(2, -10)).await.unwrap();

        let mut reader = FrameReader::new(writer.get_ref().written.as_slice());
        // The torn prefix decodes as garbage, then the real frame follows.
        assert!(reader.read_frame().await.is_err());
        assert_eq!(reader.read_frame().await.unwrap(), getter(2, -10));
    }

    /// Accepts `budget` bytes, then stays pending forever.
    struct StallAfter {
        written: Vec<u8>,
        budget: usize,
    }

    impl AsyncWrite for StallAfter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            let this = self.get_mut();
            if this.budget == 0 {
                return Poll::Pending;
            }
            let n = buf.len().min(this.budget);
            this.written.extend_from_slice(&buf[..n]);
            this.budget -= n;
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }
}
