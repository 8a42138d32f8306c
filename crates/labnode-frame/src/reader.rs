use std::io::ErrorKind;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::Decoder;

use crate::codec::{FrameCodec, FrameConfig};
use crate::error::{FrameError, Result};
use crate::payload::{decode_payload, Fields};

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Reads complete frames from any `AsyncRead` stream.
///
/// Handles partial reads internally; callers always get complete frames.
/// Both read methods are cancel safe: bytes already received stay buffered
/// when the returned future is dropped.
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    codec: FrameCodec,
    eof: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: R, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            codec: FrameCodec::with_config(&config),
            eof: false,
        }
    }

    /// Read and decode the next frame into a field map.
    ///
    /// A malformed frame yields [`FrameError::Cobs`], [`FrameError::Payload`]
    /// or [`FrameError::FrameTooLarge`]; the reader stays usable and the next
    /// call returns the following frame. Returns
    /// [`FrameError::ConnectionClosed`] once the peer has closed the stream.
    pub async fn read_frame(&mut self) -> Result<Fields> {
        let payload = self.read_raw_frame().await?;
        decode_payload(&payload)
    }

    /// Read the next frame without decoding its CBOR payload.
    pub async fn read_raw_frame(&mut self) -> Result<Bytes> {
        loop {
            if self.eof {
                if let Some(frame) = self.codec.decode_eof(&mut self.buf)? {
                    return Ok(frame);
                }
                return Err(FrameError::ConnectionClosed);
            }

            if let Some(frame) = self.codec.decode(&mut self.buf)? {
                return Ok(frame);
            }

            self.buf.reserve(INITIAL_BUFFER_CAPACITY);
            match self.inner.read_buf(&mut self.buf).await {
                Ok(0) => self.eof = true,
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use tokio::io::{AsyncWriteExt, ReadBuf};

    use super::*;
    use crate::codec::{encode_frame, TERMINATOR};
    use crate::payload::{encode_payload, Value};

    fn frame_bytes(fields: &Fields) -> Vec<u8> {
        let mut wire = BytesMut::new();
        encode_frame(&encode_payload(fields).unwrap(), &mut wire);
        wire.to_vec()
    }

    fn reply(id: i64, key: i32, value: Value) -> Fields {
        let mut fields = Fields::new();
        fields.insert(-1, Value::Integer(id));
        fields.insert(key, value);
        fields
    }

    #[tokio::test]
    async fn read_single_frame() {
        let expected = reply(3, -17, Value::Float(21.5));
        let wire = frame_bytes(&expected);
        let mut reader = FrameReader::new(&wire[..]);
        assert_eq!(reader.read_frame().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn read_multiple_frames() {
        let first = reply(0, -9, Value::Integer(1));
        let second = reply(1, -10, Value::Integer(2));
        let mut wire = frame_bytes(&first);
        wire.extend(frame_bytes(&second));

        let mut reader = FrameReader::new(&wire[..]);
        assert_eq!(reader.read_frame().await.unwrap(), first);
        assert_eq!(reader.read_frame().await.unwrap(), second);
        assert!(matches!(
            reader.read_frame().await,
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn partial_read_handling() {
        let expected = reply(7, -4, Value::Array(vec![Value::Integer(0), Value::Integer(12)]));
        let reader = ByteByByteReader {
            bytes: frame_bytes(&expected),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        assert_eq!(framed.read_frame().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(&[][..]);
        assert!(matches!(
            reader.read_frame().await,
            Err(FrameError::ConnectionClosed)
        ));
        // Stays closed.
        assert!(matches!(
            reader.read_frame().await,
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn connection_closed_mid_frame() {
        let mut wire = frame_bytes(&reply(1, -2, Value::Integer(0)));
        wire.pop();
        let mut reader = FrameReader::new(&wire[..]);
        assert!(matches!(
            reader.read_frame().await,
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn corrupt_frame_then_valid_frame() {
        let expected = reply(2, -18, Value::Integer(100));
        let mut wire = vec![0x05, 0x11, TERMINATOR];
        // Valid COBS but not CBOR: 0xff is a stray "break" byte.
        wire.extend([0x02, 0xff, TERMINATOR]);
        wire.extend(frame_bytes(&expected));

        let mut reader = FrameReader::new(&wire[..]);
        assert!(matches!(
            reader.read_frame().await,
            Err(FrameError::Cobs { .. })
        ));
        assert!(matches!(
            reader.read_frame().await,
            Err(FrameError::Payload(_))
        ));
        assert_eq!(reader.read_frame().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn oversized_frame_in_stream() {
        let cfg = FrameConfig { max_frame_size: 16 };
        let mut wire = vec![0x01; 64];
        wire.push(TERMINATOR);
        let expected = reply(0, -2, Value::Integer(0));
        wire.extend(frame_bytes(&expected));

        let mut reader = FrameReader::with_config(ByteByByteReader { bytes: wire, pos: 0 }, cfg);
        assert!(matches!(
            reader.read_frame().await,
            Err(FrameError::FrameTooLarge { size: 64, max: 16 })
        ));
        assert_eq!(reader.read_frame().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn interrupted_read_retries() {
        let expected = reply(8, -14, Value::Bool(true));
        let reader = InterruptedThenData {
            interrupted: false,
            bytes: frame_bytes(&expected),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        assert_eq!(framed.read_frame().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn reset_is_reported_as_end_of_stream() {
        let mut reader = FrameReader::new(FailingReader(ErrorKind::ConnectionReset));
        let err = reader.read_frame().await.unwrap_err();
        assert!(err.is_end_of_stream());
    }

    #[tokio::test]
    async fn cancelled_read_keeps_buffered_bytes() {
        let expected = reply(4, -6, Value::from("LN-0042"));
        let wire = frame_bytes(&expected);
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(rx);

        tx.write_all(&wire[..3]).await.unwrap();
        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            reader.read_frame(),
        )
        .await;
        assert!(pending.is_err(), "frame is incomplete");

        tx.write_all(&wire[3..]).await.unwrap();
        assert_eq!(reader.read_frame().await.unwrap(), expected);
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl AsyncRead for ByteByByteReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            let this = self.get_mut();
            if this.pos < this.bytes.len() && buf.remaining() > 0 {
                buf.put_slice(&this.bytes[this.pos..this.pos + 1]);
                this.pos += 1;
            }
            Poll::Ready(Ok(()))
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl AsyncRead for InterruptedThenData {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            let this = self.get_mut();
            if !this.interrupted {
                this.interrupted = true;
                return Poll::Ready(Err(ErrorKind::Interrupted.into()));
            }
            let n = (this.bytes.len() - this.pos).min(buf.remaining());
            buf.put_slice(&this.bytes[this.pos..this.pos + n]);
            this.pos += n;
            Poll::Ready(Ok(()))
        }
    }

    struct FailingReader(ErrorKind);

    impl AsyncRead for FailingReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Err(self.0.into()))
        }
    }
}
