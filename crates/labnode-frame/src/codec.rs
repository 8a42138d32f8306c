use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace};

use crate::error::{FrameError, Result};
use crate::payload::{encode_payload, Fields};

/// Byte that ends every frame. COBS guarantees it never occurs inside one.
pub const TERMINATOR: u8 = 0x00;

/// Default maximum stuffed frame size: 4 KiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4 * 1024;

/// Byte-stuff `payload` and append it plus the terminator to `dst`.
///
/// Wire format:
/// ```text
/// ┌──────────────────────────────┬──────┐
/// │ COBS(payload), no 0x00 bytes │ 0x00 │
/// └──────────────────────────────┴──────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) {
    let stuffed = cobs::encode_vec(payload);
    dst.reserve(stuffed.len() + 1);
    dst.put_slice(&stuffed);
    dst.put_u8(TERMINATOR);
}

/// Reverse the byte stuffing of one frame. The terminator must already be
/// stripped.
pub fn decode_frame(stuffed: &[u8]) -> Result<Vec<u8>> {
    cobs::decode_vec(stuffed).map_err(|_| FrameError::Cobs { len: stuffed.len() })
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum stuffed frame size in bytes, terminator excluded. Default: 4 KiB.
    pub max_frame_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Splits a byte stream at terminators and unstuffs each frame.
///
/// Errors returned by [`Decoder::decode`] concern one frame only; the codec
/// has already skipped past it and the next call continues with the
/// following frame. Empty frames (two terminators in a row) are skipped.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
    // Index into the buffer where the terminator search resumes.
    next_index: usize,
    // Set while skipping the tail of an oversized frame.
    discarded: Option<usize>,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::with_config(&FrameConfig::default())
    }

    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            max_frame_size: config.max_frame_size,
            next_index: 0,
            discarded: None,
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        loop {
            let start = self.next_index.min(src.len());
            let Some(offset) = src[start..].iter().position(|byte| *byte == TERMINATOR) else {
                if let Some(discarded) = self.discarded.as_mut() {
                    *discarded += src.len();
                    src.clear();
                    self.next_index = 0;
                } else if src.len() > self.max_frame_size {
                    self.discarded = Some(src.len());
                    src.clear();
                    self.next_index = 0;
                } else {
                    self.next_index = src.len();
                }
                return Ok(None);
            };

            let end = start + offset;
            self.next_index = 0;

            if let Some(discarded) = self.discarded.take() {
                src.advance(end + 1);
                return Err(FrameError::FrameTooLarge {
                    size: discarded + end,
                    max: self.max_frame_size,
                });
            }

            let frame = src.split_to(end + 1);
            let stuffed = &frame[..end];
            if stuffed.is_empty() {
                trace!("skipping empty frame");
                continue;
            }
            if stuffed.len() > self.max_frame_size {
                return Err(FrameError::FrameTooLarge {
                    size: stuffed.len(),
                    max: self.max_frame_size,
                });
            }
            return decode_frame(stuffed).map(|payload| Some(Bytes::from(payload)));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if !src.is_empty() || self.discarded.is_some() {
            debug!(
                buffered = src.len(),
                "stream ended inside a frame, dropping partial bytes"
            );
            src.clear();
            self.discarded = None;
            self.next_index = 0;
        }
        Ok(None)
    }
}

impl Encoder<&[u8]> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
        let start = dst.len();
        encode_frame(payload, dst);
        let size = dst.len() - start - 1;
        if size > self.max_frame_size {
            dst.truncate(start);
            return Err(FrameError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        Ok(())
    }
}

impl Encoder<&Fields> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, fields: &Fields, dst: &mut BytesMut) -> Result<()> {
        let payload = encode_payload(fields)?;
        Encoder::<&[u8]>::encode(self, payload.as_slice(), dst)
    }
}
