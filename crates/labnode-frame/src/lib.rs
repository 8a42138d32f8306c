//! COBS framing and CBOR field-map payloads for the Labnode protocol.
//!
//! Every message on the wire is one frame:
//! - a CBOR map keyed by small signed integers (the payload)
//! - byte-stuffed with COBS so it contains no `0x00`
//! - followed by a single `0x00` terminator
//!
//! [`FrameReader`] and [`FrameWriter`] do this over any async byte stream.
//! A corrupted frame costs exactly that frame; the reader resynchronizes at
//! the next terminator.

pub mod codec;
pub mod error;
pub mod payload;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, FrameCodec, FrameConfig, DEFAULT_MAX_FRAME_SIZE, TERMINATOR,
};
pub use error::{FrameError, Result};
pub use payload::{decode_payload, encode_payload, Fields, Value};
pub use reader::FrameReader;
pub use writer::FrameWriter;
