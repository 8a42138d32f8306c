//! Byte-stream links to Labnode devices.
//!
//! Provides a unified interface over the two links a Labnode speaks:
//! - TCP sockets (Ethernet-attached controllers, default port 4223)
//! - Serial lines (USB CDC / UART, behind the `serial` feature)
//!
//! This is the lowest layer of labnode. Everything else builds on top of
//! the [`LinkStream`] type provided here.

pub mod endpoint;
pub mod error;
pub mod stream;
pub mod tcp;

#[cfg(feature = "serial")]
pub mod serial;

pub use endpoint::Endpoint;
pub use error::{Result, TransportError};
pub use stream::{close_writer, is_disconnect, ByteStream, LinkStream};
pub use tcp::{TcpEndpoint, DEFAULT_PORT};

#[cfg(feature = "serial")]
pub use serial::{FlowControl, Parity, SerialEndpoint, StopBits, TtyOptions};
