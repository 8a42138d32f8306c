//! Async client for Labnode PID controllers.
//!
//! Labnodes speak COBS-framed CBOR maps over TCP or a serial line. This
//! crate re-exports the layers that make up the client:
//!
//! - [`transport`]: TCP and serial links
//! - [`frame`]: COBS framing and CBOR field maps
//! - [`session`]: request/response correlation over one link
//! - [`device`]: drivers, the device registry and scoped acquisition
//!
//! ```no_run
//! # async fn demo() -> labnode::device::Result<()> {
//! use labnode::device::{open, SessionConfig};
//!
//! let endpoint = "tcp://192.168.1.50:4223"
//!     .parse::<labnode::transport::Endpoint>()
//!     .map_err(labnode::session::SessionError::from)?;
//! let handle = open(endpoint, SessionConfig::default()).await?;
//! if let Some(pid) = handle.pid() {
//!     println!("board temperature: {:.2} K", pid.board_temperature().await?);
//! }
//! handle.close().await;
//! # Ok(())
//! # }
//! ```

/// Re-export transport types.
pub mod transport {
    pub use labnode_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use labnode_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use labnode_session::*;
}

/// Re-export device drivers.
pub mod device {
    pub use labnode_device::*;
}
