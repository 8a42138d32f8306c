//! Request/response sessions with Labnode devices.
//!
//! A [`Session`] owns one link at a time. Requests carry a small request
//! identifier taken from a fixed pool; a single background read loop matches
//! responses back to the waiting caller. Connection loss, timeouts and
//! cancelled callers never leave a request identifier or a waiter behind.
//!
//! ```no_run
//! # async fn demo() -> labnode_session::Result<()> {
//! use labnode_session::{identify, Session, SessionConfig};
//!
//! let endpoint = "tcp://192.168.1.50:4223".parse()?;
//! let session = Session::new(endpoint, SessionConfig::default());
//! session.connect().await?;
//! let identity = identify(&session).await?;
//! println!("device type {} api {}", identity.device_type, identity.api_version);
//! session.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
mod dispatch;
pub mod error;
pub mod handshake;
pub mod pool;
pub mod protocol;
pub mod session;

pub use config::{SessionConfig, DEFAULT_READ_ERROR_BACKOFF, DEFAULT_TIMEOUT};
pub use error::{Result, SessionError};
pub use handshake::{identify, ApiVersion, DeviceIdentity, Version};
pub use pool::{RequestId, RequestIdPool};
pub use protocol::{API_VERSION, DEVICE_TYPE, REQUEST_ID, REQUEST_ID_POOL_SIZE};
pub use session::{ConnectionState, Session};
