//! Drivers for Labnode devices.
//!
//! A driver turns typed calls such as [`PidController::set_kp`] into field
//! maps, sends them over a [`labnode_session::Session`] and interprets the
//! reply: status codes become [`DeviceError`] variants, raw sensor values
//! are converted to physical units and older firmware is translated by
//! [`compat`].
//!
//! The usual entry point is [`open`] (or [`with_device`]), which connects,
//! asks the device for its type and API version and picks the driver from a
//! [`DeviceRegistry`].

pub mod compat;
pub mod connector;
pub mod convert;
pub mod device;
pub mod error;
pub mod function;
pub mod pid;
pub mod registry;

pub use compat::{min_api_version, Compat, CURRENT_API};
pub use connector::{open, open_with, with_device, DeviceHandle};
pub use device::Device;
pub use error::{DeviceError, Result};
pub use function::{ErrorCode, FunctionId, Reply};
pub use pid::{FeedbackDirection, PidController};
pub use registry::{DeviceConstructor, DeviceRegistry};

pub use labnode_frame::{Fields, Value};
pub use labnode_session::{ApiVersion, DeviceIdentity, Session, SessionConfig, Version};
pub use labnode_transport::Endpoint;
