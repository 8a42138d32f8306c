//! Field keys every Labnode understands regardless of device type.

/// Key carrying the request identifier in requests and responses.
pub const REQUEST_ID: i32 = -1;

/// Getter for the device type, used to pick a driver.
pub const DEVICE_TYPE: i32 = -2;

/// Getter for the `[major, minor, patch]` API version of the firmware.
pub const API_VERSION: i32 = -3;

/// Number of request identifiers. Ids `0..24` encode as a single CBOR byte.
pub const REQUEST_ID_POOL_SIZE: usize = 24;
