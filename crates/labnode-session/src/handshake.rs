use std::fmt;
use std::str::FromStr;

use labnode_frame::{Fields, Value};
use tracing::info;

use crate::error::{Result, SessionError};
use crate::protocol::{API_VERSION, DEVICE_TYPE};
use crate::session::Session;

/// A `major.minor.patch` version reported by the firmware, ordered
/// lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl Version {
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse the `[major, minor, patch]` array a device reports.
    pub fn from_value(value: &Value) -> Result<Self> {
        let parts = value
            .as_array()
            .ok_or_else(|| invalid(format!("version must be an array, got {}", value.kind())))?;
        let [major, minor, patch] = parts else {
            return Err(invalid(format!(
                "version must have 3 components, got {}",
                parts.len()
            )));
        };
        let component = |part: &Value| {
            part.as_u64()
                .and_then(|part| u16::try_from(part).ok())
                .ok_or_else(|| invalid(format!("invalid version component: {part}")))
        };
        Ok(Self::new(
            component(major)?,
            component(minor)?,
            component(patch)?,
        ))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split('.');
        let mut next = || -> Result<u16> {
            parts
                .next()
                .and_then(|part| part.parse().ok())
                .ok_or_else(|| invalid(format!("invalid version '{s}'")))
        };
        let version = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(invalid(format!("invalid version '{s}'")));
        }
        Ok(version)
    }
}

/// Version of the wire API spoken by the firmware.
pub type ApiVersion = Version;

/// What a device reports about itself when a session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Numeric device type, used to pick a driver.
    pub device_type: u32,
    pub api_version: ApiVersion,
}

/// Ask the device for its type and API version in a single request.
pub async fn identify(session: &Session) -> Result<DeviceIdentity> {
    let mut request = Fields::new();
    request.insert(DEVICE_TYPE, Value::Null);
    request.insert(API_VERSION, Value::Null);

    let reply = session.request(request).await?;
    let identity = parse_identity(&reply)?;
    info!(
        device_type = identity.device_type,
        api_version = %identity.api_version,
        "device identified"
    );
    Ok(identity)
}

fn parse_identity(reply: &Fields) -> Result<DeviceIdentity> {
    let device_type = reply
        .get(&DEVICE_TYPE)
        .ok_or_else(|| invalid("reply lacks the device type".to_string()))?;
    let device_type = device_type
        .as_u64()
        .and_then(|raw| u32::try_from(raw).ok())
        .ok_or_else(|| invalid(format!("invalid device type: {device_type}")))?;

    let api_version = reply
        .get(&API_VERSION)
        .ok_or_else(|| invalid("reply lacks the api version".to_string()))?;

    Ok(DeviceIdentity {
        device_type,
        api_version: ApiVersion::from_value(api_version)?,
    })
}

fn invalid(message: String) -> SessionError {
    SessionError::InvalidReply(message)
}
