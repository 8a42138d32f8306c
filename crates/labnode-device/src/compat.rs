//! Translation between the current API and firmware older than 0.11.0.
//!
//! Older firmware numbers the board temperature and humidity getters
//! differently and uses a different status code table. Requests are
//! rewritten just before they are sent and replies just after they arrive,
//! so the rest of the driver only ever sees current identifiers.

use labnode_frame::{Fields, Value};
use labnode_session::ApiVersion;

use crate::error::{DeviceError, Result};
use crate::function::{ErrorCode, FunctionId};

/// First API version using the current numbering.
pub const CURRENT_API: ApiVersion = ApiVersion::new(0, 11, 0);

// (current, legacy) key pairs.
const LEGACY_KEYS: &[(FunctionId, i32)] = &[
    (FunctionId::GetBoardTemperature, -20),
    (FunctionId::GetHumidity, -21),
];

/// Lowest API version that implements `function`, if it is newer than the
/// oldest supported firmware.
pub fn min_api_version(function: FunctionId) -> Option<ApiVersion> {
    use FunctionId::*;
    match function {
        SetSecondaryKp | GetSecondaryKp | SetSecondaryKi | GetSecondaryKi | SetSecondaryKd
        | GetSecondaryKd | SetSecondarySetpoint | GetSecondarySetpoint | SetSecondaryConfig
        | GetSecondaryConfig | SetFallbackUpdateInterval | GetFallbackUpdateInterval
        | SetUuid | GetUuid | GetActiveConnectionCount => Some(CURRENT_API),
        _ => None,
    }
}

/// Request and response rewriting for one firmware version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compat {
    api_version: ApiVersion,
}

impl Compat {
    pub fn for_version(api_version: ApiVersion) -> Self {
        Self { api_version }
    }

    pub fn api_version(&self) -> ApiVersion {
        self.api_version
    }

    /// True when talking to firmware older than [`CURRENT_API`].
    pub fn is_legacy(&self) -> bool {
        self.api_version < CURRENT_API
    }

    /// Fail with [`DeviceError::FunctionNotSupported`] if the firmware is
    /// too old for `function`.
    pub fn check_supported(&self, function: FunctionId) -> Result<()> {
        match min_api_version(function) {
            Some(required) if self.api_version < required => {
                Err(DeviceError::FunctionNotSupported {
                    function,
                    required,
                    actual: self.api_version,
                })
            }
            _ => Ok(()),
        }
    }

    /// Rewrite outgoing keys to the firmware's numbering.
    pub fn translate_request(&self, request: Fields) -> Fields {
        if !self.is_legacy() {
            return request;
        }
        request
            .into_iter()
            .map(|(key, value)| (to_legacy_key(key), value))
            .collect()
    }

    /// Rewrite incoming keys to the current numbering.
    pub fn translate_response(&self, response: Fields) -> Fields {
        if !self.is_legacy() {
            return response;
        }
        response
            .into_iter()
            .map(|(key, value)| (from_legacy_key(key), value))
            .collect()
    }

    /// Interpret the status value a setter returned.
    ///
    /// Returns `None` if the value is not a status code this firmware
    /// version can send.
    pub fn decode_status(&self, value: &Value) -> Option<ErrorCode> {
        let code = value.as_u64().and_then(|code| u8::try_from(code).ok())?;
        if !self.is_legacy() {
            return ErrorCode::from_code(code);
        }
        let status = match code {
            249 => ErrorCode::Ack,
            250 => ErrorCode::InvalidParameter,
            251 => ErrorCode::InvalidParameterType,
            252 => ErrorCode::InvalidCommand,
            253 => ErrorCode::NotInitialized,
            254 => ErrorCode::NotImplemented,
            255 => ErrorCode::Deprecated,
            _ => return None,
        };
        Some(status)
    }
}

fn to_legacy_key(key: i32) -> i32 {
    LEGACY_KEYS
        .iter()
        .find(|(current, _)| current.raw() == key)
        .map_or(key, |(_, legacy)| *legacy)
}

fn from_legacy_key(key: i32) -> i32 {
    LEGACY_KEYS
        .iter()
        .find(|(_, legacy)| *legacy == key)
        .map_or(key, |(current, _)| current.raw())
}
