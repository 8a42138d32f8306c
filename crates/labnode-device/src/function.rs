//! Function identifiers and status codes of the Labnode API.
//!
//! Getters have negative identifiers, setters and actions non-negative
//! ones. The numbering is the one spoken by firmware with API 0.11.0 and
//! newer; older firmware is handled by [`crate::compat`].

use std::fmt;
use std::str::FromStr;

use labnode_frame::Value;

use crate::error::DeviceError;

macro_rules! function_ids {
    ($($variant:ident = $raw:literal => $name:literal,)+) => {
        /// A device function, used as a key in request and response maps.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(i32)]
        pub enum FunctionId {
            $($variant = $raw,)+
        }

        impl FunctionId {
            /// Every known function, in declaration order.
            pub const ALL: &'static [FunctionId] = &[$(FunctionId::$variant,)+];

            pub fn from_raw(raw: i32) -> Option<Self> {
                match raw {
                    $($raw => Some(FunctionId::$variant),)+
                    _ => None,
                }
            }

            /// Lowercase name, as accepted by [`FromStr`].
            pub fn name(self) -> &'static str {
                match self {
                    $(FunctionId::$variant => $name,)+
                }
            }
        }
    };
}

function_ids! {
    SetInput = 0 => "set_input",
    SetKp = 1 => "set_kp",
    SetKi = 2 => "set_ki",
    SetKd = 3 => "set_kd",
    SetLowerOutputLimit = 4 => "set_lower_output_limit",
    SetUpperOutputLimit = 5 => "set_upper_output_limit",
    SetEnabled = 6 => "set_enabled",
    SetTimeout = 7 => "set_timeout",
    SetDirection = 8 => "set_direction",
    SetSetpoint = 9 => "set_setpoint",
    SetOutput = 10 => "set_output",
    SetGain = 11 => "set_gain",
    SetCalibrationOffset = 12 => "set_calibration_offset",
    SetAutoResume = 13 => "set_auto_resume",
    SetFallbackUpdateInterval = 14 => "set_fallback_update_interval",
    SetSecondaryKp = 15 => "set_secondary_kp",
    SetSecondaryKi = 16 => "set_secondary_ki",
    SetSecondaryKd = 17 => "set_secondary_kd",
    SetSecondarySetpoint = 18 => "set_secondary_setpoint",
    SetSecondaryConfig = 19 => "set_secondary_config",
    ResetSettings = 20 => "reset_settings",
    Reset = 21 => "reset",
    SetSerialNumber = 22 => "set_serial_number",
    SetMacAddress = 23 => "set_mac_address",
    SetUuid = 24 => "set_uuid",
    RequestId = -1 => "request_id",
    GetDeviceType = -2 => "get_device_type",
    GetApiVersion = -3 => "get_api_version",
    GetSoftwareVersion = -4 => "get_software_version",
    GetHardwareVersion = -5 => "get_hardware_version",
    GetSerialNumber = -6 => "get_serial_number",
    GetUuid = -7 => "get_uuid",
    GetMacAddress = -8 => "get_mac_address",
    GetKp = -9 => "get_kp",
    GetKi = -10 => "get_ki",
    GetKd = -11 => "get_kd",
    GetLowerOutputLimit = -12 => "get_lower_output_limit",
    GetUpperOutputLimit = -13 => "get_upper_output_limit",
    GetEnabled = -14 => "get_enabled",
    GetTimeout = -15 => "get_timeout",
    GetDirection = -16 => "get_direction",
    GetSetpoint = -17 => "get_setpoint",
    GetOutput = -18 => "get_output",
    GetGain = -19 => "get_gain",
    GetBoardTemperature = -22 => "get_board_temperature",
    GetHumidity = -23 => "get_humidity",
    GetCalibrationOffset = -24 => "get_calibration_offset",
    GetAutoResume = -25 => "get_auto_resume",
    GetFallbackUpdateInterval = -26 => "get_fallback_update_interval",
    GetSecondaryKp = -27 => "get_secondary_kp",
    GetSecondaryKi = -28 => "get_secondary_ki",
    GetSecondaryKd = -29 => "get_secondary_kd",
    GetSecondarySetpoint = -30 => "get_secondary_setpoint",
    GetSecondaryConfig = -31 => "get_secondary_config",
    GetActiveConnectionCount = -32 => "get_active_connection_count",
    InvalidFormat = -33 => "invalid_format",
}

impl FunctionId {
    pub fn raw(self) -> i32 {
        self as i32
    }

    pub fn is_getter(self) -> bool {
        self.raw() < 0
    }

    pub fn is_setter(self) -> bool {
        self.raw() >= 0
    }

    /// Functions that exist on the wire but are not queried on their own:
    /// protocol bookkeeping handled by the session layer and the error
    /// marker the device adds to replies it could not parse.
    pub fn is_reserved(self) -> bool {
        matches!(
            self,
            FunctionId::RequestId | FunctionId::InvalidFormat
        )
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FunctionId {
    type Err = DeviceError;

    /// Accepts a name like `get_kp` or `GET-KP`, or the raw identifier.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(raw) = trimmed.parse::<i32>() {
            return Self::from_raw(raw)
                .ok_or_else(|| DeviceError::InvalidCommand(format!("unknown function id {raw}")));
        }
        let normalized = trimmed.to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|function| function.name() == normalized)
            .ok_or_else(|| DeviceError::InvalidCommand(format!("unknown function '{trimmed}'")))
    }
}

/// Status code a device returns for setters and actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    Ack = 0,
    InvalidMode = 249,
    InvalidCommand = 250,
    InvalidParameterType = 251,
    InvalidParameter = 252,
    NotInitialized = 253,
    NotImplemented = 254,
    Deprecated = 255,
}

impl ErrorCode {
    pub fn from_code(code: u8) -> Option<Self> {
        let status = match code {
            0 => ErrorCode::Ack,
            249 => ErrorCode::InvalidMode,
            250 => ErrorCode::InvalidCommand,
            251 => ErrorCode::InvalidParameterType,
            252 => ErrorCode::InvalidParameter,
            253 => ErrorCode::NotInitialized,
            254 => ErrorCode::NotImplemented,
            255 => ErrorCode::Deprecated,
            _ => return None,
        };
        Some(status)
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Statuses that still count as success.
    pub fn is_success(self) -> bool {
        matches!(self, ErrorCode::Ack | ErrorCode::Deprecated)
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::Ack => "ack",
            ErrorCode::InvalidMode => "invalid_mode",
            ErrorCode::InvalidCommand => "invalid_command",
            ErrorCode::InvalidParameterType => "invalid_parameter_type",
            ErrorCode::InvalidParameter => "invalid_parameter",
            ErrorCode::NotInitialized => "not_initialized",
            ErrorCode::NotImplemented => "not_implemented",
            ErrorCode::Deprecated => "deprecated",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of a single function call.
///
/// Getters yield a value, setters and actions a status.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Value(Value),
    Status(ErrorCode),
}

impl Reply {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Reply::Value(value) => Some(value),
            Reply::Status(_) => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Reply::Value(value) => Some(value),
            Reply::Status(_) => None,
        }
    }

    pub fn status(&self) -> Option<ErrorCode> {
        match self {
            Reply::Status(status) => Some(*status),
            Reply::Value(_) => None,
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Value(value) => write!(f, "{value}"),
            Reply::Status(status) => write!(f, "{status}"),
        }
    }
}
