use labnode_frame::Value;
use labnode_session::{ApiVersion, SessionError};

use crate::function::FunctionId;

/// Errors raised by device drivers.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The request never got a usable answer.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// No driver is registered for the reported device type.
    #[error("no driver available for device type {0}")]
    UnsupportedDevice(u32),

    /// The firmware is too old for this function. Raised before anything
    /// is sent.
    #[error("{function} requires api version {required} or newer, device reports {actual}")]
    FunctionNotSupported {
        function: FunctionId,
        required: ApiVersion,
        actual: ApiVersion,
    },

    /// Disable the controller to set the output, enable it to set the input.
    #[error("controller is in the wrong mode for {0}")]
    InvalidMode(FunctionId),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("invalid parameter type for {0}")]
    InvalidParameterType(FunctionId),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("controller not initialized, set kp, ki, kd and the setpoint first")]
    NotInitialized,

    #[error("{0} is not implemented by the firmware")]
    NotImplemented(FunctionId),

    /// The device could not parse the request and discarded it.
    #[error("device rejected the request format")]
    InvalidFormat,

    #[error("invalid reply: {0}")]
    InvalidReply(String),

    #[error("unexpected value for {function}: {value}")]
    UnexpectedValue { function: FunctionId, value: Value },
}

impl DeviceError {
    /// True for errors reported by the device itself, as opposed to link or
    /// local failures.
    pub fn is_device_status(&self) -> bool {
        matches!(
            self,
            DeviceError::InvalidMode(_)
                | DeviceError::InvalidCommand(_)
                | DeviceError::InvalidParameterType(_)
                | DeviceError::InvalidParameter(_)
                | DeviceError::NotInitialized
                | DeviceError::NotImplemented(_)
                | DeviceError::InvalidFormat
        )
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;
