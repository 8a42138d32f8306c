//! Driver for the Labnode PID controller.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use labnode_frame::{Fields, Value};
use labnode_session::{ApiVersion, Session, Version};
use tracing::{debug, warn};

use crate::compat::Compat;
use crate::convert;
use crate::device::Device;
use crate::error::{DeviceError, Result};
use crate::function::{ErrorCode, FunctionId, Reply};

/// Sign of the controller output relative to the error.
///
/// With `Negative` feedback a positive error drives the plant down, e.g.
/// a temperature above the setpoint increases the cooling action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackDirection {
    Negative,
    Positive,
}

impl FeedbackDirection {
    pub fn from_bool(positive: bool) -> Self {
        if positive {
            FeedbackDirection::Positive
        } else {
            FeedbackDirection::Negative
        }
    }

    pub fn is_positive(self) -> bool {
        self == FeedbackDirection::Positive
    }
}

impl fmt::Display for FeedbackDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackDirection::Negative => f.write_str("negative"),
            FeedbackDirection::Positive => f.write_str("positive"),
        }
    }
}

/// A remote PID controller.
///
/// Kp, Ki, Kd, the setpoint and the input are exchanged in Q16.16 fixed
/// point; the typed accessors convert from and to `f64`. Output and output
/// limits are raw DAC codes.
pub struct PidController {
    session: Arc<Session>,
    compat: Compat,
}

impl PidController {
    pub const DEVICE_TYPE: u32 = 0;

    pub fn new(session: Arc<Session>, api_version: ApiVersion) -> Self {
        Self {
            session,
            compat: Compat::for_version(api_version),
        }
    }

    pub(crate) fn boxed(session: Arc<Session>, api_version: ApiVersion) -> Box<dyn Device> {
        Box::new(Self::new(session, api_version))
    }

    pub fn api_version(&self) -> ApiVersion {
        self.compat.api_version()
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Send several functions in one frame and return the reply map.
    ///
    /// Keys are translated for older firmware on the way out and back. The
    /// reply is not checked for errors.
    pub async fn send_multi_request(&self, request: Fields) -> Result<Fields> {
        let request = self.compat.translate_request(request);
        let reply = self.session.request(request).await?;
        let reply = self.compat.translate_response(reply);
        if let Some(unknown) = reply.keys().find(|key| FunctionId::from_raw(**key).is_none()) {
            debug!(key = unknown, "reply contains unknown function id");
        }
        Ok(reply)
    }

    /// Query a getter. Any function with a negative id is accepted. Fixed
    /// point values come back as floats; the board temperature, humidity and
    /// MAC address are converted to kelvin, %rH and bytes.
    pub async fn get_by_function_id(&self, function: FunctionId) -> Result<Value> {
        if !function.is_getter() || function.is_reserved() {
            return Err(DeviceError::InvalidCommand(format!(
                "{function} is not a getter"
            )));
        }
        let value = self.get(function).await?;
        convert::raw_to_unit(function, value)
    }

    /// Call a setter or action with `value` as its argument.
    pub async fn set_by_function_id(&self, function: FunctionId, value: Value) -> Result<Reply> {
        if !function.is_setter() {
            return Err(DeviceError::InvalidCommand(format!(
                "{function} is not a setter"
            )));
        }
        self.call(function, value).await
    }

    async fn call(&self, function: FunctionId, value: Value) -> Result<Reply> {
        self.compat.check_supported(function)?;
        let mut request = Fields::new();
        request.insert(function.raw(), value);
        let mut reply = self.send_multi_request(request).await?;
        self.interpret(&mut reply, function)
    }

    async fn get(&self, function: FunctionId) -> Result<Value> {
        match self.call(function, Value::Null).await? {
            Reply::Value(value) => Ok(value),
            Reply::Status(status) => Err(DeviceError::InvalidReply(format!(
                "{function} answered with status {status}"
            ))),
        }
    }

    async fn set(&self, function: FunctionId, value: impl Into<Value>) -> Result<ErrorCode> {
        match self.call(function, value.into()).await? {
            Reply::Status(status) => Ok(status),
            Reply::Value(value) => Err(DeviceError::UnexpectedValue { function, value }),
        }
    }

    /// Take the answer for `function` out of `reply` and check it.
    fn interpret(&self, reply: &mut Fields, function: FunctionId) -> Result<Reply> {
        // The device drops requests it cannot parse and only reports this.
        if reply.contains_key(&FunctionId::InvalidFormat.raw()) {
            return Err(DeviceError::InvalidFormat);
        }
        let value = reply.remove(&function.raw()).ok_or_else(|| {
            DeviceError::InvalidReply(format!("reply lacks {function}: {reply:?}"))
        })?;
        if function.is_getter() {
            return Ok(Reply::Value(value));
        }

        let status = self
            .compat
            .decode_status(&value)
            .ok_or(DeviceError::UnexpectedValue { function, value })?;
        check_status(function, status).map(Reply::Status)
    }

    pub async fn software_version(&self) -> Result<Version> {
        self.version(FunctionId::GetSoftwareVersion).await
    }

    pub async fn hardware_version(&self) -> Result<Version> {
        self.version(FunctionId::GetHardwareVersion).await
    }

    async fn version(&self, function: FunctionId) -> Result<Version> {
        let value = self.get(function).await?;
        Version::from_value(&value).map_err(|_| DeviceError::UnexpectedValue { function, value })
    }

    pub async fn serial_number(&self) -> Result<u32> {
        self.get_u32(FunctionId::GetSerialNumber).await
    }

    pub async fn set_serial_number(&self, serial: u32) -> Result<ErrorCode> {
        self.set(FunctionId::SetSerialNumber, serial).await
    }

    /// Device UUID. Requires API 0.11.0.
    pub async fn uuid(&self) -> Result<[u8; 16]> {
        let function = FunctionId::GetUuid;
        let value = self.get(function).await?;
        value
            .as_bytes()
            .and_then(|bytes| <[u8; 16]>::try_from(bytes).ok())
            .ok_or(DeviceError::UnexpectedValue { function, value })
    }

    pub async fn set_uuid(&self, uuid: [u8; 16]) -> Result<ErrorCode> {
        self.set(FunctionId::SetUuid, uuid.to_vec()).await
    }

    /// MAC address of the Ethernet port.
    pub async fn mac_address(&self) -> Result<[u8; 6]> {
        let function = FunctionId::GetMacAddress;
        let value = self.get(function).await?;
        convert::mac_address(&value).ok_or(DeviceError::UnexpectedValue { function, value })
    }

    pub async fn set_mac_address(&self, mac: [u8; 6]) -> Result<ErrorCode> {
        self.set(FunctionId::SetMacAddress, mac.to_vec()).await
    }

    pub async fn kp(&self) -> Result<f64> {
        self.get_q16_16(FunctionId::GetKp).await
    }

    pub async fn set_kp(&self, kp: f64) -> Result<ErrorCode> {
        self.set_q16_16(FunctionId::SetKp, kp).await
    }

    pub async fn ki(&self) -> Result<f64> {
        self.get_q16_16(FunctionId::GetKi).await
    }

    pub async fn set_ki(&self, ki: f64) -> Result<ErrorCode> {
        self.set_q16_16(FunctionId::SetKi, ki).await
    }

    pub async fn kd(&self) -> Result<f64> {
        self.get_q16_16(FunctionId::GetKd).await
    }

    pub async fn set_kd(&self, kd: f64) -> Result<ErrorCode> {
        self.set_q16_16(FunctionId::SetKd, kd).await
    }

    // Secondary parameter set, used when running on the secondary input.

    pub async fn secondary_kp(&self) -> Result<f64> {
        self.get_q16_16(FunctionId::GetSecondaryKp).await
    }

    pub async fn set_secondary_kp(&self, kp: f64) -> Result<ErrorCode> {
        self.set_q16_16(FunctionId::SetSecondaryKp, kp).await
    }

    pub async fn secondary_ki(&self) -> Result<f64> {
        self.get_q16_16(FunctionId::GetSecondaryKi).await
    }

    pub async fn set_secondary_ki(&self, ki: f64) -> Result<ErrorCode> {
        self.set_q16_16(FunctionId::SetSecondaryKi, ki).await
    }

    pub async fn secondary_kd(&self) -> Result<f64> {
        self.get_q16_16(FunctionId::GetSecondaryKd).await
    }

    pub async fn set_secondary_kd(&self, kd: f64) -> Result<ErrorCode> {
        self.set_q16_16(FunctionId::SetSecondaryKd, kd).await
    }

    pub async fn secondary_setpoint(&self) -> Result<f64> {
        self.get_q16_16(FunctionId::GetSecondarySetpoint).await
    }

    pub async fn set_secondary_setpoint(&self, setpoint: f64) -> Result<ErrorCode> {
        self.set_q16_16(FunctionId::SetSecondarySetpoint, setpoint)
            .await
    }

    pub async fn secondary_config(&self) -> Result<u32> {
        self.get_u32(FunctionId::GetSecondaryConfig).await
    }

    pub async fn set_secondary_config(&self, config: u32) -> Result<ErrorCode> {
        self.set(FunctionId::SetSecondaryConfig, config).await
    }

    /// Feed a new input to the controller.
    ///
    /// With `return_output` the output is queried in the same frame, after
    /// the input has been applied, and returned.
    pub async fn set_input(&self, input: f64, return_output: bool) -> Result<Option<u32>> {
        let raw = q16_16_arg(FunctionId::SetInput, input)?;
        let mut request = Fields::new();
        request.insert(FunctionId::SetInput.raw(), Value::from(raw));
        if return_output {
            request.insert(FunctionId::GetOutput.raw(), Value::Null);
        }

        let mut reply = self.send_multi_request(request).await?;
        self.interpret(&mut reply, FunctionId::SetInput)?;
        if !return_output {
            return Ok(None);
        }
        let output = self.interpret(&mut reply, FunctionId::GetOutput)?;
        match output {
            Reply::Value(value) => as_u32(FunctionId::GetOutput, value).map(Some),
            Reply::Status(status) => Err(DeviceError::InvalidReply(format!(
                "output answered with status {status}"
            ))),
        }
    }

    pub async fn setpoint(&self) -> Result<f64> {
        self.get_q16_16(FunctionId::GetSetpoint).await
    }

    pub async fn set_setpoint(&self, setpoint: f64) -> Result<ErrorCode> {
        self.set_q16_16(FunctionId::SetSetpoint, setpoint).await
    }

    /// Current output as a DAC code.
    pub async fn output(&self) -> Result<u32> {
        self.get_u32(FunctionId::GetOutput).await
    }

    /// Set the output directly. Only accepted while the controller is
    /// disabled.
    pub async fn set_output(&self, output: u32) -> Result<ErrorCode> {
        self.set(FunctionId::SetOutput, output).await
    }

    pub async fn lower_output_limit(&self) -> Result<u32> {
        self.get_u32(FunctionId::GetLowerOutputLimit).await
    }

    pub async fn set_lower_output_limit(&self, limit: u32) -> Result<ErrorCode> {
        self.set(FunctionId::SetLowerOutputLimit, limit).await
    }

    pub async fn upper_output_limit(&self) -> Result<u32> {
        self.get_u32(FunctionId::GetUpperOutputLimit).await
    }

    pub async fn set_upper_output_limit(&self, limit: u32) -> Result<ErrorCode> {
        self.set(FunctionId::SetUpperOutputLimit, limit).await
    }

    pub async fn is_enabled(&self) -> Result<bool> {
        self.get_bool(FunctionId::GetEnabled).await
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<ErrorCode> {
        self.set(FunctionId::SetEnabled, enabled).await
    }

    /// Time without input after which the controller enters fallback mode.
    pub async fn timeout(&self) -> Result<Duration> {
        self.get_millis(FunctionId::GetTimeout).await
    }

    pub async fn set_timeout(&self, timeout: Duration) -> Result<ErrorCode> {
        self.set_millis(FunctionId::SetTimeout, timeout).await
    }

    pub async fn feedback_direction(&self) -> Result<FeedbackDirection> {
        self.get_bool(FunctionId::GetDirection)
            .await
            .map(FeedbackDirection::from_bool)
    }

    pub async fn set_feedback_direction(&self, direction: FeedbackDirection) -> Result<ErrorCode> {
        self.set(FunctionId::SetDirection, direction.is_positive())
            .await
    }

    /// True if the DAC runs with x2 gain (0..10 V instead of 0..5 V).
    pub async fn is_dac_gain_enabled(&self) -> Result<bool> {
        self.get_bool(FunctionId::GetGain).await
    }

    pub async fn set_dac_gain(&self, enabled: bool) -> Result<ErrorCode> {
        self.set(FunctionId::SetGain, enabled).await
    }

    /// Offset in kelvin applied to the board sensor in fallback mode.
    pub async fn calibration_offset(&self) -> Result<f64> {
        let function = FunctionId::GetCalibrationOffset;
        let value = self.get(function).await?;
        value
            .as_f64()
            .ok_or(DeviceError::UnexpectedValue { function, value })
    }

    pub async fn set_calibration_offset(&self, offset: f64) -> Result<ErrorCode> {
        if !offset.is_finite() {
            return Err(DeviceError::InvalidParameter(format!(
                "calibration offset must be finite, got {offset}"
            )));
        }
        self.set(FunctionId::SetCalibrationOffset, offset).await
    }

    /// Whether the controller restores its settings and resumes after a
    /// power cycle.
    pub async fn auto_resume(&self) -> Result<bool> {
        self.get_bool(FunctionId::GetAutoResume).await
    }

    pub async fn set_auto_resume(&self, enabled: bool) -> Result<ErrorCode> {
        self.set(FunctionId::SetAutoResume, enabled).await
    }

    /// Update interval used in fallback mode.
    pub async fn fallback_update_interval(&self) -> Result<Duration> {
        self.get_millis(FunctionId::GetFallbackUpdateInterval)
            .await
    }

    pub async fn set_fallback_update_interval(&self, interval: Duration) -> Result<ErrorCode> {
        self.set_millis(FunctionId::SetFallbackUpdateInterval, interval)
            .await
    }

    /// Temperature of the onboard sensor in kelvin.
    pub async fn board_temperature(&self) -> Result<f64> {
        self.get_unit(FunctionId::GetBoardTemperature).await
    }

    /// Relative humidity of the onboard sensor in %rH.
    pub async fn humidity(&self) -> Result<f64> {
        self.get_unit(FunctionId::GetHumidity).await
    }

    pub async fn active_connection_count(&self) -> Result<u32> {
        self.get_u32(FunctionId::GetActiveConnectionCount).await
    }

    /// Trigger a hardware reset.
    pub async fn reset(&self) -> Result<ErrorCode> {
        self.set(FunctionId::Reset, Value::Null).await
    }

    /// Restore factory settings.
    pub async fn reset_settings(&self) -> Result<ErrorCode> {
        self.set(FunctionId::ResetSettings, Value::Null).await
    }

    async fn get_u32(&self, function: FunctionId) -> Result<u32> {
        let value = self.get(function).await?;
        as_u32(function, value)
    }

    async fn get_bool(&self, function: FunctionId) -> Result<bool> {
        let value = self.get(function).await?;
        value
            .as_bool()
            .ok_or(DeviceError::UnexpectedValue { function, value })
    }

    async fn get_q16_16(&self, function: FunctionId) -> Result<f64> {
        self.get_unit(function).await
    }

    async fn set_q16_16(&self, function: FunctionId, value: f64) -> Result<ErrorCode> {
        let raw = q16_16_arg(function, value)?;
        self.set(function, raw).await
    }

    async fn get_millis(&self, function: FunctionId) -> Result<Duration> {
        self.get_u32(function)
            .await
            .map(|millis| Duration::from_millis(u64::from(millis)))
    }

    async fn set_millis(&self, function: FunctionId, duration: Duration) -> Result<ErrorCode> {
        let millis = u32::try_from(duration.as_millis()).map_err(|_| {
            DeviceError::InvalidParameter(format!("{duration:?} is too long for {function}"))
        })?;
        self.set(function, millis).await
    }

    async fn get_unit(&self, function: FunctionId) -> Result<f64> {
        let raw = self.get(function).await?;
        let value = convert::raw_to_unit(function, raw)?;
        value
            .as_f64()
            .ok_or(DeviceError::UnexpectedValue { function, value })
    }
}

fn check_status(function: FunctionId, status: ErrorCode) -> Result<ErrorCode> {
    match status {
        ErrorCode::Ack => Ok(status),
        ErrorCode::Deprecated => {
            warn!(%function, "function is deprecated by the firmware");
            Ok(status)
        }
        ErrorCode::InvalidMode => Err(DeviceError::InvalidMode(function)),
        ErrorCode::InvalidCommand => Err(DeviceError::InvalidCommand(format!(
            "device rejected {function}"
        ))),
        ErrorCode::InvalidParameterType => Err(DeviceError::InvalidParameterType(function)),
        ErrorCode::InvalidParameter => Err(DeviceError::InvalidParameter(format!(
            "device rejected the value for {function}"
        ))),
        ErrorCode::NotInitialized => Err(DeviceError::NotInitialized),
        ErrorCode::NotImplemented => Err(DeviceError::NotImplemented(function)),
    }
}

fn q16_16_arg(function: FunctionId, value: f64) -> Result<i32> {
    convert::to_q16_16(value).ok_or_else(|| {
        DeviceError::InvalidParameter(format!("{value} is out of Q16.16 range for {function}"))
    })
}

fn as_u32(function: FunctionId, value: Value) -> Result<u32> {
    value
        .as_u64()
        .and_then(|raw| u32::try_from(raw).ok())
        .ok_or(DeviceError::UnexpectedValue { function, value })
}

impl Device for PidController {
    fn device_type(&self) -> u32 {
        Self::DEVICE_TYPE
    }

    fn name(&self) -> &'static str {
        "pid controller"
    }

    fn api_version(&self) -> ApiVersion {
        self.compat.api_version()
    }

    fn session(&self) -> &Arc<Session> {
        &self.session
    }

    fn software_version(&self) -> BoxFuture<'_, Result<Version>> {
        Box::pin(PidController::software_version(self))
    }

    fn hardware_version(&self) -> BoxFuture<'_, Result<Version>> {
        Box::pin(PidController::hardware_version(self))
    }

    fn serial_number(&self) -> BoxFuture<'_, Result<u32>> {
        Box::pin(PidController::serial_number(self))
    }

    fn get_by_function_id(&self, function: FunctionId) -> BoxFuture<'_, Result<Value>> {
        Box::pin(PidController::get_by_function_id(self, function))
    }

    fn set_by_function_id(
        &self,
        function: FunctionId,
        value: Value,
    ) -> BoxFuture<'_, Result<Reply>> {
        Box::pin(PidController::set_by_function_id(self, function, value))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for PidController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PidController")
            .field("endpoint", &self.session.endpoint().to_string())
            .field("api_version", &self.compat.api_version())
            .finish()
    }
}
