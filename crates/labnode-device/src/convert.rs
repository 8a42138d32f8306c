//! Conversions between raw device values and physical units.

use labnode_frame::Value;

use crate::error::{DeviceError, Result};
use crate::function::FunctionId;

const Q16_16_SCALE: f64 = 65536.0;
const SENSOR_FULL_SCALE: f64 = 65535.0;

/// Encode `value` as signed Q16.16 fixed point, rounding to the nearest
/// step. Returns `None` if it does not fit.
pub fn to_q16_16(value: f64) -> Option<i32> {
    let scaled = (value * Q16_16_SCALE).round();
    if !scaled.is_finite() || scaled < f64::from(i32::MIN) || scaled > f64::from(i32::MAX) {
        return None;
    }
    Some(scaled as i32)
}

pub fn from_q16_16(raw: i64) -> f64 {
    raw as f64 / Q16_16_SCALE
}

/// Board temperature in kelvin from the raw 16-bit sensor reading.
pub fn board_temperature(raw: f64) -> f64 {
    175.72 * raw / SENSOR_FULL_SCALE + 226.3
}

/// Relative humidity in %rH from the raw 16-bit sensor reading, clamped to
/// 0..=100.
pub fn humidity(raw: f64) -> f64 {
    (125.0 * raw / SENSOR_FULL_SCALE - 6.0).clamp(0.0, 100.0)
}

/// A MAC address sent either as a byte string or as an array of integers.
pub fn mac_address(value: &Value) -> Option<[u8; 6]> {
    let bytes: Vec<u8> = match value {
        Value::Bytes(bytes) => bytes.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_u64().and_then(|byte| u8::try_from(byte).ok()))
            .collect::<Option<_>>()?,
        _ => return None,
    };
    bytes.try_into().ok()
}

pub fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Parse `aa:bb:cc:dd:ee:ff` (or `-` separated).
pub fn parse_mac(s: &str) -> Option<[u8; 6]> {
    let parts: Vec<u8> = s
        .trim()
        .split([':', '-'])
        .map(|part| {
            if part.len() == 2 {
                u8::from_str_radix(part, 16).ok()
            } else {
                None
            }
        })
        .collect::<Option<_>>()?;
    parts.try_into().ok()
}

/// Functions whose argument or result is Q16.16 fixed point.
pub fn is_fixed_point(function: FunctionId) -> bool {
    use FunctionId::*;
    matches!(
        function,
        SetInput
            | SetKp
            | GetKp
            | SetKi
            | GetKi
            | SetKd
            | GetKd
            | SetSetpoint
            | GetSetpoint
            | SetSecondaryKp
            | GetSecondaryKp
            | SetSecondaryKi
            | GetSecondaryKi
            | SetSecondaryKd
            | GetSecondaryKd
            | SetSecondarySetpoint
            | GetSecondarySetpoint
    )
}

/// Convert the raw reply of `function` into its unit.
///
/// Fixed point values become floats. Functions without a conversion pass
/// through unchanged.
pub fn raw_to_unit(function: FunctionId, value: Value) -> Result<Value> {
    let unexpected = |value: Value| DeviceError::UnexpectedValue { function, value };
    match function {
        _ if is_fixed_point(function) => match value.as_i64() {
            Some(raw) => Ok(Value::Float(from_q16_16(raw))),
            None => Err(unexpected(value)),
        },
        FunctionId::GetBoardTemperature => match value.as_f64() {
            Some(raw) => Ok(Value::Float(board_temperature(raw))),
            None => Err(unexpected(value)),
        },
        FunctionId::GetHumidity => match value.as_f64() {
            Some(raw) => Ok(Value::Float(humidity(raw))),
            None => Err(unexpected(value)),
        },
        FunctionId::GetMacAddress => match mac_address(&value) {
            Some(mac) => Ok(Value::Bytes(mac.to_vec())),
            None => Err(unexpected(value)),
        },
        _ => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn q16_16() {
        assert_eq!(to_q16_16(1.0), Some(65536));
        assert_eq!(to_q16_16(-0.5), Some(-32768));
        assert_eq!(to_q16_16(0.0), Some(0));
        assert_eq!(to_q16_16(40000.0), None);
        assert_eq!(to_q16_16(f64::NAN), None);
        assert!(close(from_q16_16(98304), 1.5));
        assert!(close(from_q16_16(i64::from(to_q16_16(12.25).unwrap())), 12.25));
    }

    #[test]
    fn sensor_conversions() {
        assert!(close(board_temperature(0.0), 226.3));
        assert!(close(board_temperature(65535.0), 402.02));
        assert!(close(humidity(0.0), 0.0));
        assert!(close(humidity(65535.0), 100.0));
        assert!(close(humidity(32767.5), 56.5));
    }

    #[test]
    fn mac_addresses() {
        let expected = [0x00, 0x1b, 0x63, 0x84, 0x45, 0xe6];
        assert_eq!(mac_address(&Value::Bytes(expected.to_vec())), Some(expected));
        let array = Value::Array(expected.iter().map(|b| Value::Integer(i64::from(*b))).collect());
        assert_eq!(mac_address(&array), Some(expected));
        assert_eq!(mac_address(&Value::Bytes(vec![1, 2, 3])), None);
        assert_eq!(format_mac(&expected), "00:1b:63:84:45:e6");
        assert_eq!(parse_mac("00-1B-63-84-45-E6"), Some(expected));
        assert_eq!(parse_mac("00:1b:63"), None);
    }

    #[test]
    fn raw_to_unit_applies_lookup() {
        assert_eq!(
            raw_to_unit(FunctionId::GetBoardTemperature, Value::Integer(0)).unwrap(),
            Value::Float(226.3)
        );
        assert_eq!(
            raw_to_unit(FunctionId::GetKp, Value::Integer(98304)).unwrap(),
            Value::Float(1.5)
        );
        assert_eq!(
            raw_to_unit(FunctionId::GetOutput, Value::Integer(98304)).unwrap(),
            Value::Integer(98304)
        );
        assert!(matches!(
            raw_to_unit(FunctionId::GetSetpoint, Value::Float(0.5)),
            Err(DeviceError::UnexpectedValue { .. })
        ));
        assert!(matches!(
            raw_to_unit(FunctionId::GetHumidity, Value::from("dry")),
            Err(DeviceError::UnexpectedValue { .. })
        ));
    }
}
