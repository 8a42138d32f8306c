use labnode_device::convert::{is_fixed_point, parse_mac, to_q16_16};
use labnode_device::{FunctionId, Reply};
use labnode_frame::Value;
use serde::Serialize;

use crate::cmd::{parse_duration, Context, SetArgs};
use crate::exit::{device_error, CliError, CliResult, SUCCESS};
use crate::output::print_record;

#[derive(Serialize)]
struct SetOutput {
    function: &'static str,
    id: i32,
    status: String,
}

pub async fn run(args: SetArgs, ctx: &Context) -> CliResult<i32> {
    let function: FunctionId = args
        .function
        .parse()
        .map_err(|err| CliError::usage(format!("{err}")))?;
    let argument = encode_argument(function, args.value.as_deref())?;

    let handle = args.endpoint.open(ctx).await?;
    let outcome = handle
        .device()
        .set_by_function_id(function, argument)
        .await;
    handle.close().await;
    let reply = outcome.map_err(|err| device_error(&format!("set {function}"), err))?;

    let status = match reply {
        Reply::Status(status) => status.to_string(),
        Reply::Value(value) => value.to_string(),
    };
    let rows = [("function", function.name().to_string()), ("status", status.clone())];
    let out = SetOutput {
        function: function.name(),
        id: function.raw(),
        status,
    };
    print_record(&out, &rows, ctx.format);
    Ok(SUCCESS)
}

/// Turn the command line value into the argument `function` expects.
pub fn encode_argument(function: FunctionId, value: Option<&str>) -> CliResult<Value> {
    use FunctionId::*;

    if !function.is_setter() {
        return Err(CliError::usage(format!(
            "{function} is not a setter, use `labnode get`"
        )));
    }
    if matches!(function, Reset | ResetSettings) {
        return match value {
            None => Ok(Value::Null),
            Some(_) => Err(CliError::usage(format!("{function} takes no value"))),
        };
    }

    let text = value.ok_or_else(|| CliError::usage(format!("{function} requires a value")))?;
    let invalid = || CliError::usage(format!("invalid value for {function}: '{text}'"));

    let encoded = match function {
        SetEnabled | SetGain | SetAutoResume => Value::Bool(parse_bool(text).ok_or_else(invalid)?),
        SetDirection => match text.trim().to_ascii_lowercase().as_str() {
            "positive" => Value::Bool(true),
            "negative" => Value::Bool(false),
            other => Value::Bool(parse_bool(other).ok_or_else(invalid)?),
        },
        _ if is_fixed_point(function) => {
            let number: f64 = text.trim().parse().map_err(|_| invalid())?;
            Value::from(to_q16_16(number).ok_or_else(invalid)?)
        }
        SetCalibrationOffset => {
            let number: f64 = text.trim().parse().map_err(|_| invalid())?;
            if !number.is_finite() {
                return Err(invalid());
            }
            Value::Float(number)
        }
        SetMacAddress => Value::Bytes(parse_mac(text).ok_or_else(invalid)?.to_vec()),
        SetUuid => Value::Bytes(parse_uuid(text).ok_or_else(invalid)?.to_vec()),
        SetTimeout | SetFallbackUpdateInterval => {
            let millis = parse_duration(text)?.as_millis();
            Value::from(u32::try_from(millis).map_err(|_| invalid())?)
        }
        _ => Value::from(text.trim().parse::<u32>().map_err(|_| invalid())?),
    };
    Ok(encoded)
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Some(true),
        "false" | "off" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn parse_uuid(text: &str) -> Option<[u8; 16]> {
    let hex: String = text.trim().chars().filter(|c| *c != '-').collect();
    if hex.len() != 32 || !hex.is_ascii() {
        return None;
    }
    let mut uuid = [0u8; 16];
    for (index, byte) in uuid.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[index * 2..index * 2 + 2], 16).ok()?;
    }
    Some(uuid)
}
