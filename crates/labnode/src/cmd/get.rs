use labnode_device::convert::{format_mac, mac_address};
use labnode_device::FunctionId;
use labnode_frame::Value;
use serde::Serialize;

use crate::cmd::{Context, GetArgs};
use crate::exit::{device_error, CliError, CliResult, SUCCESS};
use crate::output::{print_record, value_to_json};

#[derive(Serialize)]
struct GetOutput {
    function: &'static str,
    id: i32,
    value: serde_json::Value,
}

pub async fn run(args: GetArgs, ctx: &Context) -> CliResult<i32> {
    let function: FunctionId = args
        .function
        .parse()
        .map_err(|err| CliError::usage(format!("{err}")))?;
    if !function.is_getter() {
        return Err(CliError::usage(format!(
            "{function} is not a getter, use `labnode set`"
        )));
    }

    let handle = args.endpoint.open(ctx).await?;
    let fetched = handle.device().get_by_function_id(function).await;
    handle.close().await;
    let value = display_value(
        function,
        fetched.map_err(|err| device_error(&format!("get {function}"), err))?,
    );

    let out = GetOutput {
        function: function.name(),
        id: function.raw(),
        value: value_to_json(&value),
    };
    let rows = [("function", function.name().to_string()), ("value", value.to_string())];
    print_record(&out, &rows, ctx.format);
    Ok(SUCCESS)
}

/// Human friendly form of a getter result.
pub fn display_value(function: FunctionId, value: Value) -> Value {
    if function == FunctionId::GetMacAddress {
        if let Some(mac) = mac_address(&value) {
            return Value::Text(format_mac(&mac));
        }
    }
    value
}
