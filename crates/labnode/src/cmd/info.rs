use labnode_device::DeviceHandle;
use serde::Serialize;

use crate::cmd::{Context, InfoArgs};
use crate::exit::{device_error, CliResult, SUCCESS};
use crate::output::print_record;

#[derive(Serialize)]
struct InfoOutput {
    endpoint: String,
    driver: &'static str,
    device_type: u32,
    api_version: String,
    software_version: String,
    hardware_version: String,
    serial_number: u32,
}

pub async fn run(args: InfoArgs, ctx: &Context) -> CliResult<i32> {
    let handle = args.endpoint.open(ctx).await?;
    let collected = collect(&handle).await;
    handle.close().await;
    let out = collected?;

    let rows = [
        ("endpoint", out.endpoint.clone()),
        ("driver", out.driver.to_string()),
        ("device type", out.device_type.to_string()),
        ("api version", out.api_version.clone()),
        ("software version", out.software_version.clone()),
        ("hardware version", out.hardware_version.clone()),
        ("serial number", out.serial_number.to_string()),
    ];
    print_record(&out, &rows, ctx.format);
    Ok(SUCCESS)
}

async fn collect(handle: &DeviceHandle) -> CliResult<InfoOutput> {
    let device = handle.device();
    let software_version = device
        .software_version()
        .await
        .map_err(|err| device_error("read software version", err))?;
    let hardware_version = device
        .hardware_version()
        .await
        .map_err(|err| device_error("read hardware version", err))?;
    let serial_number = device
        .serial_number()
        .await
        .map_err(|err| device_error("read serial number", err))?;

    Ok(InfoOutput {
        endpoint: handle.session().endpoint().to_string(),
        driver: device.name(),
        device_type: handle.identity().device_type,
        api_version: handle.identity().api_version.to_string(),
        software_version: software_version.to_string(),
        hardware_version: hardware_version.to_string(),
        serial_number,
    })
}
