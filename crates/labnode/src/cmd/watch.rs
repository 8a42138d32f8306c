use std::time::Duration;

use labnode_device::{DeviceHandle, PidController};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::cmd::{parse_duration, Context, WatchArgs};
use crate::exit::{device_error, CliError, CliResult, SUCCESS, UNSUPPORTED};
use crate::output::print_sample;

#[derive(Serialize)]
struct Sample {
    sequence: usize,
    board_temperature_k: f64,
    humidity_rh: f64,
    output: u32,
}

pub async fn run(args: WatchArgs, ctx: &Context) -> CliResult<i32> {
    let interval = parse_duration(&args.interval)?;
    if args.count == Some(0) {
        return Err(CliError::usage("--count must be at least 1"));
    }

    let handle = args.endpoint.open(ctx).await?;
    let result = watch(&handle, interval, args.count, ctx).await;
    handle.close().await;
    result
}

async fn watch(
    handle: &DeviceHandle,
    interval: Duration,
    count: Option<usize>,
    ctx: &Context,
) -> CliResult<i32> {
    let pid = handle.pid().ok_or_else(|| {
        CliError::new(
            UNSUPPORTED,
            format!("watch needs a PID controller, found {}", handle.device().name()),
        )
    })?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut taken = 0usize;
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!(samples = taken, "interrupted");
                break;
            }
            _ = ticker.tick() => {}
        }

        let sample = read_sample(pid, taken).await?;
        let rows = [
            ("sequence", sample.sequence.to_string()),
            ("temperature", format!("{:.2} K", sample.board_temperature_k)),
            ("humidity", format!("{:.1} %rH", sample.humidity_rh)),
            ("output", sample.output.to_string()),
        ];
        print_sample(&sample, &rows, ctx.format);

        taken += 1;
        if count.is_some_and(|count| taken >= count) {
            break;
        }
    }
    Ok(SUCCESS)
}

async fn read_sample(pid: &PidController, sequence: usize) -> CliResult<Sample> {
    let (board_temperature_k, humidity_rh, output) =
        tokio::try_join!(pid.board_temperature(), pid.humidity(), pid.output())
            .map_err(|err| device_error("read sample", err))?;
    Ok(Sample {
        sequence,
        board_temperature_k,
        humidity_rh,
        output,
    })
}
