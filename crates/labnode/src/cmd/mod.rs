use std::time::Duration;

use clap::{Args, Subcommand};
use labnode_device::{open, DeviceHandle};
use labnode_session::SessionConfig;
use labnode_transport::Endpoint;

use crate::exit::{device_error, transport_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod get;
pub mod info;
pub mod set;
pub mod version;
pub mod watch;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Identify a device and print its versions and serial number.
    Info(InfoArgs),
    /// Query a getter, e.g. `get_kp` or `get_board_temperature`.
    Get(GetArgs),
    /// Call a setter or action, e.g. `set_setpoint 25.5` or `reset`.
    Set(SetArgs),
    /// Poll temperature, humidity and output until interrupted.
    Watch(WatchArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Settings shared by every command that talks to a device.
#[derive(Debug, Clone)]
pub struct Context {
    pub format: OutputFormat,
    pub timeout: Duration,
}

pub fn run(command: Command, ctx: Context) -> CliResult<i32> {
    match command {
        Command::Version(args) => version::run(args),
        command => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|err| CliError::new(INTERNAL, format!("failed to start runtime: {err}")))?;
            runtime.block_on(dispatch(command, &ctx))
        }
    }
}

async fn dispatch(command: Command, ctx: &Context) -> CliResult<i32> {
    match command {
        Command::Info(args) => info::run(args, ctx).await,
        Command::Get(args) => get::run(args, ctx).await,
        Command::Set(args) => set::run(args, ctx).await,
        Command::Watch(args) => watch::run(args, ctx).await,
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Clone)]
pub struct EndpointArgs {
    /// Device address: `tcp://host:port`, `host[:port]` or `serial:///dev/ttyACM0`.
    #[arg(long, short = 'e', env = "LABNODE_ENDPOINT", value_name = "ENDPOINT")]
    pub endpoint: String,
    /// Baud rate for serial endpoints.
    #[arg(long)]
    pub baud: Option<u32>,
}

impl EndpointArgs {
    pub fn resolve(&self) -> CliResult<Endpoint> {
        let mut endpoint: Endpoint = self
            .endpoint
            .parse()
            .map_err(|err| transport_error("invalid endpoint", err))?;
        if let Some(baud) = self.baud {
            match &mut endpoint {
                Endpoint::Serial(serial) => serial.options.baud_rate = baud,
                Endpoint::Tcp(_) => {
                    return Err(CliError::usage("--baud only applies to serial endpoints"));
                }
            }
        }
        Ok(endpoint)
    }

    /// Connect and identify the device.
    pub async fn open(&self, ctx: &Context) -> CliResult<DeviceHandle> {
        let endpoint = self.resolve()?;
        let context = format!("connect to {endpoint}");
        open(endpoint, SessionConfig::with_timeout(ctx.timeout))
            .await
            .map_err(|err| device_error(&context, err))
    }
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Function name or numeric id.
    pub function: String,
    #[command(flatten)]
    pub endpoint: EndpointArgs,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Function name or numeric id.
    pub function: String,
    /// New value. Omitted for actions such as `reset`.
    #[arg(allow_hyphen_values = true)]
    pub value: Option<String>,
    #[command(flatten)]
    pub endpoint: EndpointArgs,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,
    /// Time between samples (e.g. 1s, 250ms).
    #[arg(long, default_value = "1s")]
    pub interval: String,
    /// Exit after N samples.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build information.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `2.5s`, `150ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input}")))?;
    if !value.is_finite() || value <= 0.0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    let seconds = if millis { value / 1000.0 } else { value };
    Duration::try_from_secs_f64(seconds)
        .map_err(|_| CliError::new(USAGE, format!("duration out of range: {input}")))
}
