mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::{parse_duration, Command, Context};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "labnode", version, about = "Query and configure Labnode controllers")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Per-request timeout (e.g. 2.5s, 500ms).
    #[arg(long, default_value = "2.5s", global = true)]
    timeout: String,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let result = parse_duration(&cli.timeout).and_then(|timeout| {
        let ctx = Context {
            format: cli.format.unwrap_or_else(OutputFormat::default_for_stdout),
            timeout,
        };
        cmd::run(cli.command, ctx)
    });

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
