use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use bundlewire_channel::{ChannelConfig, RetryPolicy, DEFAULT_INBOUND, DEFAULT_OUTBOUND};
use bundlewire_frame::FrameConfig;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod ask;
pub mod mkfifo;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one request as the helper and print the reply.
    Ask(AskArgs),
    /// Answer requests as the parent until the helper closes.
    Serve(ServeArgs),
    /// Create the named pipe pair.
    Mkfifo(MkfifoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Ask(args) => ask::run(args, format),
        Command::Serve(args) => serve::run(args, format),
        Command::Mkfifo(args) => mkfifo::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct AskArgs {
    /// Raw string payload.
    #[arg(conflicts_with_all = ["json", "file"])]
    pub payload: Option<String>,
    /// JSON payload (validated before sending).
    #[arg(long, conflicts_with_all = ["payload", "file"])]
    pub json: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["payload", "json"])]
    pub file: Option<PathBuf>,
    /// Use inherited stdin/stdout instead of named pipes. The reply goes to stderr.
    #[arg(long)]
    pub stdio: bool,
    /// Pipe to read replies from.
    #[arg(long, env = "BUNDLEWIRE_INBOUND", default_value = DEFAULT_INBOUND)]
    pub inbound: PathBuf,
    /// Pipe to write requests to.
    #[arg(long, env = "BUNDLEWIRE_OUTBOUND", default_value = DEFAULT_OUTBOUND)]
    pub outbound: PathBuf,
    /// Largest message accepted in either direction, in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_size: Option<usize>,
    /// How long to wait for the reply (e.g. 20s, 500ms).
    #[arg(long, default_value = "20s")]
    pub timeout: String,
    /// How long to wait for the parent to open its pipe end.
    #[arg(long, value_name = "DURATION")]
    pub connect_timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Pipe to read requests from (the helper's outbound pipe).
    #[arg(long, default_value = DEFAULT_OUTBOUND)]
    pub inbound: PathBuf,
    /// Pipe to write replies to (the helper's inbound pipe).
    #[arg(long, default_value = DEFAULT_INBOUND)]
    pub outbound: PathBuf,
    /// Reply with the request itself (default).
    #[arg(long, conflicts_with_all = ["prefix", "commands"])]
    pub echo: bool,
    /// Reply with TEXT followed by the request.
    #[arg(long, value_name = "TEXT", conflicts_with_all = ["echo", "commands"])]
    pub prefix: Option<String>,
    /// Answer deployment commands from a JSON fixture.
    #[arg(long, value_name = "FILE", conflicts_with_all = ["echo", "prefix"])]
    pub commands: Option<PathBuf>,
    /// How long to wait for the next request before giving up (e.g. 20s).
    #[arg(long, default_value = "20s")]
    pub idle_timeout: String,
    /// How long to wait for the helper to open its pipe end.
    #[arg(long, value_name = "DURATION")]
    pub connect_timeout: Option<String>,
    /// Largest message accepted in either direction, in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_size: Option<usize>,
}

#[derive(Args, Debug)]
pub struct MkfifoArgs {
    /// Directory to create the pipes in.
    #[arg(default_value = ".")]
    pub dir: PathBuf,
    /// Permission bits, in octal.
    #[arg(long, default_value = "600")]
    pub mode: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

/// Channel timing from the CLI flags, defaults otherwise.
pub fn channel_config(connect_timeout: Option<&str>, poll_timeout: &str) -> CliResult<ChannelConfig> {
    let mut config = ChannelConfig {
        poll_timeout: parse_duration(poll_timeout)?,
        ..ChannelConfig::default()
    };
    if let Some(timeout) = connect_timeout {
        config.connect = policy_within(parse_duration(timeout)?, RetryPolicy::CONNECT.interval);
    }
    Ok(config)
}

pub fn frame_config(max_size: Option<usize>) -> FrameConfig {
    match max_size {
        Some(max_message_size) => FrameConfig { max_message_size },
        None => FrameConfig::default(),
    }
}

/// Enough attempts at `interval` to cover `budget`.
fn policy_within(budget: Duration, interval: Duration) -> RetryPolicy {
    let attempts = budget
        .as_millis()
        .div_ceil(interval.as_millis().max(1))
        .max(1);
    RetryPolicy::new(u32::try_from(attempts).unwrap_or(u32::MAX), interval)
}
