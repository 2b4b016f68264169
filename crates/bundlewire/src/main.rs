#[cfg(not(unix))]
compile_error!("the bundlewire CLI talks over named pipes and needs a Unix platform");

mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "bundlewire",
    version,
    about = "Length-prefixed request/reply messaging between a helper and its parent"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ask_over_stdio() {
        let cli = Cli::try_parse_from(["bundlewire", "ask", "--stdio", "get_protocol"])
            .expect("ask args should parse");
        let Command::Ask(args) = cli.command else {
            panic!("expected ask");
        };
        assert!(args.stdio);
        assert_eq!(args.payload.as_deref(), Some("get_protocol"));
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "bundlewire",
            "ask",
            "all_settings",
            "--json",
            "{\"x\":1}",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn serve_defaults_to_swapped_pipes() {
        let cli = Cli::try_parse_from(["bundlewire", "serve"]).expect("serve args should parse");
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.inbound, std::path::PathBuf::from(".from.fifo"));
        assert_eq!(args.outbound, std::path::PathBuf::from(".to.fifo"));
        assert_eq!(args.idle_timeout, "20s");
    }

    #[test]
    fn rejects_two_responders() {
        let err = Cli::try_parse_from(["bundlewire", "serve", "--echo", "--prefix", "x"])
            .expect_err("conflicting responders should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["bundlewire", "mkfifo", "/tmp", "--log-level", "off"])
            .expect("global flags should parse anywhere");
        assert_eq!(cli.log_level, LogLevel::Off);
        assert!(matches!(cli.command, Command::Mkfifo(_)));
    }
}
