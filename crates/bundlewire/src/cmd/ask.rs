use std::fs;

use bundlewire_channel::{Channel, FifoChannel, FifoPaths, StreamChannel};
use bundlewire_frame::{FramedTransport, Message};

use crate::cmd::{channel_config, frame_config, AskArgs};
use crate::exit::{frame_error, io_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_reply, OutputFormat};

pub fn run(args: AskArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;
    let request_size = payload.len();
    let frame_config = frame_config(args.max_size);

    if args.stdio {
        let channel = StreamChannel::stdio();
        let mut transport = FramedTransport::with_config(channel, frame_config);
        let reply = exchange(&mut transport, payload)?;
        // stdout is the channel.
        print_reply(
            &mut std::io::stderr(),
            &reply,
            request_size,
            transport.channel().transport_name(),
            format,
        );
        return Ok(SUCCESS);
    }

    let config = channel_config(args.connect_timeout.as_deref(), &args.timeout)?;
    let paths = FifoPaths::new(&args.inbound, &args.outbound);
    tracing::debug!(inbound = ?paths.inbound, outbound = ?paths.outbound, "asking over named pipes");
    let mut transport =
        FramedTransport::with_config(FifoChannel::with_config(paths, config), frame_config);
    let reply = exchange(&mut transport, payload)?;
    print_reply(
        &mut std::io::stdout(),
        &reply,
        request_size,
        transport.channel().transport_name(),
        format,
    );
    Ok(SUCCESS)
}

fn exchange<C: Channel>(transport: &mut FramedTransport<C>, payload: Message) -> CliResult<Message> {
    let reply = transport
        .ask(payload)
        .map_err(|err| frame_error("ask failed", err))?;
    transport.close();
    Ok(reply)
}

fn resolve_payload(args: &AskArgs) -> CliResult<Message> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(Message::from(json.as_str()));
    }
    if let Some(payload) = &args.payload {
        return Ok(Message::from(payload.as_str()));
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map(Message::from)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Message::default())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cmd::Command;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: Command,
    }

    fn ask_args(argv: &[&str]) -> AskArgs {
        let cli = TestCli::try_parse_from(std::iter::once("bundlewire").chain(argv.iter().copied()))
            .expect("ask args should parse");
        match cli.command {
            Command::Ask(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn positional_payload_is_sent_verbatim() {
        let args = ask_args(&["ask", "all_settings"]);
        assert_eq!(resolve_payload(&args).unwrap().as_bytes(), b"all_settings");
    }

    #[test]
    fn json_payload_is_validated() {
        let args = ask_args(&["ask", "--json", r#"{"fixup_binaries": []}"#]);
        assert_eq!(
            resolve_payload(&args).unwrap().as_str().unwrap(),
            r#"{"fixup_binaries": []}"#
        );

        let args = ask_args(&["ask", "--json", "{not json"]);
        assert_eq!(resolve_payload(&args).unwrap_err().code, USAGE);
    }

    #[test]
    fn missing_payload_is_empty_message() {
        let args = ask_args(&["ask", "--stdio"]);
        assert!(resolve_payload(&args).unwrap().is_empty());
    }
}
