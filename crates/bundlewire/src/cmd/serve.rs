use std::fs;

use bundlewire_channel::{CancelToken, Channel, FifoChannel, FifoPaths};
use bundlewire_command::{serve_commands_while, Fixture};
use bundlewire_frame::{FramedTransport, Message, ServeSummary};

use crate::cmd::{channel_config, frame_config, ServeArgs};
use crate::exit::{command_error, frame_error, io_error, CliError, CliResult, DATA_INVALID, INTERNAL, SUCCESS};
use crate::output::{print_summary, OutputFormat};

/// How requests get answered.
#[derive(Debug)]
enum Responder {
    Echo,
    Prefix(String),
    Commands(Box<Fixture>),
}

impl Responder {
    fn from_args(args: &ServeArgs) -> CliResult<Self> {
        if let Some(prefix) = &args.prefix {
            return Ok(Responder::Prefix(prefix.clone()));
        }
        if let Some(path) = &args.commands {
            let raw = fs::read(path)
                .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
            let fixture: Fixture = serde_json::from_slice(&raw).map_err(|err| {
                CliError::new(
                    DATA_INVALID,
                    format!("{} is not a valid command fixture: {err}", path.display()),
                )
            })?;
            return Ok(Responder::Commands(Box::new(fixture)));
        }
        Ok(Responder::Echo)
    }
}

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let mut responder = Responder::from_args(&args)?;
    let mut config = channel_config(args.connect_timeout.as_deref(), &args.idle_timeout)?;
    let paths = FifoPaths::new(&args.inbound, &args.outbound);

    // Ctrl-C closes the channel, including while waiting for the helper.
    let cancel = CancelToken::new();
    install_ctrlc_handler(cancel.clone())?;
    config.cancel = cancel.clone();
    let keep_running = || !cancel.is_cancelled();

    tracing::info!(inbound = ?paths.inbound, outbound = ?paths.outbound, "serving");
    let mut transport = FramedTransport::with_config(
        FifoChannel::with_config(paths, config),
        frame_config(args.max_size),
    );

    let mut handled = 0usize;
    let result = match &mut responder {
        Responder::Echo => transport
            .serve_while(
                |request| {
                    handled += 1;
                    tracing::info!(size = request.len(), "echoing request");
                    request
                },
                keep_running,
            )
            .map_err(|err| frame_error("serve failed", err)),
        Responder::Prefix(prefix) => transport
            .serve_while(
                |request| {
                    handled += 1;
                    tracing::info!(size = request.len(), "answering request");
                    prefixed(prefix, &request)
                },
                keep_running,
            )
            .map_err(|err| frame_error("serve failed", err)),
        Responder::Commands(fixture) => serve_commands_while(
            &mut transport,
            |request| {
                handled += 1;
                fixture.respond(request)
            },
            keep_running,
        )
        .map_err(|err| command_error("serve failed", err)),
    };

    let summary = match result {
        Ok(summary) => summary,
        Err(err) if cancel.is_cancelled() => {
            tracing::info!(reason = %err, "interrupted, stopping");
            ServeSummary { requests: handled }
        }
        Err(err) => return Err(err),
    };

    let transport_name = transport.channel().transport_name();
    transport.close();
    print_summary(&summary, transport_name, format);
    Ok(SUCCESS)
}

fn prefixed(prefix: &str, request: &Message) -> Message {
    let mut reply = Vec::with_capacity(prefix.len() + request.len());
    reply.extend_from_slice(prefix.as_bytes());
    reply.extend_from_slice(request.as_bytes());
    Message::from(reply)
}

fn install_ctrlc_handler(cancel: CancelToken) -> CliResult<()> {
    ctrlc::set_handler(move || cancel.cancel())
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
