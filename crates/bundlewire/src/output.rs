use std::io::{IsTerminal, Write};
use std::path::Path;

use bundlewire_frame::{Message, ServeSummary};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ReplyOutput<'a> {
    transport: &'a str,
    request_size: usize,
    reply_size: usize,
    reply: Value,
}

/// Print a reply to `out`. JSON replies are embedded as JSON, anything else as text.
pub fn print_reply(
    out: &mut dyn Write,
    reply: &Message,
    request_size: usize,
    transport: &str,
    format: OutputFormat,
) {
    let result = match format {
        OutputFormat::Json => {
            let line = serde_json::to_string(&ReplyOutput {
                transport,
                request_size,
                reply_size: reply.len(),
                reply: reply_value(reply),
            })
            .unwrap_or_else(|_| "{}".to_string());
            writeln!(out, "{line}")
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TRANSPORT", "SENT", "RECEIVED", "REPLY"])
                .add_row(vec![
                    transport.to_string(),
                    request_size.to_string(),
                    reply.len().to_string(),
                    payload_preview(reply),
                ]);
            writeln!(out, "{table}")
        }
        OutputFormat::Pretty => match serde_json::from_slice::<Value>(reply.as_bytes()) {
            Ok(value) => writeln!(
                out,
                "{}",
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| payload_preview(reply))
            ),
            Err(_) => writeln!(out, "{}", payload_preview(reply)),
        },
        OutputFormat::Raw => out.write_all(reply.as_bytes()),
    };
    if let Err(err) = result.and_then(|()| out.flush()) {
        tracing::warn!(error = %err, "failed writing reply");
    }
}

#[derive(Serialize)]
struct SummaryOutput<'a> {
    transport: &'a str,
    requests: usize,
}

pub fn print_summary(summary: &ServeSummary, transport: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = SummaryOutput {
                transport,
                requests: summary.requests,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["TRANSPORT", "REQUESTS"])
                .add_row(vec![transport.to_string(), summary.requests.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!("served {} requests over {transport}", summary.requests);
        }
    }
}

#[derive(Serialize)]
struct FifoOutput<'a> {
    inbound: &'a Path,
    outbound: &'a Path,
    mode: String,
}

pub fn print_fifo_paths(inbound: &Path, outbound: &Path, mode: u32, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = FifoOutput {
                inbound,
                outbound,
                mode: format!("{mode:o}"),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["ROLE", "PATH"])
                .add_row(vec!["helper reads".to_string(), inbound.display().to_string()])
                .add_row(vec!["helper writes".to_string(), outbound.display().to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!("{}", inbound.display());
            println!("{}", outbound.display());
        }
    }
}

fn reply_value(reply: &Message) -> Value {
    serde_json::from_slice(reply.as_bytes()).unwrap_or_else(|_| Value::String(payload_preview(reply)))
}

fn payload_preview(payload: &Message) -> String {
    match payload.as_str() {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}
