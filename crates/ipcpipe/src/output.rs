use std::io::{IsTerminal, Write};

use chrono::SecondsFormat;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use ipcpipe_frame::{Payload, Value};
use ipcpipe_pipeline::SendResponse;
use serde::Serialize;

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
struct MessageOutput<'a> {
    channel: &'a str,
    seq: u64,
    name: Option<&'a str>,
    sent_at: Option<String>,
    value: Option<&'a serde_json::Value>,
}

#[derive(Serialize)]
struct SendOutput<'a> {
    channel: &'a str,
    name: Option<&'a str>,
    delivered: bool,
    frame_size: usize,
}

pub fn print_message(channel: &str, seq: u64, payload: &Payload, format: OutputFormat) {
    let sent_at = payload
        .sent_at()
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true));
    let value = payload
        .as_json()
        .get("value")
        .or_else(|| payload.as_json().get("Value"));

    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                channel,
                seq,
                name: payload.name(),
                sent_at,
                value,
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
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SEQ", "NAME", "SENT AT", "VALUE"])
                .add_row(vec![
                    seq.to_string(),
                    payload.name().unwrap_or("-").to_string(),
                    sent_at.unwrap_or_else(|| "-".to_string()),
                    value_preview(payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "#{seq} channel={channel} name={} sent_at={} value={}",
                payload.name().unwrap_or("-"),
                sent_at.as_deref().unwrap_or("-"),
                value_preview(payload)
            );
        }
        OutputFormat::Raw => {
            let mut line = payload.as_json().to_string();
            line.push('\n');
            print_raw(line.as_bytes());
        }
    }
}

pub fn print_send(
    channel: &str,
    name: Option<&str>,
    response: SendResponse,
    frame_size: usize,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            let out = SendOutput {
                channel,
                name,
                delivered: response.delivered(),
                frame_size,
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
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "NAME", "DELIVERED", "FRAME SIZE"])
                .add_row(vec![
                    channel.to_string(),
                    name.unwrap_or("-").to_string(),
                    response.delivered().to_string(),
                    frame_size.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "channel={channel} name={} delivered={} frame_size={frame_size}",
                name.unwrap_or("-"),
                response.delivered()
            );
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn value_preview(payload: &Payload) -> String {
    if !payload.has_value() {
        return "-".to_string();
    }
    match payload.value::<Value>() {
        Ok(value) => value.to_string(),
        Err(_) => payload
            .as_json()
            .get("value")
            .or_else(|| payload.as_json().get("Value"))
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string()),
    }
}
