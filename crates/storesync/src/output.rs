use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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
struct StateOutput<'a> {
    channel: &'a str,
    sequence: usize,
    state: &'a Value,
    timestamp: String,
}

/// Print one state snapshot. `sequence` counts syncs seen on the channel,
/// starting at 1 for the initial one.
pub fn print_state(channel: &str, sequence: usize, state: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = StateOutput {
                channel,
                sequence,
                state,
                timestamp: now_unix_seconds(),
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
                .set_header(vec!["CHANNEL", "SEQ", "STATE"])
                .add_row(vec![channel.to_string(), sequence.to_string(), compact(state)]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("channel={channel} seq={sequence} state={}", compact(state));
        }
    }
}

/// Final status of a dispatched action.
#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    Resolved,
    Rejected,
}

impl DispatchStatus {
    fn as_str(&self) -> &'static str {
        match self {
            DispatchStatus::Resolved => "resolved",
            DispatchStatus::Rejected => "rejected",
        }
    }
}

#[derive(Serialize)]
pub struct DispatchOutput<'a> {
    pub channel: &'a str,
    pub id: &'a str,
    pub action: &'a Value,
    pub status: DispatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<&'a Value>,
}

pub fn print_dispatch(out: &DispatchOutput<'_>, format: OutputFormat) {
    let error = out.error.map(compact).unwrap_or_default();
    let state = out.state.map(compact).unwrap_or_default();

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "ID", "ACTION", "STATUS", "ERROR", "STATE"])
                .add_row(vec![
                    out.channel.to_string(),
                    out.id.to_string(),
                    compact(out.action),
                    out.status.as_str().to_string(),
                    error,
                    state,
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let mut line = format!(
                "channel={} id={} action={} status={}",
                out.channel,
                out.id,
                compact(out.action),
                out.status.as_str()
            );
            if !error.is_empty() {
                line.push_str(&format!(" error={error}"));
            }
            if !state.is_empty() {
                line.push_str(&format!(" state={state}"));
            }
            println!("{line}");
        }
    }
}

fn compact(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
