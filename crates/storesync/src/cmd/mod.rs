use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use serde_json::Value;
use storesync_frame::UnixConnector;
use storesync_peer::{connect, Mirror, MirrorDriver};
use storesync_protocol::DEFAULT_CLIENT_NAME;

use crate::exit::{sync_error, CliError, CliResult, TIMEOUT, USAGE};
use crate::output::OutputFormat;

pub mod dispatch;
pub mod host;
pub mod state;
pub mod version;
pub mod watch;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the counter store on a socket.
    Host(HostArgs),
    /// Print every state the host broadcasts.
    Watch(WatchArgs),
    /// Print the current host state once.
    State(StateArgs),
    /// Dispatch one action and wait for the host's answer.
    Dispatch(DispatchArgs),
    /// Show version information.
    Version(VersionArgs),
}

impl Command {
    /// Commands that stay up until interrupted or until the host goes away.
    pub fn is_long_running(&self) -> bool {
        matches!(self, Command::Host(_) | Command::Watch(_))
    }
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Host(args) => host::run(args).await,
        Command::Watch(args) => watch::run(args, format).await,
        Command::State(args) => state::run(args, format).await,
        Command::Dispatch(args) => dispatch::run(args, format).await,
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct HostArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Keep serving when a client breaks the protocol.
    #[arg(long)]
    pub keep_going: bool,
}

/// Connection options shared by every client command.
#[derive(Args, Debug)]
pub struct ClientArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Client name; the channel is `storeClient:<name>`.
    #[arg(long, default_value = DEFAULT_CLIENT_NAME)]
    pub name: String,
    /// Time allowed to connect and receive the first state (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub client: ClientArgs,
    /// Exit after printing N states.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct StateArgs {
    #[command(flatten)]
    pub client: ClientArgs,
}

#[derive(Args, Debug)]
pub struct DispatchArgs {
    #[command(flatten)]
    pub client: ClientArgs,
    /// Action as JSON, e.g. '{"type":"INCREMENT"}'.
    #[arg(long)]
    pub action: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Connect a mirror over the socket and wait for the first state sync.
pub(crate) async fn open_mirror(
    args: &ClientArgs,
) -> CliResult<(Mirror<Value>, MirrorDriver<Value>)> {
    let timeout = parse_duration(&args.timeout)?;
    let connector = UnixConnector::new(&args.path);

    tokio::time::timeout(timeout, connect(&args.name, &connector))
        .await
        .map_err(|_| {
            CliError::new(
                TIMEOUT,
                format!(
                    "no state from {} within {timeout:?}",
                    args.path.display()
                ),
            )
        })?
        .map_err(|err| sync_error("connect failed", err))
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
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

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert_eq!(parse_duration("0s").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("soon").unwrap_err().code, USAGE);
        assert_eq!(parse_duration(" ").unwrap_err().code, USAGE);
    }
}
