mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::exit::{CliError, INTERNAL};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "storesync", version, about = "Store synchronization CLI")]
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
    init_logging(
        cli.log_format,
        cli.log_level,
        cli.command.is_long_running(),
    );

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("failed to start runtime: {err}")))
        .and_then(|runtime| runtime.block_on(cmd::run(cli.command, format)));

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
    fn parses_dispatch_subcommand() {
        let cli = Cli::try_parse_from([
            "storesync",
            "dispatch",
            "/tmp/test.sock",
            "--action",
            "{\"type\":\"INCREMENT\"}",
            "--name",
            "popup",
        ])
        .expect("dispatch args should parse");

        assert!(!cli.command.is_long_running());
        match cli.command {
            Command::Dispatch(args) => {
                assert_eq!(args.client.name, "popup");
                assert_eq!(args.action, "{\"type\":\"INCREMENT\"}");
            }
            other => panic!("expected dispatch, got {other:?}"),
        }
    }

    #[test]
    fn dispatch_requires_an_action() {
        let err = Cli::try_parse_from(["storesync", "dispatch", "/tmp/test.sock"])
            .expect_err("missing action should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn client_name_defaults_and_global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "storesync",
            "watch",
            "/tmp/test.sock",
            "--count",
            "2",
            "--format",
            "json",
            "--log-level",
            "debug",
        ])
        .expect("watch args should parse");

        assert!(matches!(cli.format, Some(OutputFormat::Json)));
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert!(cli.command.is_long_running());
        match cli.command {
            Command::Watch(args) => {
                assert_eq!(args.client.name, "default");
                assert_eq!(args.count, Some(2));
            }
            other => panic!("expected watch, got {other:?}"),
        }
    }
}
