use serde_json::Value;
use storesync_peer::SyncError;

use crate::cmd::{open_mirror, DispatchArgs};
use crate::exit::{sync_error, CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::output::{print_dispatch, DispatchOutput, DispatchStatus, OutputFormat};

pub async fn run(args: DispatchArgs, format: OutputFormat) -> CliResult<i32> {
    let action = parse_action(&args.action)?;
    let (mirror, mut driver) = open_mirror(&args.client).await?;

    let pending = mirror
        .dispatch(&action)
        .map_err(|err| sync_error("dispatch failed", err))?;
    let id = pending.id().to_string();
    tokio::pin!(pending);

    // A disconnect drops the pending entry, which settles the future.
    let outcome = loop {
        tokio::select! {
            biased;
            outcome = &mut pending => break outcome,
            step = driver.step() => {
                if let Some(result) = step {
                    result.map_err(|err| sync_error("sync failed", err))?;
                }
            }
        }
    };

    let mut out = DispatchOutput {
        channel: mirror.channel_name(),
        id: &id,
        action: &action,
        status: DispatchStatus::Resolved,
        error: None,
        state: None,
    };

    match outcome {
        Ok(()) => {
            let state = mirror
                .get_state()
                .map_err(|err| sync_error("read state failed", err))?;
            out.state = Some(&state);
            print_dispatch(&out, format);
            Ok(SUCCESS)
        }
        Err(SyncError::Dispatch(rejected)) => {
            out.status = DispatchStatus::Rejected;
            out.error = rejected.detail();
            print_dispatch(&out, format);
            Ok(FAILURE)
        }
        Err(err) => Err(sync_error("dispatch failed", err)),
    }
}

fn parse_action(input: &str) -> CliResult<Value> {
    serde_json::from_str(input)
        .map_err(|err| CliError::new(USAGE, format!("invalid --action JSON: {err}")))
}
