use tokio::sync::mpsc;
use tracing::debug;

use crate::cmd::{open_mirror, WatchArgs};
use crate::exit::{io_error, sync_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_state, OutputFormat};

pub async fn run(args: WatchArgs, format: OutputFormat) -> CliResult<i32> {
    let (mirror, mut driver) = open_mirror(&args.client).await?;
    let channel = mirror.channel_name().to_string();

    let (changed, mut changes) = mpsc::unbounded_channel();
    let _subscription = mirror
        .subscribe(move || {
            let _ = changed.send(());
        })
        .map_err(|err| sync_error("subscribe failed", err))?;

    let mut printed = 0usize;
    let show = |printed: &mut usize| -> CliResult<bool> {
        let state = mirror
            .get_state()
            .map_err(|err| sync_error("read state failed", err))?;
        *printed = printed.saturating_add(1);
        print_state(&channel, *printed, &state, format);
        Ok(args.count.is_some_and(|count| *printed >= count))
    };

    if show(&mut printed)? {
        return Ok(SUCCESS);
    }

    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            biased;
            Some(()) = changes.recv() => {
                if show(&mut printed)? {
                    return Ok(SUCCESS);
                }
            }
            step = driver.step() => match step {
                Some(result) => result.map_err(|err| sync_error("sync failed", err))?,
                None => {
                    return Err(CliError::new(
                        FAILURE,
                        format!("channel {channel} disconnected"),
                    ));
                }
            },
            signal = &mut interrupted => {
                signal.map_err(|err| io_error("signal handler failed", err))?;
                debug!(printed, "interrupted");
                return Ok(SUCCESS);
            }
        }
    }
}
