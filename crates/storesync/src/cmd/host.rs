use std::sync::Arc;

use storesync::counter::{counter_store, CounterStore};
use storesync_frame::UnixChannelListener;
use storesync_peer::{HostConfig, Synchronizer};
use tracing::info;

use crate::cmd::HostArgs;
use crate::exit::{frame_error, io_error, sync_error, CliResult, SUCCESS};

pub async fn run(args: HostArgs) -> CliResult<i32> {
    let listener =
        UnixChannelListener::bind(&args.path).map_err(|err| frame_error("bind failed", err))?;

    let synchronizer = Synchronizer::new(Arc::new(counter_store()))
        .with_config(HostConfig {
            fail_fast: !args.keep_going,
        })
        .on_disconnect(|channel: &str, store: &CounterStore| {
            info!(channel, counter = store.get_state().counter, "client left");
        });

    info!(path = %args.path.display(), "serving counter store");
    tokio::select! {
        served = synchronizer.serve(listener) => {
            served.map_err(|err| sync_error("host stopped", err))?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|err| io_error("signal handler failed", err))?;
            info!(
                counter = synchronizer.store().get_state().counter,
                "interrupted, shutting down"
            );
        }
    }

    Ok(SUCCESS)
}
