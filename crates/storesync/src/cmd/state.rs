use crate::cmd::{open_mirror, StateArgs};
use crate::exit::{sync_error, CliResult, SUCCESS};
use crate::output::{print_state, OutputFormat};

pub async fn run(args: StateArgs, format: OutputFormat) -> CliResult<i32> {
    let (mirror, _driver) = open_mirror(&args.client).await?;
    let state = mirror
        .get_state()
        .map_err(|err| sync_error("read state failed", err))?;

    print_state(mirror.channel_name(), 1, &state, format);
    Ok(SUCCESS)
}
