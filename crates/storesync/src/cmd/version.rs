use storesync_frame::HandshakeConfig;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("storesync {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    let handshake = HandshakeConfig::default();
    println!("name: storesync");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "protocol: {} {}",
        handshake.protocol_name, handshake.protocol_version
    );
    println!(
        "target: {}",
        option_env!("STORESYNC_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("features: stream={}, cli=true", cfg!(feature = "stream"));

    Ok(SUCCESS)
}
