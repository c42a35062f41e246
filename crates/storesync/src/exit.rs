use std::fmt;
use std::io;

use storesync_channel::ChannelError;
use storesync_frame::FrameError;
use storesync_peer::SyncError;

// Exit codes follow the sysexits/timeout(1) conventions.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::AddrInUse => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::Bind { ref source, .. } | FrameError::Connect { ref source, .. } => {
            let code = match source.kind() {
                io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
                _ => TRANSPORT_ERROR,
            };
            CliError::new(code, format!("{context}: {err}"))
        }
        FrameError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        FrameError::InvalidMagic | FrameError::PayloadTooLarge { .. } | FrameError::Json(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    match err {
        ChannelError::Open { source, .. } => match source.downcast::<FrameError>() {
            Ok(frame) => frame_error(context, *frame),
            Err(other) => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
        },
        ChannelError::Closed(_) => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn sync_error(context: &str, err: SyncError) -> CliError {
    match err {
        SyncError::Channel(err) => channel_error(context, err),
        SyncError::Protocol(_) | SyncError::Json(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        SyncError::UnsupportedOperation(_) => CliError::new(USAGE, format!("{context}: {err}")),
        SyncError::Dispatch(_) | SyncError::Disconnected(_) | SyncError::NotReady => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use storesync_store::DispatchError;

    use super::*;

    #[test]
    fn refused_connection_is_a_transport_error() {
        let err = FrameError::Connect {
            path: PathBuf::from("/tmp/missing.sock"),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        let cli = channel_error("connect failed", ChannelError::open("storeClient:cli", err));

        assert_eq!(cli.code, TRANSPORT_ERROR);
        assert!(cli.message.starts_with("connect failed: "));
    }

    #[test]
    fn handshake_timeout_maps_to_timeout() {
        let err = SyncError::Channel(ChannelError::open(
            "storeClient:cli",
            FrameError::Timeout(Duration::from_secs(5)),
        ));

        assert_eq!(sync_error("connect failed", err).code, TIMEOUT);
    }

    #[test]
    fn protocol_and_dispatch_failures() {
        let protocol = SyncError::Protocol(storesync_protocol::ProtocolError::MissingType);
        assert_eq!(sync_error("sync failed", protocol).code, DATA_INVALID);

        let rejected = SyncError::Dispatch(DispatchError::new("nope"));
        assert_eq!(sync_error("dispatch failed", rejected).code, FAILURE);

        let gone = SyncError::Disconnected("storeClient:cli".to_string());
        assert_eq!(sync_error("dispatch failed", gone).code, FAILURE);
    }

    #[test]
    fn permission_denied_is_reported_as_such() {
        let err = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(io_error("bind failed", err).code, PERMISSION_DENIED);
    }
}
