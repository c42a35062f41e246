use storesync_channel::ChannelError;
use storesync_protocol::ProtocolError;
use storesync_store::DispatchError;

/// Errors that can occur in mirror and synchronizer operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A message could not be interpreted.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Channel-level failure.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Mirror used before its first state sync arrived.
    #[error("store mirror is not ready: no state sync received yet")]
    NotReady,

    /// Operation a mirror never supports.
    #[error("{0} is not supported by a store mirror")]
    UnsupportedOperation(&'static str),

    /// The host store refused a dispatched action.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The channel went away.
    #[error("channel {0} disconnected")]
    Disconnected(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
