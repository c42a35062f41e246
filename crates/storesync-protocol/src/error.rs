use crate::message::MessageKind;

/// Errors raised while interpreting messages received on a store channel.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The message has no string `type` tag.
    #[error("message has no string \"type\" tag")]
    MissingType,

    /// The `type` tag is not one of the known message kinds.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// The tag is known but the message body does not match its shape.
    #[error("malformed {kind} message: {source}")]
    Malformed {
        kind: MessageKind,
        #[source]
        source: serde_json::Error,
    },

    /// A well-formed message arrived at a side that never handles it.
    #[error("unexpected {kind} message received by {receiver}")]
    Unexpected {
        kind: MessageKind,
        receiver: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
