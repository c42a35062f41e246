use std::fmt;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ProtocolError, Result};

/// Wire tag: client asks the host for a full snapshot.
pub const REQUEST_STATE_SYNC: &str = "requestStateSync";
/// Wire tag: host pushes a full snapshot.
pub const STATE_SYNC: &str = "stateSync";
/// Wire tag: client asks the host store to apply an action.
pub const DISPATCH: &str = "dispatch";
/// Wire tag: host store accepted a dispatched action.
pub const DISPATCH_RESOLVED: &str = "dispatchResolved";
/// Wire tag: host store refused a dispatched action.
pub const DISPATCH_REJECTED: &str = "dispatchRejected";

/// The closed set of message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    RequestStateSync,
    StateSync,
    Dispatch,
    DispatchResolved,
    DispatchRejected,
}

impl MessageKind {
    /// Wire tag for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::RequestStateSync => REQUEST_STATE_SYNC,
            MessageKind::StateSync => STATE_SYNC,
            MessageKind::Dispatch => DISPATCH,
            MessageKind::DispatchResolved => DISPATCH_RESOLVED,
            MessageKind::DispatchRejected => DISPATCH_REJECTED,
        }
    }

    /// Look up a kind by wire tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            REQUEST_STATE_SYNC => Some(MessageKind::RequestStateSync),
            STATE_SYNC => Some(MessageKind::StateSync),
            DISPATCH => Some(MessageKind::Dispatch),
            DISPATCH_RESOLVED => Some(MessageKind::DispatchResolved),
            DISPATCH_REJECTED => Some(MessageKind::DispatchRejected),
            _ => None,
        }
    }

    /// Returns true for kinds that carry a dispatch correlation id.
    pub fn is_correlated(self) -> bool {
        matches!(
            self,
            MessageKind::Dispatch | MessageKind::DispatchResolved | MessageKind::DispatchRejected
        )
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a `dispatchResolved` message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DispatchAck {
    pub id: String,
}

/// Payload of a `dispatchRejected` message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DispatchFailure {
    pub id: String,
    /// Whatever error detail the host chose to transmit.
    #[serde(default)]
    pub error: Option<Value>,
}

/// A message exchanged over a store channel.
///
/// Wire shapes:
/// ```text
/// {"type":"requestStateSync"}
/// {"type":"stateSync","payload":<state>}
/// {"type":"dispatch","id":"<id>","payload":<action>}
/// {"type":"dispatchResolved","payload":{"id":"<id>"}}
/// {"type":"dispatchRejected","payload":{"id":"<id>","error":<detail>?}}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Message {
    RequestStateSync,
    StateSync { payload: Value },
    Dispatch { id: String, payload: Value },
    DispatchResolved { payload: DispatchAck },
    DispatchRejected { payload: DispatchFailure },
}

impl Message {
    /// Create a state sync request.
    pub fn request_state_sync() -> Self {
        Message::RequestStateSync
    }

    /// Create a full-state broadcast.
    pub fn state_sync(state: Value) -> Self {
        Message::StateSync { payload: state }
    }

    /// Create a dispatch request.
    pub fn dispatch(id: impl Into<String>, action: Value) -> Self {
        Message::Dispatch {
            id: id.into(),
            payload: action,
        }
    }

    /// Create a dispatch acknowledgement.
    pub fn dispatch_resolved(id: impl Into<String>) -> Self {
        Message::DispatchResolved {
            payload: DispatchAck { id: id.into() },
        }
    }

    /// Create a dispatch rejection.
    pub fn dispatch_rejected(id: impl Into<String>, error: Option<Value>) -> Self {
        Message::DispatchRejected {
            payload: DispatchFailure {
                id: id.into(),
                error,
            },
        }
    }

    /// Validate and decode a received value.
    pub fn decode(value: Value) -> Result<Self> {
        let kind = match value.get("type") {
            Some(Value::String(tag)) => MessageKind::from_tag(tag)
                .ok_or_else(|| ProtocolError::UnknownType(tag.clone()))?,
            _ => return Err(ProtocolError::MissingType),
        };

        serde_json::from_value(value).map_err(|source| ProtocolError::Malformed { kind, source })
    }

    /// Encode into the wire value handed to a channel.
    pub fn into_value(self) -> Value {
        match self {
            Message::RequestStateSync => json!({ "type": REQUEST_STATE_SYNC }),
            Message::StateSync { payload } => json!({ "type": STATE_SYNC, "payload": payload }),
            Message::Dispatch { id, payload } => {
                json!({ "type": DISPATCH, "id": id, "payload": payload })
            }
            Message::DispatchResolved { payload } => {
                json!({ "type": DISPATCH_RESOLVED, "payload": { "id": payload.id } })
            }
            Message::DispatchRejected { payload } => match payload.error {
                Some(error) => json!({
                    "type": DISPATCH_REJECTED,
                    "payload": { "id": payload.id, "error": error }
                }),
                None => json!({ "type": DISPATCH_REJECTED, "payload": { "id": payload.id } }),
            },
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::RequestStateSync => MessageKind::RequestStateSync,
            Message::StateSync { .. } => MessageKind::StateSync,
            Message::Dispatch { .. } => MessageKind::Dispatch,
            Message::DispatchResolved { .. } => MessageKind::DispatchResolved,
            Message::DispatchRejected { .. } => MessageKind::DispatchRejected,
        }
    }

    /// Correlation id, for the kinds that carry one.
    pub fn dispatch_id(&self) -> Option<&str> {
        match self {
            Message::Dispatch { id, .. } => Some(id),
            Message::DispatchResolved { payload } => Some(&payload.id),
            Message::DispatchRejected { payload } => Some(&payload.id),
            Message::RequestStateSync | Message::StateSync { .. } => None,
        }
    }
}

impl From<Message> for Value {
    fn from(message: Message) -> Self {
        message.into_value()
    }
}
