//! Message protocol for mirroring a store across isolated contexts.
//!
//! One host owns the canonical store; clients hold a mirror of it. The two
//! sides talk over named channels using five message kinds:
//! - `requestStateSync` (client → host)
//! - `stateSync` (host → client)
//! - `dispatch` (client → host, correlated by id)
//! - `dispatchResolved` / `dispatchRejected` (host → client, correlated by id)
//!
//! Channels carry opaque JSON values. This crate turns them into [`Message`]s
//! and rejects anything else with a [`ProtocolError`].

pub mod error;
pub mod message;
pub mod naming;

pub use error::{ProtocolError, Result};
pub use message::{DispatchAck, DispatchFailure, Message, MessageKind};
pub use naming::{
    client_channel_name, client_name, is_client_channel, DEFAULT_CLIENT_NAME, STORE_CLIENT_PREFIX,
};
