//! The two roles of the store synchronization protocol.
//!
//! - [`Synchronizer`] runs next to the real store. It accepts client
//!   channels, answers state sync requests, relays dispatches into the store
//!   and broadcasts every state change to every session.
//! - [`Mirror`] runs in a client context. It opens a channel, waits for the
//!   first state sync and then offers `get_state`/`subscribe`/`dispatch` as
//!   if the store were local.

pub mod error;
pub mod host;
pub mod mirror;

pub use error::{Result, SyncError};
pub use host::{expose, DisconnectCallback, HostConfig, HostSession, SessionState, Synchronizer};
pub use mirror::{
    connect, connect_narrowed, ConnectionState, DispatchFuture, Mirror, MirrorDriver,
};
