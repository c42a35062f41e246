use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::DispatchError;
use crate::listeners::{Listener, Subscription};

/// A dispatch result that completes later.
pub type DeferredDispatch = Pin<Box<dyn Future<Output = Result<(), DispatchError>> + Send>>;

/// Outcome of [`Store::dispatch`].
pub enum Dispatched {
    /// The action was applied (or refused) before `dispatch` returned.
    Ready(Result<(), DispatchError>),
    /// The store finishes the action asynchronously.
    Deferred(DeferredDispatch),
}

impl Dispatched {
    pub fn ok() -> Self {
        Dispatched::Ready(Ok(()))
    }

    pub fn rejected(error: DispatchError) -> Self {
        Dispatched::Ready(Err(error))
    }

    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Result<(), DispatchError>> + Send + 'static,
    {
        Dispatched::Deferred(Box::pin(future))
    }
}

impl From<Result<(), DispatchError>> for Dispatched {
    fn from(result: Result<(), DispatchError>) -> Self {
        Dispatched::Ready(result)
    }
}

impl fmt::Debug for Dispatched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatched::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            Dispatched::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// The store a host exposes to its clients.
///
/// Implementations own their update semantics; the synchronizer only reads
/// state, forwards actions and listens for changes.
pub trait Store: Send + Sync + 'static {
    /// Snapshot type broadcast to clients.
    type State: Serialize;
    /// Action type decoded from client dispatches.
    type Action: DeserializeOwned + Send;

    /// Current state.
    fn state(&self) -> Self::State;

    /// Apply an action.
    fn dispatch(&self, action: Self::Action) -> Dispatched;

    /// Register a change listener, invoked after every state change.
    fn subscribe(&self, listener: Listener) -> Subscription;
}
