//! The store contract a host exposes, plus a small reducer store.
//!
//! The synchronizer only needs three things from a store: read the current
//! state, apply an action, and be told when the state changes. [`Store`]
//! captures exactly that. [`ReducerStore`] is a Redux-style implementation
//! good enough for examples, tests and simple hosts.

pub mod error;
pub mod listeners;
pub mod reducer;
pub mod store;

pub use error::DispatchError;
pub use listeners::{Listener, Listeners, Subscription};
pub use reducer::ReducerStore;
pub use store::{DeferredDispatch, Dispatched, Store};
