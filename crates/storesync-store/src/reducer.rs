use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

use crate::error::DispatchError;
use crate::listeners::{Listener, Listeners, Subscription};
use crate::store::{Dispatched, Store};

type Reducer<S, A> = Box<dyn Fn(&S, &A) -> Result<S, DispatchError> + Send + Sync>;

/// Redux-style store: state replaced by a reducer on every dispatch.
///
/// Every successful dispatch notifies every listener, whether or not the
/// reducer changed anything.
pub struct ReducerStore<S, A> {
    state: Mutex<S>,
    reducer: Reducer<S, A>,
    listeners: Listeners,
}

impl<S, A> ReducerStore<S, A>
where
    S: Clone + Send + 'static,
    A: 'static,
{
    /// Create a store with a reducer that accepts every action.
    pub fn new<R>(initial: S, reducer: R) -> Self
    where
        R: Fn(&S, &A) -> S + Send + Sync + 'static,
    {
        Self::fallible(initial, move |state, action| Ok(reducer(state, action)))
    }

    /// Create a store whose reducer may refuse an action.
    ///
    /// A refused action leaves the state untouched and notifies nobody.
    pub fn fallible<R>(initial: S, reducer: R) -> Self
    where
        R: Fn(&S, &A) -> Result<S, DispatchError> + Send + Sync + 'static,
    {
        Self {
            state: Mutex::new(initial),
            reducer: Box::new(reducer),
            listeners: Listeners::new(),
        }
    }

    /// Current state.
    pub fn get_state(&self) -> S {
        lock(&self.state).clone()
    }

    /// Apply an action synchronously.
    pub fn apply(&self, action: &A) -> Result<(), DispatchError> {
        {
            let mut state = lock(&self.state);
            let next = (self.reducer)(&state, action)?;
            *state = next;
        }
        trace!(listeners = self.listeners.len(), "store state replaced");
        self.listeners.notify();
        Ok(())
    }

    /// Number of registered change listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl<S, A> Store for ReducerStore<S, A>
where
    S: Clone + Serialize + Send + 'static,
    A: DeserializeOwned + Send + 'static,
{
    type State = S;
    type Action = A;

    fn state(&self) -> S {
        self.get_state()
    }

    fn dispatch(&self, action: A) -> Dispatched {
        self.apply(&action).into()
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        self.listeners.add(listener)
    }
}

impl<S, A> fmt::Debug for ReducerStore<S, A>
where
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReducerStore")
            .field("state", &*lock(&self.state))
            .field("listeners", &self.listeners)
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
