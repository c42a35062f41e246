//! A counter store, the smallest useful thing to synchronize.

use serde::{Deserialize, Serialize};
use storesync_store::ReducerStore;

/// Counter state, `{"counter": n}` on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub counter: i64,
}

/// Actions understood by [`reduce`].
///
/// Any other `type` decodes as [`CounterAction::Other`] and leaves the state
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CounterAction {
    Increment,
    Decrement,
    #[serde(other)]
    Other,
}

pub type CounterStore = ReducerStore<Counter, CounterAction>;

pub fn reduce(state: &Counter, action: &CounterAction) -> Counter {
    match action {
        CounterAction::Increment => Counter {
            counter: state.counter.saturating_add(1),
        },
        CounterAction::Decrement => Counter {
            counter: state.counter.saturating_sub(1),
        },
        CounterAction::Other => *state,
    }
}

/// A fresh store at `{"counter": 0}`.
pub fn counter_store() -> CounterStore {
    ReducerStore::new(Counter::default(), reduce)
}
