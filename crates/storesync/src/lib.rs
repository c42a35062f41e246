//! Keep store mirrors in sync with one canonical host store.
//!
//! A host exposes its store over named asynchronous channels; every client
//! context opens a mirror that offers the usual `get_state`/`subscribe`/
//! `dispatch` surface and stays in sync with the host.
//!
//! # Crate Structure
//!
//! - [`protocol`]: the five wire messages and channel naming
//! - [`channel`]: named message channels and the in-memory runtime
//! - [`store`]: the store contract plus a reducer store
//! - [`peer`]: the client mirror and the host synchronizer
//! - [`frame`]: framed Unix socket transport (behind `stream` feature)
//! - [`counter`]: the demo counter store served by the CLI

pub mod counter;

/// Re-export protocol types.
pub mod protocol {
    pub use storesync_protocol::*;
}

/// Re-export channel types.
pub mod channel {
    pub use storesync_channel::*;
}

/// Re-export store types.
pub mod store {
    pub use storesync_store::*;
}

/// Re-export mirror and synchronizer types.
pub mod peer {
    pub use storesync_peer::*;
}

/// Re-export stream transport types (requires `stream` feature).
#[cfg(feature = "stream")]
pub mod frame {
    pub use storesync_frame::*;
}
