//! Named asynchronous message channels.
//!
//! A [`Channel`] is one end of a bidirectional pipe carrying opaque JSON
//! values. The inbound side ends exactly once, when the other end goes away;
//! that is the channel's disconnect signal.
//!
//! How channels come into existence is up to the runtime. Clients obtain them
//! through a [`ChannelFactory`], hosts through a [`ChannelAcceptor`]. The
//! in-memory [`memory_hub`] provides both for contexts living in one process.

pub mod channel;
pub mod error;
pub mod memory;
pub mod traits;

pub use channel::{Channel, ChannelReceiver, ChannelSender};
pub use error::{ChannelError, Result};
pub use memory::{memory_hub, MemoryAcceptor, MemoryConnector};
pub use traits::{factory_fn, ChannelAcceptor, ChannelFactory, FnFactory};
