//! In-process channel runtime.
//!
//! Connectors and the acceptor share a queue: every connect creates a
//! [`Channel::pair`], keeps one end and queues the other for the acceptor.

use std::future::Future;

use tokio::sync::mpsc;
use tracing::debug;

use crate::channel::Channel;
use crate::error::{ChannelError, Result};
use crate::traits::{ChannelAcceptor, ChannelFactory};

/// Create a connected connector/acceptor pair.
pub fn memory_hub() -> (MemoryConnector, MemoryAcceptor) {
    let (inbound, queue) = mpsc::unbounded_channel();
    (MemoryConnector { inbound }, MemoryAcceptor { queue })
}

/// Opens channels towards a [`MemoryAcceptor`]. Clone it for every client.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    inbound: mpsc::UnboundedSender<Channel>,
}

impl MemoryConnector {
    /// Open a channel immediately.
    pub fn connect(&self, name: &str) -> Result<Channel> {
        let (local, remote) = Channel::pair(name);
        self.inbound
            .send(remote)
            .map_err(|_| ChannelError::open(name, "memory acceptor is gone"))?;
        debug!(channel = name, "opened in-memory channel");
        Ok(local)
    }
}

impl ChannelFactory for MemoryConnector {
    fn open(&self, name: &str) -> impl Future<Output = Result<Channel>> + Send {
        std::future::ready(self.connect(name))
    }
}

/// Receives channels opened through the matching [`MemoryConnector`]s.
///
/// Exhausted once every connector has been dropped and the queue is drained.
#[derive(Debug)]
pub struct MemoryAcceptor {
    queue: mpsc::UnboundedReceiver<Channel>,
}

impl ChannelAcceptor for MemoryAcceptor {
    fn accept(&mut self) -> impl Future<Output = Option<Channel>> + Send {
        self.queue.recv()
    }
}
