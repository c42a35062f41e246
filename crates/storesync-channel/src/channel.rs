use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::debug;

use crate::error::{ChannelError, Result};

/// Sending half of a channel. Cheap to clone; every clone feeds the same peer.
#[derive(Clone)]
pub struct ChannelSender {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<Value>,
}

impl ChannelSender {
    /// Channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a message for the other end (fire-and-forget).
    ///
    /// Fails only when the other end has already gone away.
    pub fn send(&self, message: Value) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| ChannelError::Closed(self.name.to_string()))
    }

    /// Returns true once the other end has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl fmt::Debug for ChannelSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSender")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Receiving half of a channel.
pub struct ChannelReceiver {
    name: Arc<str>,
    rx: mpsc::UnboundedReceiver<Value>,
    disconnected: bool,
}

impl ChannelReceiver {
    /// Channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the next message.
    ///
    /// Returns `None` once the other end has disconnected and every queued
    /// message has been drained. After that it keeps returning `None`.
    pub async fn recv(&mut self) -> Option<Value> {
        if self.disconnected {
            return None;
        }

        match self.rx.recv().await {
            Some(message) => Some(message),
            None => {
                self.mark_disconnected();
                None
            }
        }
    }

    /// Take a queued message without waiting.
    pub fn try_recv(&mut self) -> Option<Value> {
        if self.disconnected {
            return None;
        }

        match self.rx.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.mark_disconnected();
                None
            }
        }
    }

    /// Returns true once the disconnect signal has been observed.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    fn mark_disconnected(&mut self) {
        self.disconnected = true;
        debug!(channel = %self.name, "channel disconnected");
    }
}

impl fmt::Debug for ChannelReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelReceiver")
            .field("name", &self.name)
            .field("disconnected", &self.disconnected)
            .finish()
    }
}

/// One end of a named, bidirectional message channel.
///
/// Dropping an end (including every [`ChannelSender`] cloned from it) is what
/// the other end observes as a disconnect.
#[derive(Debug)]
pub struct Channel {
    sender: ChannelSender,
    receiver: ChannelReceiver,
}

impl Channel {
    /// Create both ends of a connected channel.
    pub fn pair(name: impl Into<String>) -> (Channel, Channel) {
        let name: Arc<str> = Arc::from(name.into());
        let (left_tx, left_rx) = mpsc::unbounded_channel();
        let (right_tx, right_rx) = mpsc::unbounded_channel();

        let left = Channel {
            sender: ChannelSender {
                name: name.clone(),
                tx: right_tx,
            },
            receiver: ChannelReceiver {
                name: name.clone(),
                rx: left_rx,
                disconnected: false,
            },
        };
        let right = Channel {
            sender: ChannelSender {
                name: name.clone(),
                tx: left_tx,
            },
            receiver: ChannelReceiver {
                name,
                rx: right_rx,
                disconnected: false,
            },
        };

        (left, right)
    }

    /// Channel name.
    pub fn name(&self) -> &str {
        self.sender.name()
    }

    /// Queue a message for the other end.
    pub fn send(&self, message: Value) -> Result<()> {
        self.sender.send(message)
    }

    /// Wait for the next message; `None` means disconnected.
    pub async fn recv(&mut self) -> Option<Value> {
        self.receiver.recv().await
    }

    /// Take a queued message without waiting.
    pub fn try_recv(&mut self) -> Option<Value> {
        self.receiver.try_recv()
    }

    /// Clone the sending half.
    pub fn sender(&self) -> ChannelSender {
        self.sender.clone()
    }

    /// Split into sending and receiving halves.
    pub fn split(self) -> (ChannelSender, ChannelReceiver) {
        (self.sender, self.receiver)
    }

    /// Close this end. The other end observes a disconnect.
    pub fn disconnect(self) {
        debug!(channel = %self.name(), "closing channel");
    }
}
