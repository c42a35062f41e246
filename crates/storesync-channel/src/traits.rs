use std::future::Future;

use tokio::sync::mpsc;

use crate::channel::Channel;
use crate::error::Result;

/// Client-side seam: creates outbound channels by name.
pub trait ChannelFactory: Send + Sync {
    /// Open a channel to the host under the given name.
    fn open(&self, name: &str) -> impl Future<Output = Result<Channel>> + Send;
}

/// Host-side seam: yields inbound channels, once per connecting client.
pub trait ChannelAcceptor: Send {
    /// Wait for the next inbound channel. `None` means no more will arrive.
    fn accept(&mut self) -> impl Future<Output = Option<Channel>> + Send;
}

impl ChannelAcceptor for mpsc::UnboundedReceiver<Channel> {
    fn accept(&mut self) -> impl Future<Output = Option<Channel>> + Send {
        self.recv()
    }
}

/// A [`ChannelFactory`] backed by a plain function.
#[derive(Debug, Clone)]
pub struct FnFactory<F>(F);

/// Adapt a synchronous function into a [`ChannelFactory`].
///
/// Handy where the runtime hands out channels without waiting, and in tests
/// that keep the far end of a [`Channel::pair`] as a stub.
pub fn factory_fn<F>(open: F) -> FnFactory<F>
where
    F: Fn(&str) -> Result<Channel> + Send + Sync,
{
    FnFactory(open)
}

impl<F> ChannelFactory for FnFactory<F>
where
    F: Fn(&str) -> Result<Channel> + Send + Sync,
{
    fn open(&self, name: &str) -> impl Future<Output = Result<Channel>> + Send {
        std::future::ready((self.0)(name))
    }
}
