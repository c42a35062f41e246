//! Host-side synchronizer.
//!
//! Every accepted client channel gets its own [`HostSession`]. A session
//! relays dispatches into the shared store and broadcasts each store change
//! as a full `stateSync` on its channel.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use futures_util::FutureExt;
use serde_json::Value;
use storesync_channel::{Channel, ChannelAcceptor, ChannelReceiver, ChannelSender};
use storesync_protocol::{is_client_channel, Message, ProtocolError};
use storesync_store::{DispatchError, Dispatched, Store, Subscription};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::Result;

/// Called once per session after its channel disconnects, with the channel
/// name and the store.
pub type DisconnectCallback<St> = Arc<dyn Fn(&str, &St) + Send + Sync>;

/// Host behavior knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostConfig {
    /// Stop serving when any session hits a protocol error.
    pub fail_fast: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self { fail_fast: true }
    }
}

/// Session lifecycle. `Active` until the channel disconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Disconnected,
}

/// Exposes one store to any number of client channels.
pub struct Synchronizer<St: Store> {
    store: Arc<St>,
    on_disconnect: Option<DisconnectCallback<St>>,
    config: HostConfig,
}

impl<St: Store> Synchronizer<St> {
    pub fn new(store: Arc<St>) -> Self {
        Self {
            store,
            on_disconnect: None,
            config: HostConfig::default(),
        }
    }

    /// Run `callback` whenever a session's channel disconnects.
    pub fn on_disconnect<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &St) + Send + Sync + 'static,
    {
        self.on_disconnect = Some(Arc::new(callback));
        self
    }

    pub fn with_config(mut self, config: HostConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &Arc<St> {
        &self.store
    }

    /// Start a session on `channel`.
    ///
    /// Channels outside the `storeClient:` namespace are handed back
    /// untouched.
    pub fn attach(&self, channel: Channel) -> std::result::Result<HostSession<St>, Channel> {
        if !is_client_channel(channel.name()) {
            return Err(channel);
        }
        Ok(HostSession::open(
            self.store.clone(),
            channel,
            self.on_disconnect.clone(),
        ))
    }

    /// Accept channels until the acceptor is exhausted, then wait for every
    /// session to end.
    pub async fn serve<A>(&self, mut acceptor: A) -> Result<()>
    where
        A: ChannelAcceptor,
    {
        let mut sessions = JoinSet::new();
        let mut accepting = true;

        loop {
            tokio::select! {
                accepted = acceptor.accept(), if accepting => match accepted {
                    Some(channel) => match self.attach(channel) {
                        Ok(session) => {
                            sessions.spawn(session.run());
                        }
                        Err(channel) => {
                            warn!(channel = %channel.name(), "ignoring channel outside the store namespace");
                        }
                    },
                    None => {
                        debug!("channel acceptor exhausted");
                        accepting = false;
                    }
                },
                Some(joined) = sessions.join_next() => self.reap(joined)?,
                else => break,
            }
        }

        Ok(())
    }

    fn reap(
        &self,
        joined: std::result::Result<Result<()>, tokio::task::JoinError>,
    ) -> Result<()> {
        match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) if self.config.fail_fast => Err(err),
            Ok(Err(err)) => {
                warn!(error = %err, "store session ended with an error");
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "store session task failed");
                Ok(())
            }
        }
    }
}

impl<St: Store> fmt::Debug for Synchronizer<St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synchronizer")
            .field("config", &self.config)
            .field("on_disconnect", &self.on_disconnect.is_some())
            .finish()
    }
}

/// One client channel served by the host.
pub struct HostSession<St: Store> {
    store: Arc<St>,
    outbound: ChannelSender,
    inbound: ChannelReceiver,
    subscription: Subscription,
    state: SessionState,
    on_disconnect: Option<DisconnectCallback<St>>,
}

impl<St: Store> HostSession<St> {
    fn open(
        store: Arc<St>,
        channel: Channel,
        on_disconnect: Option<DisconnectCallback<St>>,
    ) -> Self {
        let (outbound, inbound) = channel.split();

        let weak: Weak<St> = Arc::downgrade(&store);
        let broadcast = outbound.clone();
        let subscription = store.subscribe(Arc::new(move || {
            if let Some(store) = weak.upgrade() {
                send_state_sync(&broadcast, store.as_ref());
            }
        }));

        info!(channel = %outbound.name(), "store session opened");
        Self {
            store,
            outbound,
            inbound,
            subscription,
            state: SessionState::Active,
            on_disconnect,
        }
    }

    pub fn channel_name(&self) -> &str {
        self.outbound.name()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Handle the next inbound message.
    ///
    /// Returns `None` once the channel has disconnected.
    pub async fn step(&mut self) -> Option<Result<()>> {
        match self.inbound.recv().await {
            Some(value) => Some(self.handle(value)),
            None => {
                self.disconnect();
                None
            }
        }
    }

    /// Serve the channel until it disconnects or a protocol error occurs.
    pub async fn run(mut self) -> Result<()> {
        while let Some(result) = self.step().await {
            result?;
        }
        Ok(())
    }

    fn handle(&self, value: Value) -> Result<()> {
        match Message::decode(value)? {
            Message::RequestStateSync => {
                debug!(channel = %self.channel_name(), "state sync requested");
                send_state_sync(&self.outbound, self.store.as_ref());
                Ok(())
            }
            Message::Dispatch { id, payload } => {
                self.dispatch(id, payload);
                Ok(())
            }
            message @ (Message::StateSync { .. }
            | Message::DispatchResolved { .. }
            | Message::DispatchRejected { .. }) => Err(ProtocolError::Unexpected {
                kind: message.kind(),
                receiver: "store host",
            }
            .into()),
        }
    }

    fn dispatch(&self, id: String, payload: Value) {
        let action: St::Action = match serde_json::from_value(payload) {
            Ok(action) => action,
            Err(err) => {
                warn!(channel = %self.channel_name(), id = %id, error = %err, "rejecting undecodable action");
                respond(
                    &self.outbound,
                    id,
                    Err(DispatchError::new(format!("invalid action: {err}"))),
                );
                return;
            }
        };

        debug!(channel = %self.channel_name(), id = %id, "applying dispatched action");
        let dispatched = panic::catch_unwind(AssertUnwindSafe(|| self.store.dispatch(action)))
            .unwrap_or_else(|_| Dispatched::rejected(store_panicked()));

        match dispatched {
            Dispatched::Ready(outcome) => respond(&self.outbound, id, outcome),
            Dispatched::Deferred(pending) => {
                let outbound = self.outbound.clone();
                tokio::spawn(async move {
                    let outcome = AssertUnwindSafe(pending)
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| Err(store_panicked()));
                    respond(&outbound, id, outcome);
                });
            }
        }
    }

    fn disconnect(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }
        self.state = SessionState::Disconnected;
        self.subscription.unsubscribe();
        info!(channel = %self.channel_name(), "store session closed");

        if let Some(callback) = &self.on_disconnect {
            callback(self.outbound.name(), self.store.as_ref());
        }
    }
}

impl<St: Store> Drop for HostSession<St> {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}

impl<St: Store> fmt::Debug for HostSession<St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostSession")
            .field("channel", &self.channel_name())
            .field("state", &self.state)
            .finish()
    }
}

/// Expose `store` on every store channel `acceptor` yields.
///
/// Returns once the acceptor is exhausted and every session has ended.
pub async fn expose<St, A>(
    store: Arc<St>,
    acceptor: A,
    on_disconnect: Option<DisconnectCallback<St>>,
) -> Result<()>
where
    St: Store,
    A: ChannelAcceptor,
{
    let mut synchronizer = Synchronizer::new(store);
    synchronizer.on_disconnect = on_disconnect;
    synchronizer.serve(acceptor).await
}

fn store_panicked() -> DispatchError {
    DispatchError::new("store panicked while applying the action")
}

fn respond(outbound: &ChannelSender, id: String, outcome: std::result::Result<(), DispatchError>) {
    let message = match outcome {
        Ok(()) => Message::dispatch_resolved(id),
        Err(err) => Message::dispatch_rejected(id, err.into_detail()),
    };
    if let Err(err) = outbound.send(message.into_value()) {
        debug!(error = %err, "dropping dispatch response");
    }
}

fn send_state_sync<St: Store>(outbound: &ChannelSender, store: &St) {
    let state = match serde_json::to_value(store.state()) {
        Ok(state) => state,
        Err(err) => {
            error!(channel = %outbound.name(), error = %err, "failed to serialize store state");
            return;
        }
    };
    if let Err(err) = outbound.send(Message::state_sync(state).into_value()) {
        debug!(error = %err, "dropping state sync");
    }
}
