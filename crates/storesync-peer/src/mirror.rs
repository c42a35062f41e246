//! Client-side store mirror.
//!
//! A mirror is split in two: the [`Mirror`] handle the application uses, and
//! the [`MirrorDriver`] that owns the inbound side of the channel. The driver
//! handles messages one at a time; nothing reaches the mirror's snapshot or
//! settles a dispatch unless the driver is being polled.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use storesync_channel::{ChannelFactory, ChannelReceiver, ChannelSender};
use storesync_protocol::{client_channel_name, Message, MessageKind, ProtocolError};
use storesync_store::{DispatchError, Listeners, Subscription};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};

type Decode<S> = Box<dyn Fn(Value) -> serde_json::Result<S> + Send + Sync>;
type Settle = oneshot::Sender<std::result::Result<(), DispatchError>>;

/// Connection state of a mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for the first state sync.
    Connecting,
    /// At least one state sync received.
    Connected,
    /// The channel is gone. Terminal.
    Disconnected,
}

struct PendingDispatch {
    settle: Settle,
}

struct MirrorState<S> {
    connection: ConnectionState,
    snapshot: Option<S>,
    pending: HashMap<String, PendingDispatch>,
    next_dispatch: u64,
}

impl<S> MirrorState<S> {
    /// Next id not used by any in-flight dispatch.
    fn next_dispatch_id(&mut self) -> String {
        loop {
            let id = self.next_dispatch.to_string();
            self.next_dispatch = self.next_dispatch.wrapping_add(1);
            if !self.pending.contains_key(&id) {
                return id;
            }
        }
    }
}

struct Shared<S> {
    name: String,
    outbound: ChannelSender,
    state: Mutex<MirrorState<S>>,
    subscribers: Listeners,
}

impl<S> Shared<S> {
    fn lock(&self) -> MutexGuard<'_, MirrorState<S>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn disconnected(&self) -> SyncError {
        SyncError::Disconnected(self.outbound.name().to_string())
    }
}

/// Handle to a remotely held store.
///
/// Cheap to clone. Every operation fails with [`SyncError::NotReady`] until
/// the driver has received the first state sync.
pub struct Mirror<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for Mirror<S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<S> fmt::Debug for Mirror<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("Mirror")
            .field("channel", &self.shared.outbound.name())
            .field("connection", &state.connection)
            .field("pending_dispatches", &state.pending.len())
            .field("subscribers", &self.shared.subscribers.len())
            .finish()
    }
}

impl<S> Mirror<S>
where
    S: Clone + Send + 'static,
{
    /// Open the channel and request the initial state.
    ///
    /// The mirror starts out `Connecting`; drive the returned
    /// [`MirrorDriver`] to complete the handshake.
    pub async fn open<F>(name: &str, factory: &F) -> Result<(Self, MirrorDriver<S>)>
    where
        S: DeserializeOwned,
        F: ChannelFactory,
    {
        let decode: Decode<S> = Box::new(|state: Value| serde_json::from_value::<S>(state));
        Self::open_with(name, factory, decode).await
    }

    /// Like [`Mirror::open`], narrowing every received state with `narrow`.
    ///
    /// `narrow` only ever sees states broadcast by the host.
    pub async fn open_narrowed<T, F, N>(
        name: &str,
        factory: &F,
        narrow: N,
    ) -> Result<(Self, MirrorDriver<S>)>
    where
        T: DeserializeOwned + 'static,
        F: ChannelFactory,
        N: Fn(T) -> S + Send + Sync + 'static,
    {
        let decode: Decode<S> =
            Box::new(move |state: Value| serde_json::from_value::<T>(state).map(&narrow));
        Self::open_with(name, factory, decode).await
    }

    async fn open_with<F>(
        name: &str,
        factory: &F,
        decode: Decode<S>,
    ) -> Result<(Self, MirrorDriver<S>)>
    where
        F: ChannelFactory,
    {
        let channel_name = client_channel_name(name);
        let channel = factory.open(&channel_name).await?;
        let (outbound, inbound) = channel.split();

        let shared = Arc::new(Shared {
            name: name.to_string(),
            outbound,
            state: Mutex::new(MirrorState {
                connection: ConnectionState::Connecting,
                snapshot: None,
                pending: HashMap::new(),
                next_dispatch: 0,
            }),
            subscribers: Listeners::new(),
        });

        debug!(channel = %channel_name, "requesting initial state sync");
        shared
            .outbound
            .send(Message::request_state_sync().into_value())?;

        let mirror = Mirror {
            shared: shared.clone(),
        };
        let driver = MirrorDriver {
            shared,
            inbound,
            decode,
        };
        Ok((mirror, driver))
    }

    /// Client name this mirror connected as.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Full protocol channel name.
    pub fn channel_name(&self) -> &str {
        self.shared.outbound.name()
    }

    pub fn connection(&self) -> ConnectionState {
        self.shared.lock().connection
    }

    /// Number of dispatches still waiting for the host's answer.
    pub fn pending_dispatches(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Current snapshot.
    ///
    /// After a disconnect this keeps returning the last state received.
    pub fn get_state(&self) -> Result<S> {
        let state = self.shared.lock();
        match (state.connection, &state.snapshot) {
            (ConnectionState::Connecting, _) => Err(SyncError::NotReady),
            (_, Some(snapshot)) => Ok(snapshot.clone()),
            (_, None) => Err(self.shared.disconnected()),
        }
    }

    /// Register a listener called after every state sync but the first.
    pub fn subscribe<L>(&self, listener: L) -> Result<Subscription>
    where
        L: Fn() + Send + Sync + 'static,
    {
        self.ensure_ready()?;
        Ok(self.shared.subscribers.add(Arc::new(listener)))
    }

    /// Send an action to the host store.
    ///
    /// Returns once the request is queued; the returned future settles when
    /// the host answers.
    pub fn dispatch<A>(&self, action: &A) -> Result<DispatchFuture>
    where
        A: Serialize + ?Sized,
    {
        let mut state = self.shared.lock();
        match state.connection {
            ConnectionState::Connecting => return Err(SyncError::NotReady),
            ConnectionState::Disconnected => return Err(self.shared.disconnected()),
            ConnectionState::Connected => {}
        }
        let payload = serde_json::to_value(action)?;

        let id = state.next_dispatch_id();
        let (settle, settled) = oneshot::channel();
        state
            .pending
            .insert(id.clone(), PendingDispatch { settle });

        let message = Message::dispatch(id.clone(), payload).into_value();
        if let Err(err) = self.shared.outbound.send(message) {
            state.pending.remove(&id);
            return Err(err.into());
        }
        debug!(channel = %self.channel_name(), id = %id, "dispatch sent");

        Ok(DispatchFuture {
            id,
            channel: self.channel_name().to_string(),
            settled,
        })
    }

    /// Mirrors never swap their update logic; this always fails.
    pub fn replace_reducer<R>(&self, _reducer: R) -> Result<()> {
        self.ensure_ready()?;
        Err(SyncError::UnsupportedOperation("replace_reducer"))
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.shared.lock().connection {
            ConnectionState::Connecting => Err(SyncError::NotReady),
            ConnectionState::Connected | ConnectionState::Disconnected => Ok(()),
        }
    }
}

/// Completion of one remote dispatch.
///
/// Resolves to `Ok(())` on `dispatchResolved`, to [`SyncError::Dispatch`] on
/// `dispatchRejected`, and to [`SyncError::Disconnected`] if the channel goes
/// away first. Dropping it does not cancel the dispatch.
pub struct DispatchFuture {
    id: String,
    channel: String,
    settled: oneshot::Receiver<std::result::Result<(), DispatchError>>,
}

impl DispatchFuture {
    /// Correlation id sent with the dispatch.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Future for DispatchFuture {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.settled).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(Ok(()))) => Poll::Ready(Ok(())),
            Poll::Ready(Ok(Err(err))) => Poll::Ready(Err(SyncError::Dispatch(err))),
            Poll::Ready(Err(_)) => Poll::Ready(Err(SyncError::Disconnected(self.channel.clone()))),
        }
    }
}

impl fmt::Debug for DispatchFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchFuture")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .finish()
    }
}

/// Inbound half of a mirror.
pub struct MirrorDriver<S> {
    shared: Arc<Shared<S>>,
    inbound: ChannelReceiver,
    decode: Decode<S>,
}

impl<S> MirrorDriver<S>
where
    S: Clone + Send + 'static,
{
    /// Another handle to the mirror this driver feeds.
    pub fn mirror(&self) -> Mirror<S> {
        Mirror {
            shared: self.shared.clone(),
        }
    }

    /// Handle messages until the first state sync has been applied.
    pub async fn ready(&mut self) -> Result<()> {
        loop {
            match self.shared.lock().connection {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Disconnected => return Err(self.shared.disconnected()),
                ConnectionState::Connecting => {}
            }

            match self.step().await {
                Some(result) => result?,
                None => return Err(self.shared.disconnected()),
            }
        }
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

    /// Handle messages until the channel disconnects.
    ///
    /// Stops at the first message that violates the protocol and returns its
    /// error; the embedding context decides what happens next.
    pub async fn run(mut self) -> Result<()> {
        while let Some(result) = self.step().await {
            result?;
        }
        Ok(())
    }

    fn handle(&self, value: Value) -> Result<()> {
        match Message::decode(value)? {
            Message::StateSync { payload } => self.apply_state_sync(payload),
            Message::DispatchResolved { payload } => {
                self.settle(&payload.id, Ok(()));
                Ok(())
            }
            Message::DispatchRejected { payload } => {
                self.settle(&payload.id, Err(DispatchError::from_detail(payload.error)));
                Ok(())
            }
            message @ (Message::RequestStateSync | Message::Dispatch { .. }) => {
                Err(ProtocolError::Unexpected {
                    kind: message.kind(),
                    receiver: "store mirror",
                }
                .into())
            }
        }
    }

    fn apply_state_sync(&self, payload: Value) -> Result<()> {
        let snapshot = (self.decode)(payload).map_err(|source| ProtocolError::Malformed {
            kind: MessageKind::StateSync,
            source,
        })?;

        let first = {
            let mut state = self.shared.lock();
            state.snapshot = Some(snapshot);
            let first = state.connection == ConnectionState::Connecting;
            if first {
                state.connection = ConnectionState::Connected;
            }
            first
        };

        if first {
            info!(channel = %self.shared.outbound.name(), "store mirror connected");
        } else {
            self.shared.subscribers.notify();
        }
        Ok(())
    }

    fn settle(&self, id: &str, outcome: std::result::Result<(), DispatchError>) {
        let pending = self.shared.lock().pending.remove(id);
        match pending {
            Some(pending) => {
                debug!(id, resolved = outcome.is_ok(), "dispatch settled");
                // The caller may have dropped the future; the dispatch still counts.
                let _ = pending.settle.send(outcome);
            }
            None => debug!(id, "ignoring response for unknown dispatch"),
        }
    }

    fn disconnect(&self) {
        let abandoned = {
            let mut state = self.shared.lock();
            if state.connection == ConnectionState::Disconnected {
                return;
            }
            state.connection = ConnectionState::Disconnected;
            std::mem::take(&mut state.pending)
        };

        if !abandoned.is_empty() {
            warn!(
                channel = %self.shared.outbound.name(),
                count = abandoned.len(),
                "channel disconnected with dispatches in flight"
            );
        }
        info!(channel = %self.shared.outbound.name(), "store mirror disconnected");
    }
}

impl<S> fmt::Debug for MirrorDriver<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirrorDriver")
            .field("channel", &self.shared.outbound.name())
            .field("inbound", &self.inbound)
            .finish()
    }
}

/// Connect to a host store and wait for the first state sync.
///
/// Keep the returned driver running (usually `tokio::spawn(driver.run())`)
/// for the mirror to stay in sync.
pub async fn connect<S, F>(name: &str, factory: &F) -> Result<(Mirror<S>, MirrorDriver<S>)>
where
    S: DeserializeOwned + Clone + Send + 'static,
    F: ChannelFactory,
{
    let (mirror, mut driver) = Mirror::open(name, factory).await?;
    driver.ready().await?;
    Ok((mirror, driver))
}

/// Like [`connect`], narrowing every received state with `narrow`.
pub async fn connect_narrowed<T, S, F, N>(
    name: &str,
    factory: &F,
    narrow: N,
) -> Result<(Mirror<S>, MirrorDriver<S>)>
where
    T: DeserializeOwned + 'static,
    S: Clone + Send + 'static,
    F: ChannelFactory,
    N: Fn(T) -> S + Send + Sync + 'static,
{
    let (mirror, mut driver) = Mirror::open_narrowed(name, factory, narrow).await?;
    driver.ready().await?;
    Ok((mirror, driver))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::Deserialize;
    use serde_json::json;
    use storesync_channel::{factory_fn, Channel, ChannelError};

    use super::*;

    type Slot = Arc<Mutex<Option<Channel>>>;

    /// Factory that records requested names and parks the far end in a slot.
    fn stub_factory(
        preload: Option<Value>,
    ) -> (
        impl ChannelFactory,
        Arc<Mutex<Vec<String>>>,
        Slot,
    ) {
        let names = Arc::new(Mutex::new(Vec::new()));
        let slot: Slot = Arc::new(Mutex::new(None));

        let recorded = names.clone();
        let parked = slot.clone();
        let factory = factory_fn(move |name: &str| -> std::result::Result<Channel, ChannelError> {
            recorded.lock().unwrap().push(name.to_string());
            let (local, far) = Channel::pair(name);
            if let Some(state) = &preload {
                far.send(Message::state_sync(state.clone()).into_value())
                    .expect("preloaded sync should queue");
            }
            *parked.lock().unwrap() = Some(far);
            Ok(local)
        });

        (factory, names, slot)
    }

    fn take(slot: &Slot) -> Channel {
        slot.lock()
            .unwrap()
            .take()
            .expect("factory should have opened a channel")
    }

    async fn connected(initial: Value) -> (Mirror<Value>, MirrorDriver<Value>, Channel) {
        let (factory, _names, slot) = stub_factory(Some(initial));
        let (mirror, driver) = connect::<Value, _>("foo", &factory)
            .await
            .expect("mirror should connect");
        let mut host = take(&slot);
        assert_eq!(
            host.recv().await,
            Some(json!({ "type": "requestStateSync" }))
        );
        (mirror, driver, host)
    }

    #[tokio::test]
    async fn open_requests_state_sync_on_prefixed_channel() {
        let (factory, names, slot) = stub_factory(None);
        let (mirror, _driver) = Mirror::<Value>::open("foo", &factory)
            .await
            .expect("mirror should open");

        assert_eq!(names.lock().unwrap().as_slice(), ["storeClient:foo"]);
        assert_eq!(mirror.name(), "foo");
        assert_eq!(mirror.channel_name(), "storeClient:foo");

        let mut host = take(&slot);
        assert_eq!(
            host.recv().await,
            Some(json!({ "type": "requestStateSync" }))
        );
    }

    #[tokio::test]
    async fn operations_fail_before_first_sync() {
        let (factory, _names, _slot) = stub_factory(None);
        let (mirror, _driver) = Mirror::<Value>::open("foo", &factory)
            .await
            .expect("mirror should open");

        assert_eq!(mirror.connection(), ConnectionState::Connecting);
        assert!(matches!(mirror.get_state(), Err(SyncError::NotReady)));
        assert!(matches!(mirror.subscribe(|| {}), Err(SyncError::NotReady)));
        assert!(matches!(
            mirror.dispatch(&json!({ "type": "INCREMENT" })),
            Err(SyncError::NotReady)
        ));
        assert!(matches!(mirror.replace_reducer(()), Err(SyncError::NotReady)));
        assert!(matches!(
            mirror.dispatch(&unserializable_action()),
            Err(SyncError::NotReady)
        ));
        assert_eq!(mirror.pending_dispatches(), 0);
    }

    /// Map keys that are not strings have no JSON form.
    fn unserializable_action() -> std::collections::BTreeMap<Vec<u8>, u8> {
        std::collections::BTreeMap::from([(vec![1, 2], 3)])
    }

    #[tokio::test]
    async fn unserializable_action_fails_without_sending() {
        let (mirror, _driver, mut host) = connected(json!({ "bar": "baz" })).await;

        assert!(matches!(
            mirror.dispatch(&unserializable_action()),
            Err(SyncError::Json(_))
        ));
        assert_eq!(mirror.pending_dispatches(), 0);
        assert_eq!(host.try_recv(), None);
    }

    #[tokio::test]
    async fn first_state_sync_completes_connect() {
        let (factory, _names, slot) = stub_factory(None);
        let (mirror, mut driver) = Mirror::<Value>::open("foo", &factory)
            .await
            .expect("mirror should open");
        let host = take(&slot);

        host.send(json!({ "type": "stateSync", "payload": { "bar": "baz" } }))
            .expect("host send should succeed");
        driver.ready().await.expect("first sync should connect");

        assert_eq!(mirror.connection(), ConnectionState::Connected);
        assert_eq!(mirror.get_state().unwrap(), json!({ "bar": "baz" }));
    }

    #[tokio::test]
    async fn later_syncs_replace_snapshot_and_notify_in_order() {
        let (mirror, mut driver, host) = connected(json!({ "bar": "baz" })).await;
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let reader = mirror.clone();
            let seen = seen.clone();
            mirror
                .subscribe(move || {
                    let state = reader.get_state().expect("state should be readable");
                    seen.lock().unwrap().push((tag, state));
                })
                .expect("subscribe should succeed");
        }

        host.send(Message::state_sync(json!({ "abc": "xyz" })).into_value())
            .unwrap();
        driver.step().await.expect("channel should be open").unwrap();

        assert_eq!(mirror.get_state().unwrap(), json!({ "abc": "xyz" }));
        assert_eq!(
            *seen.lock().unwrap(),
            [
                ("first", json!({ "abc": "xyz" })),
                ("second", json!({ "abc": "xyz" }))
            ]
        );
    }

    #[tokio::test]
    async fn unsubscribe_removes_exactly_one_registration() {
        let (mirror, mut driver, host) = connected(json!(0)).await;
        let calls = Arc::new(AtomicUsize::new(0));

        let counted = calls.clone();
        let kept = mirror
            .subscribe(move || {
                counted.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        let counted = calls.clone();
        let dropped = mirror
            .subscribe(move || {
                counted.fetch_add(100, Ordering::SeqCst);
            })
            .unwrap();

        assert!(dropped.unsubscribe());
        assert!(!dropped.unsubscribe());

        host.send(Message::state_sync(json!(1)).into_value()).unwrap();
        driver.step().await.unwrap().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(kept.is_active());
    }

    #[tokio::test]
    async fn dispatch_sends_correlated_request_and_resolves() {
        let (mirror, mut driver, mut host) = connected(json!({ "counter": 0 })).await;

        let pending = mirror
            .dispatch(&json!({ "type": "INCREMENT" }))
            .expect("dispatch should be sent");
        let request = host.recv().await.expect("dispatch should arrive");
        assert_eq!(
            request,
            json!({ "type": "dispatch", "id": pending.id(), "payload": { "type": "INCREMENT" } })
        );
        assert_eq!(mirror.pending_dispatches(), 1);

        host.send(Message::dispatch_resolved(pending.id()).into_value())
            .unwrap();
        driver.step().await.unwrap().unwrap();

        pending.await.expect("dispatch should resolve");
        assert_eq!(mirror.pending_dispatches(), 0);
    }

    #[tokio::test]
    async fn rejected_dispatch_carries_transmitted_error() {
        let (mirror, mut driver, host) = connected(json!({})).await;

        let with_detail = mirror.dispatch(&json!({ "type": "A" })).unwrap();
        let without_detail = mirror.dispatch(&json!({ "type": "B" })).unwrap();

        host.send(
            Message::dispatch_rejected(with_detail.id(), Some(json!("blam!"))).into_value(),
        )
        .unwrap();
        host.send(Message::dispatch_rejected(without_detail.id(), None).into_value())
            .unwrap();
        driver.step().await.unwrap().unwrap();
        driver.step().await.unwrap().unwrap();

        match with_detail.await {
            Err(SyncError::Dispatch(err)) => assert_eq!(err.detail(), Some(&json!("blam!"))),
            other => panic!("expected rejection, got {other:?}"),
        }
        match without_detail.await {
            Err(SyncError::Dispatch(err)) => assert_eq!(err, DispatchError::empty()),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_and_unknown_responses_are_ignored() {
        let (mirror, mut driver, host) = connected(json!({})).await;
        let pending = mirror.dispatch(&json!({ "type": "A" })).unwrap();
        let id = pending.id().to_string();

        host.send(Message::dispatch_resolved(&id).into_value()).unwrap();
        host.send(Message::dispatch_rejected(&id, Some(json!("late"))).into_value())
            .unwrap();
        host.send(Message::dispatch_resolved("never-sent").into_value())
            .unwrap();
        for _ in 0..3 {
            driver.step().await.unwrap().expect("responses should be tolerated");
        }

        pending.await.expect("first response wins");
        assert_eq!(mirror.pending_dispatches(), 0);
    }

    #[tokio::test]
    async fn in_flight_ids_are_unique_and_syncs_may_interleave() {
        let (mirror, mut driver, mut host) = connected(json!({ "counter": 0 })).await;

        let first = mirror.dispatch(&json!({ "type": "INCREMENT" })).unwrap();
        let second = mirror.dispatch(&json!({ "type": "INCREMENT" })).unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(host.recv().await.unwrap()["id"], json!(first.id()));
        assert_eq!(host.recv().await.unwrap()["id"], json!(second.id()));

        host.send(Message::state_sync(json!({ "counter": 1 })).into_value())
            .unwrap();
        host.send(Message::dispatch_resolved(second.id()).into_value())
            .unwrap();
        host.send(Message::state_sync(json!({ "counter": 2 })).into_value())
            .unwrap();
        host.send(Message::dispatch_resolved(first.id()).into_value())
            .unwrap();
        for _ in 0..4 {
            driver.step().await.unwrap().unwrap();
        }

        second.await.unwrap();
        first.await.unwrap();
        assert_eq!(mirror.get_state().unwrap(), json!({ "counter": 2 }));
    }

    #[tokio::test]
    async fn unknown_message_type_is_protocol_error() {
        let (_mirror, mut driver, host) = connected(json!({})).await;

        host.send(json!({ "type": "reduxAction", "payload": {} }))
            .unwrap();
        let result = driver.step().await.expect("channel should be open");
        assert!(matches!(
            result,
            Err(SyncError::Protocol(ProtocolError::UnknownType(ref tag))) if tag == "reduxAction"
        ));

        host.send(Message::request_state_sync().into_value()).unwrap();
        let result = driver.step().await.expect("channel should be open");
        assert!(matches!(
            result,
            Err(SyncError::Protocol(ProtocolError::Unexpected {
                kind: MessageKind::RequestStateSync,
                ..
            }))
        ));
    }

    #[tokio::test]
    async fn protocol_error_during_handshake_fails_connect() {
        let (factory, _names, slot) = stub_factory(None);
        let (_mirror, mut driver) = Mirror::<Value>::open("foo", &factory).await.unwrap();
        let host = take(&slot);

        host.send(json!({ "type": "bogus" })).unwrap();
        assert!(matches!(
            driver.ready().await,
            Err(SyncError::Protocol(ProtocolError::UnknownType(_)))
        ));
    }

    #[tokio::test]
    async fn replace_reducer_is_unsupported() {
        let (mirror, _driver, _host) = connected(json!({})).await;
        assert!(matches!(
            mirror.replace_reducer(|state: &Value| state.clone()),
            Err(SyncError::UnsupportedOperation("replace_reducer"))
        ));
    }

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Remote {
        counter: i64,
        #[allow(dead_code)]
        history: Vec<i64>,
    }

    #[tokio::test]
    async fn narrowing_applies_to_every_sync_only() {
        let narrowed = Arc::new(AtomicUsize::new(0));
        let counted = narrowed.clone();
        let (factory, _names, slot) = stub_factory(Some(json!({ "counter": 1, "history": [] })));

        let (mirror, mut driver) = connect_narrowed("popup", &factory, move |remote: Remote| {
            counted.fetch_add(1, Ordering::SeqCst);
            remote.counter
        })
        .await
        .expect("mirror should connect");
        let mut host = take(&slot);
        host.recv().await.expect("state request should arrive");

        assert_eq!(mirror.get_state().unwrap(), 1);
        let _pending = mirror.dispatch(&json!({ "type": "INCREMENT" })).unwrap();
        assert_eq!(narrowed.load(Ordering::SeqCst), 1);

        host.send(Message::state_sync(json!({ "counter": 2, "history": [1] })).into_value())
            .unwrap();
        driver.step().await.unwrap().unwrap();

        assert_eq!(mirror.get_state().unwrap(), 2);
        assert_eq!(narrowed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn state_of_wrong_shape_is_malformed() {
        let (factory, _names, slot) = stub_factory(None);
        let (_mirror, mut driver) = Mirror::<Remote>::open("foo", &factory).await.unwrap();
        let host = take(&slot);

        host.send(Message::state_sync(json!({ "counter": "many" })).into_value())
            .unwrap();
        assert!(matches!(
            driver.step().await,
            Some(Err(SyncError::Protocol(ProtocolError::Malformed {
                kind: MessageKind::StateSync,
                ..
            })))
        ));
    }

    #[tokio::test]
    async fn disconnect_fails_pending_and_later_dispatches() {
        let (mirror, mut driver, host) = connected(json!({ "counter": 3 })).await;
        let pending = mirror.dispatch(&json!({ "type": "INCREMENT" })).unwrap();

        drop(host);
        assert!(driver.step().await.is_none());
        assert!(driver.step().await.is_none());

        assert_eq!(mirror.connection(), ConnectionState::Disconnected);
        assert!(matches!(pending.await, Err(SyncError::Disconnected(_))));
        assert!(matches!(
            mirror.dispatch(&json!({ "type": "INCREMENT" })),
            Err(SyncError::Disconnected(_))
        ));
        assert_eq!(mirror.get_state().unwrap(), json!({ "counter": 3 }));
    }

    #[tokio::test]
    async fn disconnect_before_first_sync_fails_connect() {
        let (factory, _names, slot) = stub_factory(None);
        let (mirror, mut driver) = Mirror::<Value>::open("foo", &factory).await.unwrap();
        drop(take(&slot));

        assert!(matches!(
            driver.ready().await,
            Err(SyncError::Disconnected(ref name)) if name == "storeClient:foo"
        ));
        assert!(matches!(
            mirror.get_state(),
            Err(SyncError::Disconnected(_))
        ));
    }

    #[tokio::test]
    async fn run_returns_after_disconnect() {
        let (mirror, driver, host) = connected(json!({ "counter": 0 })).await;
        host.send(Message::state_sync(json!({ "counter": 9 })).into_value())
            .unwrap();
        drop(host);

        driver.run().await.expect("clean disconnect is not an error");
        assert_eq!(mirror.get_state().unwrap(), json!({ "counter": 9 }));
    }
}
