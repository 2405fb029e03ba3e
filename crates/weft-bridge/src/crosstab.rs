//! Cross-context broadcast synchronization.
//!
//! Multiple execution contexts of the same application each hold an
//! independent modern store; this layer keeps them eventually consistent.
//! Every local write schedules a throttled broadcast of the full current
//! state. Envelopes are last-writer-wins snapshots: no cross-context diffing,
//! no ordering metadata.
//!
//! Message delivery is asynchronous, so echo suppression is identity-based:
//! each sync session carries a random `origin_id` and discards its own
//! envelopes on receipt. The boolean guard here only prevents a remotely
//! applied patch from being re-broadcast.
//!
//! Two transports are supported: a [`BroadcastBus`] (named in-process pub/sub
//! channels, the `BroadcastChannel` analogue) and a [`SharedStorage`]
//! key-value map with change events (the `localStorage` fallback). Envelopes
//! are published to both when both are configured; receiving prefers the bus.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use weft_core::{ModernStore, StateTree, SubscriptionGuard, WeftResult};

/// Library-wide default broadcast channel name.
pub const DEFAULT_CHANNEL: &str = "weft-session-sync";

/// Default trailing-edge throttle window for outgoing broadcasts.
pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(100);

const BUS_CHANNEL_CAPACITY: usize = 64;

/// The message unit propagated across contexts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Identity of the sync session that sent this envelope; used solely to
    /// reject self-originated echoes.
    pub origin_id: Uuid,
    /// Target store identifier; envelopes for other stores are discarded.
    pub store_id: String,
    /// Full state snapshot of the sender's store.
    pub payload: StateTree,
}

impl Envelope {
    /// Encode for the wire.
    pub fn encode(&self) -> WeftResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a wire message.
    pub fn decode(message: &str) -> WeftResult<Self> {
        Ok(serde_json::from_str(message)?)
    }
}

/// Named in-process pub/sub channels shared by all contexts of one
/// application.
#[derive(Clone, Default)]
pub struct BroadcastBus {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<String>>>>,
}

impl BroadcastBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, name: &str) -> Option<broadcast::Sender<String>> {
        let mut channels = self.channels.lock().ok()?;
        Some(
            channels
                .entry(name.to_string())
                .or_insert_with(|| broadcast::channel(BUS_CHANNEL_CAPACITY).0)
                .clone(),
        )
    }

    /// Publish a message on a named channel. Messages with no listeners are
    /// dropped silently.
    pub fn publish(&self, name: &str, message: String) {
        if let Some(sender) = self.sender(name) {
            let _ = sender.send(message);
        }
    }

    /// Subscribe to a named channel.
    pub fn subscribe(&self, name: &str) -> Option<broadcast::Receiver<String>> {
        self.sender(name).map(|sender| sender.subscribe())
    }
}

/// Change notification emitted by [`SharedStorage`].
#[derive(Debug, Clone)]
pub struct StorageEvent {
    /// The key that was written.
    pub key: String,
    /// The value it was written to.
    pub new_value: String,
}

struct StorageInner {
    items: Mutex<HashMap<String, String>>,
    events: broadcast::Sender<StorageEvent>,
}

/// Shared key-value store with change events: the fallback transport when no
/// broadcast bus is available. Any context observes writes made by any other
/// context to the shared map (the writer included; origin filtering handles
/// that).
#[derive(Clone)]
pub struct SharedStorage {
    inner: Arc<StorageInner>,
}

impl SharedStorage {
    /// Create an empty storage map.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StorageInner {
                items: Mutex::new(HashMap::new()),
                events: broadcast::channel(BUS_CHANNEL_CAPACITY).0,
            }),
        }
    }

    /// Write a key, notifying watchers.
    pub fn set_item(&self, key: &str, value: String) {
        if let Ok(mut items) = self.inner.items.lock() {
            items.insert(key.to_string(), value.clone());
        }
        let _ = self.inner.events.send(StorageEvent {
            key: key.to_string(),
            new_value: value,
        });
    }

    /// Read a key.
    pub fn get_item(&self, key: &str) -> Option<String> {
        self.inner.items.lock().ok()?.get(key).cloned()
    }

    /// Watch for writes to any key.
    pub fn watch(&self) -> broadcast::Receiver<StorageEvent> {
        self.inner.events.subscribe()
    }
}

impl Default for SharedStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// Options accepted by [`setup_cross_context_sync`].
#[derive(Clone, Default)]
pub struct CrossContextOptions {
    /// Broadcast channel name; [`DEFAULT_CHANNEL`] when absent.
    pub channel_name: Option<String>,
    /// Trailing-edge throttle window; [`DEFAULT_THROTTLE`] when absent.
    pub throttle: Option<Duration>,
    /// Primary transport.
    pub bus: Option<BroadcastBus>,
    /// Fallback transport, also published to when the bus is present.
    pub storage_fallback: Option<SharedStorage>,
}

struct Publisher {
    bus: Option<BroadcastBus>,
    storage: Option<SharedStorage>,
    channel: String,
    origin_id: Uuid,
    store_id: String,
}

impl Publisher {
    fn publish(&self, payload: StateTree) {
        let envelope = Envelope {
            origin_id: self.origin_id,
            store_id: self.store_id.clone(),
            payload,
        };
        let message = match envelope.encode() {
            Ok(message) => message,
            Err(error) => {
                debug!(%error, "failed to encode broadcast envelope, dropping");
                return;
            }
        };
        if let Some(bus) = &self.bus {
            bus.publish(&self.channel, message.clone());
        }
        if let Some(storage) = &self.storage {
            storage.set_item(&self.channel, message);
        }
    }
}

struct RemoteApply {
    store: Arc<dyn ModernStore>,
    origin_id: Uuid,
    applying_remote: Arc<AtomicBool>,
    // Serializes envelope application across the asynchronous gap; a bare
    // boolean set before an await could be cleared by a competing apply.
    apply_lock: async_lock::Mutex<()>,
}

impl RemoteApply {
    async fn apply(&self, message: &str) {
        let envelope = match Envelope::decode(message) {
            Ok(envelope) => envelope,
            Err(error) => {
                debug!(%error, "discarding malformed broadcast envelope");
                return;
            }
        };
        if envelope.origin_id == self.origin_id {
            return;
        }
        if envelope.store_id != self.store.id() {
            debug!(
                envelope_store = %envelope.store_id,
                local_store = %self.store.id(),
                "discarding envelope for a different store"
            );
            return;
        }

        let _lock = self.apply_lock.lock().await;
        self.applying_remote.store(true, Ordering::SeqCst);
        self.store.patch(envelope.payload);
        self.applying_remote.store(false, Ordering::SeqCst);
    }
}

async fn debounce_loop(
    mut rx: mpsc::UnboundedReceiver<StateTree>,
    throttle: Duration,
    publisher: Publisher,
) {
    while let Some(mut latest) = rx.recv().await {
        // Trailing-edge debounce: every further write within the window
        // restarts the timer and supersedes the pending payload.
        loop {
            tokio::select! {
                () = tokio::time::sleep(throttle) => break,
                next = rx.recv() => match next {
                    Some(payload) => latest = payload,
                    // Disposed mid-window: the pending broadcast is dropped.
                    None => return,
                }
            }
        }
        publisher.publish(latest);
    }
}

async fn bus_recv_loop(mut rx: broadcast::Receiver<String>, remote: Arc<RemoteApply>) {
    loop {
        match rx.recv().await {
            Ok(message) => remote.apply(&message).await,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "broadcast receiver lagged, skipping messages");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

async fn storage_recv_loop(
    mut rx: broadcast::Receiver<StorageEvent>,
    channel: String,
    remote: Arc<RemoteApply>,
) {
    loop {
        match rx.recv().await {
            Ok(event) if event.key == channel => remote.apply(&event.new_value).await,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "storage watcher lagged, skipping events");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Disposer for a cross-context sync session. Disposal detaches the store
/// subscription (before anything else, so no callback fires afterwards),
/// stops the transport tasks, clears the pending throttle timer, and is
/// idempotent. Dropping the handle disposes it.
pub struct CrossContextHandle {
    origin_id: Uuid,
    sub: Mutex<Option<SubscriptionGuard>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CrossContextHandle {
    fn inert(origin_id: Uuid) -> Self {
        Self {
            origin_id,
            sub: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// This session's origin identity.
    pub fn origin_id(&self) -> Uuid {
        self.origin_id
    }

    /// Whether the session is still wired to its store.
    pub fn is_active(&self) -> bool {
        self.sub
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// Tear the session down. Safe to call more than once.
    pub fn dispose(&self) {
        let sub = self.sub.lock().ok().and_then(|mut slot| slot.take());
        if let Some(sub) = sub {
            sub.unsubscribe();
        }
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

impl Drop for CrossContextHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for CrossContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossContextHandle")
            .field("origin_id", &self.origin_id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Keep a modern store eventually consistent with its counterparts in other
/// execution contexts.
///
/// Must be called from within a Tokio runtime (the throttle timer and
/// transport listeners are spawned tasks). When neither transport is
/// configured, sync degrades to a logged no-op and the returned handle is
/// inert.
pub fn setup_cross_context_sync(
    store: Arc<dyn ModernStore>,
    options: CrossContextOptions,
) -> CrossContextHandle {
    let origin_id = Uuid::new_v4();
    let channel = options
        .channel_name
        .clone()
        .unwrap_or_else(|| DEFAULT_CHANNEL.to_string());
    let throttle = options.throttle.unwrap_or(DEFAULT_THROTTLE);

    if options.bus.is_none() && options.storage_fallback.is_none() {
        warn!(channel, "no broadcast transport available, cross-context sync disabled");
        return CrossContextHandle::inert(origin_id);
    }

    let applying_remote = Arc::new(AtomicBool::new(false));
    let mut tasks = Vec::new();

    // Outbound: store writes -> debounced full-state broadcast.
    let (tx, rx) = mpsc::unbounded_channel::<StateTree>();
    let publisher = Publisher {
        bus: options.bus.clone(),
        storage: options.storage_fallback.clone(),
        channel: channel.clone(),
        origin_id,
        store_id: store.id(),
    };
    tasks.push(tokio::spawn(debounce_loop(rx, throttle, publisher)));

    // Inbound: prefer the bus; fall back to storage events.
    let remote = Arc::new(RemoteApply {
        store: Arc::clone(&store),
        origin_id,
        applying_remote: Arc::clone(&applying_remote),
        apply_lock: async_lock::Mutex::new(()),
    });
    if let Some(rx) = options.bus.as_ref().and_then(|bus| bus.subscribe(&channel)) {
        tasks.push(tokio::spawn(bus_recv_loop(rx, Arc::clone(&remote))));
    } else if let Some(storage) = &options.storage_fallback {
        tasks.push(tokio::spawn(storage_recv_loop(
            storage.watch(),
            channel.clone(),
            remote,
        )));
    }

    let sub = store.subscribe(Arc::new(move |_record, state| {
        if applying_remote.load(Ordering::SeqCst) {
            // This write came off the wire; re-broadcasting it would echo.
            return;
        }
        let _ = tx.send(state.clone());
    }));

    debug!(channel, %origin_id, "cross-context sync established");
    CrossContextHandle {
        origin_id,
        sub: Mutex::new(Some(sub)),
        tasks: Mutex::new(tasks),
    }
}
