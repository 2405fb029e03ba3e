//! Store capability traits and subscription plumbing.
//!
//! A bridge does not care which state-management library sits on either side;
//! it needs exactly three capabilities from each store: read the current full
//! state, a write primitive, and a synchronous subscription stream reporting
//! every committed write. These traits capture that minimal contract, in the
//! same spirit as parameterizing protocols by effect traits: the engine is
//! written against the seam, and any container satisfying it can be bridged.
//!
//! The in-memory reference stores ([`CommitStore`], [`PatchStore`]) use only
//! std primitives so they stay runtime-agnostic.

mod commit;
mod patched;

pub use commit::{CommitStore, MutationHandler};
pub use patched::PatchStore;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::tree::StateTree;

/// Dedicated mutation kind a bridge commits to replace a legacy module's
/// state. A legacy store must handle `"{namespace}/BRIDGE_REPLACE_STATE"` by
/// deep-merging the payload into the module's state.
pub const REPLACE_STATE: &str = "BRIDGE_REPLACE_STATE";

/// Root-level counterpart of [`REPLACE_STATE`], committed by a root bridge to
/// deep-merge a payload into the entire legacy state tree.
pub const REPLACE_ROOT_STATE: &str = "BRIDGE_REPLACE_ROOT_STATE";

/// Descriptor of a committed legacy-store write.
#[derive(Debug, Clone)]
pub struct Mutation {
    /// Fully qualified mutation kind, e.g. `"user/SET_NAME"`.
    pub kind: String,
    /// The payload the mutation was committed with.
    pub payload: StateTree,
}

/// How a modern-store write was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    /// An object patch: a partial state tree deep-merged into the state.
    Object,
    /// A mutator patch: an arbitrary closure edited the state in place.
    Mutator,
    /// A full overwrite of the state.
    Replace,
}

/// Descriptor of a modern-store write, delivered with the resulting state.
#[derive(Debug, Clone)]
pub struct PatchRecord {
    /// Identifier of the store that was written.
    pub store_id: String,
    /// How the write was made.
    pub kind: PatchKind,
    /// The partial (or full, for replaces) tree the write carried. Mutator
    /// patches carry no identifiable payload.
    pub payload: Option<StateTree>,
}

/// Listener invoked synchronously after every legacy-store commit.
pub type CommitListener = Arc<dyn Fn(&Mutation, &StateTree) + Send + Sync>;

/// Listener invoked synchronously after every modern-store write.
pub type PatchListener = Arc<dyn Fn(&PatchRecord, &StateTree) + Send + Sync>;

/// A commit-style ("legacy") state container: writes go through named,
/// synchronous commit operations and a single global subscription stream
/// reports every commit.
pub trait LegacyStore: Send + Sync {
    /// Snapshot of the current full state tree.
    fn state(&self) -> StateTree;

    /// Commit a mutation by qualified kind.
    fn commit(&self, kind: &str, payload: StateTree);

    /// Subscribe to the global commit stream. Listeners run synchronously,
    /// after the write, with the mutation descriptor and resulting state.
    fn subscribe(&self, listener: CommitListener) -> SubscriptionGuard;
}

/// A patch-style ("modern") state container: writes are object patches or
/// arbitrary mutator functions, and subscriptions report the resulting state
/// plus a generic write descriptor.
pub trait ModernStore: Send + Sync {
    /// Store identifier (used for cross-context routing).
    fn id(&self) -> String;

    /// Snapshot of the current full state tree.
    fn state(&self) -> StateTree;

    /// Deep-merge a partial state tree into the state.
    fn patch(&self, partial: StateTree);

    /// Edit the state in place with an arbitrary mutator.
    fn patch_with(&self, mutate: &mut dyn FnMut(&mut StateTree));

    /// Overwrite the entire state wholesale.
    fn replace(&self, state: StateTree);

    /// Subscribe to the write stream. Listeners run synchronously after the
    /// write.
    fn subscribe(&self, listener: PatchListener) -> SubscriptionGuard;
}

/// Registry of subscribed listeners, handing out detachable guards.
///
/// Dispatch snapshots the listener list before invoking anyone, so a listener
/// may unsubscribe (itself or others) or write back into the store without
/// deadlocking the registry lock.
pub(crate) struct ListenerSet<L: Clone> {
    entries: Arc<Mutex<Vec<(u64, L)>>>,
    next_id: AtomicU64,
}

impl<L: Clone + Send + 'static> ListenerSet<L> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a listener, returning its detach guard.
    pub(crate) fn subscribe(&self, listener: L) -> SubscriptionGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((id, listener));
        }
        let entries = Arc::clone(&self.entries);
        SubscriptionGuard::new(move || {
            if let Ok(mut entries) = entries.lock() {
                entries.retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    /// Snapshot the current listeners for dispatch.
    pub(crate) fn snapshot(&self) -> Vec<L> {
        self.entries
            .lock()
            .map(|entries| entries.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default()
    }
}

/// Detaches a subscription when dropped or when [`unsubscribe`] is called
/// explicitly. Unsubscribing is idempotent.
///
/// [`unsubscribe`]: SubscriptionGuard::unsubscribe
pub struct SubscriptionGuard {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl SubscriptionGuard {
    fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// Detach the subscription. Safe to call more than once.
    pub fn unsubscribe(&self) {
        let cancel = self.cancel.lock().ok().and_then(|mut slot| slot.take());
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    /// Whether the subscription is still attached.
    pub fn is_active(&self) -> bool {
        self.cancel
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for SubscriptionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionGuard")
            .field("active", &self.is_active())
            .finish()
    }
}
