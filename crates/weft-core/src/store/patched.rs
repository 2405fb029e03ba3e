//! In-memory patch-style store.
//!
//! `PatchStore` models the modern side of a bridge: writes are object patches
//! (partial trees deep-merged into the state) or arbitrary mutator closures,
//! and every write is reported synchronously to subscribers together with the
//! resulting full state.

use std::sync::{Arc, RwLock};

use crate::store::{
    ListenerSet, ModernStore, PatchKind, PatchListener, PatchRecord, SubscriptionGuard,
};
use crate::tree::{coerce_object, merge_into, StateTree};

/// In-memory patch-style ("modern") store.
pub struct PatchStore {
    id: String,
    state: RwLock<StateTree>,
    listeners: ListenerSet<PatchListener>,
}

impl PatchStore {
    /// Create a store with the given identifier and initial state (coerced
    /// to an object).
    pub fn new(id: impl Into<String>, initial: StateTree) -> Arc<Self> {
        let id = id.into();
        let state = coerce_object(Some(initial), &id);
        Arc::new(Self {
            id,
            state: RwLock::new(state),
            listeners: ListenerSet::new(),
        })
    }

    fn notify(&self, kind: PatchKind, payload: Option<StateTree>) {
        // Snapshot outside the write lock; listeners may read or write back
        // into the store from within the callback.
        let snapshot = self.state();
        let record = PatchRecord {
            store_id: self.id.clone(),
            kind,
            payload,
        };
        for listener in self.listeners.snapshot() {
            listener(&record, &snapshot);
        }
    }
}

impl ModernStore for PatchStore {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn state(&self) -> StateTree {
        self.state
            .read()
            .map(|s| s.clone())
            .unwrap_or(StateTree::Null)
    }

    fn patch(&self, partial: StateTree) {
        if let Ok(mut state) = self.state.write() {
            merge_into(&mut state, &partial);
        }
        self.notify(PatchKind::Object, Some(partial));
    }

    fn patch_with(&self, mutate: &mut dyn FnMut(&mut StateTree)) {
        if let Ok(mut state) = self.state.write() {
            mutate(&mut state);
        }
        self.notify(PatchKind::Mutator, None);
    }

    fn replace(&self, state: StateTree) {
        let state = coerce_object(Some(state), &self.id);
        if let Ok(mut slot) = self.state.write() {
            *slot = state.clone();
        }
        self.notify(PatchKind::Replace, Some(state));
    }

    fn subscribe(&self, listener: PatchListener) -> SubscriptionGuard {
        self.listeners.subscribe(listener)
    }
}
