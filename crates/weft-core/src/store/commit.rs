//! In-memory commit-style store.
//!
//! `CommitStore` models the legacy side of a bridge: a single hierarchical
//! state tree whose modules are written through named, synchronous commit
//! operations, with one global subscription stream reporting every commit.
//!
//! The bridge replace mutations ([`REPLACE_STATE`], [`REPLACE_ROOT_STATE`])
//! are built in: they deep-merge their payload into the addressed module (or
//! the root) without any registration, since every bridged module needs them.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::path::NamespacePath;
use crate::store::{
    CommitListener, LegacyStore, ListenerSet, Mutation, SubscriptionGuard, REPLACE_ROOT_STATE,
    REPLACE_STATE,
};
use crate::tree::{coerce_object, merge_into, StateTree};

/// A registered mutation body: edits its module's state given the payload.
pub type MutationHandler = Arc<dyn Fn(&mut StateTree, &StateTree) + Send + Sync>;

/// In-memory commit-style ("legacy") store.
pub struct CommitStore {
    state: RwLock<StateTree>,
    handlers: RwLock<HashMap<String, MutationHandler>>,
    listeners: ListenerSet<CommitListener>,
}

impl CommitStore {
    /// Create a store from an initial root state (coerced to an object).
    pub fn new(initial: StateTree) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(coerce_object(Some(initial), "commit-store")),
            handlers: RwLock::new(HashMap::new()),
            listeners: ListenerSet::new(),
        })
    }

    /// Install a module's initial state at `namespace`, creating intermediate
    /// objects along the path.
    pub fn register_module(&self, namespace: &str, initial: StateTree) {
        let path = NamespacePath::parse(namespace);
        let initial = coerce_object(Some(initial), namespace);
        if let Ok(mut root) = self.state.write() {
            if let Some(slot) = module_slot_mut(&mut root, &path, true) {
                *slot = initial;
            }
        }
    }

    /// Register a mutation handler under its fully qualified kind, e.g.
    /// `"user/SET_NAME"`. The handler receives the owning module's state and
    /// the commit payload.
    pub fn register_mutation(&self, qualified_kind: &str, handler: MutationHandler) {
        if let Ok(mut handlers) = self.handlers.write() {
            handlers.insert(qualified_kind.to_string(), handler);
        }
    }

    fn apply_commit(&self, kind: &str, payload: &StateTree) -> bool {
        let path = owning_namespace(kind);
        let local = kind.rsplit('/').next().unwrap_or(kind);

        if local == REPLACE_STATE || kind == REPLACE_ROOT_STATE {
            let Ok(mut root) = self.state.write() else {
                return false;
            };
            match module_slot_mut(&mut root, &path, false) {
                Some(slot) => {
                    merge_into(slot, payload);
                    true
                }
                None => {
                    warn!(kind, "replace-state commit for a missing module, ignoring");
                    false
                }
            }
        } else {
            let handler = self
                .handlers
                .read()
                .ok()
                .and_then(|handlers| handlers.get(kind).cloned());
            let Some(handler) = handler else {
                warn!(kind, "commit for an unregistered mutation kind, ignoring");
                return false;
            };
            let Ok(mut root) = self.state.write() else {
                return false;
            };
            match module_slot_mut(&mut root, &path, false) {
                Some(slot) => {
                    handler(slot, payload);
                    true
                }
                None => {
                    warn!(kind, "commit addressed a missing module, ignoring");
                    false
                }
            }
        }
    }
}

impl LegacyStore for CommitStore {
    fn state(&self) -> StateTree {
        self.state
            .read()
            .map(|s| s.clone())
            .unwrap_or(StateTree::Null)
    }

    fn commit(&self, kind: &str, payload: StateTree) {
        if !self.apply_commit(kind, &payload) {
            return;
        }

        // Locks are released before dispatch so listeners may read state or
        // commit again from within the callback.
        let snapshot = self.state();
        let mutation = Mutation {
            kind: kind.to_string(),
            payload,
        };
        for listener in self.listeners.snapshot() {
            listener(&mutation, &snapshot);
        }
    }

    fn subscribe(&self, listener: CommitListener) -> SubscriptionGuard {
        self.listeners.subscribe(listener)
    }
}

/// Namespace that owns a qualified mutation kind (all but the last segment).
fn owning_namespace(kind: &str) -> NamespacePath {
    match kind.rsplit_once('/') {
        Some((namespace, _)) => NamespacePath::parse(namespace),
        None => NamespacePath::root(),
    }
}

fn module_slot_mut<'a>(
    root: &'a mut StateTree,
    path: &NamespacePath,
    create: bool,
) -> Option<&'a mut StateTree> {
    let mut current = root;
    for segment in path.segments() {
        let map = current.as_object_mut()?;
        if create && !map.contains_key(segment) {
            map.insert(segment.clone(), StateTree::Object(serde_json::Map::new()));
        }
        current = map.get_mut(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn user_store() -> Arc<CommitStore> {
        let store = CommitStore::new(json!({}));
        store.register_module("user", json!({"name": "ada", "age": 36}));
        store.register_mutation(
            "user/SET_NAME",
            Arc::new(|state, payload| {
                if let Some(map) = state.as_object_mut() {
                    map.insert("name".into(), payload.clone());
                }
            }),
        );
        store
    }

    #[test]
    fn registered_mutations_edit_their_module() {
        let store = user_store();
        store.commit("user/SET_NAME", json!("grace"));
        assert_eq!(
            store.state(),
            json!({"user": {"name": "grace", "age": 36}})
        );
    }

    #[test]
    fn listeners_observe_the_mutation_and_resulting_state() {
        let store = user_store();
        let seen: Arc<Mutex<Vec<(String, StateTree)>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let _sub = store.subscribe(Arc::new(move |mutation, state| {
            if let Ok(mut v) = sink.lock() {
                v.push((mutation.kind.clone(), state.clone()));
            }
        }));

        store.commit("user/SET_NAME", json!("grace"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "user/SET_NAME");
        assert_eq!(seen[0].1["user"]["name"], json!("grace"));
    }

    #[test]
    fn unregistered_kinds_are_ignored_without_notification() {
        let store = user_store();
        let count = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        let _sub = store.subscribe(Arc::new(move |_, _| {
            *sink.lock().unwrap() += 1;
        }));

        store.commit("user/UNKNOWN", json!(1));
        assert_eq!(*count.lock().unwrap(), 0);
        assert_eq!(store.state()["user"]["name"], json!("ada"));
    }

    #[test]
    fn replace_state_deep_merges_into_the_module() {
        let store = user_store();
        store.commit("user/BRIDGE_REPLACE_STATE", json!({"age": 37}));
        assert_eq!(store.state()["user"], json!({"name": "ada", "age": 37}));
    }

    #[test]
    fn replace_root_state_deep_merges_into_the_root() {
        let store = user_store();
        store.commit("BRIDGE_REPLACE_ROOT_STATE", json!({"session": {"id": 7}}));
        assert_eq!(store.state()["session"], json!({"id": 7}));
        assert_eq!(store.state()["user"]["name"], json!("ada"));
    }

    #[test]
    fn replace_state_for_a_missing_module_is_ignored() {
        let store = user_store();
        store.commit("cart/BRIDGE_REPLACE_STATE", json!({"items": []}));
        assert!(store.state().get("cart").is_none());
    }

    #[test]
    fn nested_module_registration_creates_parents() {
        let store = CommitStore::new(json!({}));
        store.register_module("account/profile", json!({"name": "ada"}));
        assert_eq!(
            store.state(),
            json!({"account": {"profile": {"name": "ada"}}})
        );
    }

    #[test]
    fn listeners_may_commit_reentrantly() {
        let store = user_store();
        let fired = Arc::new(Mutex::new(false));
        let sink = Arc::clone(&fired);
        let inner = Arc::clone(&store);
        let _sub = store.subscribe(Arc::new(move |mutation, _| {
            if mutation.kind == "user/SET_NAME" {
                let mut once = sink.lock().unwrap();
                if !*once {
                    *once = true;
                    inner.commit("user/BRIDGE_REPLACE_STATE", json!({"age": 1}));
                }
            }
        }));

        store.commit("user/SET_NAME", json!("grace"));
        assert_eq!(store.state()["user"], json!({"name": "grace", "age": 1}));
    }
}
