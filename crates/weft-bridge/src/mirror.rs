//! Mirrored modern stores derived from legacy modules.
//!
//! A mirrored store gives callers a modern store handle that *looks like a
//! normal store* but stays synchronized with a legacy module underneath:
//! its initial state is derived from the module, and the bidirectional
//! bridge is wired lazily on first use, so merely constructing the mirror
//! costs nothing if the store is never read.

use std::sync::{Arc, Mutex};

use tracing::debug;

use weft_core::{
    resolve_module_state, LegacyStore, ModernStore, NamespacePath, PatchStore, StateTree,
};

use crate::session::{
    create_module_bridge, create_root_bridge, BridgeHandle, BridgeOptions, MapStateFn,
};

/// Options accepted by mirrored-store construction.
#[derive(Clone, Default)]
pub struct MirrorOptions {
    /// Store identifier override. Defaults to the namespace (or `"global"`
    /// for a root mirror).
    pub id: Option<String>,
    /// Shape translation applied to legacy state, as in [`BridgeOptions`].
    pub map_state: Option<MapStateFn>,
}

/// A modern store mirroring a legacy module (or the legacy root), with the
/// bridge wired on first [`handle`](MirroredStore::handle) call.
pub struct MirroredStore {
    legacy: Arc<dyn LegacyStore>,
    namespace: NamespacePath,
    store: Arc<PatchStore>,
    options: MirrorOptions,
    bridge: Mutex<Option<BridgeHandle>>,
    wired: Mutex<bool>,
}

impl MirroredStore {
    /// Mirror one legacy module, e.g. `"user"` or `"account/profile"`.
    pub fn from_module(
        legacy: Arc<dyn LegacyStore>,
        namespace: impl Into<NamespacePath>,
        options: MirrorOptions,
    ) -> Self {
        let namespace = namespace.into();
        let id = options
            .id
            .clone()
            .unwrap_or_else(|| namespace.to_string());
        Self::build(legacy, namespace, id, options)
    }

    /// Mirror the entire legacy root state (default id `"global"`).
    pub fn from_root(legacy: Arc<dyn LegacyStore>, options: MirrorOptions) -> Self {
        let id = options.id.clone().unwrap_or_else(|| "global".to_string());
        Self::build(legacy, NamespacePath::root(), id, options)
    }

    fn build(
        legacy: Arc<dyn LegacyStore>,
        namespace: NamespacePath,
        id: String,
        options: MirrorOptions,
    ) -> Self {
        let root = legacy.state();
        let initial = resolve_module_state(&root, &namespace)
            .cloned()
            .unwrap_or(StateTree::Null);
        let initial = match &options.map_state {
            Some(map) => map(initial),
            None => initial,
        };
        debug!(namespace = %namespace, id, "creating mirrored store from legacy state");
        let store = PatchStore::new(id, initial);

        Self {
            legacy,
            namespace,
            store,
            options,
            bridge: Mutex::new(None),
            wired: Mutex::new(false),
        }
    }

    /// The mirrored store, with the bridge guaranteed to be wired.
    ///
    /// The first call creates the bridge (re-seeding the store from the
    /// current legacy state); later calls return the same handle.
    pub fn handle(&self) -> Arc<PatchStore> {
        let needs_wiring = {
            let mut wired = match self.wired.lock() {
                Ok(wired) => wired,
                Err(_) => return Arc::clone(&self.store),
            };
            let first = !*wired;
            *wired = true;
            first
        };

        if needs_wiring {
            debug!(namespace = %self.namespace, "wiring bridge for mirrored store");
            let bridge_options = BridgeOptions {
                map_state: self.options.map_state.clone(),
            };
            let modern = Arc::clone(&self.store) as Arc<dyn ModernStore>;
            let handle = if self.namespace.is_root() {
                create_root_bridge(Arc::clone(&self.legacy), modern, bridge_options)
            } else {
                create_module_bridge(
                    Arc::clone(&self.legacy),
                    self.namespace.clone(),
                    modern,
                    bridge_options,
                )
            };
            if let Ok(mut bridge) = self.bridge.lock() {
                *bridge = Some(handle);
            }
        }

        Arc::clone(&self.store)
    }

    /// Whether the bridge has been wired yet.
    pub fn is_wired(&self) -> bool {
        self.bridge
            .lock()
            .map(|bridge| bridge.is_some())
            .unwrap_or(false)
    }

    /// Tear down the bridge (the store itself stays usable, unsynchronized).
    pub fn dispose(&self) {
        if let Ok(mut bridge) = self.bridge.lock() {
            if let Some(handle) = bridge.take() {
                handle.dispose();
            }
        }
    }
}

impl Drop for MirroredStore {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mirror_seeds_without_wiring() {
        let legacy = weft_testkit::session_commit_store();
        let mirror = MirroredStore::from_module(
            Arc::clone(&legacy) as Arc<dyn LegacyStore>,
            "user",
            MirrorOptions::default(),
        );
        assert!(!mirror.is_wired());

        // Not yet bridged: legacy commits are not reflected.
        legacy.commit("user/SET_NAME", json!("grace"));
        let store = mirror.handle();
        assert!(mirror.is_wired());
        // Wiring re-seeds from current legacy state.
        assert_eq!(store.state()["name"], json!("grace"));
    }

    #[test]
    fn handle_is_idempotent() {
        let legacy = weft_testkit::session_commit_store();
        let mirror = MirroredStore::from_module(
            Arc::clone(&legacy) as Arc<dyn LegacyStore>,
            "user",
            MirrorOptions::default(),
        );
        let a = mirror.handle();
        let b = mirror.handle();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn wired_mirror_synchronizes_both_ways() {
        let legacy = weft_testkit::session_commit_store();
        let mirror = MirroredStore::from_module(
            Arc::clone(&legacy) as Arc<dyn LegacyStore>,
            "user",
            MirrorOptions::default(),
        );
        let store = mirror.handle();

        legacy.commit("user/SET_LOGGED_IN", json!(true));
        assert_eq!(store.state()["loggedIn"], json!(true));

        store.patch(json!({"name": "grace"}));
        assert_eq!(legacy.state()["user"]["name"], json!("grace"));
    }

    #[test]
    fn root_mirror_defaults_to_global_id() {
        let legacy = weft_testkit::session_commit_store();
        let mirror = MirroredStore::from_root(
            Arc::clone(&legacy) as Arc<dyn LegacyStore>,
            MirrorOptions::default(),
        );
        let store = mirror.handle();
        assert_eq!(store.id(), "global");
        assert_eq!(store.state()["user"]["name"], json!("ada"));
    }

    #[test]
    fn dispose_stops_synchronization() {
        let legacy = weft_testkit::session_commit_store();
        let mirror = MirroredStore::from_module(
            Arc::clone(&legacy) as Arc<dyn LegacyStore>,
            "user",
            MirrorOptions::default(),
        );
        let store = mirror.handle();
        mirror.dispose();

        legacy.commit("user/SET_NAME", json!("grace"));
        assert_eq!(store.state()["name"], json!("ada"));
    }
}
