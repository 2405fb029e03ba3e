//! Refcounted bridge registry and bulk registration.
//!
//! Two callers wiring a bridge over the same legacy namespace would otherwise
//! produce duplicate subscriptions: every commit synced twice, and a leak
//! when only one caller cleans up. The registry deduplicates by namespace:
//! the first acquisition creates the bridge, later ones bump a reference
//! count, and the bridge is disposed when the last [`BridgeRef`] is released.

use std::collections::{hash_map, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use weft_core::{LegacyStore, ModernStore, NamespacePath};

use crate::session::{create_module_bridge, create_root_bridge, BridgeHandle, BridgeOptions};

struct Entry {
    refs: usize,
    handle: BridgeHandle,
}

/// Explicit, refcounted registry of active bridges, keyed by namespace.
///
/// Owned by whichever component constructs bridges, typically one per
/// application shell. The registry assumes one modern store per namespace;
/// a second acquisition's store argument is ignored in favor of the bridge
/// already running.
#[derive(Default)]
pub struct BridgeRegistry {
    entries: Mutex<HashMap<String, Entry>>,
}

impl BridgeRegistry {
    /// Create an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Acquire the bridge for a legacy module, creating it on first use.
    pub fn acquire_module(
        self: &Arc<Self>,
        legacy: Arc<dyn LegacyStore>,
        namespace: impl Into<NamespacePath>,
        modern: Arc<dyn ModernStore>,
        options: BridgeOptions,
    ) -> BridgeRef {
        let namespace = namespace.into();
        self.acquire(namespace.to_string(), || {
            create_module_bridge(legacy, namespace.clone(), modern, options)
        })
    }

    /// Acquire the root bridge, creating it on first use.
    pub fn acquire_root(
        self: &Arc<Self>,
        legacy: Arc<dyn LegacyStore>,
        modern: Arc<dyn ModernStore>,
        options: BridgeOptions,
    ) -> BridgeRef {
        self.acquire(String::new(), || create_root_bridge(legacy, modern, options))
    }

    fn acquire(self: &Arc<Self>, key: String, make: impl FnOnce() -> BridgeHandle) -> BridgeRef {
        {
            let Ok(mut entries) = self.entries.lock() else {
                // A poisoned registry cannot track the bridge; hand back an
                // inert reference rather than panic in the caller.
                return BridgeRef::inert(key);
            };
            if let Some(entry) = entries.get_mut(&key) {
                entry.refs += 1;
                debug!(namespace = %key, refs = entry.refs, "reusing active bridge");
                return BridgeRef::live(Arc::clone(self), key);
            }
        }

        // Bridge construction runs outside the registry lock: it touches both
        // stores and may dispatch notifications.
        let handle = make();
        {
            let Ok(mut entries) = self.entries.lock() else {
                handle.dispose();
                return BridgeRef::inert(key);
            };
            match entries.entry(key.clone()) {
                hash_map::Entry::Occupied(mut slot) => {
                    // Another caller registered this namespace while the
                    // bridge was being built; keep theirs.
                    let entry = slot.get_mut();
                    entry.refs += 1;
                    debug!(
                        namespace = %key,
                        refs = entry.refs,
                        "lost construction race, reusing registered bridge"
                    );
                }
                hash_map::Entry::Vacant(slot) => {
                    debug!(namespace = %key, "registering bridge");
                    slot.insert(Entry { refs: 1, handle });
                    return BridgeRef::live(Arc::clone(self), key);
                }
            }
        }
        // Dispose the duplicate outside the lock; unsubscribing may run
        // listener bookkeeping on the stores.
        handle.dispose();
        BridgeRef::live(Arc::clone(self), key)
    }

    fn release(&self, key: &str) {
        let disposed = {
            let Ok(mut entries) = self.entries.lock() else {
                return;
            };
            match entries.get_mut(key) {
                Some(entry) if entry.refs > 1 => {
                    entry.refs -= 1;
                    debug!(namespace = %key, refs = entry.refs, "released bridge reference");
                    None
                }
                Some(_) => entries.remove(key).map(|entry| entry.handle),
                None => None,
            }
        };
        if let Some(handle) = disposed {
            debug!(namespace = %key, "last reference released, disposing bridge");
            handle.dispose();
        }
    }

    /// Number of distinct active bridges.
    pub fn active(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Current reference count for a namespace (0 when absent).
    pub fn ref_count(&self, namespace: impl Into<NamespacePath>) -> usize {
        let key = namespace.into().to_string();
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(&key).map(|entry| entry.refs))
            .unwrap_or(0)
    }
}

/// One caller's claim on a registered bridge. Releasing the last claim
/// disposes the bridge; dropping the ref releases it.
pub struct BridgeRef {
    registry: Option<Arc<BridgeRegistry>>,
    key: String,
    released: AtomicBool,
}

impl BridgeRef {
    fn live(registry: Arc<BridgeRegistry>, key: String) -> Self {
        Self {
            registry: Some(registry),
            key,
            released: AtomicBool::new(false),
        }
    }

    fn inert(key: String) -> Self {
        Self {
            registry: None,
            key,
            released: AtomicBool::new(true),
        }
    }

    /// The namespace this reference holds (empty string for the root).
    pub fn namespace(&self) -> &str {
        &self.key
    }

    /// Release this claim. Safe to call more than once.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(registry) = &self.registry {
            registry.release(&self.key);
        }
    }
}

impl Drop for BridgeRef {
    fn drop(&mut self) {
        self.release();
    }
}

/// Disposer over a batch of bridges wired together.
pub struct DisposerGroup {
    handles: Vec<BridgeHandle>,
}

impl DisposerGroup {
    /// Dispose every bridge in the group. Idempotent.
    pub fn dispose(&self) {
        for handle in &self.handles {
            handle.dispose();
        }
    }

    /// Number of bridges in the group.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether the group is empty.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Wire a module bridge for every `(namespace, modern store)` pair against
/// one legacy store, returning a single disposer for the batch.
pub fn register_bridges(
    legacy: &Arc<dyn LegacyStore>,
    modules: Vec<(String, Arc<dyn ModernStore>)>,
) -> DisposerGroup {
    let handles = modules
        .into_iter()
        .map(|(namespace, modern)| {
            create_module_bridge(
                Arc::clone(legacy),
                namespace.as_str(),
                modern,
                BridgeOptions::default(),
            )
        })
        .collect();
    DisposerGroup { handles }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weft_core::{CommitStore, PatchStore};
    use weft_testkit::WriteCounter;

    #[test]
    fn second_acquire_reuses_the_bridge() {
        let registry = BridgeRegistry::new();
        let legacy = weft_testkit::session_commit_store();
        let modern = PatchStore::new("user", json!({}));

        let r1 = registry.acquire_module(
            Arc::clone(&legacy) as Arc<dyn LegacyStore>,
            "user",
            Arc::clone(&modern) as Arc<dyn ModernStore>,
            BridgeOptions::default(),
        );
        let r2 = registry.acquire_module(
            Arc::clone(&legacy) as Arc<dyn LegacyStore>,
            "user",
            Arc::clone(&modern) as Arc<dyn ModernStore>,
            BridgeOptions::default(),
        );

        assert_eq!(registry.active(), 1);
        assert_eq!(registry.ref_count("user"), 2);

        // One bridge means one modern write per legacy commit.
        let counter = WriteCounter::new();
        let _sub = modern.subscribe(counter.patch_listener());
        legacy.commit("user/SET_NAME", json!("grace"));
        assert_eq!(counter.get(), 1);

        drop(r1);
        assert_eq!(registry.ref_count("user"), 1);
        drop(r2);
        assert_eq!(registry.active(), 0);
    }

    #[test]
    fn last_release_disposes_the_bridge() {
        let registry = BridgeRegistry::new();
        let legacy = weft_testkit::session_commit_store();
        let modern = PatchStore::new("user", json!({}));

        let r = registry.acquire_module(
            Arc::clone(&legacy) as Arc<dyn LegacyStore>,
            "user",
            Arc::clone(&modern) as Arc<dyn ModernStore>,
            BridgeOptions::default(),
        );
        r.release();
        r.release();

        legacy.commit("user/SET_NAME", json!("grace"));
        assert_eq!(modern.state(), json!({"name": "ada", "loggedIn": false}));
    }

    #[test]
    fn concurrent_acquires_share_one_bridge() {
        let registry = BridgeRegistry::new();
        let legacy = weft_testkit::session_commit_store();
        let modern = PatchStore::new("user", json!({}));

        let refs: Vec<BridgeRef> = std::thread::scope(|scope| {
            let threads: Vec<_> = (0..8)
                .map(|_| {
                    let registry = Arc::clone(&registry);
                    let legacy = Arc::clone(&legacy) as Arc<dyn LegacyStore>;
                    let modern = Arc::clone(&modern) as Arc<dyn ModernStore>;
                    scope.spawn(move || {
                        registry.acquire_module(legacy, "user", modern, BridgeOptions::default())
                    })
                })
                .collect();
            threads.into_iter().map(|t| t.join().unwrap()).collect()
        });

        assert_eq!(registry.active(), 1);
        assert_eq!(registry.ref_count("user"), 8);

        // Releasing all but one claim must leave the bridge running.
        for r in refs.iter().take(7) {
            r.release();
        }
        assert_eq!(registry.ref_count("user"), 1);

        let counter = WriteCounter::new();
        let _sub = modern.subscribe(counter.patch_listener());
        legacy.commit("user/SET_NAME", json!("grace"));
        assert_eq!(counter.get(), 1);

        refs[7].release();
        assert_eq!(registry.active(), 0);
    }

    #[test]
    fn root_and_module_keys_do_not_collide() {
        let registry = BridgeRegistry::new();
        let legacy = CommitStore::new(json!({"user": {"name": "ada"}}));
        let global = PatchStore::new("global", json!({}));
        let user = PatchStore::new("user", json!({}));

        let _root = registry.acquire_root(
            Arc::clone(&legacy) as Arc<dyn LegacyStore>,
            Arc::clone(&global) as Arc<dyn ModernStore>,
            BridgeOptions::default(),
        );
        let _module = registry.acquire_module(
            Arc::clone(&legacy) as Arc<dyn LegacyStore>,
            "user",
            Arc::clone(&user) as Arc<dyn ModernStore>,
            BridgeOptions::default(),
        );
        assert_eq!(registry.active(), 2);
    }

    #[test]
    fn register_bridges_wires_and_disposes_in_bulk() {
        let legacy = weft_testkit::session_commit_store();
        let user = PatchStore::new("user", json!({}));
        let cart = PatchStore::new("cart", json!({}));

        let legacy_dyn: Arc<dyn LegacyStore> = legacy.clone();
        let group = register_bridges(
            &legacy_dyn,
            vec![
                ("user".to_string(), Arc::clone(&user) as Arc<dyn ModernStore>),
                ("cart".to_string(), Arc::clone(&cart) as Arc<dyn ModernStore>),
            ],
        );
        assert_eq!(group.len(), 2);

        legacy.commit("cart/ADD_ITEM", json!({"sku": "tea"}));
        assert_eq!(cart.state()["items"], json!([{"sku": "tea"}]));

        group.dispose();
        legacy.commit("user/SET_NAME", json!("grace"));
        assert_eq!(user.state()["name"], json!("ada"));
    }
}
