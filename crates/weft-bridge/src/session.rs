//! Bidirectional bridge sessions.
//!
//! A bridge session pairs one legacy store (optionally scoped to a namespace)
//! with one modern store and keeps them converging:
//!
//! - legacy → modern: on every in-scope commit, the legacy module's state is
//!   re-resolved, mapped, diffed against the modern state, and the diff is
//!   patched in;
//! - modern → legacy: every payload-carrying modern write is forwarded as a
//!   single dedicated replace-state commit scoped to the namespace.
//!
//! Echo suppression uses two boolean guards owned by the session value (never
//! shared between sessions), and each direction serializes its notification
//! handling through its own [`ExclusiveQueue`]. Guards alone suffice across
//! directions because each direction's handling is synchronous end-to-end.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use weft_core::store::{PatchRecord, REPLACE_ROOT_STATE, REPLACE_STATE};
use weft_core::tree::shape_of;
use weft_core::{
    apply, diff, resolve_module_state, LegacyStore, ModernStore, NamespacePath, StateTree,
    SubscriptionGuard,
};

use crate::exclusive::ExclusiveQueue;

/// Caller-supplied one-way transform applied to legacy state before it is
/// compared with (and written into) the modern store.
pub type MapStateFn = Arc<dyn Fn(StateTree) -> StateTree + Send + Sync>;

/// Options accepted by bridge construction.
#[derive(Clone, Default)]
pub struct BridgeOptions {
    /// Shape translation for differently-shaped stores. Identity when absent.
    pub map_state: Option<MapStateFn>,
}

/// Runtime pairing of the two stores: namespace scope, mapper, and the two
/// reentrancy guards.
struct BridgeSession {
    namespace: NamespacePath,
    map_state: Option<MapStateFn>,
    syncing_from_legacy: AtomicBool,
    syncing_from_modern: AtomicBool,
}

/// Clears a reentrancy flag when the propagation scope ends.
struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl BridgeSession {
    /// Apply the mapper and insist on an object shape; anything else is a
    /// logged skip, never an error.
    fn mapped_state(&self, module_state: StateTree) -> Option<StateTree> {
        let value = match &self.map_state {
            Some(map) => map(module_state),
            None => module_state,
        };
        if value.is_object() {
            Some(value)
        } else {
            warn!(
                namespace = %self.namespace,
                shape = ?shape_of(&value),
                "mapped legacy state is not an object, skipping sync"
            );
            None
        }
    }

    /// Whether a legacy commit is foreign input for this session.
    fn scope_accepts(&self, kind: &str) -> bool {
        if self.namespace.is_root() {
            // A root bridge mirrors everything except its own propagation.
            kind != REPLACE_ROOT_STATE
        } else {
            self.namespace.contains_kind(kind)
        }
    }

    /// The dedicated replace-state commit kind this session writes.
    fn replace_kind(&self) -> String {
        if self.namespace.is_root() {
            REPLACE_ROOT_STATE.to_string()
        } else {
            self.namespace.qualify(REPLACE_STATE)
        }
    }

    fn sync_from_legacy(&self, module: Option<&StateTree>, modern: &dyn ModernStore) {
        if self.syncing_from_modern.load(Ordering::SeqCst) {
            return;
        }
        let Some(module) = module else {
            debug!(namespace = %self.namespace, "legacy module state missing, skipping tick");
            return;
        };
        let Some(mapped) = self.mapped_state(module.clone()) else {
            return;
        };

        let d = diff(&modern.state(), &mapped);
        if d.is_empty() {
            return;
        }

        debug!(namespace = %self.namespace, "legacy -> modern: patching state diff");
        let _guard = FlagGuard::set(&self.syncing_from_legacy);
        modern.patch_with(&mut |state| apply(state, &d));
    }

    fn sync_from_modern(&self, record: &PatchRecord, legacy: &dyn LegacyStore) {
        let Some(payload) = &record.payload else {
            debug!(
                store_id = %record.store_id,
                "modern write carries no payload, skipping"
            );
            return;
        };
        if self.syncing_from_legacy.load(Ordering::SeqCst) {
            return;
        }

        debug!(
            namespace = %self.namespace,
            store_id = %record.store_id,
            "modern -> legacy: forwarding write payload"
        );
        let _guard = FlagGuard::set(&self.syncing_from_modern);
        legacy.commit(&self.replace_kind(), payload.clone());
    }
}

/// Disposer for an active bridge. Disposal unsubscribes both directions and
/// is idempotent; dropping the handle disposes it too.
pub struct BridgeHandle {
    subs: Mutex<Option<(SubscriptionGuard, SubscriptionGuard)>>,
}

impl BridgeHandle {
    /// Stop both directions of the bridge. Safe to call more than once.
    pub fn dispose(&self) {
        let subs = self.subs.lock().ok().and_then(|mut slot| slot.take());
        if let Some((legacy_sub, modern_sub)) = subs {
            legacy_sub.unsubscribe();
            modern_sub.unsubscribe();
            debug!("bridge disposed");
        }
    }

    /// Whether the bridge has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.subs
            .lock()
            .map(|slot| slot.is_none())
            .unwrap_or(true)
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for BridgeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeHandle")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Bridge a legacy module (addressed by `namespace`) to a modern store.
///
/// The modern store's state is first overwritten wholesale with the mapped
/// legacy module state (a missing module is a logged warning, not an error;
/// the modern side starts empty). Both subscription directions are then
/// wired. Commits outside the namespace are ignored.
pub fn create_module_bridge(
    legacy: Arc<dyn LegacyStore>,
    namespace: impl Into<NamespacePath>,
    modern: Arc<dyn ModernStore>,
    options: BridgeOptions,
) -> BridgeHandle {
    connect(legacy, namespace.into(), modern, options)
}

/// Bridge the entire legacy root state to a modern store.
///
/// Identical to a module bridge with the empty namespace: every commit is in
/// scope except the session's own replace-root propagation.
pub fn create_root_bridge(
    legacy: Arc<dyn LegacyStore>,
    modern: Arc<dyn ModernStore>,
    options: BridgeOptions,
) -> BridgeHandle {
    connect(legacy, NamespacePath::root(), modern, options)
}

fn connect(
    legacy: Arc<dyn LegacyStore>,
    namespace: NamespacePath,
    modern: Arc<dyn ModernStore>,
    options: BridgeOptions,
) -> BridgeHandle {
    let session = Arc::new(BridgeSession {
        namespace,
        map_state: options.map_state,
        syncing_from_legacy: AtomicBool::new(false),
        syncing_from_modern: AtomicBool::new(false),
    });

    // Initial sync is a one-time full overwrite, bypassing the diff
    // machinery. Subscriptions are wired afterwards, so it produces no echo.
    let root = legacy.state();
    let initial = match resolve_module_state(&root, &session.namespace) {
        Some(module) => session.mapped_state(module.clone()),
        None => {
            warn!(
                namespace = %session.namespace,
                "legacy module not found, starting modern store empty"
            );
            None
        }
    };
    modern.replace(initial.unwrap_or_else(|| StateTree::Object(serde_json::Map::new())));

    // Legacy -> modern.
    let legacy_queue = ExclusiveQueue::new();
    let legacy_sub = {
        let session = Arc::clone(&session);
        let modern = Arc::clone(&modern);
        legacy.subscribe(Arc::new(move |mutation, state| {
            if !session.scope_accepts(&mutation.kind) {
                return;
            }
            // The resolver only borrows; the module subtree is cloned once
            // so the queued job owns its input.
            let module = resolve_module_state(state, &session.namespace).cloned();
            let session = Arc::clone(&session);
            let modern = Arc::clone(&modern);
            legacy_queue.run_exclusive(move || {
                session.sync_from_legacy(module.as_ref(), modern.as_ref());
            });
        }))
    };

    // Modern -> legacy.
    let modern_queue = ExclusiveQueue::new();
    let modern_sub = {
        let session = Arc::clone(&session);
        let legacy = Arc::clone(&legacy);
        modern.subscribe(Arc::new(move |record, _state| {
            if record.payload.is_none() {
                debug!(
                    store_id = %record.store_id,
                    "skipping modern write without payload"
                );
                return;
            }
            let record = record.clone();
            let session = Arc::clone(&session);
            let legacy = Arc::clone(&legacy);
            modern_queue.run_exclusive(move || {
                session.sync_from_modern(&record, legacy.as_ref());
            });
        }))
    };

    BridgeHandle {
        subs: Mutex::new(Some((legacy_sub, modern_sub))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weft_core::{CommitStore, PatchStore};

    #[test]
    fn construction_seeds_the_modern_store() {
        let legacy = CommitStore::new(json!({"user": {"name": "ada"}}));
        let modern = PatchStore::new("user", json!({"stale": true}));
        let _bridge = create_module_bridge(
            legacy,
            "user",
            Arc::clone(&modern) as Arc<dyn ModernStore>,
            BridgeOptions::default(),
        );
        assert_eq!(modern.state(), json!({"name": "ada"}));
    }

    #[test]
    fn missing_module_starts_the_modern_store_empty() {
        let legacy = CommitStore::new(json!({}));
        let modern = PatchStore::new("user", json!({"stale": true}));
        let _bridge = create_module_bridge(
            legacy,
            "user",
            Arc::clone(&modern) as Arc<dyn ModernStore>,
            BridgeOptions::default(),
        );
        assert_eq!(modern.state(), json!({}));
    }

    #[test]
    fn map_state_translates_shapes_on_construction() {
        let legacy = CommitStore::new(json!({"user": {"name": "ada"}}));
        let modern = PatchStore::new("profile", json!({}));
        let map: MapStateFn = Arc::new(|state| json!({ "displayName": state["name"] }));
        let _bridge = create_module_bridge(
            legacy,
            "user",
            Arc::clone(&modern) as Arc<dyn ModernStore>,
            BridgeOptions {
                map_state: Some(map),
            },
        );
        assert_eq!(modern.state(), json!({"displayName": "ada"}));
    }

    #[test]
    fn non_object_mapper_output_skips_the_tick() {
        let legacy = weft_testkit::session_commit_store();
        let modern = PatchStore::new("user", json!({}));
        let map: MapStateFn = Arc::new(|_| json!(42));
        let _bridge = create_module_bridge(
            Arc::clone(&legacy) as Arc<dyn LegacyStore>,
            "user",
            Arc::clone(&modern) as Arc<dyn ModernStore>,
            BridgeOptions {
                map_state: Some(map),
            },
        );
        // Initialization degraded to empty, and the commit tick is skipped.
        assert_eq!(modern.state(), json!({}));
        legacy.commit("user/SET_NAME", json!("grace"));
        assert_eq!(modern.state(), json!({}));
    }
}
