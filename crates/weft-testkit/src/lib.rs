//! Test support for Weft crates.
//!
//! Provides the small set of helpers the bridge and core test suites share:
//! counting/recording store listeners, canned session-state fixtures, and
//! one-line tracing setup. Intended as a dev-dependency only.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;
use weft_core::store::{CommitListener, PatchListener, PatchRecord};
use weft_core::{CommitStore, Mutation, StateTree};

/// Install a fmt tracing subscriber honoring `RUST_LOG`. Safe to call from
/// every test; repeat calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Counts how many write notifications a store delivered.
#[derive(Clone, Default)]
pub struct WriteCounter {
    count: Arc<AtomicUsize>,
}

impl WriteCounter {
    /// Create a counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of notifications observed so far.
    pub fn get(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// A modern-store listener that increments this counter.
    pub fn patch_listener(&self) -> PatchListener {
        let count = Arc::clone(&self.count);
        Arc::new(move |_, _| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    /// A legacy-store listener that increments this counter.
    pub fn commit_listener(&self) -> CommitListener {
        let count = Arc::clone(&self.count);
        Arc::new(move |_, _| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }
}

/// Records every modern-store write it observes.
#[derive(Clone, Default)]
pub struct PatchRecorder {
    events: Arc<Mutex<Vec<(PatchRecord, StateTree)>>>,
}

impl PatchRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// The writes observed so far.
    pub fn events(&self) -> Vec<(PatchRecord, StateTree)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// A listener that appends to this recorder.
    pub fn listener(&self) -> PatchListener {
        let events = Arc::clone(&self.events);
        Arc::new(move |record, state| {
            if let Ok(mut v) = events.lock() {
                v.push((record.clone(), state.clone()));
            }
        })
    }
}

/// Records every legacy-store commit it observes.
#[derive(Clone, Default)]
pub struct CommitRecorder {
    events: Arc<Mutex<Vec<(Mutation, StateTree)>>>,
}

impl CommitRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// The commits observed so far.
    pub fn events(&self) -> Vec<(Mutation, StateTree)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Qualified kinds of the commits observed so far.
    pub fn kinds(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|(m, _)| m.kind)
            .collect()
    }

    /// A listener that appends to this recorder.
    pub fn listener(&self) -> CommitListener {
        let events = Arc::clone(&self.events);
        Arc::new(move |mutation: &Mutation, state: &StateTree| {
            if let Ok(mut v) = events.lock() {
                v.push((mutation.clone(), state.clone()));
            }
        })
    }
}

/// A legacy store pre-populated with the `user` and `cart` modules used
/// throughout the bridge test suites.
pub fn session_commit_store() -> Arc<CommitStore> {
    let store = CommitStore::new(json!({}));
    store.register_module("user", json!({"name": "ada", "loggedIn": false}));
    store.register_module("cart", json!({"items": [], "total": 0}));
    store.register_mutation(
        "user/SET_NAME",
        Arc::new(|state, payload| {
            if let Some(map) = state.as_object_mut() {
                map.insert("name".into(), payload.clone());
            }
        }),
    );
    store.register_mutation(
        "user/SET_LOGGED_IN",
        Arc::new(|state, payload| {
            if let Some(map) = state.as_object_mut() {
                map.insert("loggedIn".into(), payload.clone());
            }
        }),
    );
    store.register_mutation(
        "cart/ADD_ITEM",
        Arc::new(|state, payload| {
            if let Some(items) = state.get_mut("items").and_then(|v| v.as_array_mut()) {
                items.push(payload.clone());
            }
        }),
    );
    store
}
