//! Weft Bridge: Bidirectional State Synchronization
//!
//! This crate keeps two independently-owned, differently-shaped state
//! containers continuously consistent with each other, without livelock,
//! echo loops, or lost updates:
//!
//! - **Bridge sessions** ([`create_module_bridge`], [`create_root_bridge`])
//!   wire a commit-style legacy store (optionally scoped to one namespace)
//!   to a patch-style modern store, in both directions, with per-session
//!   reentrancy guards and a FIFO queue discipline per direction
//! - **The bridge registry** ([`BridgeRegistry`]) deduplicates bridges by
//!   namespace with reference counting, so concurrent construction over the
//!   same module never leaks duplicate subscriptions
//! - **Mirrored stores** ([`MirroredStore`]) derive a ready-to-use modern
//!   store from a legacy module and lazily wire the bridge on first use
//! - **Cross-context sync** ([`setup_cross_context_sync`]) propagates
//!   modern-store state to other execution contexts over a broadcast channel
//!   (with a shared-storage fallback), throttled and echo-suppressed
//!
//! Store shape translation is the caller's business: an optional `map_state`
//! transform is applied on every legacy-to-modern tick. Failure on either
//! side degrades to "no sync this tick"; nothing in this crate panics or
//! throws out of a subscriber callback.

#![forbid(unsafe_code)]

/// FIFO run-to-completion execution queue for notification handlers
pub mod exclusive;

/// Bidirectional bridge sessions between a legacy and a modern store
pub mod session;

/// Refcounted per-namespace bridge registry and bulk registration
pub mod registry;

/// Mirrored modern stores derived from legacy modules
pub mod mirror;

/// Cross-context broadcast synchronization
pub mod crosstab;

pub use crosstab::{
    setup_cross_context_sync, BroadcastBus, CrossContextHandle, CrossContextOptions, Envelope,
    SharedStorage, StorageEvent, DEFAULT_CHANNEL, DEFAULT_THROTTLE,
};
pub use exclusive::ExclusiveQueue;
pub use mirror::{MirrorOptions, MirroredStore};
pub use registry::{register_bridges, BridgeRef, BridgeRegistry, DisposerGroup};
pub use session::{create_module_bridge, create_root_bridge, BridgeHandle, BridgeOptions};

// Re-export the core contracts bridge callers always need.
pub use weft_core::{LegacyStore, ModernStore, NamespacePath, StateTree};
