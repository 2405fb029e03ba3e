//! Weft Core: State Trees, Structural Diff/Patch, and Store Contracts
//!
//! This crate provides the pure foundation of the Weft state-synchronization
//! engine:
//!
//! - **State trees**: plain, JSON-shaped nested data ([`StateTree`]) with
//!   explicit shape classification and coercion rules
//! - **Structural diff/patch**: a typed, minimal transformation between two
//!   state trees ([`Diff`]), and in-place application ([`apply`])
//! - **Namespace resolution**: locating a subtree of a root state by a
//!   segmented path ([`NamespacePath`], [`resolve_module_state`])
//! - **Store contracts**: the minimal capability traits a commit-style
//!   ([`LegacyStore`]) or patch-style ([`ModernStore`]) state container must
//!   satisfy to be bridged, plus in-memory reference implementations
//!
//! Everything here is synchronous and runtime-agnostic: store notification
//! dispatch uses only std primitives, so the same stores work under any async
//! runtime or in sync-only code. The bridging engine itself lives in
//! `weft-bridge`.

#![forbid(unsafe_code)]

/// State tree representation, shape classification, and deep merge
pub mod tree;

/// Structural diff computation and in-place patch application
pub mod diff;

/// Namespace paths and module-state resolution
pub mod path;

/// Store capability traits and in-memory reference stores
pub mod store;

/// Unified error handling
pub mod errors;

pub use diff::{apply, diff, Diff};
pub use errors::{WeftError, WeftResult};
pub use path::{resolve_module_state, NamespacePath};
pub use store::{
    CommitListener, CommitStore, LegacyStore, ModernStore, Mutation, PatchKind, PatchListener,
    PatchRecord, PatchStore, SubscriptionGuard, REPLACE_ROOT_STATE, REPLACE_STATE,
};
pub use tree::{coerce_object, merge_into, shape_of, StateShape, StateTree};
