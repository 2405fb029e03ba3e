//! Namespace paths and module-state resolution.
//!
//! A namespace identifies a sub-region of a hierarchical state tree, e.g.
//! `account/profile`. Bridges use it both to locate the module's state under
//! the legacy root and to scope which commit notifications they react to.

use std::fmt;

use crate::tree::StateTree;

/// An ordered sequence of segments identifying a subtree of a root state
/// tree. The empty path denotes the root itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NamespacePath {
    segments: Vec<String>,
}

impl NamespacePath {
    /// The root path (no segments).
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a namespace from its textual form.
    ///
    /// Both `/` and `.` are accepted as separators (`"account/profile"` and
    /// `"account.profile"` name the same module); empty segments are skipped,
    /// so `""` parses to the root path.
    pub fn parse(raw: &str) -> Self {
        let segments = raw
            .split(['/', '.'])
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self { segments }
    }

    /// `true` for the empty path.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The path's segments, in order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Qualify a local mutation kind with this namespace prefix.
    ///
    /// `NamespacePath::parse("user").qualify("SET_NAME")` is `"user/SET_NAME"`;
    /// qualification at the root leaves the kind untouched.
    pub fn qualify(&self, kind: &str) -> String {
        if self.is_root() {
            kind.to_string()
        } else {
            format!("{self}/{kind}")
        }
    }

    /// Whether a qualified mutation kind falls inside this namespace.
    ///
    /// The root namespace contains every kind.
    pub fn contains_kind(&self, qualified_kind: &str) -> bool {
        if self.is_root() {
            return true;
        }
        qualified_kind
            .strip_prefix(self.to_string().as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }
}

impl fmt::Display for NamespacePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl From<&str> for NamespacePath {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

/// Walk `path` through `root`, returning the module's subtree.
///
/// Returns `None` as soon as any segment is missing or the walk reaches a
/// non-map value; never panics. The empty path resolves to `root` itself.
/// This runs on every sync tick, so it only borrows and never clones.
pub fn resolve_module_state<'a>(
    root: &'a StateTree,
    path: &NamespacePath,
) -> Option<&'a StateTree> {
    let mut current = root;
    for segment in path.segments() {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_accepts_both_separators() {
        assert_eq!(
            NamespacePath::parse("account/profile"),
            NamespacePath::parse("account.profile")
        );
        assert_eq!(NamespacePath::parse("user").segments(), ["user"]);
    }

    #[test]
    fn empty_input_is_root() {
        assert!(NamespacePath::parse("").is_root());
        assert!(NamespacePath::parse("/").is_root());
        assert!(NamespacePath::root().is_root());
    }

    #[test]
    fn qualify_prefixes_local_kinds() {
        let ns = NamespacePath::parse("account/profile");
        assert_eq!(ns.qualify("SET_NAME"), "account/profile/SET_NAME");
        assert_eq!(NamespacePath::root().qualify("SET_NAME"), "SET_NAME");
    }

    #[test]
    fn contains_kind_checks_the_full_prefix() {
        let ns = NamespacePath::parse("user");
        assert!(ns.contains_kind("user/SET_NAME"));
        assert!(ns.contains_kind("user/nested/SET_X"));
        assert!(!ns.contains_kind("users/SET_NAME"));
        assert!(!ns.contains_kind("cart/ADD_ITEM"));
        assert!(!ns.contains_kind("user"));
        assert!(NamespacePath::root().contains_kind("anything"));
    }

    #[test]
    fn resolve_walks_nested_modules() {
        let root = json!({"account": {"profile": {"name": "ada"}}});
        let path = NamespacePath::parse("account/profile");
        assert_eq!(
            resolve_module_state(&root, &path),
            Some(&json!({"name": "ada"}))
        );
    }

    #[test]
    fn resolve_returns_none_for_missing_segments() {
        let root = json!({"account": {"profile": {}}});
        assert_eq!(
            resolve_module_state(&root, &NamespacePath::parse("account/billing")),
            None
        );
        assert_eq!(
            resolve_module_state(&root, &NamespacePath::parse("missing")),
            None
        );
    }

    #[test]
    fn resolve_stops_at_non_map_values() {
        let root = json!({"a": 5});
        assert_eq!(
            resolve_module_state(&root, &NamespacePath::parse("a/b")),
            None
        );
    }

    #[test]
    fn empty_path_resolves_to_root() {
        let root = json!({"a": 1});
        assert_eq!(
            resolve_module_state(&root, &NamespacePath::root()),
            Some(&root)
        );
    }
}
