//! Entity keys and their canonical cache form.
//!
//! A key is a path of `(kind, id-or-name)` segments inside an optional
//! partition. Lookups and mutations describe the same entity with keys that
//! may differ in incidental ways (project id, an explicitly empty namespace),
//! so every cache backend addresses entries through [`Key::cache_key`].
//! Equality and hashing are defined on that canonical form.

use std::fmt::{self, Write};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Marker written in place of an empty namespace.
pub const DEFAULT_NAMESPACE: &str = "[default]";

/// Separator between canonical key segments.
const SEPARATOR: char = '/';

/// The partition a key lives in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionId {
    pub project_id: String,
    pub namespace_id: String,
}

/// Identity of a single path element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdType {
    /// Numeric id, usually allocated by the service.
    Id(i64),
    /// Client-chosen name.
    Name(String),
}

/// One `(kind, identity)` segment of a key path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathElement {
    pub kind: String,
    /// `None` for the last element of an incomplete key.
    pub id_type: Option<IdType>,
}

/// An entity key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Key {
    pub partition_id: Option<PartitionId>,
    pub path: Vec<PathElement>,
}

impl Key {
    /// Key with a numeric id.
    pub fn id(kind: impl Into<String>, id: i64) -> Self {
        Self::single(kind, Some(IdType::Id(id)))
    }

    /// Key with a string name.
    pub fn name(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::single(kind, Some(IdType::Name(name.into())))
    }

    /// Key whose identity will be assigned by the service on insert.
    pub fn incomplete(kind: impl Into<String>) -> Self {
        Self::single(kind, None)
    }

    fn single(kind: impl Into<String>, id_type: Option<IdType>) -> Self {
        Self {
            partition_id: None,
            path: vec![PathElement {
                kind: kind.into(),
                id_type,
            }],
        }
    }

    /// Prefix this key's path with `parent`'s path, adopting its partition.
    pub fn with_parent(mut self, parent: &Key) -> Self {
        let mut path = parent.path.clone();
        path.append(&mut self.path);
        self.path = path;
        if self.partition_id.is_none() {
            self.partition_id = parent.partition_id.clone();
        }
        self
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.partition_id.get_or_insert_with(PartitionId::default).namespace_id = namespace.into();
        self
    }

    /// Set the project id.
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.partition_id.get_or_insert_with(PartitionId::default).project_id = project.into();
        self
    }

    /// Namespace, empty for the default namespace.
    pub fn namespace(&self) -> &str {
        self.partition_id
            .as_ref()
            .map(|p| p.namespace_id.as_str())
            .unwrap_or("")
    }

    /// Kind of the last path element.
    pub fn kind(&self) -> Option<&str> {
        self.path.last().map(|p| p.kind.as_str())
    }

    /// Whether the last path element carries an id or a name.
    pub fn is_complete(&self) -> bool {
        matches!(self.path.last(), Some(PathElement { id_type: Some(_), .. }))
    }

    /// Canonical string used as the cache index.
    ///
    /// Namespace (or [`DEFAULT_NAMESPACE`]) followed by each element's kind
    /// and its decimal id or quoted name, joined with `/`.
    pub fn cache_key(&self) -> String {
        let mut out = String::with_capacity(16 + self.path.len() * 16);
        let ns = self.namespace();
        out.push_str(if ns.is_empty() { DEFAULT_NAMESPACE } else { ns });
        for element in &self.path {
            out.push(SEPARATOR);
            out.push_str(&element.kind);
            match &element.id_type {
                Some(IdType::Id(id)) => {
                    out.push(SEPARATOR);
                    let _ = write!(out, "{}", id);
                }
                Some(IdType::Name(name)) => {
                    out.push(SEPARATOR);
                    let _ = write!(out, "{:?}", name);
                }
                None => {}
            }
        }
        out
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cache_key() == other.cache_key()
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cache_key().hash(state);
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_cache_key_default_namespace() {
        assert_eq!(Key::id("Task", 42).cache_key(), "[default]/Task/42");
        assert_eq!(Key::name("Task", "a").cache_key(), "[default]/Task/\"a\"");
    }

    #[test]
    fn test_cache_key_with_namespace_and_parent() {
        let parent = Key::name("List", "home").with_namespace("tenant-a");
        let key = Key::id("Task", 7).with_parent(&parent);
        assert_eq!(key.cache_key(), "tenant-a/List/\"home\"/Task/7");
    }

    #[test]
    fn test_cache_key_quotes_names() {
        let key = Key::name("Task", "a/b\"c");
        assert_eq!(key.cache_key(), "[default]/Task/\"a/b\\\"c\"");
    }

    #[test]
    fn test_id_and_name_do_not_collide() {
        assert_ne!(Key::id("Task", 1), Key::name("Task", "1"));
    }

    #[test]
    fn test_equality_ignores_project_and_empty_namespace() {
        let a = Key::id("Task", 1).with_project("p1");
        let b = Key::id("Task", 1).with_namespace("");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_completeness() {
        assert!(Key::id("Task", 1).is_complete());
        assert!(Key::name("Task", "x").is_complete());
        assert!(!Key::incomplete("Task").is_complete());
        assert!(!Key::default().is_complete());
    }

    #[test]
    fn test_incomplete_key_canonical_form() {
        let parent = Key::id("List", 3);
        let key = Key::incomplete("Task").with_parent(&parent);
        assert_eq!(key.cache_key(), "[default]/List/3/Task");
        assert_eq!(key.kind(), Some("Task"));
    }

    proptest! {
        #[test]
        fn prop_cache_key_separates_distinct_keys(
            kind in "[A-Z][a-z]{1,6}",
            a in any::<i64>(),
            b in any::<i64>(),
            name in "[a-z0-9/\"]{0,8}",
        ) {
            prop_assert_eq!(Key::id(&kind, a) == Key::id(&kind, b), a == b);
            prop_assert_ne!(Key::id(&kind, a), Key::name(&kind, name.clone()));
            prop_assert_ne!(Key::name(&kind, name.clone()), Key::name(&kind, format!("{name}x")));
        }
    }
}
