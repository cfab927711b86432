//! Snapshot model
//!
//! A [`Snapshot`] is the point-in-time view of one directory tree: every
//! entry below the root keyed by its [`RelativePath`]. Snapshots are built
//! fresh by the scanner each cycle and consumed by the diff engine.

use std::collections::btree_map::{self, BTreeMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{ContentHash, RelativePath};

/// Kind of filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Directory,
    /// Symbolic link, recorded as an opaque leaf and never followed
    Symlink,
    /// Socket, FIFO or device; only ever recorded in the destination tree
    Special,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::File => write!(f, "file"),
            NodeKind::Directory => write!(f, "directory"),
            NodeKind::Symlink => write!(f, "symlink"),
            NodeKind::Special => write!(f, "special file"),
        }
    }
}

/// Metadata for a single entry in a tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    path: RelativePath,
    kind: NodeKind,
    /// Size in bytes; always 0 for directories and symlinks
    size: u64,
    modified_at: DateTime<Utc>,
    /// Present only for files scanned in checksum mode
    content_hash: Option<ContentHash>,
    /// Present only for symlinks
    link_target: Option<String>,
}

impl Node {
    /// Creates a regular file node
    pub fn file(path: RelativePath, size: u64, modified_at: DateTime<Utc>) -> Self {
        Self {
            path,
            kind: NodeKind::File,
            size,
            modified_at,
            content_hash: None,
            link_target: None,
        }
    }

    /// Creates a directory node
    pub fn directory(path: RelativePath, modified_at: DateTime<Utc>) -> Self {
        Self {
            path,
            kind: NodeKind::Directory,
            size: 0,
            modified_at,
            content_hash: None,
            link_target: None,
        }
    }

    /// Creates a symlink node pointing at `target`
    pub fn symlink(
        path: RelativePath,
        target: impl Into<String>,
        modified_at: DateTime<Utc>,
    ) -> Self {
        Self {
            path,
            kind: NodeKind::Symlink,
            size: 0,
            modified_at,
            content_hash: None,
            link_target: Some(target.into()),
        }
    }

    /// Creates a node for a socket, FIFO or device
    pub fn special(path: RelativePath, modified_at: DateTime<Utc>) -> Self {
        Self {
            path,
            kind: NodeKind::Special,
            size: 0,
            modified_at,
            content_hash: None,
            link_target: None,
        }
    }

    /// Attaches a content hash (files only; ignored for other kinds)
    #[must_use]
    pub fn with_content_hash(mut self, hash: ContentHash) -> Self {
        if self.kind == NodeKind::File {
            self.content_hash = Some(hash);
        }
        self
    }

    pub fn path(&self) -> &RelativePath {
        &self.path
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    pub fn content_hash(&self) -> Option<&ContentHash> {
        self.content_hash.as_ref()
    }

    pub fn link_target(&self) -> Option<&str> {
        self.link_target.as_deref()
    }
}

/// Immutable mapping from relative path to [`Node`]
///
/// Iteration is in lexicographic path order, which keeps logs and test
/// expectations reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    nodes: BTreeMap<RelativePath, Node>,
}

impl Snapshot {
    /// Creates an empty snapshot (e.g. for an empty tree)
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot from a list of nodes
    ///
    /// # Errors
    /// Returns `DomainError::DuplicatePath` if two nodes share a path
    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Result<Self, DomainError> {
        let mut map = BTreeMap::new();
        for node in nodes {
            match map.entry(node.path().clone()) {
                btree_map::Entry::Occupied(entry) => {
                    return Err(DomainError::DuplicatePath(entry.key().to_string()));
                }
                btree_map::Entry::Vacant(entry) => {
                    entry.insert(node);
                }
            }
        }
        Ok(Self { nodes: map })
    }

    pub fn get(&self, path: &RelativePath) -> Option<&Node> {
        self.nodes.get(path)
    }

    pub fn contains(&self, path: &RelativePath) -> bool {
        self.nodes.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates nodes in path order
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Iterates paths in order
    pub fn paths(&self) -> impl Iterator<Item = &RelativePath> {
        self.nodes.keys()
    }

    /// Structural equality: same paths, kinds, sizes and link targets
    ///
    /// Timestamps are ignored, which is what convergence is measured
    /// against after a cycle.
    pub fn structurally_equal(&self, other: &Snapshot) -> bool {
        self.len() == other.len()
            && self.iter().zip(other.iter()).all(|(a, b)| {
                a.path() == b.path()
                    && a.kind() == b.kind()
                    && a.size() == b.size()
                    && a.link_target() == b.link_target()
            })
    }

    /// Total bytes across all file nodes
    pub fn total_file_bytes(&self) -> u64 {
        self.iter()
            .filter(|n| n.kind() == NodeKind::File)
            .map(Node::size)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn path(s: &str) -> RelativePath {
        RelativePath::new(s).unwrap()
    }

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_from_nodes_orders_lexicographically() {
        let snapshot = Snapshot::from_nodes(vec![
            Node::file(path("sub/b.txt"), 3, t(1)),
            Node::file(path("a.txt"), 10, t(100)),
            Node::directory(path("sub"), t(1)),
        ])
        .unwrap();

        let paths: Vec<&str> = snapshot.paths().map(RelativePath::as_str).collect();
        assert_eq!(paths, vec!["a.txt", "sub", "sub/b.txt"]);
        assert_eq!(snapshot.total_file_bytes(), 13);
    }

    #[test]
    fn test_from_nodes_rejects_duplicates() {
        let result = Snapshot::from_nodes(vec![
            Node::file(path("a.txt"), 1, t(1)),
            Node::directory(path("a.txt"), t(1)),
        ]);
        assert_eq!(
            result.unwrap_err(),
            DomainError::DuplicatePath("a.txt".to_string())
        );
    }

    #[test]
    fn test_structural_equality_ignores_timestamps() {
        let a = Snapshot::from_nodes(vec![Node::file(path("f"), 5, t(1))]).unwrap();
        let b = Snapshot::from_nodes(vec![Node::file(path("f"), 5, t(999))]).unwrap();
        let c = Snapshot::from_nodes(vec![Node::file(path("f"), 6, t(1))]).unwrap();

        assert!(a.structurally_equal(&b));
        assert!(!a.structurally_equal(&c));
        assert!(!a.structurally_equal(&Snapshot::new()));
    }

    #[test]
    fn test_content_hash_only_on_files() {
        let hash = ContentHash::from_digest(&[0; 32]);
        let dir = Node::directory(path("d"), t(0)).with_content_hash(hash.clone());
        let file = Node::file(path("f"), 0, t(0)).with_content_hash(hash.clone());

        assert!(dir.content_hash().is_none());
        assert_eq!(file.content_hash(), Some(&hash));
    }

    #[test]
    fn test_symlink_node() {
        let link = Node::symlink(path("l"), "../target", t(0));
        assert_eq!(link.kind(), NodeKind::Symlink);
        assert_eq!(link.link_target(), Some("../target"));
        assert_eq!(link.size(), 0);
    }
}
