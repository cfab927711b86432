//! Destination-side filesystem actions
//!
//! An [`Action`] is produced by the diff engine and consumed exactly once by
//! the applier. Ordering between actions is the diff engine's concern; see
//! [`Action::sort_key`].

use serde::{Deserialize, Serialize};

use super::newtypes::RelativePath;
use super::node::NodeKind;

/// A single operation that moves the destination tree toward the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Action {
    /// Create an entry that exists only in the source
    Create { path: RelativePath, kind: NodeKind },
    /// Replace the content of an entry present on both sides
    UpdateContent { path: RelativePath },
    /// Remove an entry that exists only in the destination
    Delete { path: RelativePath, kind: NodeKind },
}

impl Action {
    pub fn create(path: RelativePath, kind: NodeKind) -> Self {
        Action::Create { path, kind }
    }

    pub fn update(path: RelativePath) -> Self {
        Action::UpdateContent { path }
    }

    pub fn delete(path: RelativePath, kind: NodeKind) -> Self {
        Action::Delete { path, kind }
    }

    /// Path the action operates on
    pub fn path(&self) -> &RelativePath {
        match self {
            Action::Create { path, .. } => path,
            Action::UpdateContent { path } => path,
            Action::Delete { path, .. } => path,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Action::Delete { .. })
    }

    /// Whether this action creates or removes a directory
    pub fn targets_directory(&self) -> bool {
        matches!(
            self,
            Action::Create {
                kind: NodeKind::Directory,
                ..
            } | Action::Delete {
                kind: NodeKind::Directory,
                ..
            }
        )
    }

    /// Total order used to sequence a cycle's actions
    ///
    /// Deletes come first, deepest first; creates and updates follow,
    /// shallowest first. At equal depth directories precede other kinds,
    /// then paths compare lexicographically.
    pub fn sort_key(&self) -> (u8, i64, bool, &str) {
        let depth = self.path().depth() as i64;
        let (phase, depth) = if self.is_delete() {
            (0, -depth)
        } else {
            (1, depth)
        };
        (phase, depth, !self.targets_directory(), self.path().as_str())
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Create { path, kind } => write!(f, "Create({path}, {kind})"),
            Action::UpdateContent { path } => write!(f, "UpdateContent({path})"),
            Action::Delete { path, kind } => write!(f, "Delete({path}, {kind})"),
        }
    }
}
