//! Local filesystem port (driven/secondary port)
//!
//! This module defines the primitive operations the synchronization engine
//! needs from the host filesystem. The scanner and applier depend only on
//! this trait, so tests can substitute failing or instrumented adapters.
//!
//! ## Design Notes
//!
//! - Uses `std::io::Result` so callers can classify failures by
//!   [`std::io::ErrorKind`] and raw OS error codes.
//! - `stat` never follows symlinks.
//! - `copy_file_atomic` must never leave a partially written file at the
//!   final path.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::domain::newtypes::ContentHash;
use crate::domain::node::NodeKind;

// ============================================================================
// EntryState
// ============================================================================

/// Metadata about a path, read without following symlinks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryState {
    /// File, directory or symlink; `None` for other entry types
    /// (sockets, FIFOs, devices)
    pub kind: Option<NodeKind>,
    /// Size in bytes (0 for anything but regular files)
    pub size: u64,
    /// Last modification time, when the platform reports one
    pub modified: Option<DateTime<Utc>>,
}

impl EntryState {
    /// Returns true if this is a regular file
    pub fn is_file(&self) -> bool {
        self.kind == Some(NodeKind::File)
    }

    /// Returns true if this is a directory
    pub fn is_directory(&self) -> bool {
        self.kind == Some(NodeKind::Directory)
    }

    /// Returns true if this is a symbolic link
    pub fn is_symlink(&self) -> bool {
        self.kind == Some(NodeKind::Symlink)
    }
}

// ============================================================================
// DirEntry
// ============================================================================

/// A single entry returned by [`ILocalFileSystem::list_dir`]
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Full path of the entry
    pub path: PathBuf,
    /// Metadata for the entry (not following symlinks)
    pub state: EntryState,
}

// ============================================================================
// ILocalFileSystem trait
// ============================================================================

/// Port trait for local filesystem operations
///
/// All paths are absolute host paths; translating between relative tree
/// paths and host paths is the caller's job.
#[async_trait::async_trait]
pub trait ILocalFileSystem: Send + Sync {
    /// Lists the immediate children of a directory
    ///
    /// # Errors
    /// Returns an error if the directory doesn't exist or cannot be read
    async fn list_dir(&self, path: &Path) -> std::io::Result<Vec<DirEntry>>;

    /// Gets the state of a path without following symlinks
    ///
    /// Returns `Ok(None)` when the path doesn't exist.
    async fn stat(&self, path: &Path) -> std::io::Result<Option<EntryState>>;

    /// Reads the target of a symbolic link
    async fn read_link(&self, path: &Path) -> std::io::Result<PathBuf>;

    /// Copies `source` to `target` atomically, preserving the modification time
    ///
    /// Content is written to a temporary sibling of `target` and renamed
    /// into place once complete. An existing `target` file is replaced.
    async fn copy_file_atomic(&self, source: &Path, target: &Path) -> std::io::Result<u64>;

    /// Creates a symbolic link at `link` pointing at `target`
    async fn create_symlink(&self, target: &Path, link: &Path) -> std::io::Result<()>;

    /// Creates a single directory (the parent must exist)
    async fn create_directory(&self, path: &Path) -> std::io::Result<()>;

    /// Creates a directory and all missing parents (`mkdir -p`)
    async fn create_directory_all(&self, path: &Path) -> std::io::Result<()>;

    /// Removes a file or symlink
    async fn remove_file(&self, path: &Path) -> std::io::Result<()>;

    /// Removes an empty directory; fails if the directory has entries
    async fn remove_directory(&self, path: &Path) -> std::io::Result<()>;

    /// Computes the SHA-256 digest of a file's content
    async fn compute_hash(&self, path: &Path) -> std::io::Result<ContentHash>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_state_predicates() {
        let file = EntryState {
            kind: Some(NodeKind::File),
            size: 3,
            modified: None,
        };
        assert!(file.is_file());
        assert!(!file.is_directory());

        let fifo = EntryState {
            kind: None,
            size: 0,
            modified: None,
        };
        assert!(!fifo.is_file());
        assert!(!fifo.is_directory());
        assert!(!fifo.is_symlink());
    }
}
