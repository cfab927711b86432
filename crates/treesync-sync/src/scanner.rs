//! Tree scanner
//!
//! Walks one directory tree through the [`ILocalFileSystem`] port and
//! produces a [`Snapshot`]. Scanning is read-only: nothing under the root is
//! ever modified.
//!
//! Sockets, FIFOs and devices are never mirrored. A source scan skips them; a
//! destination scan records them as [`NodeKind::Special`] so they get deleted.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};
use treesync_core::{
    config::CompareMode,
    domain::{Node, NodeKind, RelativePath, Snapshot},
    ports::local_filesystem::{DirEntry, ILocalFileSystem},
};

use crate::ScanError;

type WalkFuture<'a> =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), ScanError>> + Send + 'a>>;

/// Builds snapshots of directory trees
#[derive(Clone)]
pub struct TreeScanner {
    fs: Arc<dyn ILocalFileSystem>,
    compare: CompareMode,
    record_special: bool,
}

impl TreeScanner {
    pub fn new(fs: Arc<dyn ILocalFileSystem>, compare: CompareMode) -> Self {
        Self {
            fs,
            compare,
            record_special: false,
        }
    }

    /// Records special files as [`NodeKind::Special`] nodes instead of
    /// skipping them (used for the destination tree)
    #[must_use]
    pub fn recording_special_files(mut self) -> Self {
        self.record_special = true;
        self
    }

    /// Scans the tree rooted at `root`
    ///
    /// # Errors
    /// Returns `ScanError` if the root does not exist, is not a directory,
    /// or any directory below it cannot be read.
    #[instrument(skip(self), fields(root = %root.display(), compare = ?self.compare))]
    pub async fn scan(&self, root: &Path) -> Result<Snapshot, ScanError> {
        let state = self
            .fs
            .stat(root)
            .await
            .map_err(|e| ScanError::from_io(root.to_path_buf(), e))?
            .ok_or_else(|| ScanError::RootNotFound(root.to_path_buf()))?;

        // A symlinked root is accepted; listing it fails if it doesn't lead
        // to a directory.
        match state.kind {
            Some(NodeKind::Directory) | Some(NodeKind::Symlink) => {}
            _ => return Err(ScanError::NotADirectory(root.to_path_buf())),
        }

        let mut nodes = Vec::new();
        self.walk(root, None, &mut nodes).await?;

        let snapshot = Snapshot::from_nodes(nodes).map_err(|e| ScanError::Io {
            path: root.to_path_buf(),
            source: std::io::Error::new(ErrorKind::InvalidData, e),
        })?;

        debug!(
            entries = snapshot.len(),
            bytes = snapshot.total_file_bytes(),
            "Scan complete"
        );
        Ok(snapshot)
    }

    fn walk<'a>(
        &'a self,
        dir: &'a Path,
        parent: Option<&'a RelativePath>,
        nodes: &'a mut Vec<Node>,
    ) -> WalkFuture<'a> {
        Box::pin(async move {
            let entries = match self.fs.list_dir(dir).await {
                Ok(entries) => entries,
                // A subdirectory removed mid-scan is simply absent
                Err(e) if e.kind() == ErrorKind::NotFound && parent.is_some() => {
                    debug!(path = %dir.display(), "Directory vanished during scan");
                    return Ok(());
                }
                Err(e) => return Err(ScanError::from_io(dir.to_path_buf(), e)),
            };

            for entry in entries {
                let Some(relative) = relative_path_for(&entry, parent) else {
                    continue;
                };

                let modified_at = entry
                    .state
                    .modified
                    .unwrap_or_else(|| DateTime::<Utc>::from(std::time::UNIX_EPOCH));

                match entry.state.kind {
                    Some(NodeKind::Directory) => {
                        nodes.push(Node::directory(relative.clone(), modified_at));
                        self.walk(&entry.path, Some(&relative), nodes).await?;
                    }
                    Some(NodeKind::File) => {
                        let mut node = Node::file(relative, entry.state.size, modified_at);
                        if self.compare == CompareMode::Checksum {
                            match self.fs.compute_hash(&entry.path).await {
                                Ok(hash) => node = node.with_content_hash(hash),
                                Err(e) if e.kind() == ErrorKind::NotFound => {
                                    debug!(path = %entry.path.display(), "File vanished during scan");
                                    continue;
                                }
                                Err(e) => return Err(ScanError::from_io(entry.path, e)),
                            }
                        }
                        nodes.push(node);
                    }
                    Some(NodeKind::Symlink) => {
                        let target = match self.fs.read_link(&entry.path).await {
                            Ok(target) => target,
                            Err(e) if e.kind() == ErrorKind::NotFound => continue,
                            Err(e) => return Err(ScanError::from_io(entry.path, e)),
                        };
                        let Some(target) = target.to_str().map(str::to_owned) else {
                            warn!(path = %entry.path.display(), "Skipping symlink with non-UTF-8 target");
                            continue;
                        };
                        nodes.push(Node::symlink(relative, target, modified_at));
                    }
                    Some(NodeKind::Special) | None if self.record_special => {
                        nodes.push(Node::special(relative, modified_at));
                    }
                    Some(NodeKind::Special) | None => {
                        debug!(path = %entry.path.display(), "Skipping special file");
                    }
                }
            }

            Ok(())
        })
    }
}

/// Relative path of `entry` below `parent`, or `None` (with a warning) when
/// the name cannot be represented
fn relative_path_for(entry: &DirEntry, parent: Option<&RelativePath>) -> Option<RelativePath> {
    let Some(name) = entry.path.file_name().and_then(|n| n.to_str()) else {
        warn!(path = ?entry.path, "Skipping entry with non-UTF-8 name");
        return None;
    };

    let result = match parent {
        Some(parent) => parent.join(name),
        None => RelativePath::new(name),
    };

    match result {
        Ok(path) => Some(path),
        Err(err) => {
            warn!(path = ?entry.path, %err, "Skipping invalid path");
            None
        }
    }
}
