//! Action applier
//!
//! Executes one [`Action`] against the destination tree. Each call is
//! independent: a failure is returned to the caller and never affects other
//! actions. The source tree is only ever read.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, instrument};
use treesync_core::{
    domain::{Action, NodeKind, RelativePath},
    ports::local_filesystem::{EntryState, ILocalFileSystem},
};

use crate::ApplyError;

/// Applies actions between a fixed source root and destination root
#[derive(Clone)]
pub struct ActionApplier {
    fs: Arc<dyn ILocalFileSystem>,
    source_root: PathBuf,
    dest_root: PathBuf,
}

fn describe(state: &EntryState) -> String {
    match state.kind {
        Some(kind) => kind.to_string(),
        None => "special file".to_string(),
    }
}

impl ActionApplier {
    pub fn new(fs: Arc<dyn ILocalFileSystem>, source_root: PathBuf, dest_root: PathBuf) -> Self {
        Self {
            fs,
            source_root,
            dest_root,
        }
    }

    /// Applies a single action to the destination
    ///
    /// # Errors
    /// Returns an [`ApplyError`] describing why the action could not be
    /// applied; the destination is left as it was for that path.
    #[instrument(skip(self), fields(action = %action))]
    pub async fn apply(&self, action: &Action) -> Result<(), ApplyError> {
        match action {
            Action::Create {
                path,
                kind: NodeKind::Directory,
            } => self.create_directory(path).await,
            Action::Create { path, kind } => self.sync_leaf(path, Some(*kind)).await,
            Action::UpdateContent { path } => self.sync_leaf(path, None).await,
            Action::Delete {
                path,
                kind: NodeKind::Directory,
            } => self.delete_directory(path).await,
            Action::Delete { path, .. } => self.delete_leaf(path).await,
        }
    }

    async fn stat_dest(&self, target: &Path) -> Result<Option<EntryState>, ApplyError> {
        self.fs
            .stat(target)
            .await
            .map_err(|e| ApplyError::from_io(target.to_path_buf(), e))
    }

    async fn create_directory(&self, path: &RelativePath) -> Result<(), ApplyError> {
        let target = path.to_path_under(&self.dest_root);

        match self.stat_dest(&target).await? {
            Some(state) if state.is_directory() => {
                debug!("Directory already exists");
                return Ok(());
            }
            Some(state) => {
                return Err(ApplyError::KindMismatch {
                    found: describe(&state),
                    path: target,
                    expected: NodeKind::Directory,
                })
            }
            None => {}
        }

        match self.fs.create_directory(&target).await {
            Ok(()) => {
                debug!(path = %target.display(), "Directory created");
                Ok(())
            }
            // Created by someone else between the stat and the mkdir
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                match self.stat_dest(&target).await? {
                    Some(state) if state.is_directory() => {
                        debug!("Directory appeared concurrently");
                        Ok(())
                    }
                    Some(state) => Err(ApplyError::KindMismatch {
                        found: describe(&state),
                        path: target,
                        expected: NodeKind::Directory,
                    }),
                    None => Err(ApplyError::from_io(target, e)),
                }
            }
            Err(e) => Err(ApplyError::from_io(target, e)),
        }
    }

    /// Creates or refreshes a file or symlink from the source
    ///
    /// `expected` is the kind recorded at scan time for creates; updates
    /// take whatever kind the source holds now.
    async fn sync_leaf(
        &self,
        path: &RelativePath,
        expected: Option<NodeKind>,
    ) -> Result<(), ApplyError> {
        let source = path.to_path_under(&self.source_root);
        let target = path.to_path_under(&self.dest_root);

        let source_state = self
            .fs
            .stat(&source)
            .await
            .map_err(|e| ApplyError::from_io(source.clone(), e))?
            .ok_or_else(|| ApplyError::SourceMissing(source.clone()))?;

        let kind = match (source_state.kind, expected) {
            (Some(found), Some(expected)) if found != expected => {
                return Err(ApplyError::KindMismatch {
                    path: source,
                    expected,
                    found: found.to_string(),
                })
            }
            (Some(NodeKind::Directory), None) | (Some(NodeKind::Special), _) | (None, _) => {
                return Err(ApplyError::KindMismatch {
                    path: source,
                    expected: NodeKind::File,
                    found: describe(&source_state),
                })
            }
            (Some(kind), _) => kind,
        };

        match kind {
            NodeKind::Symlink => self.replace_symlink(&source, &target).await,
            _ => self.copy_file(&source, &target).await,
        }
    }

    async fn copy_file(&self, source: &Path, target: &Path) -> Result<(), ApplyError> {
        if let Some(state) = self.stat_dest(target).await? {
            if !state.is_file() {
                return Err(ApplyError::KindMismatch {
                    path: target.to_path_buf(),
                    expected: NodeKind::File,
                    found: describe(&state),
                });
            }
        }

        match self.fs.copy_file_atomic(source, target).await {
            Ok(bytes) => {
                debug!(bytes, path = %target.display(), "File copied");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // Either the source vanished mid-copy or the destination
                // parent is gone
                match self.fs.stat(source).await {
                    Ok(None) => Err(ApplyError::SourceMissing(source.to_path_buf())),
                    _ => Err(ApplyError::from_io(target.to_path_buf(), e)),
                }
            }
            Err(e) => Err(ApplyError::from_io(target.to_path_buf(), e)),
        }
    }

    async fn replace_symlink(&self, source: &Path, target: &Path) -> Result<(), ApplyError> {
        let link_target = match self.fs.read_link(source).await {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ApplyError::SourceMissing(source.to_path_buf()))
            }
            Err(e) => return Err(ApplyError::from_io(source.to_path_buf(), e)),
        };

        match self.stat_dest(target).await? {
            Some(state) if state.is_symlink() => {
                self.fs
                    .remove_file(target)
                    .await
                    .map_err(|e| ApplyError::from_io(target.to_path_buf(), e))?;
            }
            Some(state) => {
                return Err(ApplyError::KindMismatch {
                    path: target.to_path_buf(),
                    expected: NodeKind::Symlink,
                    found: describe(&state),
                })
            }
            None => {}
        }

        self.fs
            .create_symlink(&link_target, target)
            .await
            .map_err(|e| ApplyError::from_io(target.to_path_buf(), e))?;
        debug!(path = %target.display(), link_target = %link_target.display(), "Symlink created");
        Ok(())
    }

    async fn delete_leaf(&self, path: &RelativePath) -> Result<(), ApplyError> {
        let target = path.to_path_under(&self.dest_root);

        match self.stat_dest(&target).await? {
            None => {
                debug!("Already absent");
                return Ok(());
            }
            Some(state) if state.is_directory() => {
                return Err(ApplyError::KindMismatch {
                    path: target,
                    expected: NodeKind::File,
                    found: describe(&state),
                })
            }
            Some(_) => {}
        }

        match self.fs.remove_file(&target).await {
            Ok(()) => {
                debug!(path = %target.display(), "Removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ApplyError::from_io(target, e)),
        }
    }

    async fn delete_directory(&self, path: &RelativePath) -> Result<(), ApplyError> {
        let target = path.to_path_under(&self.dest_root);

        match self.stat_dest(&target).await? {
            None => {
                debug!("Already absent");
                return Ok(());
            }
            Some(state) if !state.is_directory() => {
                return Err(ApplyError::KindMismatch {
                    path: target,
                    expected: NodeKind::Directory,
                    found: describe(&state),
                })
            }
            Some(_) => {}
        }

        let entries = self
            .fs
            .list_dir(&target)
            .await
            .map_err(|e| ApplyError::from_io(target.clone(), e))?;
        if !entries.is_empty() {
            return Err(ApplyError::DirectoryNotEmpty(target));
        }

        match self.fs.remove_directory(&target).await {
            Ok(()) => {
                debug!(path = %target.display(), "Directory removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ApplyError::from_io(target, e)),
        }
    }
}
