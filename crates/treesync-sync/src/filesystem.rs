//! Local filesystem adapter (secondary/driven adapter)
//!
//! Implements [`ILocalFileSystem`] using `tokio::fs` for async file operations.
//!
//! ## Design Decisions
//!
//! - **Atomic writes**: Copies go to a hidden temporary sibling and are
//!   renamed into place, so the final path never shows a truncated file.
//! - **No-follow stat**: Every stat uses `symlink_metadata`; symlinks are
//!   reported as symlinks and never traversed.
//! - **Modification time**: Copies carry the source's mtime, which is what
//!   keeps the next cycle's diff empty.
//! - **SHA-256**: Content hashes are streamed in fixed-size chunks.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument};
use treesync_core::{
    domain::{newtypes::ContentHash, node::NodeKind},
    ports::local_filesystem::{DirEntry, EntryState, ILocalFileSystem},
};
use uuid::Uuid;

/// Prefix of the temporary sibling used during atomic copies
pub const TEMP_PREFIX: &str = ".treesync-";

/// Suffix of the temporary sibling used during atomic copies
pub const TEMP_SUFFIX: &str = ".tmp";

/// Read buffer size for hashing
const HASH_CHUNK_SIZE: usize = 64 * 1024;

// ============================================================================
// LocalFileSystemAdapter struct
// ============================================================================

/// Adapter that bridges the [`ILocalFileSystem`] port to the real filesystem.
///
/// This is a zero-sized struct because all operations derive their context
/// from their path arguments. Roots live at a higher layer.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystemAdapter;

impl LocalFileSystemAdapter {
    /// Create a new `LocalFileSystemAdapter`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Path of a fresh temporary sibling used while copying into `target`
///
/// `dir/name` becomes `dir/.treesync-<uuid>.tmp`. The length is fixed so a
/// target name close to `NAME_MAX` still gets a valid temporary.
pub fn temp_sibling(target: &Path) -> PathBuf {
    target.with_file_name(format!(
        "{TEMP_PREFIX}{}{TEMP_SUFFIX}",
        Uuid::new_v4().simple()
    ))
}

/// Whether `name` looks like a temporary created by [`temp_sibling`]
pub fn is_temp_name(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX)
}

fn entry_state(metadata: &std::fs::Metadata) -> EntryState {
    let file_type = metadata.file_type();
    let kind = if file_type.is_symlink() {
        Some(NodeKind::Symlink)
    } else if file_type.is_dir() {
        Some(NodeKind::Directory)
    } else if file_type.is_file() {
        Some(NodeKind::File)
    } else {
        None
    };

    let size = if kind == Some(NodeKind::File) {
        metadata.len()
    } else {
        0
    };

    let modified = metadata.modified().ok().map(DateTime::<Utc>::from);

    EntryState {
        kind,
        size,
        modified,
    }
}

// ============================================================================
// ILocalFileSystem implementation
// ============================================================================

#[async_trait::async_trait]
impl ILocalFileSystem for LocalFileSystemAdapter {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn list_dir(&self, path: &Path) -> std::io::Result<Vec<DirEntry>> {
        let mut reader = tokio::fs::read_dir(path).await?;
        let mut entries = Vec::new();

        while let Some(entry) = reader.next_entry().await? {
            let entry_path = entry.path();
            let metadata = match tokio::fs::symlink_metadata(&entry_path).await {
                Ok(m) => m,
                // Removed between readdir and stat
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            entries.push(DirEntry {
                path: entry_path,
                state: entry_state(&metadata),
            });
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(entries = entries.len(), "directory listed");
        Ok(entries)
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn stat(&self, path: &Path) -> std::io::Result<Option<EntryState>> {
        match tokio::fs::symlink_metadata(path).await {
            Ok(metadata) => Ok(Some(entry_state(&metadata))),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("path not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn read_link(&self, path: &Path) -> std::io::Result<PathBuf> {
        tokio::fs::read_link(path).await
    }

    #[instrument(skip(self), fields(source = %source.display(), target = %target.display()))]
    async fn copy_file_atomic(&self, source: &Path, target: &Path) -> std::io::Result<u64> {
        // Read the mtime before copying: if the source changes mid-copy the
        // destination ends up older and is refreshed on the next cycle.
        let modified = tokio::fs::metadata(source).await?.modified()?;
        let tmp_path = temp_sibling(target);

        let result = async {
            debug!(?tmp_path, "copying to temporary file");
            let bytes = tokio::fs::copy(source, &tmp_path).await?;

            // The copy carries the source's mode, which may be read-only.
            // Owning the file is enough to set its times through a read handle.
            let tmp_owned = tmp_path.clone();
            tokio::task::spawn_blocking(move || -> std::io::Result<()> {
                let file = std::fs::File::open(&tmp_owned)?;
                file.set_modified(modified)?;
                file.sync_all()
            })
            .await
            .map_err(std::io::Error::other)??;

            debug!("renaming temporary file to target");
            tokio::fs::rename(&tmp_path, target).await?;
            Ok::<_, std::io::Error>(bytes)
        }
        .await;

        if result.is_err() {
            // Best effort: never leave a stray temporary behind
            let _ = tokio::fs::remove_file(&tmp_path).await;
        }

        if let Ok(bytes) = &result {
            debug!(bytes, "copy complete");
        }
        result
    }

    #[instrument(skip(self), fields(link = %link.display()))]
    async fn create_symlink(&self, target: &Path, link: &Path) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            tokio::fs::symlink(target, link).await
        }
        #[cfg(windows)]
        {
            tokio::fs::symlink_file(target, link).await
        }
        #[cfg(not(any(unix, windows)))]
        {
            let _ = (target, link);
            Err(std::io::Error::new(
                ErrorKind::Unsupported,
                "symlinks are not supported on this platform",
            ))
        }
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn create_directory(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::create_dir(path).await
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn create_directory_all(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn remove_file(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::remove_file(path).await
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn remove_directory(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::remove_dir(path).await
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn compute_hash(&self, path: &Path) -> std::io::Result<ContentHash> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; HASH_CHUNK_SIZE];

        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        let digest: [u8; 32] = hasher.finalize().into();
        let hash = ContentHash::from_digest(&digest);
        debug!(hash = %hash, "hash computed");
        Ok(hash)
    }
}

// ============================================================================
// Unit tests
// ============================================================================
