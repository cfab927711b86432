//! TreeSync Sync - One-way directory synchronization engine
//!
//! Provides:
//! - Read-only tree scanning into snapshots
//! - Pure snapshot diffing into ordered actions
//! - Per-action application with failure isolation
//! - A fixed-interval cycle scheduler with cancellation
//!
//! ## Modules
//!
//! - [`filesystem`] - Local filesystem adapter (atomic copies, SHA-256)
//! - [`scanner`] - Walks a tree into a [`Snapshot`](treesync_core::domain::Snapshot)
//! - [`diff`] - Computes the ordered action list between two snapshots
//! - [`applier`] - Applies one action to the destination tree
//! - [`engine`] - Runs a single scan/diff/apply cycle
//! - [`scheduler`] - Repeats cycles at a fixed interval until stopped

pub mod applier;
pub mod diff;
pub mod engine;
pub mod filesystem;
pub mod scanner;
pub mod scheduler;

use std::path::PathBuf;

use thiserror::Error;
use treesync_core::domain::{ApplyErrorKind, NodeKind};

/// Errors that abort the scan of a tree (and with it, the current cycle)
#[derive(Debug, Error)]
pub enum ScanError {
    /// The tree root does not exist
    #[error("Root not found: {0}")]
    RootNotFound(PathBuf),

    /// The tree root exists but is not a directory
    #[error("Root is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Insufficient permissions to read part of the tree
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Any other I/O failure while walking the tree
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    /// Wraps an I/O error raised at `path`, keeping permission failures distinct
    pub fn from_io(path: PathBuf, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => ScanError::PermissionDenied(path),
            std::io::ErrorKind::NotFound => ScanError::RootNotFound(path),
            _ => ScanError::Io { path, source },
        }
    }
}

/// Errors raised while applying a single action
#[derive(Debug, Error)]
pub enum ApplyError {
    /// Insufficient filesystem permissions
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The target is busy or locked by another process
    #[error("File locked: {0}")]
    Locked(PathBuf),

    /// A directory scheduled for deletion still has entries
    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(PathBuf),

    /// The destination holds a different kind of entry than the action expects
    #[error("Kind mismatch at {path}: expected {expected}, found {found}")]
    KindMismatch {
        path: PathBuf,
        expected: NodeKind,
        found: String,
    },

    /// The source entry disappeared after it was scanned
    #[error("Source missing: {0}")]
    SourceMissing(PathBuf),

    /// Any other I/O failure
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ApplyError {
    /// Classifies an I/O error raised while touching `path`
    pub fn from_io(path: PathBuf, source: std::io::Error) -> Self {
        use std::io::ErrorKind;

        if source.kind() == ErrorKind::PermissionDenied {
            return ApplyError::PermissionDenied(path);
        }
        if source.kind() == ErrorKind::WouldBlock {
            return ApplyError::Locked(path);
        }

        #[cfg(unix)]
        match source.raw_os_error() {
            Some(libc::EBUSY) | Some(libc::ETXTBSY) => return ApplyError::Locked(path),
            Some(libc::ENOTEMPTY) => return ApplyError::DirectoryNotEmpty(path),
            Some(libc::EACCES) | Some(libc::EPERM) | Some(libc::EROFS) => {
                return ApplyError::PermissionDenied(path)
            }
            _ => {}
        }

        ApplyError::Io { path, source }
    }

    /// The report-level category of this error
    pub fn kind(&self) -> ApplyErrorKind {
        match self {
            ApplyError::PermissionDenied(_) => ApplyErrorKind::PermissionDenied,
            ApplyError::Locked(_) => ApplyErrorKind::Locked,
            ApplyError::DirectoryNotEmpty(_) => ApplyErrorKind::DirectoryNotEmpty,
            ApplyError::KindMismatch { .. } => ApplyErrorKind::KindMismatch,
            ApplyError::SourceMissing(_) => ApplyErrorKind::SourceMissing,
            ApplyError::Io { .. } => ApplyErrorKind::Io,
        }
    }
}
