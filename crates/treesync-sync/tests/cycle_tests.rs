//! End-to-end cycle tests against real temporary directories
//!
//! Covers the properties a full cycle must hold: idempotence, convergence,
//! deletion safety, action ordering and per-action failure isolation.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tempfile::TempDir;
use treesync_core::{
    config::CompareMode,
    domain::{ApplyErrorKind, ContentHash, NodeKind},
    ports::local_filesystem::{DirEntry, EntryState, ILocalFileSystem},
};
use treesync_sync::{
    diff::{diff, DiffOptions},
    engine::SyncEngine,
    filesystem::LocalFileSystemAdapter,
    scanner::TreeScanner,
};

// ============================================================================
// Helpers
// ============================================================================

fn write(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn set_mtime(path: &Path, time: SystemTime) {
    std::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}

fn mtime(path: &Path) -> SystemTime {
    std::fs::metadata(path).unwrap().modified().unwrap()
}

fn engine(
    fs: Arc<dyn ILocalFileSystem>,
    src: &Path,
    dst: &Path,
    compare: CompareMode,
) -> SyncEngine {
    SyncEngine::new(
        fs,
        src.to_path_buf(),
        dst.to_path_buf(),
        DiffOptions {
            compare,
            ..DiffOptions::default()
        },
    )
}

fn local_engine(src: &Path, dst: &Path) -> SyncEngine {
    engine(
        Arc::new(LocalFileSystemAdapter::new()),
        src,
        dst,
        CompareMode::Metadata,
    )
}

async fn assert_converged(src: &Path, dst: &Path) {
    let scanner = TreeScanner::new(Arc::new(LocalFileSystemAdapter::new()), CompareMode::Metadata);
    let source = scanner.scan(src).await.unwrap();
    let dest = scanner.scan(dst).await.unwrap();
    assert!(
        source.structurally_equal(&dest),
        "trees differ:\nsource: {source:?}\ndest: {dest:?}"
    );
    assert!(diff(&source, &dest, &DiffOptions::default()).is_empty());
}

/// Adapter that records mutating operations and can inject a concurrent
/// write when a particular file is removed
struct HookedFileSystem {
    inner: LocalFileSystemAdapter,
    ops: Mutex<Vec<String>>,
    /// When `.0` is removed, `.1` is written (simulating another writer)
    on_remove: Option<(PathBuf, PathBuf)>,
}

impl HookedFileSystem {
    fn new(on_remove: Option<(PathBuf, PathBuf)>) -> Self {
        Self {
            inner: LocalFileSystemAdapter::new(),
            ops: Mutex::new(Vec::new()),
            on_remove,
        }
    }

    fn record(&self, op: &str, path: &Path) {
        self.ops
            .lock()
            .unwrap()
            .push(format!("{op} {}", path.display()));
    }

    fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ILocalFileSystem for HookedFileSystem {
    async fn list_dir(&self, path: &Path) -> std::io::Result<Vec<DirEntry>> {
        self.inner.list_dir(path).await
    }

    async fn stat(&self, path: &Path) -> std::io::Result<Option<EntryState>> {
        self.inner.stat(path).await
    }

    async fn read_link(&self, path: &Path) -> std::io::Result<PathBuf> {
        self.inner.read_link(path).await
    }

    async fn copy_file_atomic(&self, source: &Path, target: &Path) -> std::io::Result<u64> {
        self.record("copy", target);
        self.inner.copy_file_atomic(source, target).await
    }

    async fn create_symlink(&self, target: &Path, link: &Path) -> std::io::Result<()> {
        self.record("symlink", link);
        self.inner.create_symlink(target, link).await
    }

    async fn create_directory(&self, path: &Path) -> std::io::Result<()> {
        self.record("mkdir", path);
        self.inner.create_directory(path).await
    }

    async fn create_directory_all(&self, path: &Path) -> std::io::Result<()> {
        self.inner.create_directory_all(path).await
    }

    async fn remove_file(&self, path: &Path) -> std::io::Result<()> {
        self.record("rm", path);
        self.inner.remove_file(path).await?;
        if let Some((trigger, late)) = &self.on_remove {
            if trigger == path {
                tokio::fs::write(late, b"late").await?;
            }
        }
        Ok(())
    }

    async fn remove_directory(&self, path: &Path) -> std::io::Result<()> {
        self.record("rmdir", path);
        self.inner.remove_directory(path).await
    }

    async fn compute_hash(&self, path: &Path) -> std::io::Result<ContentHash> {
        self.inner.compute_hash(path).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_fresh_destination_receives_whole_tree() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write(&src.path().join("a.txt"), b"0123456789");
    write(&src.path().join("sub/b.txt"), b"abc");

    let fs = Arc::new(HookedFileSystem::new(None));
    let report = engine(fs.clone(), src.path(), dst.path(), CompareMode::Metadata)
        .run_cycle()
        .await;

    assert!(report.is_clean());
    assert_eq!(report.actions_attempted, 3);
    assert_eq!(report.actions_succeeded, 3);
    assert_eq!(
        fs.ops(),
        vec![
            format!("mkdir {}", dst.path().join("sub").display()),
            format!("copy {}", dst.path().join("a.txt").display()),
            format!("copy {}", dst.path().join("sub/b.txt").display()),
        ]
    );
    assert_eq!(std::fs::read(dst.path().join("a.txt")).unwrap(), b"0123456789");
    assert_eq!(std::fs::read(dst.path().join("sub/b.txt")).unwrap(), b"abc");
}

#[tokio::test]
async fn test_second_cycle_does_nothing() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write(&src.path().join("x/y/z.bin"), &[7u8; 4096]);
    write(&src.path().join("top.txt"), b"top");
    write(&dst.path().join("stale.txt"), b"stale");
    let engine = local_engine(src.path(), dst.path());

    let first = engine.run_cycle().await;
    assert!(first.is_clean());

    let second = engine.run_cycle().await;
    assert!(second.is_noop(), "second cycle attempted {}", second.actions_attempted);
}

#[tokio::test]
async fn test_cycle_converges_mixed_drift() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();

    write(&src.path().join("keep/same.txt"), b"same");
    write(&src.path().join("keep/grown.txt"), b"longer content");
    write(&src.path().join("new/deep/file.txt"), b"new");
    write(&src.path().join("was_file/inner.txt"), b"inner");

    write(&dst.path().join("keep/grown.txt"), b"short");
    write(&dst.path().join("gone/deep/old.txt"), b"old");
    write(&dst.path().join("was_file"), b"i am a file");

    let report = local_engine(src.path(), dst.path()).run_cycle().await;

    assert!(report.is_clean(), "failures: {:?}", report.actions_failed);
    assert_converged(src.path(), dst.path()).await;
    assert_eq!(
        std::fs::read(dst.path().join("keep/grown.txt")).unwrap(),
        b"longer content"
    );
}

#[tokio::test]
async fn test_identical_files_are_left_untouched() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let past = SystemTime::now() - Duration::from_secs(7200);

    write(&src.path().join("same.txt"), b"same");
    set_mtime(&src.path().join("same.txt"), past);
    write(&dst.path().join("same.txt"), b"same");
    set_mtime(&dst.path().join("same.txt"), mtime(&src.path().join("same.txt")));
    write(&src.path().join("only_src.txt"), b"new");
    write(&dst.path().join("only_dst.txt"), b"extra");

    let before = mtime(&dst.path().join("same.txt"));
    let report = local_engine(src.path(), dst.path()).run_cycle().await;

    assert!(report.is_clean());
    assert_eq!(report.actions_attempted, 2);
    assert_eq!(mtime(&dst.path().join("same.txt")), before);
    assert!(dst.path().join("only_src.txt").exists());
    assert!(!dst.path().join("only_dst.txt").exists());
}

#[tokio::test]
async fn test_deletes_precede_creates_and_children_precede_parents() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write(&dst.path().join("old/a/b/c.txt"), b"c");
    write(&dst.path().join("old/a/d.txt"), b"d");
    write(&src.path().join("fresh/e/f.txt"), b"f");

    let fs = Arc::new(HookedFileSystem::new(None));
    let report = engine(fs.clone(), src.path(), dst.path(), CompareMode::Metadata)
        .run_cycle()
        .await;
    assert!(report.is_clean());

    let ops = fs.ops();
    let last_removal = ops.iter().rposition(|op| op.starts_with("rm")).unwrap();
    let first_creation = ops
        .iter()
        .position(|op| op.starts_with("mkdir") || op.starts_with("copy"))
        .unwrap();
    assert!(last_removal < first_creation, "{ops:#?}");

    // Each directory removal comes after every removal beneath it
    for (i, op) in ops.iter().enumerate() {
        if let Some(dir) = op.strip_prefix("rmdir ") {
            let prefix = format!("{dir}/");
            assert!(
                ops[i + 1..].iter().all(|later| !later.contains(&prefix)),
                "{op} removed before its contents: {ops:#?}"
            );
        }
    }
}

#[tokio::test]
async fn test_untracked_file_only_fails_its_directory() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write(&dst.path().join("doomed/x.txt"), b"x");
    write(&src.path().join("a.txt"), b"a");
    write(&src.path().join("b.txt"), b"b");

    // Another writer drops a file into `doomed` after it was scanned
    let fs = Arc::new(HookedFileSystem::new(Some((
        dst.path().join("doomed/x.txt"),
        dst.path().join("doomed/late.txt"),
    ))));
    let engine = engine(fs, src.path(), dst.path(), CompareMode::Metadata);

    let report = engine.run_cycle().await;

    assert_eq!(report.actions_attempted, 4);
    assert_eq!(report.actions_succeeded, 3);
    assert_eq!(report.failure_count(), 1);
    let failed = &report.actions_failed[0];
    assert_eq!(failed.kind, ApplyErrorKind::DirectoryNotEmpty);
    assert_eq!(failed.action.path().as_str(), "doomed");
    assert!(dst.path().join("a.txt").exists());
    assert!(dst.path().join("b.txt").exists());

    // The next cycle absorbs the drift
    let report = local_engine(src.path(), dst.path()).run_cycle().await;
    assert!(report.is_clean());
    assert_converged(src.path(), dst.path()).await;
}

#[tokio::test]
async fn test_external_deletion_is_repaired_next_cycle() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write(&src.path().join("dir/file.txt"), b"content");
    let engine = local_engine(src.path(), dst.path());

    engine.run_cycle().await;
    std::fs::remove_dir_all(dst.path().join("dir")).unwrap();

    let report = engine.run_cycle().await;
    assert_eq!(report.actions_succeeded, 2);
    assert_converged(src.path(), dst.path()).await;
}

#[tokio::test]
async fn test_checksum_mode_catches_same_size_same_mtime_edit() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let when = SystemTime::now() - Duration::from_secs(600);

    write(&src.path().join("f.txt"), b"AAAA");
    set_mtime(&src.path().join("f.txt"), when);
    write(&dst.path().join("f.txt"), b"BBBB");
    set_mtime(&dst.path().join("f.txt"), mtime(&src.path().join("f.txt")));

    let metadata = local_engine(src.path(), dst.path()).run_cycle().await;
    assert!(metadata.is_noop());
    assert_eq!(std::fs::read(dst.path().join("f.txt")).unwrap(), b"BBBB");

    let checksum = engine(
        Arc::new(LocalFileSystemAdapter::new()),
        src.path(),
        dst.path(),
        CompareMode::Checksum,
    )
    .run_cycle()
    .await;
    assert_eq!(checksum.actions_succeeded, 1);
    assert_eq!(std::fs::read(dst.path().join("f.txt")).unwrap(), b"AAAA");
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlinks_are_mirrored_not_followed() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    write(&outside.path().join("big.txt"), b"not copied");
    std::os::unix::fs::symlink(outside.path(), src.path().join("link")).unwrap();

    let report = local_engine(src.path(), dst.path()).run_cycle().await;

    assert!(report.is_clean());
    let meta = std::fs::symlink_metadata(dst.path().join("link")).unwrap();
    assert!(meta.file_type().is_symlink());
    assert_eq!(
        std::fs::read_link(dst.path().join("link")).unwrap(),
        outside.path()
    );
    assert_converged(src.path(), dst.path()).await;
}

#[tokio::test]
async fn test_report_serializes_failed_actions() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write(&dst.path().join("doomed/x.txt"), b"x");

    let fs = Arc::new(HookedFileSystem::new(Some((
        dst.path().join("doomed/x.txt"),
        dst.path().join("doomed/late.txt"),
    ))));
    let report = engine(fs, src.path(), dst.path(), CompareMode::Metadata)
        .run_cycle()
        .await;

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["actions_attempted"], 2);
    assert_eq!(json["actions_failed"][0]["kind"], "directory_not_empty");
    assert_eq!(json["actions_failed"][0]["action"]["op"], "delete");
    assert_eq!(
        report.actions_failed[0].action,
        treesync_core::domain::Action::delete(
            "doomed".parse().unwrap(),
            NodeKind::Directory
        )
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_read_only_source_files_converge() {
    use std::os::unix::fs::PermissionsExt;

    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write(&src.path().join("objects/ab/cdef"), b"packed");
    std::fs::set_permissions(
        src.path().join("objects/ab/cdef"),
        std::fs::Permissions::from_mode(0o444),
    )
    .unwrap();
    let engine = local_engine(src.path(), dst.path());

    let first = engine.run_cycle().await;
    assert!(first.is_clean(), "failures: {:?}", first.actions_failed);
    assert_eq!(
        std::fs::read(dst.path().join("objects/ab/cdef")).unwrap(),
        b"packed"
    );

    let second = engine.run_cycle().await;
    assert!(second.is_noop(), "second cycle attempted {}", second.actions_attempted);
}

#[tokio::test]
async fn test_long_file_names_converge() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let name = "n".repeat(250);
    write(&src.path().join(&name), b"long");
    let engine = local_engine(src.path(), dst.path());

    let report = engine.run_cycle().await;

    assert!(report.is_clean(), "failures: {:?}", report.actions_failed);
    assert_eq!(std::fs::read(dst.path().join(&name)).unwrap(), b"long");
    assert!(engine.run_cycle().await.is_noop());
}

#[cfg(unix)]
#[tokio::test]
async fn test_special_files_in_destination_are_removed() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    std::fs::create_dir_all(dst.path().join("gone")).unwrap();
    for fifo in ["gone/pipe", "clash"] {
        let c_path =
            std::ffi::CString::new(dst.path().join(fifo).to_str().unwrap()).unwrap();
        assert_eq!(unsafe { libc::mkfifo(c_path.as_ptr(), 0o644) }, 0);
    }
    write(&src.path().join("clash"), b"regular");

    let engine = local_engine(src.path(), dst.path());
    let report = engine.run_cycle().await;

    assert!(report.is_clean(), "failures: {:?}", report.actions_failed);
    assert!(!dst.path().join("gone").exists());
    assert_eq!(std::fs::read(dst.path().join("clash")).unwrap(), b"regular");
    assert!(engine.run_cycle().await.is_noop());
}
