//! One-way synchronization engine
//!
//! The [`SyncEngine`] runs a single cycle: it makes sure the destination
//! root exists, scans both trees concurrently, diffs them and applies every
//! resulting action in order. The outcome is summarized in a
//! [`CycleReport`]; the engine itself never returns an error.
//!
//! ## Cycle
//!
//! ```text
//! ensure dest ──→ scan(source) ┐
//!                 scan(dest)   ┴─→ diff ──→ apply × N ──→ CycleReport
//! ```
//!
//! A scan failure aborts the cycle before any action is applied. A failed
//! action is recorded and the next one is attempted.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, instrument, warn};
use treesync_core::{
    config::SyncConfig,
    domain::{CycleId, CycleReport},
    ports::local_filesystem::ILocalFileSystem,
};

use crate::{
    applier::ActionApplier,
    diff::{diff, DiffOptions},
    scanner::TreeScanner,
    scheduler::SchedulerState,
};

/// Runs scan → diff → apply cycles between two roots
#[derive(Clone)]
pub struct SyncEngine {
    fs: Arc<dyn ILocalFileSystem>,
    scanner: TreeScanner,
    dest_scanner: TreeScanner,
    applier: ActionApplier,
    source_root: PathBuf,
    dest_root: PathBuf,
    options: DiffOptions,
}

impl SyncEngine {
    /// Creates a new `SyncEngine`
    ///
    /// # Arguments
    /// * `fs` - Filesystem adapter shared by the scanner and the applier
    /// * `source_root` - Tree that is mirrored (never written)
    /// * `dest_root` - Tree that is made to match the source
    /// * `options` - How files present on both sides are compared
    pub fn new(
        fs: Arc<dyn ILocalFileSystem>,
        source_root: PathBuf,
        dest_root: PathBuf,
        options: DiffOptions,
    ) -> Self {
        let scanner = TreeScanner::new(Arc::clone(&fs), options.compare);
        let dest_scanner = scanner.clone().recording_special_files();
        let applier = ActionApplier::new(Arc::clone(&fs), source_root.clone(), dest_root.clone());
        Self {
            fs,
            scanner,
            dest_scanner,
            applier,
            source_root,
            dest_root,
            options,
        }
    }

    /// Creates an engine for the roots and comparison settings in `config`
    pub fn from_config(fs: Arc<dyn ILocalFileSystem>, config: &SyncConfig) -> Self {
        Self::new(
            fs,
            config.source.clone(),
            config.destination.clone(),
            DiffOptions::from(config),
        )
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn dest_root(&self) -> &Path {
        &self.dest_root
    }

    /// Runs one complete cycle
    pub async fn run_cycle(&self) -> CycleReport {
        self.run_cycle_observed(|_| {}).await
    }

    /// Runs one complete cycle, reporting each phase to `observe`
    ///
    /// `observe` receives `Scanning`, then `Diffing` and `Applying` unless
    /// the scan fails.
    #[instrument(skip(self, observe), fields(source = %self.source_root.display(), dest = %self.dest_root.display()))]
    pub async fn run_cycle_observed<F>(&self, observe: F) -> CycleReport
    where
        F: Fn(SchedulerState) + Send + Sync,
    {
        let started = Instant::now();
        let mut report = CycleReport::begin(CycleId::new());
        debug!(cycle_id = %report.cycle_id, "Starting sync cycle");

        observe(SchedulerState::Scanning);

        if let Err(e) = self.fs.create_directory_all(&self.dest_root).await {
            warn!(error = %e, "Failed to create destination root");
            report.abort_scan(format!(
                "Failed to create destination {}: {e}",
                self.dest_root.display()
            ));
            report.set_duration_ms(elapsed_ms(started));
            return report;
        }

        let (source, dest) = tokio::join!(
            self.scanner.scan(&self.source_root),
            self.dest_scanner.scan(&self.dest_root)
        );
        let (source, dest) = match (source, dest) {
            (Ok(source), Ok(dest)) => (source, dest),
            (Err(e), _) => {
                warn!(error = %e, "Source scan failed, skipping cycle");
                report.abort_scan(format!("Source scan failed: {e}"));
                report.set_duration_ms(elapsed_ms(started));
                return report;
            }
            (_, Err(e)) => {
                warn!(error = %e, "Destination scan failed, skipping cycle");
                report.abort_scan(format!("Destination scan failed: {e}"));
                report.set_duration_ms(elapsed_ms(started));
                return report;
            }
        };

        observe(SchedulerState::Diffing);
        let actions = diff(&source, &dest, &self.options);
        debug!(
            source_entries = source.len(),
            dest_entries = dest.len(),
            actions = actions.len(),
            "Diff computed"
        );

        observe(SchedulerState::Applying);
        for action in actions {
            match self.applier.apply(&action).await {
                Ok(()) => report.record_success(),
                Err(e) => {
                    debug!(action = %action, error = %e, "Action failed");
                    let kind = e.kind();
                    report.record_failure(action, kind, e.to_string());
                }
            }
        }

        report.set_duration_ms(elapsed_ms(started));
        if !report.is_noop() {
            debug!(
                cycle_id = %report.cycle_id,
                attempted = report.actions_attempted,
                succeeded = report.actions_succeeded,
                failed = report.failure_count(),
                "Applied changes"
            );
        }
        report
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
