//! TreeSync Daemon - Periodic one-way directory mirroring
//!
//! This binary keeps a destination directory identical to a source
//! directory by running a scan/diff/apply cycle at a fixed interval:
//! - Settings from the YAML config file, overridden by command-line flags
//! - Logging to a file and (optionally) standard output
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The daemon builds a [`SyncEngine`] over the local filesystem adapter and
//! hands it to a [`SyncScheduler`]. The loop is controlled by a
//! `CancellationToken` that is triggered on receipt of SIGTERM or SIGINT;
//! a cycle that is already running finishes before the daemon exits.

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use treesync_core::{
    config::{Config, ConfigBuilder},
    domain::CycleReport,
    ports::local_filesystem::ILocalFileSystem,
};
use treesync_sync::{
    engine::SyncEngine, filesystem::LocalFileSystemAdapter, scheduler::SyncScheduler,
};

// ============================================================================
// Command line
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "treesyncd",
    version,
    about = "Periodically mirror a source directory into a destination directory"
)]
struct Cli {
    /// Directory to mirror (overrides `sync.source`)
    source: Option<PathBuf>,

    /// Directory kept identical to the source; created if absent
    /// (overrides `sync.destination`)
    destination: Option<PathBuf>,

    /// Seconds between the starts of two cycles [default: 15]
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    interval: Option<u64>,

    /// Log file path [default: output.log]
    #[arg(short, long)]
    log_path: Option<PathBuf>,

    /// Use alternate config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

impl Cli {
    /// Log level implied by `-v` flags, if any
    fn level_override(&self) -> Option<&'static str> {
        match self.verbose {
            0 => None,
            1 => Some("debug"),
            _ => Some("trace"),
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Loads the config file and layers the command-line overrides on top
fn resolve_config(cli: &Cli) -> Result<Config> {
    let base = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => Config::load_or_default(&Config::default_path()),
    };

    let mut builder = ConfigBuilder::from_config(base);
    if let Some(source) = &cli.source {
        builder = builder.sync_source(source.clone());
    }
    if let Some(destination) = &cli.destination {
        builder = builder.sync_destination(destination.clone());
    }
    if let Some(interval) = cli.interval {
        builder = builder.sync_interval_secs(interval);
    }
    if let Some(log_path) = &cli.log_path {
        builder = builder.logging_file(log_path.clone());
    }
    if let Some(level) = cli.level_override() {
        builder = builder.logging_level(level);
    }

    let mut config = builder.build();
    config.sync.source = absolutize(&config.sync.source);
    config.sync.destination = absolutize(&config.sync.destination);

    let errors = config.validate();
    if !errors.is_empty() {
        let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
        anyhow::bail!("Invalid configuration:\n  {}", details.join("\n  "));
    }
    Ok(config)
}

/// Resolves `path` against the working directory, following symlinks when
/// the path exists so containment checks compare real locations
fn absolutize(path: &Path) -> PathBuf {
    if path.as_os_str().is_empty() {
        return PathBuf::new();
    }
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }
    // Not created yet: resolve the parent instead
    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if let Ok(canonical) = std::fs::canonicalize(parent) {
            return canonical.join(name);
        }
    }
    if path.is_relative() {
        if let Ok(cwd) = std::env::current_dir() {
            return cwd.join(path);
        }
    }
    path.to_path_buf()
}

// ============================================================================
// Logging
// ============================================================================

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

/// Installs the global subscriber: file output always, stdout when enabled
fn init_tracing(config: &Config, log_file: File) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(Arc::new(log_file));
    let stdout_layer = config
        .logging
        .stdout
        .then(|| fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

/// Writes one cycle's outcome to the log
fn log_report(report: &CycleReport) {
    if let Some(reason) = &report.scan_error {
        warn!(
            cycle_id = %report.cycle_id,
            duration_ms = report.duration_ms,
            error = %reason,
            "Sync cycle aborted"
        );
    } else {
        info!(
            cycle_id = %report.cycle_id,
            attempted = report.actions_attempted,
            succeeded = report.actions_succeeded,
            failed = report.failure_count(),
            duration_ms = report.duration_ms,
            "Sync cycle complete"
        );
    }

    for failed in &report.actions_failed {
        warn!(
            cycle_id = %report.cycle_id,
            action = %failed.action,
            kind = %failed.kind,
            error = %failed.message,
            "Action failed"
        );
    }

    match serde_json::to_string(report) {
        Ok(json) => debug!(report = %json, "Cycle report"),
        Err(e) => debug!(error = %e, "Failed to serialize cycle report"),
    }
}

// ============================================================================
// Signal handling
// ============================================================================

/// Waits for SIGTERM or SIGINT and cancels the provided token
///
/// If a handler cannot be installed, that signal is logged and ignored.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    let log_file = open_log_file(&config.logging.file)?;
    init_tracing(&config, log_file);

    info!(
        source = %config.sync.source.display(),
        destination = %config.sync.destination.display(),
        interval_secs = config.sync.interval_secs,
        compare_mode = ?config.sync.compare_mode,
        log_file = %config.logging.file.display(),
        "TreeSync daemon starting (treesyncd)"
    );

    let fs: Arc<dyn ILocalFileSystem> = Arc::new(LocalFileSystemAdapter::new());
    let engine = SyncEngine::from_config(fs, &config.sync);

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let scheduler = SyncScheduler::new(engine, config.sync.interval(), shutdown_token);

    if cli.once {
        let report = scheduler.run_once().await;
        log_report(&report);
        if let Some(reason) = report.scan_error {
            error!(error = %reason, "TreeSync single cycle failed");
            anyhow::bail!("Sync cycle aborted: {reason}");
        }
        return Ok(());
    }

    let cycles = scheduler.run(|report| log_report(&report)).await;
    info!(cycles, "TreeSync daemon shut down gracefully");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
