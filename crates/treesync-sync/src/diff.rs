//! Snapshot diffing
//!
//! [`diff`] is a pure function from two snapshots to the ordered list of
//! actions that makes the destination match the source. It performs no I/O,
//! so identical inputs always produce identical output.

use std::time::Duration;

use treesync_core::{
    config::{CompareMode, SyncConfig},
    domain::{Action, Node, NodeKind, Snapshot},
};

/// Tunables for how entries present on both sides are compared
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffOptions {
    pub compare: CompareMode,
    /// A source mtime newer than the destination's by at most this much
    /// counts as unchanged
    pub mtime_tolerance: Duration,
}

impl From<&SyncConfig> for DiffOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            compare: config.compare_mode,
            mtime_tolerance: config.mtime_tolerance(),
        }
    }
}

/// Computes the actions that transform `dest` into `source`
///
/// The result is sorted by [`Action::sort_key`]: deletes first (deepest
/// first), then creates and updates (shallowest first).
pub fn diff(source: &Snapshot, dest: &Snapshot, options: &DiffOptions) -> Vec<Action> {
    let mut actions = Vec::new();

    for src in source.iter() {
        match dest.get(src.path()) {
            None => actions.push(Action::create(src.path().clone(), src.kind())),
            Some(dst) if dst.kind() != src.kind() => {
                actions.push(Action::delete(dst.path().clone(), dst.kind()));
                actions.push(Action::create(src.path().clone(), src.kind()));
            }
            Some(dst) => {
                if content_differs(src, dst, options) {
                    actions.push(Action::update(src.path().clone()));
                }
            }
        }
    }

    actions.extend(
        dest.iter()
            .filter(|dst| !source.contains(dst.path()))
            .map(|dst| Action::delete(dst.path().clone(), dst.kind())),
    );

    actions.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    actions
}

/// Whether two same-kind nodes at the same path need an update
fn content_differs(src: &Node, dst: &Node, options: &DiffOptions) -> bool {
    match src.kind() {
        NodeKind::Directory | NodeKind::Special => false,
        NodeKind::Symlink => src.link_target() != dst.link_target(),
        NodeKind::File => {
            if src.size() != dst.size() {
                return true;
            }

            // Negative when the destination is newer, which never triggers
            let newer = (src.modified_at() - dst.modified_at())
                .to_std()
                .is_ok_and(|ahead| ahead > options.mtime_tolerance);
            if newer {
                return true;
            }

            if options.compare == CompareMode::Checksum {
                if let (Some(a), Some(b)) = (src.content_hash(), dst.content_hash()) {
                    return a != b;
                }
            }
            false
        }
    }
}
