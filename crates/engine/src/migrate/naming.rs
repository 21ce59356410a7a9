// SPDX-License-Identifier: MIT

//! Snapshot sequencing (§4.8 step 4, "Pick names"): a pure decision over
//! the `vm-migration-<N>` suffixes already present on the source and
//! target, kept free of I/O so the whole decision table is exercised by
//! plain unit tests rather than a live zfs pipeline.

/// Prefix shared by every migration snapshot (§3, §4.8 step 1).
pub const SNAPSHOT_PREFIX: &str = "vm-migration-";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NamingError {
    /// Target has snapshots but source has none, or the resume
    /// predecessor is also missing (§4.8 step 4, §8 boundary behavior).
    #[error("target and source migration snapshots are inconsistent")]
    InconsistentSnapshots,
    /// The next snapshot name is already present on the target (§4.8 step 4).
    #[error("snapshot {0} already exists on target")]
    SnapshotCollision(String),
}

/// The outcome of the naming decision: what to call the next snapshot,
/// what to diff it against, and whether this run resumes an
/// already-created-but-unsent snapshot rather than cutting a fresh one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPlan {
    pub is_first_sync: bool,
    pub prev_snapshot_name: Option<String>,
    pub snapshot_name: String,
    /// `true` when `prevSnapshotName` was missing on the target and this
    /// run resends the predecessor pair rather than cutting a new
    /// snapshot on the source (§4.8 step 4).
    pub is_resume: bool,
}

pub fn snapshot_name(suffix: u64) -> String {
    format!("{SNAPSHOT_PREFIX}{suffix}")
}

/// Decide the next snapshot pair given the numeric suffixes already
/// present on each side, sorted or not (order does not matter here).
pub fn plan_snapshot_names(source_suffixes: &[u64], target_suffixes: &[u64]) -> Result<SnapshotPlan, NamingError> {
    let highest_source = match source_suffixes.iter().copied().max() {
        None if target_suffixes.is_empty() => {
            return Ok(SnapshotPlan { is_first_sync: true, prev_snapshot_name: None, snapshot_name: snapshot_name(1), is_resume: false });
        }
        None => return Err(NamingError::InconsistentSnapshots),
        Some(highest) => highest,
    };

    let next = highest_source + 1;
    if target_suffixes.contains(&next) {
        return Err(NamingError::SnapshotCollision(snapshot_name(next)));
    }

    if target_suffixes.contains(&highest_source) {
        return Ok(SnapshotPlan {
            is_first_sync: false,
            prev_snapshot_name: Some(snapshot_name(highest_source)),
            snapshot_name: snapshot_name(next),
            is_resume: false,
        });
    }

    // prevSnapshotName (highest_source) is missing on the target: resend
    // the predecessor pair instead, if it is fully present on both sides.
    let predecessor = highest_source.checked_sub(1).filter(|s| source_suffixes.contains(s));
    match predecessor {
        Some(pred) if target_suffixes.contains(&pred) => Ok(SnapshotPlan {
            is_first_sync: false,
            prev_snapshot_name: Some(snapshot_name(pred)),
            snapshot_name: snapshot_name(highest_source),
            is_resume: true,
        }),
        _ => Err(NamingError::InconsistentSnapshots),
    }
}

#[cfg(test)]
#[path = "naming_tests.rs"]
mod tests;
