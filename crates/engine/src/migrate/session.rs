// SPDX-License-Identifier: MIT

//! Migration Session (§3): per-VM, per-snapshot-sequence replication
//! state held by both the send and receive sides for the duration of a
//! run. A session covers the primary zfs filesystem plus, for KVM
//! instances, each data disk's own filesystem (§4.8 "Bulk protocol
//! detail").

use serde::{Deserialize, Serialize};

/// Per-filesystem replication state (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesystemReplicationState {
    pub zfs_filesystem: String,
    pub source_snapshots: Vec<u64>,
    pub target_snapshots: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_snapshot_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_token: Option<String>,
    pub is_first_sync: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_size: Option<u64>,
    pub bytes_sent: u64,
}

impl FilesystemReplicationState {
    pub fn new(zfs_filesystem: impl Into<String>) -> Self {
        Self {
            zfs_filesystem: zfs_filesystem.into(),
            source_snapshots: Vec::new(),
            target_snapshots: Vec::new(),
            prev_snapshot_name: None,
            snapshot_name: None,
            resume_token: None,
            is_first_sync: false,
            estimated_size: None,
            bytes_sent: 0,
        }
    }
}

/// Identity: the VM uuid plus a monotonic snapshot sequence number (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationSession {
    pub vm_uuid: String,
    pub sequence: u64,
    pub filesystems: Vec<FilesystemReplicationState>,
}

impl MigrationSession {
    pub fn new(vm_uuid: impl Into<String>, sequence: u64, filesystems: Vec<FilesystemReplicationState>) -> Self {
        Self { vm_uuid: vm_uuid.into(), sequence, filesystems }
    }

    /// `vm-migration-<N>`, the session-level label (§3).
    pub fn session_name(&self) -> String {
        format!("vm-migration-{}", self.sequence)
    }

    /// Sum of each filesystem's estimated send size, forming
    /// `totalProgress` (§4.8 step 7).
    pub fn total_progress(&self) -> u64 {
        self.filesystems.iter().filter_map(|fs| fs.estimated_size).sum()
    }

    pub fn total_bytes_sent(&self) -> u64 {
        self.filesystems.iter().map(|fs| fs.bytes_sent).sum()
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
