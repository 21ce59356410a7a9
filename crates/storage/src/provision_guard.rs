// SPDX-License-Identifier: MIT

//! Provision Guard (§4.12, §3): a filesystem flag at
//! `/var/tmp/machine-provision-<uuid>` that serializes destructive
//! operations on the same instance across processes. Recovery from a
//! crashed provisioner is age-based: a guard older than 10 minutes is
//! treated as abandoned and removed.

use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Age after which a guard file is considered abandoned (§3, §4.12).
pub const GUARD_EXPIRY: Duration = Duration::from_secs(10 * 60);

pub struct ProvisionGuard {
    base_dir: PathBuf,
}

impl ProvisionGuard {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    pub fn default_dir() -> Self {
        Self::new("/var/tmp")
    }

    pub fn path(&self, instance_uuid: Uuid) -> PathBuf {
        self.base_dir.join(format!("machine-provision-{instance_uuid}"))
    }

    /// Creates the guard file if no live guard currently holds it.
    /// Returns `true` if this call created (and so now holds) the guard.
    pub fn try_create(&self, instance_uuid: Uuid) -> std::io::Result<bool> {
        if self.is_held(instance_uuid)? {
            return Ok(false);
        }
        std::fs::OpenOptions::new().create(true).write(true).truncate(true).open(self.path(instance_uuid))?;
        Ok(true)
    }

    /// `true` if a non-expired guard file exists; reaps an expired one as
    /// a side effect.
    pub fn is_held(&self, instance_uuid: Uuid) -> std::io::Result<bool> {
        let path = self.path(instance_uuid);
        let metadata = match std::fs::metadata(&path) {
            Ok(m) => m,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(error) => return Err(error),
        };
        if guard_expired(&metadata, SystemTime::now()) {
            let _ = std::fs::remove_file(&path);
            return Ok(false);
        }
        Ok(true)
    }

    pub fn release(&self, instance_uuid: Uuid) -> std::io::Result<()> {
        match std::fs::remove_file(self.path(instance_uuid)) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error),
        }
    }

    /// Polls every `poll_interval` (10s in the reference design) until no
    /// live guard remains for `instance_uuid`.
    pub async fn await_ready(&self, instance_uuid: Uuid, poll_interval: Duration) -> std::io::Result<()> {
        loop {
            if !self.is_held(instance_uuid)? {
                return Ok(());
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

fn guard_expired(metadata: &std::fs::Metadata, now: SystemTime) -> bool {
    is_expired_at(metadata.ctime(), now)
}

fn is_expired_at(ctime_secs: i64, now: SystemTime) -> bool {
    let ctime = if ctime_secs >= 0 {
        SystemTime::UNIX_EPOCH + Duration::from_secs(ctime_secs as u64)
    } else {
        return false;
    };
    now.duration_since(ctime).map(|age| age >= GUARD_EXPIRY).unwrap_or(false)
}

pub fn guard_file_for(base_dir: &Path, instance_uuid: Uuid) -> PathBuf {
    ProvisionGuard::new(base_dir).path(instance_uuid)
}

#[cfg(test)]
#[path = "provision_guard_tests.rs"]
mod tests;
