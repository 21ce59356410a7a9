// SPDX-License-Identifier: MIT

//! The sysinfo cache's payload (§4.10): zone inventory, zpool capacity,
//! memory counters, disk usage, and boot time. Gathering it shells out
//! to the same handful of illumos utilities the reference agent polls,
//! so the sampling itself is behind the [`SampleSource`] trait and only
//! [`ShellSampleSource`] actually forks anything.

use cnagent_adapters::subprocess::{run_with_timeout, SubprocessError, DEFAULT_OUTPUT_LIMIT_BYTES, SHELL_COMMAND_TIMEOUT};
use serde::{Deserialize, Serialize};
use tokio::process::Command;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ZoneSummary {
    pub uuid: String,
    pub name: String,
    pub state: String,
    pub brand: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ZpoolCapacity {
    pub name: String,
    pub size_bytes: u64,
    pub allocated_bytes: u64,
    pub free_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryCounters {
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub arc_size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiskUsageEntry {
    pub mount: String,
    pub used_bytes: u64,
    pub available_bytes: u64,
}

/// The full sample published on the heartbeat and zone-event channels
/// (§4.10). `boot_time_ms` is epoch milliseconds, not an uptime duration,
/// so consumers don't need to resample it to stay accurate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SysinfoSample {
    pub zones: Vec<ZoneSummary>,
    pub zpools: Vec<ZpoolCapacity>,
    pub memory: MemoryCounters,
    pub disk_usage: Vec<DiskUsageEntry>,
    pub boot_time_ms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error(transparent)]
    Subprocess(#[from] SubprocessError),
}

#[async_trait::async_trait]
pub trait SampleSource: Send + Sync + 'static {
    async fn sample(&self) -> Result<SysinfoSample, SampleError>;
}

/// Shells out to `zoneadm`, `zpool`, `swap`, `df`, and `kstat` the way
/// the reference sysinfo poller does, parsing their parseable (`-p`)
/// output forms.
#[derive(Debug, Default, Clone)]
pub struct ShellSampleSource;

#[async_trait::async_trait]
impl SampleSource for ShellSampleSource {
    async fn sample(&self) -> Result<SysinfoSample, SampleError> {
        let (zones, zpools, memory, disk_usage, boot_time_ms) = tokio::try_join!(
            list_zones(),
            list_zpools(),
            read_memory_counters(),
            list_disk_usage(),
            read_boot_time_ms(),
        )?;
        Ok(SysinfoSample { zones, zpools, memory, disk_usage, boot_time_ms })
    }
}

async fn run(program: &str, args: &[&str]) -> Result<String, SubprocessError> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    let output = run_with_timeout(cmd, SHELL_COMMAND_TIMEOUT, DEFAULT_OUTPUT_LIMIT_BYTES).await?;
    Ok(output.stdout_str().into_owned())
}

/// `zoneadm list -cp` fields: `zoneid:zonename:state:path:uuid:brand:...`
async fn list_zones() -> Result<Vec<ZoneSummary>, SubprocessError> {
    let stdout = run("zoneadm", &["list", "-cp"]).await?;
    Ok(stdout
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(':').collect();
            let name = (*fields.first()?).to_string();
            let state = (*fields.get(2)?).to_string();
            let uuid = (*fields.get(4)?).to_string();
            let brand = (*fields.get(5)?).to_string();
            Some(ZoneSummary { uuid, name, state, brand })
        })
        .collect())
}

/// `zpool list -Hpo name,size,alloc,free`: tab-separated, `-p` for raw bytes.
async fn list_zpools() -> Result<Vec<ZpoolCapacity>, SubprocessError> {
    let stdout = run("zpool", &["list", "-Hpo", "name,size,alloc,free"]).await?;
    Ok(stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.next()?.to_string();
            let size_bytes = fields.next()?.parse().ok()?;
            let allocated_bytes = fields.next()?.parse().ok()?;
            let free_bytes = fields.next()?.parse().ok()?;
            Some(ZpoolCapacity { name, size_bytes, allocated_bytes, free_bytes })
        })
        .collect())
}

/// `kstat -p` against the `unix:0:system_pages` module for total/free
/// pages and `zfs:0:arcstats` for the ARC's current size.
async fn read_memory_counters() -> Result<MemoryCounters, SubprocessError> {
    let pages = run("kstat", &["-p", "unix:0:system_pages:pagestotal", "unix:0:system_pages:pagesfree"]).await?;
    let arc = run("kstat", &["-p", "zfs:0:arcstats:size"]).await?;
    let page_size = 4096u64;
    let mut total_pages = 0u64;
    let mut free_pages = 0u64;
    for line in pages.lines() {
        if let Some((key, value)) = line.rsplit_once(char::is_whitespace) {
            let value: u64 = value.trim().parse().unwrap_or(0);
            if key.ends_with("pagestotal") {
                total_pages = value;
            } else if key.ends_with("pagesfree") {
                free_pages = value;
            }
        }
    }
    let arc_size_bytes = arc.lines().next().and_then(|l| l.rsplit_once(char::is_whitespace)).and_then(|(_, v)| v.trim().parse().ok()).unwrap_or(0);
    Ok(MemoryCounters { total_bytes: total_pages * page_size, available_bytes: free_pages * page_size, arc_size_bytes })
}

/// `df -b` reports space in 512-byte blocks; converted to bytes here so
/// callers never have to know the block size.
async fn list_disk_usage() -> Result<Vec<DiskUsageEntry>, SubprocessError> {
    let stdout = run("df", &["-b"]).await?;
    Ok(stdout
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            fields.next()?;
            let available_blocks: u64 = fields.next()?.parse().ok()?;
            let used_blocks: u64 = fields.next()?.parse().ok()?;
            let mount = fields.last()?.to_string();
            Some(DiskUsageEntry { mount, used_bytes: used_blocks * 512, available_bytes: available_blocks * 512 })
        })
        .collect())
}

async fn read_boot_time_ms() -> Result<u64, SubprocessError> {
    let stdout = run("kstat", &["-p", "unix:0:system_misc:boot_time"]).await?;
    let seconds: u64 = stdout.lines().next().and_then(|l| l.rsplit_once(char::is_whitespace)).and_then(|(_, v)| v.trim().parse().ok()).unwrap_or(0);
    Ok(seconds.saturating_mul(1000))
}

#[cfg(test)]
#[path = "sample_tests.rs"]
mod tests;
