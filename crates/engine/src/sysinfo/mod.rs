// SPDX-License-Identifier: MIT

//! Sysinfo/Heartbeat Loop (§4.10, components K and L): a dirty-flag cache
//! of system state sampled on a floor timer, refreshed early by two
//! watchers (a zone state-transition event stream and a filesystem
//! watch), and published periodically to the controller.

pub mod heartbeat;
pub mod sample;
pub mod watcher;

pub use heartbeat::{HeartbeatLoop, HeartbeatLoopError, Publish, HEARTBEAT_INTERVAL, REFRESH_FLOOR, SKIPPED_REFRESH_ABORT_THRESHOLD};
pub use sample::{DiskUsageEntry, MemoryCounters, SampleError, SampleSource, ShellSampleSource, SysinfoSample, ZoneSummary, ZpoolCapacity};
pub use watcher::{SysinfoFileWatcher, WatcherError, WATCH_REARM_BACKOFF};
