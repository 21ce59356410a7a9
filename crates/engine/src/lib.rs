// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cnagent-engine: everything that touches the outside world on behalf
//! of the scheduler in `cnagent-core` — the Worker Supervisor (forked
//! task processes speaking line-delimited JSON over stdio), the
//! migration send/receive control plane (the same framing over TCP,
//! driving `zfs send`/`zfs receive`), and the sysinfo/heartbeat loop.

pub mod migrate;
pub mod supervisor;
pub mod sysinfo;
pub mod tasks;

pub use migrate::{plan_snapshot_names, NamingError, ReceiveProcess, SendProcess, SnapshotPlan, SyncRunError, SyncRunState};
pub use supervisor::{Supervisor, SupervisorConfig, SupervisorError, DEFAULT_TERMINATION_GRACE};
pub use sysinfo::{HeartbeatLoop, HeartbeatLoopError, SysinfoFileWatcher, SysinfoSample};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    #[error(transparent)]
    Sync(#[from] SyncRunError),
    #[error(transparent)]
    Receive(#[from] migrate::receive::ReceiveError),
    #[error(transparent)]
    Naming(#[from] NamingError),
    #[error(transparent)]
    Heartbeat(#[from] HeartbeatLoopError),
    #[error(transparent)]
    Watcher(#[from] sysinfo::WatcherError),
}
