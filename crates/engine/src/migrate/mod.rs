// SPDX-License-Identifier: MIT

//! Migration control plane (§4.8, §4.9): a multi-stage streaming ZFS
//! replication between a source-side send process and a target-side
//! receive process, coordinated over a line-delimited JSON TCP protocol.
//!
//! `naming` is the pure snapshot-sequencing decision (§4.8 step 4, kept
//! free of I/O so it is exhaustively unit-testable); `session` is the
//! per-run state (§3 Migration Session); `send`/`receive` drive the two
//! process roles; `throttle` is the send-side rate limiter (§9).

pub mod naming;
pub mod receive;
pub mod send;
pub mod session;
pub mod throttle;

pub use naming::{plan_snapshot_names, NamingError, SnapshotPlan, SNAPSHOT_PREFIX};
pub use receive::ReceiveProcess;
pub use send::{DatasetSpec, SendProcess, SyncRunError, SyncRunState};
pub use session::{FilesystemReplicationState, MigrationSession};
