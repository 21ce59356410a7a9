// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! On-disk state: per-worker bunyan log files and the provision guard
//! flag file. Everything else the daemon tracks is in-memory only (§1
//! Non-goals).

pub mod provision_guard;
pub mod time_fmt;
pub mod worker_log;

pub use provision_guard::{ProvisionGuard, GUARD_EXPIRY};
pub use worker_log::{current_log_timestamp, LogLevel, WorkerLog};
