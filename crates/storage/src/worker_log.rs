// SPDX-License-Identifier: MIT

//! Per-worker bunyan-style JSON log file (§4.4): one file per task
//! invocation, named `<timestamp>-<pid>-<task>.log`. The `machine_query`
//! queue disables this (`logging=false`) to avoid one file per
//! high-volume read.

use chrono::Utc;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::time_fmt::format_filename_timestamp;

pub fn worker_log_path(log_dir: &Path, pid: u32, task_kind: &str) -> PathBuf {
    let timestamp = format_filename_timestamp(Utc::now());
    log_dir.join(format!("{timestamp}-{pid}-{task_kind}.log"))
}

/// A filename-safe timestamp, picked once per worker spawn so the same
/// value can be embedded in the log file name and forwarded to the
/// worker as the `logtimestamp` environment variable (§4.4, §6).
pub fn current_log_timestamp() -> String {
    format_filename_timestamp(Utc::now())
}

#[derive(Debug, Serialize)]
struct BunyanRecord<'a> {
    v: u8,
    name: &'a str,
    hostname: &'a str,
    pid: u32,
    level: u8,
    time: String,
    task: &'a str,
    msg: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

/// bunyan numeric levels: 20 debug, 30 info, 40 warn, 50 error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug = 20,
    Info = 30,
    Warn = 40,
    Error = 50,
}

/// Either writes bunyan JSON lines to a file, or discards them entirely
/// when the owning queue has `logging=false`.
pub enum WorkerLog {
    File { path: PathBuf, hostname: String },
    Null,
}

impl WorkerLog {
    pub fn open(log_dir: &Path, pid: u32, task_kind: &str) -> std::io::Result<Self> {
        std::fs::create_dir_all(log_dir)?;
        let path = worker_log_path(log_dir, pid, task_kind);
        let hostname = hostname_or_unknown();
        Ok(WorkerLog::File { path, hostname })
    }

    /// Opens with a timestamp chosen by the caller rather than sampled
    /// fresh, so the file name's timestamp matches the `logtimestamp`
    /// value handed to the worker process (§4.4).
    pub fn open_at(log_dir: &Path, timestamp: &str, pid: u32, task_kind: &str) -> std::io::Result<Self> {
        std::fs::create_dir_all(log_dir)?;
        let path = log_dir.join(format!("{timestamp}-{pid}-{task_kind}.log"));
        let hostname = hostname_or_unknown();
        Ok(WorkerLog::File { path, hostname })
    }

    pub fn disabled() -> Self {
        WorkerLog::Null
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            WorkerLog::File { path, .. } => Some(path),
            WorkerLog::Null => None,
        }
    }

    pub fn write(&self, pid: u32, task_kind: &str, level: LogLevel, msg: &str, data: Option<serde_json::Value>) {
        let WorkerLog::File { path, hostname } = self else { return };
        if let Err(error) = append_record(path, hostname, pid, task_kind, level, msg, data) {
            tracing::warn!(task = task_kind, pid, %error, "failed to write worker log");
        }
    }
}

fn append_record(
    path: &Path,
    hostname: &str,
    pid: u32,
    task_kind: &str,
    level: LogLevel,
    msg: &str,
    data: Option<serde_json::Value>,
) -> std::io::Result<()> {
    let record = BunyanRecord {
        v: 0,
        name: "cnagent",
        hostname,
        pid,
        level: level as u8,
        time: crate::time_fmt::format_utc(Utc::now()),
        task: task_kind,
        msg,
        data,
    };
    let line = serde_json::to_string(&record)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}

fn hostname_or_unknown() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
#[path = "worker_log_tests.rs"]
mod tests;
