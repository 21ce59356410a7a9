// SPDX-License-Identifier: MIT

//! Task Record & History (§4.3): the in-memory entity tracked from
//! admission through a terminal event, plus the bounded-retention History
//! it moves into once finished.

use crate::id::{QueueName, TaskId, TaskKind};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default bound on the number of finished records retained in History (§3).
pub const DEFAULT_HISTORY_CAPACITY: usize = 256;

/// Bound on the per-task accumulated event log, to contain a runaway or
/// looping worker (§3: "accumulated event log (bounded)").
pub const MAX_EVENT_LOG: usize = 2048;

/// Status of a Task Record (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Active,
    Complete,
    Failed,
}

crate::simple_display! {
    TaskStatus {
        Active => "active",
        Complete => "complete",
        Failed => "failed",
    }
}

/// An error payload terminal to a task (§7 Fatal / WorkerCrash / SubtaskFailure).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_excerpt: Option<String>,
}

impl TaskError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind: kind.into(), message: message.into(), rest_code: None, exit_code: None, stderr_excerpt: None }
    }
}

/// One entry in a Task Record's accumulated event log, mirroring the IPC
/// event types forwarded by a worker (§4.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    Start,
    Progress { value: u8 },
    Named { name: String, payload: serde_json::Value },
    Finish { result: serde_json::Value },
    Error { message: String },
    Log { line: serde_json::Value },
}

/// A running/finished unit of work admitted through the Queue Set (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub kind: TaskKind,
    pub queue: QueueName,
    pub body: serde_json::Value,
    pub controller_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_trace: Option<String>,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    pub progress: u8,
    pub status: TaskStatus,
    pub events: VecDeque<TaskEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal: Option<TaskError>,
}

impl TaskRecord {
    pub fn new(
        id: TaskId,
        kind: TaskKind,
        queue: QueueName,
        body: serde_json::Value,
        controller_id: String,
        controller_trace: Option<String>,
        created_at_ms: u64,
    ) -> Self {
        Self {
            id,
            kind,
            queue,
            body,
            controller_id,
            controller_trace,
            created_at_ms,
            started_at_ms: None,
            finished_at_ms: None,
            progress: 0,
            status: TaskStatus::Active,
            events: VecDeque::new(),
            worker_pid: None,
            fatal: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.status, TaskStatus::Active)
    }

    /// Append an event, enforcing the bounded log by dropping the oldest
    /// entry. Does not itself decide terminality — callers drive
    /// `mark_finished`/`mark_failed` from the event content.
    pub fn append_event(&mut self, event: TaskEvent) {
        if self.events.len() >= MAX_EVENT_LOG {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Set progress; progress is specified as strictly monotonic for the
    /// `progress` IPC event, but we clamp rather than reject out-of-range
    /// values so a misbehaving worker cannot corrupt the record's shape.
    pub fn set_progress(&mut self, value: u8) {
        self.progress = value.min(100);
    }

    pub fn mark_started(&mut self, pid: u32, now_ms: u64) {
        self.worker_pid = Some(pid);
        self.started_at_ms = Some(now_ms);
    }

    /// First terminal event wins (§8 boundary behavior): a call on an
    /// already-terminal record is a no-op.
    pub fn mark_finished(&mut self, result: serde_json::Value, now_ms: u64) {
        if self.is_terminal() {
            return;
        }
        self.status = TaskStatus::Complete;
        self.progress = 100;
        self.finished_at_ms = Some(now_ms);
        self.append_event(TaskEvent::Finish { result });
    }

    pub fn mark_failed(&mut self, error: TaskError, now_ms: u64) {
        if self.is_terminal() {
            return;
        }
        self.status = TaskStatus::Failed;
        self.finished_at_ms = Some(now_ms);
        self.fatal = Some(error.clone());
        self.append_event(TaskEvent::Error { message: error.message });
    }
}

/// Bounded-retention FIFO of finished Task Records (§3 History).
#[derive(Debug, Default)]
pub struct History {
    capacity: usize,
    records: VecDeque<TaskRecord>,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, records: VecDeque::with_capacity(capacity.min(1024)) }
    }

    pub fn push(&mut self, record: TaskRecord) {
        if self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskRecord> {
        self.records.iter()
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
