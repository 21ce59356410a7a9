// SPDX-License-Identifier: MIT

//! Queue Set (§4.2): admits, orders, and releases Task Records across a
//! fixed set of named queues with independent concurrency limits.
//!
//! This module is the pure state machine described in §3/§4.2/§4.3: it
//! owns admission, FIFO ordering, concurrency-limited dispatch readiness,
//! and the History a finished record moves into. It does not fork worker
//! processes itself — that is the Worker Supervisor's job (in the engine
//! crate), which calls [`QueueSet::tick`] to learn which task ids are now
//! clear to run and reports back terminal outcomes via
//! [`QueueSet::finish_task`]/[`QueueSet::fail_task`].

use crate::id::{QueueName, TaskId, TaskKind};
use crate::pause::PauseFlag;
use crate::registry::TaskRegistry;
use crate::task::{History, TaskError, TaskEvent, TaskRecord, DEFAULT_HISTORY_CAPACITY};
use std::collections::{HashMap, HashSet, VecDeque};

/// Per-queue concurrency limit. `None` means unbounded (the reference
/// `machine_query` queue, §4.2).
pub type QueueLimit = Option<usize>;

#[derive(Debug)]
struct Queue {
    limit: QueueLimit,
    pending: VecDeque<TaskId>,
    running: HashSet<TaskId>,
}

impl Queue {
    fn new(limit: QueueLimit) -> Self {
        Self { limit, pending: VecDeque::new(), running: HashSet::new() }
    }

    fn has_capacity(&self) -> bool {
        match self.limit {
            Some(limit) => self.running.len() < limit,
            None => true,
        }
    }
}

/// Error returned by [`QueueSet::admit`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AdmitError {
    /// The Pause Flag is set; HTTP layer should answer 503 (§4.2, §7).
    #[error("service paused")]
    Paused,
    /// The requested task kind is not in the Task Registry; HTTP layer
    /// should answer 404 (§4.2, §7).
    #[error("unknown task: {0}")]
    UnknownTask(String),
}

impl From<crate::registry::UnknownTask> for AdmitError {
    fn from(e: crate::registry::UnknownTask) -> Self {
        AdmitError::UnknownTask(e.0)
    }
}

/// The fixed set of named queues plus the Task Records currently admitted
/// into them (pending or running) and the History of finished ones.
pub struct QueueSet {
    registry: TaskRegistry,
    queues: HashMap<QueueName, Queue>,
    tasks: HashMap<TaskId, TaskRecord>,
    history: History,
}

impl QueueSet {
    /// Build a queue set from a registry and an explicit per-queue limit
    /// table. Any queue named by the registry but missing from
    /// `queue_limits` defaults to a limit of 1 (the reference design's
    /// default, §4.2: "in the reference design, 1 per queue except
    /// `machine_query`").
    pub fn new(registry: TaskRegistry, queue_limits: &[(&str, QueueLimit)]) -> Self {
        let mut queues: HashMap<QueueName, Queue> = HashMap::new();
        for name in registry.queue_names() {
            queues.entry(name.clone()).or_insert_with(|| Queue::new(Some(1)));
        }
        for (name, limit) in queue_limits {
            queues.insert(QueueName::from(*name), Queue::new(*limit));
        }
        Self { registry, queues, tasks: HashMap::new(), history: History::new(DEFAULT_HISTORY_CAPACITY) }
    }

    /// The reference queue set from §4.2.
    pub fn reference() -> Self {
        Self::new(
            TaskRegistry::reference(),
            &[
                ("machine_creation", Some(1)),
                ("image_import_tasks", Some(1)),
                ("machine_tasks", Some(1)),
                ("machine_query", None),
                ("nop", Some(1)),
            ],
        )
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Admit a task. Fails closed on Pause (§4.2) or an unregistered kind;
    /// otherwise appends to the tail of the task's queue and returns the
    /// new record's id immediately — callers do not wait for completion.
    pub fn admit(
        &mut self,
        pause: &PauseFlag,
        kind: &str,
        body: serde_json::Value,
        controller_id: String,
        controller_trace: Option<String>,
        now_ms: u64,
    ) -> Result<TaskId, AdmitError> {
        if pause.is_paused() {
            return Err(AdmitError::Paused);
        }
        let info = self.registry.lookup(kind)?;
        let queue_name = info.queue.clone();
        let id = TaskId::new();
        let record = TaskRecord::new(
            id,
            TaskKind::from(kind),
            queue_name.clone(),
            body,
            controller_id,
            controller_trace,
            now_ms,
        );
        self.tasks.insert(id, record);
        self.queues.entry(queue_name).or_insert_with(|| Queue::new(Some(1))).pending.push_back(id);
        Ok(id)
    }

    /// For each queue with spare capacity and pending work, promote the
    /// head of its FIFO to running and return it for dispatch. Call after
    /// every admit and every terminal event (§4.2).
    pub fn tick(&mut self) -> Vec<TaskId> {
        let mut dispatched = Vec::new();
        for queue in self.queues.values_mut() {
            while queue.has_capacity() {
                let Some(id) = queue.pending.pop_front() else { break };
                queue.running.insert(id);
                dispatched.push(id);
            }
        }
        dispatched
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskRecord> {
        self.tasks.get(&id).or_else(|| self.history.get(id))
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Snapshot of in-flight (pending + running) records plus History,
    /// for the `GET /history` / `GET /tasks` contract (§4.6).
    pub fn snapshot(&self) -> Vec<&TaskRecord> {
        let mut out: Vec<&TaskRecord> = self.tasks.values().collect();
        out.extend(self.history.iter());
        out
    }

    pub fn mark_started(&mut self, id: TaskId, pid: u32, now_ms: u64) {
        if let Some(task) = self.tasks.get_mut(&id) {
            task.mark_started(pid, now_ms);
        }
    }

    pub fn set_progress(&mut self, id: TaskId, value: u8) {
        if let Some(task) = self.tasks.get_mut(&id) {
            task.set_progress(value);
        }
    }

    pub fn append_event(&mut self, id: TaskId, event: TaskEvent) {
        if let Some(task) = self.tasks.get_mut(&id) {
            task.append_event(event);
        }
    }

    /// Finalize a task as complete, release its queue slot, and return the
    /// newly-dispatchable ids from the resulting `tick()` (§4.3).
    pub fn finish_task(&mut self, id: TaskId, result: serde_json::Value, now_ms: u64) -> Vec<TaskId> {
        self.terminate(id, now_ms, |task| task.mark_finished(result, now_ms))
    }

    /// Finalize a task as failed, release its queue slot, and return the
    /// newly-dispatchable ids from the resulting `tick()` (§4.3).
    pub fn fail_task(&mut self, id: TaskId, error: TaskError, now_ms: u64) -> Vec<TaskId> {
        self.terminate(id, now_ms, |task| task.mark_failed(error, now_ms))
    }

    fn terminate(&mut self, id: TaskId, _now_ms: u64, apply: impl FnOnce(&mut TaskRecord)) -> Vec<TaskId> {
        let Some(mut task) = self.tasks.remove(&id) else { return Vec::new() };
        apply(&mut task);
        if let Some(queue) = self.queues.get_mut(&task.queue) {
            queue.running.remove(&id);
        }
        self.history.push(task);
        self.tick()
    }

    pub fn queue_running_count(&self, queue: &str) -> usize {
        self.queues.get(queue).map(|q| q.running.len()).unwrap_or(0)
    }

    pub fn queue_pending_count(&self, queue: &str) -> usize {
        self.queues.get(queue).map(|q| q.pending.len()).unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
