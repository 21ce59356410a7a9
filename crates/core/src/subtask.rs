// SPDX-License-Identifier: MIT

//! Subtask Request (§3, §4.7): a cross-task call raised by a running
//! worker. This module holds the pure bookkeeping invariant — "at most one
//! pending reply per id" — generic over whatever continuation type the
//! engine uses to remember how to reach back into the caller's control
//! channel.

use crate::id::{SubtaskId, TaskId};
use std::collections::HashMap;

/// Fields of a subtask call, independent of how the reply gets delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtaskRequest {
    pub caller_task_id: TaskId,
    pub target_kind: String,
    pub payload: serde_json::Value,
}

/// Tracks at most one pending continuation per outstanding subtask id.
///
/// `C` is the engine-level continuation (e.g. a channel back to the
/// caller's control pipe); this type only enforces the identity invariant,
/// it does not know how to invoke `C`.
#[derive(Debug, Default)]
pub struct SubtaskTable<C> {
    pending: HashMap<SubtaskId, (SubtaskRequest, C)>,
}

/// Returned when registering a subtask id that is already outstanding.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("subtask id already has a pending reply")]
pub struct DuplicateSubtask;

impl<C> SubtaskTable<C> {
    pub fn new() -> Self {
        Self { pending: HashMap::new() }
    }

    /// Register a new outstanding subtask. Fails if the id is already
    /// pending — ids are meant to be generated uniquely per call, so a
    /// collision indicates a caller bug rather than a retry.
    pub fn register(&mut self, id: SubtaskId, request: SubtaskRequest, continuation: C) -> Result<(), DuplicateSubtask> {
        if self.pending.contains_key(&id) {
            return Err(DuplicateSubtask);
        }
        self.pending.insert(id, (request, continuation));
        Ok(())
    }

    /// Take the continuation for a terminal subtask reply. Returns `None`
    /// if the id was never registered or already resolved — per §4.7, if
    /// the caller died before the reply arrived, the reply is silently
    /// discarded rather than erroring.
    pub fn take(&mut self, id: &SubtaskId) -> Option<(SubtaskRequest, C)> {
        self.pending.remove(id)
    }

    /// Drop a pending subtask without delivering a reply — used when the
    /// caller's worker has already exited.
    pub fn discard(&mut self, id: &SubtaskId) {
        self.pending.remove(id);
    }

    pub fn is_pending(&self, id: &SubtaskId) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
#[path = "subtask_tests.rs"]
mod tests;
