// SPDX-License-Identifier: MIT

//! Identifiers used throughout the scheduler core.
//!
//! Per §3 of the spec, a Task Record's identity is "a fresh UUID assigned
//! on admission"; a Subtask Request's identity is "a generated hex id".
//! The two are intentionally different shapes so that a subtask reply can
//! never be mistaken for a top-level task id.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a Task Record, assigned on admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub uuid::Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<uuid::Uuid> for TaskId {
    fn from(u: uuid::Uuid) -> Self {
        Self(u)
    }
}

/// Identifier for an outstanding Subtask Request: a generated hex id,
/// unique only while the request is outstanding (§3 Subtask Request).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubtaskId(pub String);

impl SubtaskId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl Default for SubtaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubtaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SubtaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SubtaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The name of a registered task kind (e.g. `machine_create`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskKind(pub String);

impl TaskKind {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskKind {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskKind {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::borrow::Borrow<str> for TaskKind {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// The name of a queue (e.g. `machine_tasks`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueName(pub String);

impl QueueName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for QueueName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for QueueName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::borrow::Borrow<str> for QueueName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
