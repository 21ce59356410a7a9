// SPDX-License-Identifier: MIT

//! Task Registry (§4.1): a static, process-lifetime map from task name to
//! `{queue name, logging flag}`. Immutable at runtime; populated once at
//! startup from a declaration table.

use crate::id::{QueueName, TaskKind};
use std::collections::HashMap;

/// Static attributes of a registered task kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskKindInfo {
    pub queue: QueueName,
    /// Whether a per-invocation worker log file should be written (§4.4).
    pub logging: bool,
}

/// Error returned when a requested task kind is not registered.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown task kind: {0}")]
pub struct UnknownTask(pub String);

/// Immutable map from task kind to its queue assignment and logging flag.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    entries: HashMap<TaskKind, TaskKindInfo>,
}

impl TaskRegistry {
    /// Build a registry from an explicit declaration table.
    ///
    /// `declarations` is `(task_name, queue_name, logging)`.
    pub fn from_declarations(declarations: &[(&str, &str, bool)]) -> Self {
        let mut entries = HashMap::with_capacity(declarations.len());
        for (task, queue, logging) in declarations {
            entries.insert(
                TaskKind::from(*task),
                TaskKindInfo { queue: QueueName::from(*queue), logging: *logging },
            );
        }
        Self { entries }
    }

    /// The reference declaration table from §4.2.
    pub fn reference() -> Self {
        Self::from_declarations(&[
            ("machine_create", "machine_creation", true),
            ("image_ensure_present", "image_import_tasks", true),
            ("machine_boot", "machine_tasks", true),
            ("machine_destroy", "machine_tasks", true),
            ("machine_kill", "machine_tasks", true),
            ("machine_reboot", "machine_tasks", true),
            ("machine_shutdown", "machine_tasks", true),
            ("machine_update", "machine_tasks", true),
            ("machine_load", "machine_query", false),
            ("nop", "nop", true),
        ])
    }

    pub fn lookup(&self, kind: &str) -> Result<&TaskKindInfo, UnknownTask> {
        self.entries.get(kind).ok_or_else(|| UnknownTask(kind.to_string()))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.entries.contains_key(kind)
    }

    pub fn queue_names(&self) -> impl Iterator<Item = &QueueName> {
        self.entries.values().map(|info| &info.queue)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &TaskKind> {
        self.entries.keys()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
