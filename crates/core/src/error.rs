// SPDX-License-Identifier: MIT

//! Crate-wide error type for `cnagent-core` (§7 Error Handling Design).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    UnknownTask(#[from] crate::registry::UnknownTask),
    #[error(transparent)]
    Admit(#[from] crate::queue::AdmitError),
    #[error(transparent)]
    DuplicateSubtask(#[from] crate::subtask::DuplicateSubtask),
}
