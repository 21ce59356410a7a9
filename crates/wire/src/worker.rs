// SPDX-License-Identifier: MIT

//! Worker IPC message schema (§4.4): the newline-delimited JSON events a
//! worker emits to its parent, and the messages the parent sends back.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw envelope every message arrives as: a `type` discriminator plus
/// whatever fields that type carries. `event:<name>` is an open-ended tag
/// (§4.4), so we parse into this envelope first and classify afterwards
/// rather than relying on serde's tagged-enum matching, which cannot
/// express a dynamic `event:` prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEnvelope {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerMessageError {
    #[error("unrecognized message type: {0}")]
    UnrecognizedType(String),
    #[error("missing field {0:?} on message type {1:?}")]
    MissingField(&'static str, String),
}

/// Events a worker emits to the parent (§4.4 table).
#[derive(Debug, Clone, PartialEq)]
pub enum ChildEvent {
    /// Child constructed; waiting for `start`.
    Ready,
    /// Task body began.
    Start,
    /// Strictly monotonic 0..=100.
    Progress { value: u8 },
    /// Arbitrary named event with an opaque payload, forwarded verbatim.
    Named { name: String, payload: Value },
    /// Terminal success; payload is the task result.
    Finish { result: Value },
    /// Non-fatal notification; does not terminate the task.
    Error { message: Value },
    /// Parameter validation passed.
    TaskValidated,
    /// Uncaught failure; terminal.
    Exception { message: String, stack: Option<String> },
    /// A structured per-line logging record.
    Log { record: Value },
    /// The running worker is raising a subtask call (§4.7).
    Subtask { resource: String, task: String, msg: Value, id: String },
}

impl ChildEvent {
    pub fn from_envelope(env: RawEnvelope) -> Result<Self, WorkerMessageError> {
        let RawEnvelope { type_, mut fields } = env;
        match type_.as_str() {
            "ready" => Ok(ChildEvent::Ready),
            "event:start" => Ok(ChildEvent::Start),
            "event:progress" => {
                let value = fields
                    .remove("value")
                    .and_then(|v| v.as_u64())
                    .ok_or(WorkerMessageError::MissingField("value", type_))?;
                Ok(ChildEvent::Progress { value: value.min(100) as u8 })
            }
            "event:finish" => {
                let result = fields.remove("result").unwrap_or(Value::Null);
                Ok(ChildEvent::Finish { result })
            }
            "event:error" => {
                let message = fields.remove("message").unwrap_or(Value::Null);
                Ok(ChildEvent::Error { message })
            }
            "event:task_validated" => Ok(ChildEvent::TaskValidated),
            "exception" => {
                let message = fields
                    .remove("message")
                    .and_then(|v| v.as_str().map(str::to_string))
                    .ok_or(WorkerMessageError::MissingField("message", type_))?;
                let stack = fields.remove("stack").and_then(|v| v.as_str().map(str::to_string));
                Ok(ChildEvent::Exception { message, stack })
            }
            "log" => Ok(ChildEvent::Log { record: Value::Object(fields) }),
            "subtask" => {
                let resource = field_str(&mut fields, "resource", &type_)?;
                let task = field_str(&mut fields, "task", &type_)?;
                let id = field_str(&mut fields, "id", &type_)?;
                let msg = fields.remove("msg").unwrap_or(Value::Null);
                Ok(ChildEvent::Subtask { resource, task, msg, id })
            }
            other if other.starts_with("event:") => {
                let name = other.trim_start_matches("event:").to_string();
                Ok(ChildEvent::Named { name, payload: Value::Object(fields) })
            }
            other => Err(WorkerMessageError::UnrecognizedType(other.to_string())),
        }
    }
}

fn field_str(fields: &mut serde_json::Map<String, Value>, key: &'static str, type_: &str) -> Result<String, WorkerMessageError> {
    fields
        .remove(key)
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or(WorkerMessageError::MissingField(key, type_.to_string()))
}

/// Messages the parent sends to a child (§4.4 table).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ParentMessage {
    /// MUST be sent exactly once, after `ready` (§4.4).
    Start { req: Value, taskspath: String },
    /// Reply to a prior `subtask` from this child.
    Subtask { id: String, name: String, event: Value },
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
