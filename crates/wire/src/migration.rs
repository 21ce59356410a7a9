// SPDX-License-Identifier: MIT

//! Migration control protocol (§4.8, §4.9, §6): newline-delimited JSON
//! over TCP between a source-side send process and a target-side receive
//! process (or the coordinating controller, for `ping`/`set-record`/
//! `watch`/`sync`/`stop`/`end`).
//!
//! Every request carries `{type:"request", command, eventId}`; responses
//! carry matching `{type:"response", command, eventId, ...}` or
//! `{type:"error", eventId, message}`; unsolicited events are
//! `{type:"progress", ...}` and `{type:"sync-success"}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The command name carried by every request/response (§4.8, §4.9, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MigrationCommand {
    Ping,
    SetRecord,
    Watch,
    Sync,
    Stop,
    End,
    GetZfsResumeToken,
    GetZfsSnapshotNames,
    ZfsDestroy,
}

impl MigrationCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationCommand::Ping => "ping",
            MigrationCommand::SetRecord => "set-record",
            MigrationCommand::Watch => "watch",
            MigrationCommand::Sync => "sync",
            MigrationCommand::Stop => "stop",
            MigrationCommand::End => "end",
            MigrationCommand::GetZfsResumeToken => "get-zfs-resume-token",
            MigrationCommand::GetZfsSnapshotNames => "get-zfs-snapshot-names",
            MigrationCommand::ZfsDestroy => "zfs-destroy",
        }
    }
}

impl std::fmt::Display for MigrationCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request from the coordinator or peer process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRequest {
    #[serde(rename = "type")]
    pub type_: RequestTag,
    pub command: MigrationCommand,
    pub event_id: String,
    /// Command-specific arguments, e.g. `{host, port}` for `sync` or
    /// `{record}` for `set-record`. Kept as a free-form value since each
    /// command has its own shape (§4.8).
    #[serde(flatten)]
    pub args: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "request")]
pub struct RequestTag;

/// A matching response to a prior request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResponse {
    #[serde(rename = "type")]
    pub type_: ResponseTag,
    pub command: MigrationCommand,
    pub event_id: String,
    #[serde(flatten)]
    pub result: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "response")]
pub struct ResponseTag;

/// `{type:"error", message:"Not Implemented"}` for unrecognized commands
/// (§4.8), or any other command-specific failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationError {
    #[serde(rename = "type")]
    pub type_: ErrorTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "error")]
pub struct ErrorTag;

/// Progress phase, always `"sync"` in the current design (§4.8) but kept
/// as a string so a future phase does not require a wire break.
pub type Phase = String;

/// Unsolicited 1Hz progress broadcast to every watching socket (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationProgress {
    #[serde(rename = "type")]
    pub type_: ProgressTag,
    pub current_progress: u64,
    pub total_progress: u64,
    pub transfer_bytes_second: f64,
    pub eta_ms: Option<u64>,
    pub phase: Phase,
    pub state: String,
    /// Forces delivery even with no byte movement, as a 60s keepalive.
    pub store: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "progress")]
pub struct ProgressTag;

/// Terminal success notification for a sync run (§4.8 step 9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSuccess {
    #[serde(rename = "type")]
    pub type_: SyncSuccessTag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "sync-success")]
pub struct SyncSuccessTag;

impl MigrationRequest {
    pub fn new(command: MigrationCommand, event_id: impl Into<String>) -> Self {
        Self { type_: RequestTag, command, event_id: event_id.into(), args: serde_json::Map::new() }
    }

    pub fn with_arg(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.args.insert(key.to_string(), value.into());
        self
    }
}

impl MigrationResponse {
    pub fn new(command: MigrationCommand, event_id: impl Into<String>) -> Self {
        Self { type_: ResponseTag, command, event_id: event_id.into(), result: serde_json::Map::new() }
    }

    pub fn with_result(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.result.insert(key.to_string(), value.into());
        self
    }
}

impl MigrationError {
    pub fn not_implemented(event_id: impl Into<String>) -> Self {
        Self { type_: ErrorTag, event_id: Some(event_id.into()), message: "Not Implemented".to_string() }
    }

    pub fn new(event_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self { type_: ErrorTag, event_id: Some(event_id.into()), message: message.into() }
    }
}

/// Top-level envelope used on the wire; decoding matches on `type` first
/// since the shapes otherwise differ (no single struct covers all of
/// them).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MigrationFrame {
    Request {
        command: MigrationCommand,
        event_id: String,
        #[serde(flatten)]
        args: serde_json::Map<String, Value>,
    },
    Response {
        command: MigrationCommand,
        event_id: String,
        #[serde(flatten)]
        result: serde_json::Map<String, Value>,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        message: String,
    },
    Progress {
        current_progress: u64,
        total_progress: u64,
        transfer_bytes_second: f64,
        eta_ms: Option<u64>,
        phase: Phase,
        state: String,
        store: bool,
    },
    #[serde(rename = "sync-success")]
    SyncSuccess,
}

#[cfg(test)]
#[path = "migration_tests.rs"]
mod tests;
