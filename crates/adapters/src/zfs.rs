// SPDX-License-Identifier: MIT

//! Thin `zfs(1M)`/`zpool(1M)` command wrapper (§4.8, §4.9). Every
//! invocation goes through [`crate::subprocess::run_with_timeout`] with
//! the migration-specific timeout and output cap (§5).

use crate::subprocess::{self, CommandOutput, SubprocessError, ZFS_COMMAND_TIMEOUT};
use std::process::Stdio;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum ZfsError {
    #[error(transparent)]
    Subprocess(#[from] SubprocessError),
    #[error("zfs command exited with status {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },
    #[error("could not parse zfs output: {0}")]
    ParseError(String),
}

fn ok_or_failed(output: CommandOutput) -> Result<CommandOutput, ZfsError> {
    if output.status.success() {
        Ok(output)
    } else {
        Err(ZfsError::CommandFailed { status: output.status.to_string(), stderr: output.stderr_excerpt() })
    }
}

/// Snapshot suffixes for `<dataset>@<prefix><N>`, parsed from `zfs list`
/// output, sorted ascending. Pure so it can be tested without a zfs
/// binary.
pub fn parse_snapshot_suffixes(dataset: &str, prefix: &str, list_output: &str) -> Vec<u64> {
    let needle = format!("{dataset}@{prefix}");
    let mut suffixes: Vec<u64> = list_output
        .lines()
        .filter_map(|line| line.strip_prefix(&needle))
        .filter_map(|suffix| suffix.trim().parse::<u64>().ok())
        .collect();
    suffixes.sort_unstable();
    suffixes
}

pub async fn list_migration_snapshot_suffixes(dataset: &str, prefix: &str) -> Result<Vec<u64>, ZfsError> {
    let mut cmd = Command::new("zfs");
    cmd.args(["list", "-H", "-o", "name", "-t", "snapshot", "-r", dataset]);
    let output = ok_or_failed(subprocess::run_with_timeout(cmd, ZFS_COMMAND_TIMEOUT, subprocess::DEFAULT_OUTPUT_LIMIT_BYTES).await?)?;
    Ok(parse_snapshot_suffixes(dataset, prefix, &output.stdout_str()))
}

/// `receive_resume_token` property value; `"-"` (absent) maps to `None`.
pub fn parse_resume_token(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "-" {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub async fn get_resume_token(dataset: &str) -> Result<Option<String>, ZfsError> {
    let mut cmd = Command::new("zfs");
    cmd.args(["get", "-H", "-o", "value", "receive_resume_token", dataset]);
    let output = ok_or_failed(subprocess::run_with_timeout(cmd, ZFS_COMMAND_TIMEOUT, subprocess::DEFAULT_OUTPUT_LIMIT_BYTES).await?)?;
    Ok(parse_resume_token(&output.stdout_str()))
}

pub async fn create_snapshot(dataset: &str, name: &str, recursive: bool) -> Result<(), ZfsError> {
    let mut cmd = Command::new("zfs");
    cmd.arg("snapshot");
    if recursive {
        cmd.arg("-r");
    }
    cmd.arg(format!("{dataset}@{name}"));
    ok_or_failed(subprocess::run_with_timeout(cmd, ZFS_COMMAND_TIMEOUT, subprocess::DEFAULT_OUTPUT_LIMIT_BYTES).await?)?;
    Ok(())
}

pub async fn destroy(dataset_and_snapshot: &str, recursive: bool, force: bool) -> Result<(), ZfsError> {
    let mut cmd = Command::new("zfs");
    cmd.arg("destroy");
    if recursive {
        cmd.arg("-r");
    }
    if force {
        cmd.arg("-f");
    }
    cmd.arg(dataset_and_snapshot);
    ok_or_failed(subprocess::run_with_timeout(cmd, ZFS_COMMAND_TIMEOUT, subprocess::DEFAULT_OUTPUT_LIMIT_BYTES).await?)?;
    Ok(())
}

/// Parses the last line of `zfs send --parsable --dryrun` output: either
/// `size <bytes>` for a fresh send, or `full|incremental <name> <bytes>`
/// for a resumed one (§4.8 step 7).
pub fn parse_send_size(dryrun_output: &str) -> Result<u64, ZfsError> {
    let last_line = dryrun_output.lines().rev().find(|l| !l.trim().is_empty()).ok_or_else(|| {
        ZfsError::ParseError("empty dryrun output".to_string())
    })?;
    let parts: Vec<&str> = last_line.split_whitespace().collect();
    match parts.as_slice() {
        ["size", bytes] => bytes.parse().map_err(|_| ZfsError::ParseError(last_line.to_string())),
        [kind, _name, bytes] if *kind == "full" || *kind == "incremental" => {
            bytes.parse().map_err(|_| ZfsError::ParseError(last_line.to_string()))
        }
        _ => Err(ZfsError::ParseError(last_line.to_string())),
    }
}

pub async fn estimate_send_size(args: &SendArgs) -> Result<u64, ZfsError> {
    let mut cmd = send_command_base(args);
    cmd.arg("--dryrun");
    let output = ok_or_failed(subprocess::run_with_timeout(cmd, ZFS_COMMAND_TIMEOUT, subprocess::DEFAULT_OUTPUT_LIMIT_BYTES).await?)?;
    parse_send_size(&output.stdout_str())
}

/// Arguments for a `zfs send` invocation (§4.8 step 8).
#[derive(Debug, Clone)]
pub struct SendArgs {
    pub dataset: String,
    pub snapshot: String,
    pub prev_snapshot: Option<String>,
    /// `true` replicates recursively (BHYVE child datasets); `false` uses
    /// `--props` for CN-local docker origin datasets that will not match
    /// on the peer (§4.8 "Bulk protocol detail").
    pub replicate: bool,
    /// When present, this run resumes an interrupted transfer: the
    /// command becomes `zfs send -t <token>` and every other field here
    /// is ignored (§4.8 step 5/8 — the token alone encodes dataset,
    /// snapshot, and incremental-from state).
    pub resume_token: Option<String>,
}

fn send_command_base(args: &SendArgs) -> Command {
    let mut cmd = Command::new("zfs");
    cmd.arg("send").arg("--parsable");
    if let Some(token) = &args.resume_token {
        cmd.arg("-t").arg(token);
        return cmd;
    }
    if args.replicate {
        cmd.arg("--replicate");
    } else {
        cmd.arg("--props");
    }
    if let Some(prev) = &args.prev_snapshot {
        cmd.arg("-I").arg(prev);
    }
    cmd.arg(format!("{}@{}", args.dataset, args.snapshot));
    cmd
}

/// Builds the streaming send command with stdout piped for the caller to
/// copy (through a rate limiter) into the migration control socket.
pub fn send_stream_command(args: &SendArgs) -> Command {
    let mut cmd = send_command_base(args);
    cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd
}

/// Builds the receive-side command with stdin piped for the caller to
/// feed from the control socket once the command stream hands off to the
/// bulk stream (§4.9 step 2).
pub fn receive_stream_command(dataset: &str) -> Command {
    let mut cmd = Command::new("zfs");
    cmd.arg("receive").arg("-s").arg(dataset);
    cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd
}

pub async fn dataset_exists(dataset: &str) -> Result<bool, ZfsError> {
    let mut cmd = Command::new("zfs");
    cmd.args(["list", "-H", "-o", "name", dataset]);
    let output = subprocess::run_with_timeout(cmd, ZFS_COMMAND_TIMEOUT, subprocess::DEFAULT_OUTPUT_LIMIT_BYTES).await?;
    Ok(output.status.success())
}

#[cfg(test)]
#[path = "zfs_tests.rs"]
mod tests;
