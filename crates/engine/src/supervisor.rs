// SPDX-License-Identifier: MIT

//! Worker Supervisor (§4.4): forks one worker process per admitted task,
//! speaks the IPC protocol over its stdio pipes, and translates the
//! resulting events into Task Record mutations. The Queue Set is the only
//! shared mutable state and every access goes through `self.queues`
//! (single writer, §5).

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};

use cnagent_adapters::subprocess::truncate_excerpt;
use cnagent_core::{AdmitError, Clock, PauseFlag, QueueName, QueueSet, SubtaskId, SubtaskRequest, SubtaskTable, TaskError, TaskId, TaskKind};
use cnagent_storage::{LogLevel, WorkerLog};
use cnagent_wire::codec::JsonLineCodec;
use cnagent_wire::worker::{ChildEvent, ParentMessage, RawEnvelope, WorkerMessageError};

/// Default window between `SIGTERM` and `SIGKILL` for a worker that
/// doesn't exit promptly after its task reaches a terminal event, or
/// during daemon shutdown (§4.4 termination policy).
pub const DEFAULT_TERMINATION_GRACE: Duration = Duration::from_secs(10);

/// Wait for the child's initial `ready` message before sending `start`
/// (§4.4: the parent MUST NOT send the body before `ready`).
const READY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub worker_bin: PathBuf,
    pub log_dir: PathBuf,
    pub tasks_path: String,
    pub termination_grace: Duration,
}

struct WorkerHandle {
    pid: u32,
    to_child: mpsc::UnboundedSender<ParentMessage>,
}

/// What to do once the subtask named by this key reaches a terminal event.
struct SubtaskContinuation {
    caller_task_id: TaskId,
    correlation_id: String,
}

/// Owns the Queue Set and every live worker process. Cloned cheaply via
/// `Arc` so spawned tasks can call back into it.
pub struct Supervisor<C: Clock> {
    queues: Mutex<QueueSet>,
    pause: Arc<PauseFlag>,
    clock: C,
    config: SupervisorConfig,
    workers: Mutex<HashMap<TaskId, WorkerHandle>>,
    subtasks: Mutex<SubtaskTable<SubtaskContinuation>>,
    /// Maps the admitted subtask's own Task Record id back to the
    /// correlation key it was registered under, since `SubtaskTable` is
    /// keyed by the generated hex [`SubtaskId`], not the Task Record id
    /// (§3: the two identities are deliberately distinct).
    subtask_index: Mutex<HashMap<TaskId, SubtaskId>>,
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Admit(#[from] AdmitError),
}

impl<C: Clock> Supervisor<C> {
    pub fn new(queues: QueueSet, pause: Arc<PauseFlag>, clock: C, config: SupervisorConfig) -> Arc<Self> {
        Arc::new(Self {
            queues: Mutex::new(queues),
            pause,
            clock,
            config,
            workers: Mutex::new(HashMap::new()),
            subtasks: Mutex::new(SubtaskTable::new()),
            subtask_index: Mutex::new(HashMap::new()),
        })
    }

    pub fn history(&self) -> Vec<serde_json::Value> {
        self.queues.lock().history().iter().map(task_summary).collect()
    }

    pub fn snapshot(&self) -> Vec<serde_json::Value> {
        self.queues.lock().snapshot().iter().map(|r| task_summary(r)).collect()
    }

    pub fn get(&self, id: TaskId) -> Option<serde_json::Value> {
        self.queues.lock().get(id).map(task_summary)
    }

    pub fn pause(&self) {
        self.pause.pause();
    }

    pub fn resume(&self) {
        self.pause.resume();
    }

    /// Admits a new top-level task and dispatches whatever the Queue Set's
    /// `tick()` releases as a result (§4.2).
    pub fn admit(
        self: &Arc<Self>,
        kind: &str,
        body: Value,
        controller_id: impl Into<String>,
        controller_trace: Option<String>,
    ) -> Result<TaskId, AdmitError> {
        let now_ms = self.clock.epoch_ms();
        let id = {
            let mut queues = self.queues.lock();
            queues.admit(&self.pause, kind, body, controller_id.into(), controller_trace, now_ms)?
        };
        self.dispatch_ready();
        Ok(id)
    }

    fn dispatch_ready(self: &Arc<Self>) {
        let ready = { self.queues.lock().tick() };
        for task_id in ready {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.spawn_worker(task_id).await });
        }
    }

    async fn spawn_worker(self: Arc<Self>, task_id: TaskId) {
        let Some((kind, queue, body, logging, controller_trace)) = self.task_spawn_context(task_id) else {
            return;
        };

        let logtimestamp = cnagent_storage::current_log_timestamp();

        let mut cmd = Command::new(&self.config.worker_bin);
        cmd.env("TASK", kind.as_str())
            .env("REQUEST_ID", task_id.to_string())
            .env("LOGDIR", &self.config.log_dir)
            .env("logtimestamp", &logtimestamp)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if !logging {
            cmd.env("SILENT", "1");
        }
        if let Some(trace) = &controller_trace {
            cmd.env("CONTROLLER_TRACE", trace);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(error) => {
                tracing::error!(%task_id, %queue, %error, "failed to spawn worker");
                self.terminate(
                    task_id,
                    Err(TaskError {
                        kind: "SpawnFailed".to_string(),
                        message: error.to_string(),
                        rest_code: None,
                        exit_code: None,
                        stderr_excerpt: None,
                    }),
                );
                return;
            }
        };
        let pid = child.id().unwrap_or(0);

        // Opened after spawn so the file name's pid component (§4.4
        // `<timestamp>-<pid>-<task>.log`) is the real worker pid, not a
        // placeholder picked before the child existed.
        let log = if logging {
            WorkerLog::open_at(&self.config.log_dir, &logtimestamp, pid, kind.as_str()).unwrap_or_else(|error| {
                tracing::warn!(%task_id, %error, "failed to open worker log, continuing without it");
                WorkerLog::disabled()
            })
        } else {
            WorkerLog::disabled()
        };

        let now_ms = self.clock.epoch_ms();
        {
            let mut queues = self.queues.lock();
            queues.mark_started(task_id, pid, now_ms);
        }
        tracing::info!(%task_id, %queue, pid, "worker spawned");

        #[allow(clippy::expect_used)]
        let stdin = child.stdin.take().expect("stdin piped");
        #[allow(clippy::expect_used)]
        let stdout = child.stdout.take().expect("stdout piped");
        #[allow(clippy::expect_used)]
        let stderr = child.stderr.take().expect("stderr piped");

        let (to_child_tx, to_child_rx) = mpsc::unbounded_channel();
        self.workers.lock().insert(task_id, WorkerHandle { pid, to_child: to_child_tx });

        let writer_task = tokio::spawn(forward_to_child(stdin, to_child_rx));
        let stderr_task = tokio::spawn(collect_stderr(stderr));

        let outcome = self.clone().run_ipc_loop(task_id, pid, body, stdout, log).await;

        self.workers.lock().remove(&task_id);
        writer_task.abort();
        let stderr_excerpt = stderr_task.await.unwrap_or_default();

        if matches!(outcome, IpcOutcome::ChildExitedWithoutTerminal) {
            let status = child.wait().await.ok();
            let exit_code = status.and_then(|s| s.code());
            tracing::warn!(%task_id, ?exit_code, "worker exited without a terminal event");
            self.terminate(
                task_id,
                Err(TaskError {
                    kind: "WorkerCrash".to_string(),
                    message: "worker exited without a terminal event".to_string(),
                    rest_code: None,
                    exit_code,
                    stderr_excerpt: Some(truncate_excerpt(stderr_excerpt.as_bytes())),
                }),
            );
        }

        let _ = child.kill().await;
    }

    fn task_spawn_context(&self, task_id: TaskId) -> Option<(TaskKind, QueueName, Value, bool, Option<String>)> {
        let queues = self.queues.lock();
        let record = queues.get(task_id)?;
        let logging = queues.registry().lookup(record.kind.as_str()).map(|info| info.logging).unwrap_or(true);
        Some((record.kind.clone(), record.queue.clone(), record.body.clone(), logging, record.controller_trace.clone()))
    }

    async fn run_ipc_loop(
        self: Arc<Self>,
        task_id: TaskId,
        pid: u32,
        body: Value,
        stdout: tokio::process::ChildStdout,
        log: WorkerLog,
    ) -> IpcOutcome {
        let mut reader: FramedRead<_, JsonLineCodec<RawEnvelope>> = FramedRead::new(stdout, JsonLineCodec::default());

        let ready = tokio::time::timeout(READY_TIMEOUT, reader.next()).await;
        match ready {
            Ok(Some(Ok(env))) if env.type_ == "ready" => {}
            _ => {
                tracing::warn!(%task_id, "worker did not send ready in time");
                return IpcOutcome::ChildExitedWithoutTerminal;
            }
        }

        self.send_to_child(task_id, ParentMessage::Start { req: body, taskspath: self.config.tasks_path.clone() });

        while let Some(frame) = reader.next().await {
            let env = match frame {
                Ok(env) => env,
                Err(error) => {
                    tracing::warn!(%task_id, %error, "malformed worker message");
                    continue;
                }
            };
            match ChildEvent::from_envelope(env) {
                Ok(event) => {
                    if self.apply_event(task_id, pid, event, &log) {
                        return IpcOutcome::AlreadyTerminal;
                    }
                }
                Err(WorkerMessageError::UnrecognizedType(kind)) => {
                    tracing::warn!(%task_id, kind, "unrecognized worker message type");
                }
                Err(WorkerMessageError::MissingField(field, kind)) => {
                    tracing::warn!(%task_id, kind, field, "worker message missing required field");
                }
            }
        }
        IpcOutcome::ChildExitedWithoutTerminal
    }

    /// Applies one child event to the Task Record. Returns `true` once a
    /// terminal event has been processed.
    fn apply_event(self: &Arc<Self>, task_id: TaskId, pid: u32, event: ChildEvent, log: &WorkerLog) -> bool {
        match event {
            ChildEvent::Ready => false,
            ChildEvent::Start => {
                self.queues.lock().append_event(task_id, cnagent_core::TaskEvent::Start);
                false
            }
            ChildEvent::Progress { value } => {
                self.queues.lock().set_progress(task_id, value);
                false
            }
            ChildEvent::Named { name, payload } => {
                self.queues.lock().append_event(task_id, cnagent_core::TaskEvent::Named { name, payload });
                false
            }
            ChildEvent::TaskValidated => {
                self.queues.lock().append_event(
                    task_id,
                    cnagent_core::TaskEvent::Named { name: "task_validated".to_string(), payload: Value::Null },
                );
                false
            }
            ChildEvent::Log { record } => {
                let line = serde_json::to_string(&record).unwrap_or_default();
                log.write(pid, "worker", LogLevel::Info, &line, None);
                false
            }
            ChildEvent::Error { message } => {
                let message = match message {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                self.queues.lock().append_event(task_id, cnagent_core::TaskEvent::Error { message });
                false
            }
            ChildEvent::Finish { result } => {
                self.terminate(task_id, Ok(result));
                true
            }
            ChildEvent::Exception { message, stack } => {
                self.terminate(
                    task_id,
                    Err(TaskError { kind: "Exception".to_string(), message, rest_code: None, exit_code: None, stderr_excerpt: stack }),
                );
                true
            }
            ChildEvent::Subtask { resource, task, msg, id } => {
                self.route_subtask(task_id, resource, task, msg, id);
                false
            }
        }
    }

    fn terminate(self: &Arc<Self>, task_id: TaskId, outcome: Result<Value, TaskError>) {
        let now_ms = self.clock.epoch_ms();
        let dispatched = {
            let mut queues = self.queues.lock();
            match outcome {
                Ok(result) => queues.finish_task(task_id, result, now_ms),
                Err(error) => queues.fail_task(task_id, error, now_ms),
            }
        };
        self.deliver_subtask_reply(task_id);
        for id in dispatched {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.spawn_worker(id).await });
        }
    }

    /// Forwards `resource.task` as a new admitted task and remembers the
    /// caller so the eventual terminal event can be routed back (§4.7).
    /// Subtasks run in their own target queue and so do not consume the
    /// caller's queue's concurrency budget.
    fn route_subtask(self: &Arc<Self>, caller_task_id: TaskId, resource: String, task: String, msg: Value, correlation_id: String) {
        let now_ms = self.clock.epoch_ms();
        let admitted = {
            let mut queues = self.queues.lock();
            queues.admit(&self.pause, &task, msg.clone(), format!("subtask:{resource}"), None, now_ms)
        };
        match admitted {
            Ok(subtask_task_id) => {
                let key = SubtaskId::new();
                let request = SubtaskRequest { caller_task_id, target_kind: task, payload: msg };
                let continuation = SubtaskContinuation { caller_task_id, correlation_id };
                if self.subtasks.lock().register(key.clone(), request, continuation).is_ok() {
                    self.subtask_index.lock().insert(subtask_task_id, key);
                }
                self.dispatch_ready();
            }
            Err(error) => {
                tracing::warn!(%caller_task_id, %error, "subtask admission failed");
            }
        }
    }

    /// If `task_id` was a registered subtask, delivers its terminal event
    /// back to the caller's control channel; otherwise a no-op — the
    /// reply is silently discarded if the caller has already exited
    /// (§4.7 invariant).
    fn deliver_subtask_reply(self: &Arc<Self>, task_id: TaskId) {
        let Some(key) = self.subtask_index.lock().remove(&task_id) else { return };
        let Some((_, continuation)) = self.subtasks.lock().take(&key) else { return };
        let Some(record) = self.queues.lock().get(task_id) else { return };
        let event = match &record.fatal {
            Some(error) => serde_json::json!({"error": error.message}),
            None => record.events.back().map(|e| serde_json::to_value(e).unwrap_or(Value::Null)).unwrap_or(Value::Null),
        };
        self.send_to_child(
            continuation.caller_task_id,
            ParentMessage::Subtask { id: continuation.correlation_id, name: record.kind.to_string(), event },
        );
    }

    fn send_to_child(&self, task_id: TaskId, message: ParentMessage) {
        let workers = self.workers.lock();
        if let Some(handle) = workers.get(&task_id) {
            let _ = handle.to_child.send(message);
        }
    }

    /// Sends `SIGTERM` to every live worker, waits up to
    /// `termination_grace`, then `SIGKILL`s anything still alive. Used on
    /// daemon shutdown (§4.4).
    pub async fn terminate_all(&self) {
        let pids: Vec<u32> = self.workers.lock().values().map(|h| h.pid).collect();
        for pid in &pids {
            send_signal(*pid, Signal::SIGTERM);
        }
        tokio::time::sleep(self.config.termination_grace).await;
        for pid in &pids {
            send_signal(*pid, Signal::SIGKILL);
        }
    }
}

fn send_signal(pid: u32, sig: Signal) {
    if pid == 0 {
        return;
    }
    if let Err(error) = signal::kill(Pid::from_raw(pid as i32), sig) {
        tracing::debug!(pid, ?sig, %error, "signal delivery failed (worker likely already exited)");
    }
}

enum IpcOutcome {
    AlreadyTerminal,
    ChildExitedWithoutTerminal,
}

async fn forward_to_child(stdin: tokio::process::ChildStdin, mut rx: mpsc::UnboundedReceiver<ParentMessage>) {
    let mut writer: FramedWrite<_, JsonLineCodec<ParentMessage>> = FramedWrite::new(stdin, JsonLineCodec::default());
    while let Some(message) = rx.recv().await {
        if writer.send(message).await.is_err() {
            break;
        }
    }
}

async fn collect_stderr(mut stderr: tokio::process::ChildStderr) -> String {
    use tokio::io::AsyncReadExt;
    let mut buf = BytesMut::new();
    let mut chunk = [0u8; 8192];
    loop {
        match stderr.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn task_summary(record: &cnagent_core::TaskRecord) -> serde_json::Value {
    serde_json::json!({
        "id": record.id.to_string(),
        "kind": record.kind.to_string(),
        "queue": record.queue.to_string(),
        "status": record.status.to_string(),
        "progress": record.progress,
        "createdAt": record.created_at_ms,
        "startedAt": record.started_at_ms,
        "finishedAt": record.finished_at_ms,
        "events": record.events,
        "fatal": record.fatal,
    })
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
