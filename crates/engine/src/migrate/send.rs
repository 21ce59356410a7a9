// SPDX-License-Identifier: MIT

//! Migration Send Process (§4.8): one spawned process per active outbound
//! migration. Binds a control listener for the coordinating controller,
//! and for each `sync` command drives the state machine in §4.8 against
//! a direct connection to the target's [`super::receive::ReceiveProcess`].
//!
//! Callback-pyramid reimplemented as the explicit `SyncRunState` enum
//! (§9): `Listing → Connected → Named → Resuming? → Snapshotted →
//! Estimated → Sending → Succeeded|Aborted|Failed`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cnagent_adapters::zfs::{self, SendArgs};
use cnagent_adapters::TokenBucket;
use cnagent_wire::codec::JsonLineCodec;
use cnagent_wire::migration::{MigrationCommand, MigrationFrame, MigrationProgress};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};

use super::naming::{plan_snapshot_names, NamingError};
use super::session::FilesystemReplicationState;

/// Explicit sync-run state machine (§9), replacing the source's nested
/// callback waterfall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRunState {
    Listing,
    Connected,
    Named,
    Resuming,
    Snapshotted,
    Estimated,
    Sending,
    Succeeded,
    Aborted,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncRunError {
    #[error("sync aborted")]
    SyncAborted,
    #[error(transparent)]
    Naming(#[from] NamingError),
    #[error("receiver timed out waiting for sync-success")]
    ReceiverTimeout,
    #[error("zfs operation failed: {0}")]
    ZfsFailure(#[from] zfs::ZfsError),
    #[error("control connection error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed control frame: {0}")]
    Codec(#[from] cnagent_wire::codec::CodecError),
    #[error("peer closed the connection before completing the run")]
    PeerClosed,
}

/// One filesystem to replicate for this VM (§4.8 "Bulk protocol detail"):
/// `replicate=true` for the BHYVE primary dataset (recursive child
/// datasets), `false` for docker's CN-local origin dataset which uses
/// `--props` instead since it won't match on the peer.
#[derive(Debug, Clone)]
pub struct DatasetSpec {
    pub dataset: String,
    pub replicate: bool,
}

/// Default window to wait for the receiver's `sync-success` before
/// failing the run with `ReceiverTimeout` (§7).
pub const RECEIVER_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Progress ticker cadence (§4.8).
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);
/// Keepalive floor: force a `store:true` progress event even with no
/// byte movement (§4.8).
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);

struct ProgressTicker {
    started_at: Instant,
    last_keepalive: Mutex<Instant>,
    bytes_sent: Arc<AtomicU64>,
    starting_bytes: u64,
    starting_progress: u64,
    total_progress: u64,
}

impl ProgressTicker {
    fn sample(&self, now: Instant) -> MigrationProgress {
        let sent = self.bytes_sent.load(Ordering::Relaxed);
        let current = self.starting_progress + sent.saturating_sub(self.starting_bytes);
        let elapsed = now.duration_since(self.started_at).as_secs_f64().max(0.001);
        let rate = sent as f64 / elapsed;
        let remaining = self.total_progress.saturating_sub(current);
        let eta_ms = if rate > 0.0 { Some(((remaining as f64 / rate) * 1000.0) as u64) } else { None };
        let mut last = self.last_keepalive.lock();
        let store = now.duration_since(*last) >= KEEPALIVE_INTERVAL;
        if store {
            *last = now;
        }
        MigrationProgress {
            type_: cnagent_wire::migration::ProgressTag,
            current_progress: current,
            total_progress: self.total_progress,
            transfer_bytes_second: rate,
            eta_ms,
            phase: "sync".to_string(),
            state: "running".to_string(),
            store,
        }
    }
}

/// One active outbound migration: owns the abort flag and the set of
/// control sockets currently `watch`-ing progress (§4.8).
pub struct SendSession {
    pub vm_uuid: String,
    abort: Arc<AtomicBool>,
    watchers: Mutex<Vec<mpsc::UnboundedSender<MigrationProgress>>>,
}

impl SendSession {
    pub fn new(vm_uuid: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { vm_uuid: vm_uuid.into(), abort: Arc::new(AtomicBool::new(false)), watchers: Mutex::new(Vec::new()) })
    }

    /// `stop` (§4.8): sets the abort flag, checked at every pipeline stage.
    pub fn stop(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    fn check_abort(&self) -> Result<(), SyncRunError> {
        if self.is_aborted() {
            Err(SyncRunError::SyncAborted)
        } else {
            Ok(())
        }
    }

    pub fn watch(&self) -> mpsc::UnboundedReceiver<MigrationProgress> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.watchers.lock().push(tx);
        rx
    }

    fn broadcast(&self, progress: MigrationProgress) {
        self.watchers.lock().retain(|tx| tx.send(progress.clone()).is_ok());
    }
}

/// Process-wide table of active send sessions, keyed by VM uuid, and the
/// control listener the coordinating controller connects to (§4.8).
pub struct SendProcess {
    listener: TcpListener,
    sessions: Mutex<HashMap<String, Arc<SendSession>>>,
}

impl SendProcess {
    pub async fn bind(addr: impl tokio::net::ToSocketAddrs) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, sessions: Mutex::new(HashMap::new()) })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts exactly one control connection from the coordinator and
    /// runs the command dispatch loop on it (§4.8: "accepts one control
    /// connection").
    pub async fn accept_and_serve(&self) -> std::io::Result<()> {
        let (stream, _peer) = self.listener.accept().await?;
        self.serve_control_connection(stream).await;
        Ok(())
    }

    fn session_for(&self, vm_uuid: &str) -> Arc<SendSession> {
        self.sessions.lock().entry(vm_uuid.to_string()).or_insert_with(|| SendSession::new(vm_uuid)).clone()
    }

    async fn serve_control_connection(&self, stream: TcpStream) {
        let (read_half, write_half) = stream.into_split();
        let mut reader: FramedRead<_, JsonLineCodec<MigrationFrame>> = FramedRead::new(read_half, JsonLineCodec::default());
        let mut writer: FramedWrite<_, JsonLineCodec<MigrationFrame>> = FramedWrite::new(write_half, JsonLineCodec::default());
        let mut watch_rx: Option<mpsc::UnboundedReceiver<MigrationProgress>> = None;

        loop {
            tokio::select! {
                frame = reader.next() => {
                    let Some(frame) = frame else { break };
                    let Ok(frame) = frame else { break };
                    match frame {
                        MigrationFrame::Request { command: MigrationCommand::Ping, event_id, .. } => {
                            let resp = MigrationFrame::Response {
                                command: MigrationCommand::Ping,
                                event_id,
                                result: response_fields(&[("pid", serde_json::json!(std::process::id())), ("version", serde_json::json!(env!("CARGO_PKG_VERSION")))]),
                            };
                            if writer.send(resp).await.is_err() { break; }
                        }
                        MigrationFrame::Request { command: MigrationCommand::Watch, event_id, args } => {
                            if let Some(vm_uuid) = args.get("vm_uuid").and_then(|v| v.as_str()) {
                                watch_rx = Some(self.session_for(vm_uuid).watch());
                            }
                            let resp = MigrationFrame::Response { command: MigrationCommand::Watch, event_id, result: Default::default() };
                            if writer.send(resp).await.is_err() { break; }
                        }
                        MigrationFrame::Request { command: MigrationCommand::Stop, event_id, args } => {
                            if let Some(vm_uuid) = args.get("vm_uuid").and_then(|v| v.as_str()) {
                                self.session_for(vm_uuid).stop();
                            }
                            let resp = MigrationFrame::Response { command: MigrationCommand::Stop, event_id, result: Default::default() };
                            if writer.send(resp).await.is_err() { break; }
                        }
                        MigrationFrame::Request { command: MigrationCommand::End, event_id, args } => {
                            if let Some(vm_uuid) = args.get("vm_uuid").and_then(|v| v.as_str()) {
                                self.sessions.lock().remove(vm_uuid);
                            }
                            let resp = MigrationFrame::Response { command: MigrationCommand::End, event_id, result: Default::default() };
                            let _ = writer.send(resp).await;
                            break;
                        }
                        MigrationFrame::Request { command: MigrationCommand::SetRecord, event_id, .. } => {
                            let resp = MigrationFrame::Response { command: MigrationCommand::SetRecord, event_id, result: Default::default() };
                            if writer.send(resp).await.is_err() { break; }
                        }
                        MigrationFrame::Request { event_id, .. } => {
                            let resp = MigrationFrame::Error { event_id: Some(event_id), message: "Not Implemented".to_string() };
                            if writer.send(resp).await.is_err() { break; }
                        }
                        _ => {}
                    }
                }
                progress = async {
                    match watch_rx.as_mut() {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    let Some(progress) = progress else { continue };
                    let frame = MigrationFrame::Progress {
                        current_progress: progress.current_progress,
                        total_progress: progress.total_progress,
                        transfer_bytes_second: progress.transfer_bytes_second,
                        eta_ms: progress.eta_ms,
                        phase: progress.phase,
                        state: progress.state,
                        store: progress.store,
                    };
                    if writer.send(frame).await.is_err() { break; }
                }
            }
        }
    }

    /// Runs a full sync for `datasets`, sequenced one at a time (§4.8:
    /// "Sync run state machine (per dataset, sequenced)"), against a
    /// direct TCP connection to the target's receive process.
    pub async fn run_sync(
        &self,
        vm_uuid: &str,
        datasets: &[DatasetSpec],
        target_host: &str,
        target_port: u16,
        send_mbps_limit: Option<u64>,
    ) -> Result<Vec<FilesystemReplicationState>, SyncRunError> {
        let session = self.session_for(vm_uuid);
        let mut results = Vec::with_capacity(datasets.len());
        for spec in datasets {
            let fs_state = run_one_dataset(&session, spec, target_host, target_port, send_mbps_limit).await?;
            results.push(fs_state);
        }
        Ok(results)
    }
}

async fn run_one_dataset(
    session: &SendSession,
    spec: &DatasetSpec,
    target_host: &str,
    target_port: u16,
    send_mbps_limit: Option<u64>,
) -> Result<FilesystemReplicationState, SyncRunError> {
    let mut state = SyncRunState::Listing;
    session.check_abort()?;

    // Step 1: list source snapshots.
    let source_suffixes = zfs::list_migration_snapshot_suffixes(&spec.dataset, super::naming::SNAPSHOT_PREFIX).await?;

    // Step 2: connect to the receiver.
    let stream = TcpStream::connect((target_host, target_port)).await?;
    state = SyncRunState::Connected;
    let (read_half, write_half) = stream.into_split();
    let mut reader: FramedRead<_, JsonLineCodec<MigrationFrame>> = FramedRead::new(read_half, JsonLineCodec::default());
    let mut writer: FramedWrite<_, JsonLineCodec<MigrationFrame>> = FramedWrite::new(write_half, JsonLineCodec::default());
    session.check_abort()?;

    // Step 3: query target snapshots.
    let target_suffixes = request_snapshot_names(&mut writer, &mut reader, &spec.dataset).await?;

    // Step 4: pick names.
    let plan = plan_snapshot_names(&source_suffixes, &target_suffixes)?;
    state = SyncRunState::Named;
    let mut fs_state = FilesystemReplicationState::new(spec.dataset.clone());
    fs_state.source_snapshots = source_suffixes;
    fs_state.target_snapshots = target_suffixes;
    fs_state.is_first_sync = plan.is_first_sync;
    fs_state.prev_snapshot_name = plan.prev_snapshot_name.clone();
    fs_state.snapshot_name = Some(plan.snapshot_name.clone());
    session.check_abort()?;

    // Step 5: resume token.
    let resume_token = request_resume_token(&mut writer, &mut reader, &spec.dataset).await?;
    if resume_token.is_some() {
        state = SyncRunState::Resuming;
    }
    fs_state.resume_token = resume_token.clone();

    // Step 6: create snapshot on source, unless resuming.
    if !plan.is_resume && resume_token.is_none() {
        zfs::create_snapshot(&spec.dataset, &plan.snapshot_name, spec.replicate).await?;
    }
    state = SyncRunState::Snapshotted;
    session.check_abort()?;

    // Step 7: estimate size.
    let send_args = SendArgs {
        dataset: spec.dataset.clone(),
        snapshot: plan.snapshot_name.clone(),
        prev_snapshot: plan.prev_snapshot_name.clone(),
        replicate: spec.replicate,
        resume_token: resume_token.clone(),
    };
    let estimated_size = zfs::estimate_send_size(&send_args).await?;
    fs_state.estimated_size = Some(estimated_size);
    state = SyncRunState::Estimated;
    session.check_abort()?;

    // Step 8: begin transfer, throttled through the control socket.
    let bytes_sent = Arc::new(AtomicU64::new(0));
    let ticker = ProgressTicker {
        started_at: Instant::now(),
        last_keepalive: Mutex::new(Instant::now()),
        bytes_sent: Arc::clone(&bytes_sent),
        starting_bytes: 0,
        starting_progress: 0,
        total_progress: estimated_size,
    };
    state = SyncRunState::Sending;
    let sent = stream_send(session, &send_args, &mut writer, send_mbps_limit, &bytes_sent, &ticker).await?;
    fs_state.bytes_sent = sent;

    // Step 9: await sync-success.
    await_sync_success(&mut reader, RECEIVER_TIMEOUT).await?;
    state = SyncRunState::Succeeded;

    // Step 10: cleanup superseded snapshots.
    cleanup_after_success(&spec.dataset, &fs_state, &mut writer, &mut reader).await?;

    debug_assert!(matches!(state, SyncRunState::Succeeded));
    Ok(fs_state)
}

async fn request_snapshot_names(
    writer: &mut FramedWrite<tokio::net::tcp::OwnedWriteHalf, JsonLineCodec<MigrationFrame>>,
    reader: &mut FramedRead<tokio::net::tcp::OwnedReadHalf, JsonLineCodec<MigrationFrame>>,
    dataset: &str,
) -> Result<Vec<u64>, SyncRunError> {
    let event_id = uuid::Uuid::new_v4().simple().to_string();
    writer
        .send(MigrationFrame::Request {
            command: MigrationCommand::GetZfsSnapshotNames,
            event_id: event_id.clone(),
            args: response_fields(&[("dataset", serde_json::json!(dataset))]),
        })
        .await?;
    match reader.next().await {
        Some(Ok(MigrationFrame::Response { result, .. })) => {
            let names = result.get("names").and_then(|v| v.as_array()).cloned().unwrap_or_default();
            Ok(names
                .iter()
                .filter_map(|v| v.as_str())
                .filter_map(|s| s.strip_prefix(super::naming::SNAPSHOT_PREFIX))
                .filter_map(|s| s.parse::<u64>().ok())
                .collect())
        }
        Some(Ok(MigrationFrame::Error { message, .. })) => Err(SyncRunError::Io(std::io::Error::other(message))),
        _ => Err(SyncRunError::PeerClosed),
    }
}

async fn request_resume_token(
    writer: &mut FramedWrite<tokio::net::tcp::OwnedWriteHalf, JsonLineCodec<MigrationFrame>>,
    reader: &mut FramedRead<tokio::net::tcp::OwnedReadHalf, JsonLineCodec<MigrationFrame>>,
    dataset: &str,
) -> Result<Option<String>, SyncRunError> {
    let event_id = uuid::Uuid::new_v4().simple().to_string();
    writer
        .send(MigrationFrame::Request {
            command: MigrationCommand::GetZfsResumeToken,
            event_id,
            args: response_fields(&[("dataset", serde_json::json!(dataset))]),
        })
        .await?;
    match reader.next().await {
        Some(Ok(MigrationFrame::Response { result, .. })) => {
            Ok(result.get("token").and_then(|v| v.as_str()).and_then(|s| zfs::parse_resume_token(s)))
        }
        _ => Err(SyncRunError::PeerClosed),
    }
}

/// Pipes `zfs send` stdout through the rate limiter directly into the
/// control socket's write half, after telling the target to start
/// `zfs receive -s <dataset>` (§4.8 step 8).
async fn stream_send(
    session: &SendSession,
    args: &SendArgs,
    writer: &mut FramedWrite<tokio::net::tcp::OwnedWriteHalf, JsonLineCodec<MigrationFrame>>,
    mbps_limit: Option<u64>,
    bytes_sent: &Arc<AtomicU64>,
    ticker: &ProgressTicker,
) -> Result<u64, SyncRunError> {
    let event_id = uuid::Uuid::new_v4().simple().to_string();
    writer
        .send(MigrationFrame::Request {
            command: MigrationCommand::Sync,
            event_id,
            args: response_fields(&[("dataset", serde_json::json!(args.dataset))]),
        })
        .await?;

    let mut child = zfs::send_stream_command(args).spawn()?;
    let mut stdout = child.stdout.take().ok_or_else(|| std::io::Error::other("zfs send stdout not piped"))?;
    let mut limiter = mbps_limit.map(|mbps| TokenBucket::new(mbps * 125_000));

    let sink = writer.get_mut();
    let mut buf = [0u8; 64 * 1024];
    let mut ticker_interval = tokio::time::interval(PROGRESS_INTERVAL);
    loop {
        tokio::select! {
            read = stdout.read(&mut buf) => {
                let n = read?;
                if n == 0 { break; }
                if session.is_aborted() {
                    let _ = child.start_kill();
                    return Err(SyncRunError::SyncAborted);
                }
                if let Some(bucket) = limiter.as_mut() {
                    bucket.acquire(n).await;
                }
                sink.write_all(&buf[..n]).await?;
                bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
            }
            _ = ticker_interval.tick() => {
                session.broadcast(ticker.sample(Instant::now()));
            }
        }
    }
    let status = child.wait().await?;
    if !status.success() {
        return Err(SyncRunError::Io(std::io::Error::other(format!("zfs send exited with {status}"))));
    }
    Ok(bytes_sent.load(Ordering::Relaxed))
}

async fn await_sync_success(
    reader: &mut FramedRead<tokio::net::tcp::OwnedReadHalf, JsonLineCodec<MigrationFrame>>,
    timeout: Duration,
) -> Result<(), SyncRunError> {
    match tokio::time::timeout(timeout, reader.next()).await {
        Ok(Some(Ok(MigrationFrame::SyncSuccess))) => Ok(()),
        Ok(Some(Ok(MigrationFrame::Error { message, .. }))) => Err(SyncRunError::Io(std::io::Error::other(message))),
        Ok(_) => Err(SyncRunError::PeerClosed),
        Err(_elapsed) => Err(SyncRunError::ReceiverTimeout),
    }
}

/// Deletes all but the most recent source migration snapshot, and the
/// now-superseded previous snapshot on the target (§4.8 step 10).
async fn cleanup_after_success(
    dataset: &str,
    fs_state: &FilesystemReplicationState,
    writer: &mut FramedWrite<tokio::net::tcp::OwnedWriteHalf, JsonLineCodec<MigrationFrame>>,
    reader: &mut FramedRead<tokio::net::tcp::OwnedReadHalf, JsonLineCodec<MigrationFrame>>,
) -> Result<(), SyncRunError> {
    let mut keep = fs_state.source_snapshots.clone();
    if let Some(name) = &fs_state.snapshot_name {
        if let Some(suffix) = name.strip_prefix(super::naming::SNAPSHOT_PREFIX).and_then(|s| s.parse::<u64>().ok()) {
            keep.push(suffix);
        }
    }
    let Some(&most_recent) = keep.iter().max() else { return Ok(()) };
    for suffix in keep {
        if suffix != most_recent {
            let snap = format!("{dataset}@{}", super::naming::snapshot_name(suffix));
            let _ = zfs::destroy(&snap, false, false).await;
        }
    }

    if let Some(prev) = &fs_state.prev_snapshot_name {
        let snap = format!("{dataset}@{prev}");
        if let Err(error) = request_zfs_destroy(writer, reader, &snap).await {
            tracing::warn!(%error, snapshot = %snap, "failed to destroy superseded snapshot on target");
        }
    }
    Ok(())
}

/// Asks the target to delete a now-superseded snapshot over the control
/// socket (§4.8 step 10, scenario 5: "deletes vm-migration-1 from both
/// sides"). Best-effort: callers log and move on rather than fail the
/// whole sync over a stale snapshot the next run will collide on anyway.
async fn request_zfs_destroy(
    writer: &mut FramedWrite<tokio::net::tcp::OwnedWriteHalf, JsonLineCodec<MigrationFrame>>,
    reader: &mut FramedRead<tokio::net::tcp::OwnedReadHalf, JsonLineCodec<MigrationFrame>>,
    snapshot: &str,
) -> Result<(), SyncRunError> {
    let event_id = uuid::Uuid::new_v4().simple().to_string();
    writer
        .send(MigrationFrame::Request {
            command: MigrationCommand::ZfsDestroy,
            event_id,
            args: response_fields(&[("snapshot", serde_json::json!(snapshot))]),
        })
        .await?;
    match reader.next().await {
        Some(Ok(MigrationFrame::Response { .. })) => Ok(()),
        Some(Ok(MigrationFrame::Error { message, .. })) => Err(SyncRunError::Io(std::io::Error::other(message))),
        _ => Err(SyncRunError::PeerClosed),
    }
}

fn response_fields(pairs: &[(&str, serde_json::Value)]) -> serde_json::Map<String, serde_json::Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[cfg(test)]
#[path = "send_tests.rs"]
mod tests;
