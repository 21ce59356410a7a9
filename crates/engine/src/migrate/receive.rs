// SPDX-License-Identifier: MIT

//! Migration Receive Process (§4.9): one spawned process per inbound
//! migration. Parses line-delimited JSON commands until a `sync` arrives,
//! at which point the control connection's parser is unplugged and the
//! remaining bytes are fed straight into `zfs receive`'s stdin (§4.9 step 2).

use cnagent_adapters::zfs;
use cnagent_wire::codec::JsonLineCodec;
use cnagent_wire::migration::{MigrationCommand, MigrationFrame};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, FramedWrite};

#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Zfs(#[from] zfs::ZfsError),
}

pub struct ReceiveProcess {
    listener: TcpListener,
}

impl ReceiveProcess {
    pub async fn bind(addr: impl tokio::net::ToSocketAddrs) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn accept_and_serve(&self) -> std::io::Result<()> {
        let (stream, _peer) = self.listener.accept().await?;
        serve_connection(stream).await;
        Ok(())
    }
}

async fn serve_connection(stream: TcpStream) {
    let (mut read_half, write_half) = stream.into_split();
    let mut writer: FramedWrite<_, JsonLineCodec<MigrationFrame>> = FramedWrite::new(write_half, JsonLineCodec::default());
    // `leftover` carries any bytes the line-codec's internal buffer had
    // already read past the `sync` command's trailing newline, which
    // belong to the bulk zfs stream, not the next control command.
    let mut leftover: Vec<u8> = Vec::new();

    loop {
        let mut reader: FramedRead<&mut tokio::net::tcp::OwnedReadHalf, JsonLineCodec<MigrationFrame>> =
            FramedRead::new(&mut read_half, JsonLineCodec::default());
        let frame = match reader.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(error)) => {
                tracing::warn!(%error, "malformed migration control frame");
                break;
            }
            None => break,
        };
        leftover = reader.read_buffer().to_vec();

        match frame {
            MigrationFrame::Request { command: MigrationCommand::Ping, event_id, .. } => {
                let resp = MigrationFrame::Response {
                    command: MigrationCommand::Ping,
                    event_id,
                    result: [("pid".to_string(), serde_json::json!(std::process::id()))].into_iter().collect(),
                };
                if writer.send(resp).await.is_err() {
                    break;
                }
            }
            MigrationFrame::Request { command: MigrationCommand::GetZfsResumeToken, event_id, args } => {
                let dataset = args.get("dataset").and_then(|v| v.as_str()).unwrap_or_default();
                let token = zfs::get_resume_token(dataset).await.ok().flatten();
                let resp = MigrationFrame::Response {
                    command: MigrationCommand::GetZfsResumeToken,
                    event_id,
                    result: [("token".to_string(), serde_json::json!(token.unwrap_or_default()))].into_iter().collect(),
                };
                if writer.send(resp).await.is_err() {
                    break;
                }
            }
            MigrationFrame::Request { command: MigrationCommand::GetZfsSnapshotNames, event_id, args } => {
                let dataset = args.get("dataset").and_then(|v| v.as_str()).unwrap_or_default();
                let names = zfs::list_migration_snapshot_suffixes(dataset, super::naming::SNAPSHOT_PREFIX)
                    .await
                    .unwrap_or_default()
                    .into_iter()
                    .map(super::naming::snapshot_name)
                    .collect::<Vec<_>>();
                let resp = MigrationFrame::Response {
                    command: MigrationCommand::GetZfsSnapshotNames,
                    event_id,
                    result: [("names".to_string(), serde_json::json!(names))].into_iter().collect(),
                };
                if writer.send(resp).await.is_err() {
                    break;
                }
            }
            MigrationFrame::Request { command: MigrationCommand::ZfsDestroy, event_id, args } => {
                let snapshot = args.get("snapshot").and_then(|v| v.as_str()).unwrap_or_default();
                let resp = match zfs::destroy(snapshot, false, false).await {
                    Ok(()) => MigrationFrame::Response { command: MigrationCommand::ZfsDestroy, event_id, result: Default::default() },
                    Err(error) => MigrationFrame::Error { event_id: Some(event_id), message: error.to_string() },
                };
                if writer.send(resp).await.is_err() {
                    break;
                }
            }
            MigrationFrame::Request { command: MigrationCommand::Stop, event_id, .. }
            | MigrationFrame::Request { command: MigrationCommand::End, event_id, .. } => {
                let resp = MigrationFrame::Response { command: MigrationCommand::Stop, event_id, result: Default::default() };
                let _ = writer.send(resp).await;
                break;
            }
            MigrationFrame::Request { command: MigrationCommand::Sync, args, .. } => {
                let dataset = args.get("dataset").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                let first_sync = args.get("is_first_sync").and_then(|v| v.as_bool()).unwrap_or(false);
                match run_receive(&mut read_half, &dataset, first_sync, std::mem::take(&mut leftover)).await {
                    Ok(()) => {
                        let _ = writer.send(MigrationFrame::SyncSuccess).await;
                    }
                    Err(error) => {
                        tracing::error!(%error, dataset, "zfs receive failed");
                        let _ = writer
                            .send(MigrationFrame::Error { event_id: None, message: error.to_string() })
                            .await;
                        break;
                    }
                }
            }
            MigrationFrame::Request { event_id, .. } => {
                let _ = writer.send(MigrationFrame::Error { event_id: Some(event_id), message: "Not Implemented".to_string() }).await;
            }
            _ => {}
        }
    }
}

/// Runs `zfs receive -s <dataset>` (§4.9 step 2), feeding it any
/// already-buffered bytes from the control connection first, then the
/// raw socket until the peer closes the stream or the child exits.
async fn run_receive(
    read_half: &mut tokio::net::tcp::OwnedReadHalf,
    dataset: &str,
    first_sync: bool,
    leftover: Vec<u8>,
) -> Result<(), ReceiveError> {
    if first_sync && zfs::dataset_exists(dataset).await? {
        zfs::destroy(dataset, true, true).await?;
    }

    let mut child = zfs::receive_stream_command(dataset).spawn()?;
    let mut stdin = child.stdin.take().ok_or_else(|| std::io::Error::other("zfs receive stdin not piped"))?;

    if !leftover.is_empty() {
        stdin.write_all(&leftover).await?;
    }

    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = read_half.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        stdin.write_all(&buf[..n]).await?;
    }
    drop(stdin);

    let status = child.wait().await?;
    if !status.success() {
        return Err(ReceiveError::Io(std::io::Error::other(format!("zfs receive exited with {status}"))));
    }
    Ok(())
}

#[cfg(test)]
#[path = "receive_tests.rs"]
mod tests;
