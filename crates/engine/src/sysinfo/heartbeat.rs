// SPDX-License-Identifier: MIT

//! Sysinfo/Heartbeat Loop (§4.10 component K): a single owner of the
//! sysinfo cache. Two watchers (the zone event stream, the config
//! filesystem watch) call [`HeartbeatLoop::mark_dirty`]/
//! [`HeartbeatLoop::mark_dirty_and_ready`] to request an early refresh;
//! a 60s floor forces one regardless. The cache itself is published
//! every 5s, plus once more immediately whenever a `ready`-flagged
//! refresh lands (the "state changed" routing key the zone watcher asks
//! for).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::interval;

use super::sample::{SampleError, SampleSource, SysinfoSample};

/// Refresh the cache at least this often even with no dirty signal.
pub const REFRESH_FLOOR: Duration = Duration::from_secs(60);
/// Cadence for publishing the cached sample.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// Consecutive refreshes skipped because the sampler mutex was already
/// held before the loop gives up and reports a deadlock.
pub const SKIPPED_REFRESH_ABORT_THRESHOLD: u32 = 5;

#[derive(Debug, Clone)]
pub enum Publish {
    Heartbeat(SysinfoSample),
    ZoneEvent(SysinfoSample),
}

#[derive(Debug, thiserror::Error)]
pub enum HeartbeatLoopError {
    #[error("sampler mutex skipped {0} consecutive refreshes, assuming deadlock")]
    SamplerDeadlock(u32),
    #[error(transparent)]
    Sample(#[from] SampleError),
}

pub struct HeartbeatLoop<S: SampleSource> {
    source: Arc<S>,
    dirty: AtomicBool,
    ready: AtomicBool,
    cached: Mutex<SysinfoSample>,
    sampler: tokio::sync::Mutex<()>,
    skipped: AtomicU32,
    publish_tx: broadcast::Sender<Publish>,
}

impl<S: SampleSource> HeartbeatLoop<S> {
    pub fn new(source: Arc<S>) -> Arc<Self> {
        let (publish_tx, _) = broadcast::channel(16);
        Arc::new(Self {
            source,
            dirty: AtomicBool::new(true),
            ready: AtomicBool::new(false),
            cached: Mutex::new(SysinfoSample::default()),
            sampler: tokio::sync::Mutex::new(()),
            skipped: AtomicU32::new(0),
            publish_tx,
        })
    }

    /// Requests a refresh on the next heartbeat tick.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Requests a refresh and an extra immediate publish once it lands
    /// (the zone watcher's "something changed" signal, §4.10).
    pub fn mark_dirty_and_ready(&self) {
        self.dirty.store(true, Ordering::SeqCst);
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Publish> {
        self.publish_tx.subscribe()
    }

    pub fn snapshot(&self) -> SysinfoSample {
        self.cached.lock().clone()
    }

    /// Drives the loop until a refresh gives up on the sampler mutex
    /// (§4.10: 5 consecutive skips is treated as a deadlock). The caller
    /// is expected to log and restart the loop.
    pub async fn run(self: Arc<Self>) -> Result<(), HeartbeatLoopError> {
        let mut floor = interval(REFRESH_FLOOR);
        let mut heartbeat = interval(HEARTBEAT_INTERVAL);
        loop {
            tokio::select! {
                _ = floor.tick() => {
                    self.dirty.store(true, Ordering::SeqCst);
                }
                _ = heartbeat.tick() => {
                    if self.dirty.swap(false, Ordering::SeqCst) {
                        self.refresh().await?;
                    }
                    let sample = self.cached.lock().clone();
                    let _ = self.publish_tx.send(Publish::Heartbeat(sample.clone()));
                    if self.ready.swap(false, Ordering::SeqCst) {
                        let _ = self.publish_tx.send(Publish::ZoneEvent(sample));
                    }
                }
            }
        }
    }

    async fn refresh(&self) -> Result<(), HeartbeatLoopError> {
        match self.sampler.try_lock() {
            Ok(_guard) => {
                self.skipped.store(0, Ordering::SeqCst);
                let sample = self.source.sample().await?;
                *self.cached.lock() = sample;
                Ok(())
            }
            Err(_would_block) => {
                let skipped = self.skipped.fetch_add(1, Ordering::SeqCst) + 1;
                if skipped >= SKIPPED_REFRESH_ABORT_THRESHOLD {
                    Err(HeartbeatLoopError::SamplerDeadlock(skipped))
                } else {
                    tracing::warn!(skipped, "sysinfo sampler busy, skipping this refresh");
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
