use super::*;
use std::sync::atomic::{AtomicUsize, Ordering as StdOrdering};

struct CountingSource {
    calls: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl SampleSource for CountingSource {
    async fn sample(&self) -> Result<SysinfoSample, SampleError> {
        let n = self.calls.fetch_add(1, StdOrdering::SeqCst) as u64 + 1;
        Ok(SysinfoSample { boot_time_ms: n, ..SysinfoSample::default() })
    }
}

#[tokio::test(start_paused = true)]
async fn dirty_flag_is_refreshed_on_the_next_heartbeat_tick() {
    let calls = Arc::new(AtomicUsize::new(0));
    let loop_ = HeartbeatLoop::new(Arc::new(CountingSource { calls: Arc::clone(&calls) }));
    let handle = tokio::spawn(Arc::clone(&loop_).run());

    tokio::time::advance(HEARTBEAT_INTERVAL + Duration::from_millis(1)).await;
    tokio::task::yield_now().await;

    assert_eq!(calls.load(StdOrdering::SeqCst), 1);
    assert_eq!(loop_.snapshot().boot_time_ms, 1);
    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn mark_dirty_and_ready_triggers_a_zone_event_publish() {
    let calls = Arc::new(AtomicUsize::new(0));
    let loop_ = HeartbeatLoop::new(Arc::new(CountingSource { calls: Arc::clone(&calls) }));
    let mut rx = loop_.subscribe();
    let handle = tokio::spawn(Arc::clone(&loop_).run());

    loop_.mark_dirty_and_ready();
    tokio::time::advance(HEARTBEAT_INTERVAL + Duration::from_millis(1)).await;
    tokio::task::yield_now().await;

    let first = rx.try_recv().expect("heartbeat publish expected");
    assert!(matches!(first, Publish::Heartbeat(_)));
    let second = rx.try_recv().expect("zone-event publish expected after ready refresh");
    assert!(matches!(second, Publish::ZoneEvent(_)));
    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn busy_sampler_eventually_reports_a_deadlock() {
    let calls = Arc::new(AtomicUsize::new(0));
    let loop_ = HeartbeatLoop::new(Arc::new(CountingSource { calls: Arc::clone(&calls) }));
    let _guard = loop_.sampler.try_lock().expect("sampler starts unlocked");

    let handle = tokio::spawn(Arc::clone(&loop_).run());
    for _ in 0..SKIPPED_REFRESH_ABORT_THRESHOLD {
        loop_.mark_dirty();
        tokio::time::advance(HEARTBEAT_INTERVAL + Duration::from_millis(1)).await;
        tokio::task::yield_now().await;
    }

    let result = handle.await.expect("task should not panic");
    assert!(matches!(result, Err(HeartbeatLoopError::SamplerDeadlock(n)) if n >= SKIPPED_REFRESH_ABORT_THRESHOLD));
}
