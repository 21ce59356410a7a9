use super::*;

#[test]
fn stop_sets_abort_flag_observable_by_check_abort() {
    let session = SendSession::new("vm-1");
    assert!(session.check_abort().is_ok());
    session.stop();
    assert!(matches!(session.check_abort(), Err(SyncRunError::SyncAborted)));
}

#[test]
fn stop_is_idempotent() {
    let session = SendSession::new("vm-1");
    session.stop();
    session.stop();
    assert!(session.is_aborted());
}

#[test]
fn progress_ticker_reports_current_progress_relative_to_starting_point() {
    let ticker = ProgressTicker {
        started_at: Instant::now(),
        last_keepalive: Mutex::new(Instant::now()),
        bytes_sent: Arc::new(AtomicU64::new(500)),
        starting_bytes: 0,
        starting_progress: 0,
        total_progress: 1000,
    };
    let sample = ticker.sample(Instant::now());
    assert_eq!(sample.current_progress, 500);
    assert_eq!(sample.total_progress, 1000);
}

#[test]
fn watchers_receive_broadcast_progress() {
    let session = SendSession::new("vm-1");
    let mut rx = session.watch();
    let ticker = ProgressTicker {
        started_at: Instant::now(),
        last_keepalive: Mutex::new(Instant::now()),
        bytes_sent: Arc::new(AtomicU64::new(10)),
        starting_bytes: 0,
        starting_progress: 0,
        total_progress: 100,
    };
    session.broadcast(ticker.sample(Instant::now()));
    let received = rx.try_recv().expect("progress should have been delivered");
    assert_eq!(received.current_progress, 10);
}
