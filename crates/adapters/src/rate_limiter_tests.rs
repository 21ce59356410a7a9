use super::*;

#[test]
fn reserve_is_immediate_within_burst_capacity() {
    let mut bucket = TokenBucket::new(1000);
    let wait = bucket.reserve(500, Instant::now());
    assert_eq!(wait, Duration::ZERO);
}

#[test]
fn reserve_charges_wait_time_once_tokens_exhausted() {
    let mut bucket = TokenBucket::new(1000);
    let now = Instant::now();
    assert_eq!(bucket.reserve(1000, now), Duration::ZERO);
    let wait = bucket.reserve(500, now);
    assert!(wait > Duration::ZERO);
    assert!(wait <= Duration::from_secs(1));
}

#[test]
fn tokens_refill_over_time() {
    let mut bucket = TokenBucket::new(1000);
    let t0 = Instant::now();
    bucket.reserve(1000, t0);
    let t1 = t0 + Duration::from_millis(500);
    let wait = bucket.reserve(400, t1);
    assert_eq!(wait, Duration::ZERO);
}
