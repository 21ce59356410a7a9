use super::*;

#[test]
fn system_clock_epoch_ms_is_nonzero() {
    let clock = SystemClock;
    assert!(clock.epoch_ms() > 0);
}

#[test]
fn fake_clock_advances_both_now_and_epoch() {
    let clock = FakeClock::new();
    let t0 = clock.now();
    let ms0 = clock.epoch_ms();

    clock.advance(Duration::from_secs(5));

    assert_eq!(clock.now(), t0 + Duration::from_secs(5));
    assert_eq!(clock.epoch_ms(), ms0 + 5000);
}

#[test]
fn fake_clock_set_epoch_ms_is_independent_of_now() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(42);
    assert_eq!(clock.epoch_ms(), 42);
}
