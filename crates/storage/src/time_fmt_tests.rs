use super::*;
use chrono::TimeZone;

#[test]
fn formats_rfc3339_with_z_suffix() {
    let when = Utc.with_ymd_and_hms(2026, 7, 29, 8, 14, 9).unwrap();
    assert_eq!(format_utc(when), "2026-07-29T08:14:09Z");
}

#[test]
fn formats_compact_filename_timestamp() {
    let when = Utc.with_ymd_and_hms(2026, 7, 29, 8, 14, 9).unwrap();
    assert_eq!(format_filename_timestamp(when), "20260729T081409Z");
}
