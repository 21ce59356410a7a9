// SPDX-License-Identifier: MIT

//! UTC timestamp formatting shared by the worker log writer and the
//! provision guard.

use chrono::{DateTime, Utc};

/// RFC3339 with second precision, e.g. `2026-07-29T08:14:09Z`.
pub fn format_utc(when: DateTime<Utc>) -> String {
    when.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Compact form used in worker log filenames, e.g. `20260729T081409Z`.
pub fn format_filename_timestamp(when: DateTime<Utc>) -> String {
    when.format("%Y%m%dT%H%M%SZ").to_string()
}

#[cfg(test)]
#[path = "time_fmt_tests.rs"]
mod tests;
