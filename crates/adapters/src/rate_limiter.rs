// SPDX-License-Identifier: MIT

//! Token-bucket rate limiter for the ZFS send pipeline (`zfs_send_mbps_limit`,
//! §4.8 step 8). Not present in the reference design under this name, but
//! every reference to "throttling" resolves to this shape.

use std::time::{Duration, Instant};

/// Caps throughput to `rate_bytes_per_sec`, with a burst allowance equal
/// to one second's worth of tokens.
pub struct TokenBucket {
    rate_bytes_per_sec: f64,
    capacity: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(rate_bytes_per_sec: u64) -> Self {
        let rate = rate_bytes_per_sec as f64;
        Self { rate_bytes_per_sec: rate, capacity: rate, tokens: rate, last_refill: Instant::now() }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate_bytes_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Returns how long the caller must wait before `n` bytes may be sent,
    /// consuming the tokens as if the wait already happened.
    pub fn reserve(&mut self, n: usize, now: Instant) -> Duration {
        self.refill(now);
        let n = n as f64;
        if self.tokens >= n {
            self.tokens -= n;
            return Duration::ZERO;
        }
        let deficit = n - self.tokens;
        self.tokens = 0.0;
        Duration::from_secs_f64(deficit / self.rate_bytes_per_sec)
    }

    /// Blocks the caller, via an async sleep, until `n` bytes are allowed.
    pub async fn acquire(&mut self, n: usize) {
        let wait = self.reserve(n, Instant::now());
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
#[path = "rate_limiter_tests.rs"]
mod tests;
