// SPDX-License-Identifier: MIT

//! Send-side rate limiter (§4.8 step 8, §9): re-exported here under
//! `migrate::throttle` so call sites in the send pipeline read as a
//! first-class, independently testable part of the migration design
//! rather than a borrowed subprocess utility. The implementation itself
//! lives in `cnagent-adapters` alongside the other external-world
//! primitives it is built from (a plain monotonic clock read).

pub use cnagent_adapters::TokenBucket;
