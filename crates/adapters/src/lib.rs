// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! External-world adapters: subprocess execution, the `zfs(1M)` wrapper,
//! the agent-image fetcher, and the send-side rate limiter. Nothing here
//! holds scheduling state — that lives in `cnagent-core` and
//! `cnagent-engine`.

pub mod image_fetch;
pub mod rate_limiter;
pub mod subprocess;
pub mod zfs;

pub use image_fetch::{fetch as fetch_agent_image, Compression, FetchedImage, ImageFetchContext, ImageFetchError, Manifest};
pub use rate_limiter::TokenBucket;
pub use subprocess::{run_with_timeout, CommandOutput, SubprocessError, SHELL_COMMAND_TIMEOUT, ZFS_COMMAND_TIMEOUT};
pub use zfs::{SendArgs, ZfsError};
