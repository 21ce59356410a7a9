// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Wire formats for the agent's two IPC surfaces: the worker control
//! channel (parent↔child over pipes) and the migration control protocol
//! (coordinator↔send/receive processes over TCP). Both share the same
//! newline-delimited JSON framing, implemented once in [`codec`].

pub mod codec;
pub mod migration;
pub mod worker;

pub use codec::{CodecError, JsonLineCodec, MAX_LINE_BYTES, RESERVED_KEYS};
pub use migration::{
    MigrationCommand, MigrationError, MigrationFrame, MigrationProgress, MigrationRequest, MigrationResponse,
    SyncSuccess,
};
pub use worker::{ChildEvent, ParentMessage, RawEnvelope, WorkerMessageError};
