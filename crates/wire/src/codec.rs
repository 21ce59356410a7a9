// SPDX-License-Identifier: MIT

//! IPC Codec (§4.4, §6): newline-delimited JSON framing shared by the
//! worker control channel and the migration TCP protocol.
//!
//! A single generic [`JsonLineCodec<T>`] implements both `Decoder` and
//! `Encoder` so the same framing is reused for parent↔child pipes and for
//! the migration send/receive TCP sockets — only the message type `T`
//! differs.

use bytes::BytesMut;
use std::marker::PhantomData;
use tokio_util::codec::{Decoder, Encoder};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("line exceeds max length of {0} bytes")]
    LineTooLong(usize),
}

/// Maximum single-line length accepted before the connection is torn down,
/// guarding against an unbounded buffer from a misbehaving peer (§5: all
/// subprocess output is bound; the same discipline applies to sockets).
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

pub struct JsonLineCodec<T> {
    _marker: PhantomData<T>,
}

impl<T> Default for JsonLineCodec<T> {
    fn default() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> Clone for JsonLineCodec<T> {
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl<T: for<'de> serde::Deserialize<'de>> Decoder for JsonLineCodec<T> {
    type Item = T;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(newline_at) = src.iter().position(|b| *b == b'\n') else {
            if src.len() > MAX_LINE_BYTES {
                return Err(CodecError::LineTooLong(src.len()));
            }
            return Ok(None);
        };
        let line = src.split_to(newline_at + 1);
        // Drop the trailing '\n' (and a preceding '\r', if any).
        let line = trim_trailing_cr(&line[..line.len() - 1]);
        if line.is_empty() {
            return self.decode(src);
        }
        let value = serde_json::from_slice(line)?;
        Ok(Some(value))
    }
}

fn trim_trailing_cr(line: &[u8]) -> &[u8] {
    if line.last() == Some(&b'\r') {
        &line[..line.len() - 1]
    } else {
        line
    }
}

impl<T: serde::Serialize> Encoder<T> for JsonLineCodec<T> {
    type Error = CodecError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut line = serde_json::to_vec(&item)?;
        line.push(b'\n');
        dst.extend_from_slice(&line);
        Ok(())
    }
}

/// Reserved top-level keys in any wire message (§6): `type`, `name`,
/// `event`, `action`, `id`. New message variants must not repurpose them.
pub const RESERVED_KEYS: &[&str] = &["type", "name", "event", "action", "id"];

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
