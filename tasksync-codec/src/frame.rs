//! The transport length frame.
//!
//! Every message on the wire is preceded by a 4-byte big-endian length that
//! counts the whole frame, prefix included. The codec plugs into
//! [`tokio_util::codec::Framed`] on both ends of a connection.
//!
//! Oversized frames are rejected from the length header alone, before any
//! body bytes are read.

use std::io::Error as IoError;

use bytes::{Buf, BufMut, BytesMut};
use log::trace;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Size of the length prefix.
pub const HEADER_LEN: usize = 4;

/// Length-frame codec with an optional size limit (0 disables it).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FrameCodec {
    limit: usize,
}

impl FrameCodec {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }
}

#[derive(Debug, Error)]
pub enum FrameCodecError {
    #[error(transparent)]
    Io(#[from] IoError),
    /// The announced size reached the configured request limit.
    #[error("Expected message size {length} is larger than allowed limit {limit}")]
    TooBig { length: usize, limit: usize },
    /// The announced size cannot even cover the prefix itself.
    #[error("Frame length {0} is shorter than the length prefix")]
    BadLength(usize),
}

impl PartialEq for FrameCodecError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Io(error1), Self::Io(error2)) => error1.kind() == error2.kind(),
            (
                Self::TooBig { length: l1, limit: m1 },
                Self::TooBig { length: l2, limit: m2 },
            ) => l1 == l2 && m1 == m2,
            (Self::BadLength(l1), Self::BadLength(l2)) => l1 == l2,
            _ => false,
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Vec<u8>;
    type Error = FrameCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&src[..HEADER_LEN]);
        let length = u32::from_be_bytes(header) as usize;

        trace!("expecting {length} bytes");

        if length < HEADER_LEN {
            return Err(FrameCodecError::BadLength(length));
        }

        if self.limit > 0 && length >= self.limit {
            return Err(FrameCodecError::TooBig {
                length,
                limit: self.limit,
            });
        }

        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let body = src.split_to(length - HEADER_LEN);
        Ok(Some(body.to_vec()))
    }
}

impl Encoder<&[u8]> for FrameCodec {
    type Error = FrameCodecError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        let total = item.len() + HEADER_LEN;
        dst.reserve(total);
        dst.put_u32(total as u32);
        dst.put_slice(item);
        Ok(())
    }
}
