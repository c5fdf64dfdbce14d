//! # Wire grammar and framing
//!
//! Three layers, innermost first:
//!
//! * [`record`]: one task as a single `[name:"value" ...]` line.
//! * [`envelope`]: a header block, a blank-line separator, and a payload.
//! * [`frame`]: a 4-byte big-endian length prefix over the transport,
//!   usable directly as a [`tokio_util::codec`] codec.
//!
//! Decoding and encoding are exposed through the [`Decoder`](decode::Decoder)
//! and [`Encoder`](encode::Encoder) traits, implemented by [`RecordCodec`]
//! and [`EnvelopeCodec`].

#![forbid(unsafe_code)]
#![deny(missing_debug_implementations)]

pub mod decode;
pub mod encode;
pub mod envelope;
pub mod frame;
pub mod record;

// Re-exported to avoid version drift between the codec and its types.
pub use tasksync_types as types;

pub use crate::{
    decode::Decoder,
    encode::Encoder,
    envelope::{EnvelopeCodec, EnvelopeDecodeError},
    frame::{FrameCodec, FrameCodecError},
    record::{RecordCodec, RecordDecodeError},
};
