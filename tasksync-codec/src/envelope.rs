//! The request/response envelope codec.
//!
//! An envelope body is UTF-8 text, partitioned at the first blank line:
//!
//! ```text
//! type: sync
//! protocol: v1
//!
//! <payload>
//! ```
//!
//! Header names and values are trimmed; duplicates are rejected. The payload
//! is carried byte-for-byte, so encode/decode round-trips exactly.

use std::str::from_utf8;

use tasksync_types::message::Message;
use thiserror::Error;

use crate::{decode::Decoder, encode::Encoder};

/// Error during envelope decoding.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum EnvelopeDecodeError {
    /// No blank-line separator between headers and payload.
    #[error("Malformed message")]
    MissingSeparator,
    #[error("Malformed message header '{0}'")]
    BadHeader(String),
    #[error("Duplicate message header '{0}'")]
    DuplicateHeader(String),
    /// The body is not UTF-8. Bodies that sniff as UTF-16/32 (a null among
    /// the first four bytes) are caught here before any text handling.
    #[error("Message is not UTF-8 encoded")]
    NotUtf8,
}

/// Codec for the header-block-plus-payload envelope.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct EnvelopeCodec;

impl Decoder for EnvelopeCodec {
    type Message = Message;
    type Error = EnvelopeDecodeError;

    fn decode(&self, input: &[u8]) -> Result<Message, EnvelopeDecodeError> {
        // UTF-16 and UTF-32 both put a null somewhere in the first four
        // bytes; UTF-8 never does.
        if input.len() >= 4 && input[..4].contains(&0) {
            return Err(EnvelopeDecodeError::NotUtf8);
        }

        let text = from_utf8(input).map_err(|_| EnvelopeDecodeError::NotUtf8)?;

        let Some((head, payload)) = text.split_once("\n\n") else {
            return Err(EnvelopeDecodeError::MissingSeparator);
        };

        let mut message = Message::new();
        for line in head.split('\n') {
            if line.is_empty() {
                continue;
            }

            let Some((name, value)) = line.split_once(':') else {
                return Err(EnvelopeDecodeError::BadHeader(line.to_string()));
            };

            let name = name.trim();
            if message.get(name).is_some() {
                return Err(EnvelopeDecodeError::DuplicateHeader(name.to_string()));
            }
            message.set(name, value.trim());
        }

        message.set_payload(payload);
        Ok(message)
    }
}

impl Encoder for EnvelopeCodec {
    type Message = Message;

    fn encode(&self, message: &Message) -> Vec<u8> {
        let mut output = String::new();

        for (name, value) in message.headers() {
            output.push_str(name);
            output.push_str(": ");
            output.push_str(value);
            output.push('\n');
        }

        output.push('\n');
        output.push_str(message.payload());

        output.into_bytes()
    }
}
