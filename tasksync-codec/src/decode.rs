//! Decoding of protocol values.

/// Decoder.
///
/// Implemented for types that know how to decode one protocol value from a
/// complete input. Inputs are complete by construction here (the length
/// frame delivers whole bodies, and records are whole lines), so decoding
/// either consumes everything or fails.
pub trait Decoder {
    type Message;
    type Error;

    fn decode(&self, input: &[u8]) -> Result<Self::Message, Self::Error>;
}
