//! Encoding of protocol values.

/// Encoder.
///
/// Implemented for types that know how to serialize one protocol value.
/// Encoding is infallible; anything representable is encodable.
pub trait Encoder {
    type Message;

    fn encode(&self, message: &Self::Message) -> Vec<u8>;
}
