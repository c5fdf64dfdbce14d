//! The request/response envelope.

use indexmap::IndexMap;

/// A protocol message: a block of `name: value` headers and a payload.
///
/// This is a plain value type. Wire encoding and decoding live in
/// `tasksync-codec`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Message {
    headers: IndexMap<String, String>,
    payload: String,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// A header value, with absence read as the empty string.
    pub fn get_or_empty(&self, name: &str) -> &str {
        self.get(name).unwrap_or("")
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn set_payload(&mut self, payload: impl Into<String>) {
        self.payload = payload.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_access() {
        let mut msg = Message::new();
        msg.set("type", "sync");
        msg.set("org", "Public");

        assert_eq!(Some("sync"), msg.get("type"));
        assert_eq!("", msg.get_or_empty("missing"));
        assert_eq!(2, msg.headers().count());
    }
}
