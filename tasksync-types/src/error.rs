//! The failure channel shared by all request handlers.

use std::{
    fmt::{Display, Formatter},
    io::Error as IoError,
};

use thiserror::Error;

use crate::response::canonical_status;

/// How a handler signals failure.
///
/// A numeric code produces a response with the canonical status text and an
/// empty payload; a descriptive string produces `code=500` with that string
/// as the status. Anything else collapses to `500 "Unknown error"` at the
/// dispatch boundary.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Failure {
    Code(u16),
    Text(String),
}

impl Display for Failure {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Failure::Code(code) => write!(f, "{} {}", code, canonical_status(*code)),
            Failure::Text(text) => f.write_str(text),
        }
    }
}

impl Failure {
    /// The response code this failure surfaces as.
    pub fn code(&self) -> u16 {
        match self {
            Failure::Code(code) => *code,
            Failure::Text(_) => 500,
        }
    }

    /// The response status text this failure surfaces as.
    pub fn status(&self) -> String {
        match self {
            Failure::Code(code) => canonical_status(*code).to_string(),
            Failure::Text(text) => text.clone(),
        }
    }
}

impl From<&str> for Failure {
    fn from(text: &str) -> Self {
        Failure::Text(text.to_string())
    }
}

impl From<String> for Failure {
    fn from(text: String) -> Self {
        Failure::Text(text)
    }
}

// Log I/O problems are transient from the client's point of view. The turn
// is discarded cleanly, so the client retries against an unchanged log.
impl From<IoError> for Failure {
    fn from(_: IoError) -> Self {
        Failure::Text("Temporary problem storing data. Please retry.".to_string())
    }
}
