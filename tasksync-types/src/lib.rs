//! # Data structures for the task synchronization protocol
//!
//! This crate provides the value types shared by the codec and the server:
//! [`Task`](task::Task) records, the request/response [`Message`](message::Message)
//! envelope, the numeric status taxonomy, and the [`Failure`](error::Failure)
//! channel handlers use to signal protocol-level errors.
//!
//! Parsing and serialization live in `tasksync-codec`.

#![forbid(unsafe_code)]
#![deny(missing_debug_implementations)]

pub mod duration;
pub mod error;
pub mod message;
pub mod response;
pub mod task;
pub mod utils;
