//! # The task synchronization server
//!
//! One request/response cycle (a *turn*) flows through the crate like this:
//! [`server`] reads a length-framed envelope off the transport and hands the
//! body to [`dispatch`], which authenticates the caller ([`auth`]), takes the
//! per-user lock, loads the user's transaction log ([`store`]), runs the
//! merge ([`engine`]) and answers with a response envelope, accumulating
//! [`stats`] along the way.

#![forbid(unsafe_code)]
#![deny(missing_debug_implementations)]

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod server;
pub mod stats;
pub mod store;
