//! File Server Module
//!
//! Accepts TCP connections and drives each one through the request state machine.
//!
//! ## Core Concepts
//! - **Resumable connections**: `Connection` consumes whatever bytes arrived and
//!   remembers exactly where it stopped, so a request split across any number of
//!   reads is handled the same as one delivered whole.
//! - **Verb handlers**: GET, DELETE and LIST answer in one step; PUT and ADD_SERVER
//!   keep a `Transfer` alive until their payload is complete.
//! - **Shared context**: every connection task holds an `Arc<ServerContext>` with the
//!   local file directory, the shard registry and the shutdown signal.

pub mod connection;
pub mod context;
pub mod handlers;
pub mod listener;
pub mod types;

#[cfg(test)]
mod tests;
