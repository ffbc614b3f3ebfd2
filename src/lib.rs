//! Distributed File Sharing Library
//!
//! This library crate defines the modules shared by the server binary (`main.rs`)
//! and the command-line client (`bin/client.rs`).
//!
//! ## Architecture Modules
//!
//! - **`protocol`**: The wire format. Request lines, the 8-byte size field, redirect
//!   pairs and error framing, plus resumable parsers that accept input in any chunking.
//! - **`storage`**: Where files live. The local file directory mirrors the storage root;
//!   the shard registry pins remote names to their owners and spreads new PUTs
//!   round-robin across registered nodes.
//! - **`server`**: The TCP front end. One task per connection drives a request state
//!   machine over a shared context.
//! - **`client`**: The request driver used by the CLI and by nodes joining a cluster.
//! - **`config`** / **`telemetry`**: Command-line arguments and logging setup.

pub mod client;
pub mod config;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod telemetry;
