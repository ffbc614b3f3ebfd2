//! Wire Protocol Module
//!
//! Defines the line-oriented request/response format spoken between clients,
//! the primary node and secondary nodes.
//!
//! ## Framing
//! - **Request line**: `VERB path\n`, `LIST\n` or `ADD_SERVER ip port\n`.
//! - **Response header**: `OK\n`, or `ERROR\n` followed by a message that runs until the peer closes.
//! - **Redirect pair**: `ip\nport\n` after `OK` for GET and PUT. `0.0.0.0` means "continue here".
//! - **Payload**: an 8-byte length in native byte order followed by exactly that many bytes.
//!
//! ## Submodules
//! - **`types`**: Verbs, headers, redirect targets and the fixed error messages.
//! - **`parser`**: Resumable, sans-IO parsers that the server feeds as bytes trickle in.
//! - **`codec`**: Async helpers for reading and writing frames on a live stream.

pub mod codec;
pub mod parser;
pub mod types;
