//! Client Module
//!
//! Talks to a pishare server the way the command-line client does.
//!
//! ## Core Concepts
//! - **Redirects**: GET and PUT follow at most one redirect to the node that owns the file.
//! - **Byte accounting**: every transfer is checked against its declared size; short
//!   transfers and trailing extra bytes are reported separately.
//! - **Joining**: a node registers itself and the files it already holds with a primary.

pub mod driver;
pub mod join;
pub mod types;
