//! Storage Module
//!
//! Tracks where every file lives: on this node's disk, or on a registered
//! secondary node.
//!
//! ## Core Concepts
//! - **Local directory**: `LocalFileDirectory` mirrors the regular files in the storage root.
//! - **Sharding**: `ShardRegistry` pins non-local names to the node that owns them and
//!   hands out new PUTs round-robin across "every registered node, then self".
//! - **Pinning**: once a name is assigned it keeps its owner for the life of the process.

pub mod directory;
pub mod shard;
pub mod types;
