//! I/O for the sandbox: set files, the shard store, and configuration.

pub mod config;
pub mod paths;
pub mod sets;
pub mod shard;
