//! Support library of the `shmdomains` command line.
//!
//! Configuration, RPC fallback and the Parquet sale archive live here so the
//! binary stays a thin argument dispatcher.

pub mod archive;
pub mod config;
pub mod cursor;
pub mod parquet;
pub mod rpc;
