//! Replicated, shard-partitioned key-value engine (§1-§4.4 RKV): cluster
//! membership, election, per-table commit/abort, and the replication and
//! recovery frames that keep a leader and its followers converged.
//!
//! [`zdb_store`] supplies the pluggable storage backend one [`table::Table`]
//! opens against; wire transport (length-delimited framing, reconnect,
//! heartbeat timers) lives in the sibling `zdb-transport` crate, which talks
//! to an [`engine::Engine`] purely through [`frame::Frame`] and the
//! [`engine::Replicator`] trait so this crate never depends on a socket
//! type.
#![deny(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod election;
pub mod engine;
pub mod frame;
pub mod host;
pub mod ids;
pub mod object;
pub mod table;
