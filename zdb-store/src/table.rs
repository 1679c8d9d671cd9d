//! The storage backend contract (§4.3 STORE interface).
//!
//! `StoreEngine::open` stands in for the source's `open(id, nShards,
//! objFields, keyFields, schema, bufAlloc, fn)`: the callback-style `fn`
//! completion is replaced with a plain `async fn` return per §9's
//! "exceptions for configuration → result type" redesign direction,
//! generalized here to every fallible store operation, not just
//! configuration.

use async_trait::async_trait;

use crate::row::Row;
use crate::value::{Direction, StoreValue};
use zdb_errors::Result;

/// Static shape of one table: which fields exist, and which (sub)set of
/// them forms the primary key the in-memory store orders rows by.
#[derive(Debug, Clone)]
pub struct TableSchema {
    /// Table identifier, as it appears in wire frames (§6.1 `Hdr.shard`'s
    /// sibling `tableId`).
    pub table_id: String,
    /// Number of shards this table is partitioned into.
    pub n_shards: u8,
    /// Number of fields in a row's tuple.
    pub n_fields: usize,
    /// Field index + direction pairs making up the primary key, in
    /// comparison priority order.
    pub key_fields: Vec<(usize, Direction)>,
}

impl TableSchema {
    fn key_spec(&self) -> crate::value::KeySpec<'_> {
        crate::value::KeySpec { fields: &self.key_fields }
    }

    /// Project a row's key out of its full tuple.
    pub fn key_of(&self, tuple: &[StoreValue]) -> Vec<StoreValue> {
        self.key_spec().project(tuple)
    }
}

/// A single write: `shard` selects which per-shard UN counter is
/// incremented; `vn` is the new object version (negative for a delete).
#[derive(Debug, Clone)]
pub struct WriteRecord {
    /// Shard this write belongs to.
    pub shard: u8,
    /// Full row tuple being written (already containing the key fields).
    pub tuple: Vec<StoreValue>,
    /// New version number (`< 0` for delete).
    pub vn: i64,
}

/// What a successful [`StoreTable::write`] assigns, per §4.3/§4.4.3: a
/// strictly increasing per-shard UN and a strictly increasing, globally
/// unique SN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Commit {
    /// Per-shard update number assigned to this write.
    pub un: u64,
    /// Global sequence number assigned to this write.
    pub sn: u128,
}

/// Parameters for an ordered range scan (§4.3 `select`).
#[derive(Debug, Clone)]
pub struct SelectParams {
    /// Seek position; `None` scans from the very first/last key depending
    /// on `forward`.
    pub key: Option<Vec<StoreValue>>,
    /// Scan toward increasing keys if true, decreasing if false.
    pub forward: bool,
    /// Whether a row exactly matching `key` is included in the results.
    pub inclusive: bool,
    /// Maximum number of rows to return.
    pub limit: usize,
}

/// Per-table counters and identity returned by [`StoreEngine::open`].
#[derive(Debug, Clone)]
pub struct OpenedTable {
    /// Row count at open time.
    pub count: u64,
    /// Next UN to assign, per shard (index = shard id).
    pub next_un: Vec<u64>,
    /// Next global SN to assign.
    pub next_sn: u128,
}

/// A backend-agnostic handle to one open table.
///
/// Two implementations are in scope for this workspace: the in-memory
/// reference engine ([`crate::memory::MemoryTable`], part of the core) and
/// an on-disk engine (external collaborator, out of scope — §1).
#[async_trait]
pub trait StoreTable: Send + Sync {
    /// Append `record`, assigning it the next UN for its shard and the next
    /// global SN. On success the caller (RKV) evicts its cached buffer for
    /// the row's previous version and sends a `Commit` frame.
    async fn write(&self, record: WriteRecord) -> Result<Commit>;

    /// Read a single versioned row back by its per-shard UN, for follower
    /// tail-catch-up recovery (§4.4.3).
    async fn recover(&self, shard: u8, un: u64) -> Result<Option<Row>>;

    /// Apply a row at the exact `(un, sn)` a leader already assigned it,
    /// rather than minting fresh ones. A follower's store replicates this
    /// way so its UN/SN sequencing matches the leader's bit for bit (§4.4.3
    /// convergence invariant); `write` is only ever called by the table
    /// that owns assignment (the leader, or a standalone host).
    async fn apply_replicated(&self, shard: u8, un: u64, sn: u128, vn: i64, tuple: Vec<StoreValue>) -> Result<()>;

    /// Count live rows matching `key` (an exact-match key, possibly a
    /// prefix of the full key).
    async fn count(&self, key: &[StoreValue]) -> Result<usize>;

    /// Find the live row exactly matching `key`, if any.
    async fn find(&self, key: &[StoreValue]) -> Result<Option<Row>>;

    /// Ordered range scan per [`SelectParams`].
    async fn select(&self, params: SelectParams) -> Result<Vec<Row>>;

    /// Release any resources held by this table handle. Idempotent.
    async fn close(&self) -> Result<()>;
}

/// A storage backend capable of opening tables. `open` is the async
/// stand-in for the source's `fn`-completion `open(...)` call.
#[async_trait]
pub trait StoreEngine: Send + Sync {
    /// Open (creating if necessary) the table described by `schema`,
    /// returning a handle plus its recovered counters.
    async fn open(&self, schema: TableSchema) -> Result<(std::sync::Arc<dyn StoreTable>, OpenedTable)>;
}
