//! A table's shard-partitioned in-memory state and commit/abort machinery
//! (§3.3 `Table`, §4.4.4 sharding, §4.4.5 object lifecycle).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use zdb_errors::{internal, internal_err, Error, Result};
use zdb_store::table::{Commit as StoreCommit, OpenedTable, StoreTable, WriteRecord};
use zdb_store::value::StoreValue;

use crate::config::TableCfg;
use crate::host::SnCounter;
use crate::object::{Object, ObjectState};

/// Sharded in-memory table state sitting on top of a [`StoreTable`]
/// (§3.3 Table, §4.4.4 sharding, §4.4.5 object lifecycle).
///
/// `next_un`/the shared `next_sn` are *mirrors* of what the store has
/// actually assigned, kept here purely so the heartbeat serialiser and
/// `buffered`/recovery callers can read them without a round trip to the
/// (possibly async, possibly remote) store (§4.4.4: "exported through a
/// lock-free atomic that the heartbeat serialiser reads").
pub struct Table {
    /// Static configuration this table was opened with.
    pub cfg: TableCfg,
    store: Arc<dyn StoreTable>,
    next_un: Vec<AtomicU64>,
    next_sn: Arc<SnCounter>,
    /// Per-key in-flight/most-recently-committed transaction state.
    objects: Mutex<HashMap<Vec<StoreValue>, Object>>,
    /// Outbound buffer cache: serialized wire payload by the UN it
    /// committed at, used to serve replication/recovery without going
    /// back to the store (§4.4.3).
    buffers: Mutex<HashMap<u64, Vec<u8>>>,
    /// A single gate serializing begin→commit/abort sequences against each
    /// other, standing in for "all mutations on shard s of table T execute
    /// on T.cfg.sids[s]" (§4.4.4) — see DESIGN.md for why one async mutex
    /// per table, rather than a dedicated OS thread per shard, is enough
    /// to satisfy the per-shard total-order invariant here.
    write_gate: tokio::sync::Mutex<()>,
    count: AtomicU64,
}

impl Table {
    /// Wrap an already-opened store table in RKV's bookkeeping.
    pub fn new(cfg: TableCfg, store: Arc<dyn StoreTable>, opened: OpenedTable, next_sn: Arc<SnCounter>) -> Table {
        next_sn.fetch_max(opened.next_sn);
        Table {
            cfg,
            store,
            next_un: opened.next_un.iter().map(|&un| AtomicU64::new(un)).collect(),
            next_sn,
            objects: Mutex::new(HashMap::new()),
            buffers: Mutex::new(HashMap::new()),
            write_gate: tokio::sync::Mutex::new(()),
            count: AtomicU64::new(opened.count),
        }
    }

    /// The UN this table's local mirror expects to assign next for
    /// `shard`, for heartbeat reporting.
    pub fn next_un_for_shard(&self, shard: u8) -> u64 {
        self.next_un[shard as usize].load(Ordering::Acquire)
    }

    /// Live row count, mirrored from the store.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Begin an insert on `shard` for `key` (§4.4.5 `insert_`).
    pub async fn begin_insert(&self, key: Vec<StoreValue>, shard: u8) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        let mut objects = self.objects.lock();
        if objects.contains_key(&key) {
            internal!("insert on a key that already has an in-flight or cached object");
        }
        objects.insert(key, Object::new_insert(shard));
        Ok(())
    }

    /// Begin an update on `shard` for `key`, given the row's currently
    /// live `(un, vn)` (§4.4.5 `update_`).
    pub async fn begin_update(&self, key: Vec<StoreValue>, shard: u8, current_un: u64, current_vn: i64) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        self.objects.lock().insert(key, Object::new_update(shard, current_un, current_vn));
        Ok(())
    }

    /// Begin a delete on `shard` for `key`, given the row's currently live
    /// `(un, vn)` (§4.4.5 `del_`).
    pub async fn begin_delete(&self, key: Vec<StoreValue>, shard: u8, current_un: u64, current_vn: i64) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        self.objects.lock().insert(key, Object::new_delete(shard, current_un, current_vn));
        Ok(())
    }

    /// Commit the in-flight object at `key` (§4.4.5 `commit_`): writes
    /// through to the store, which assigns the authoritative UN/SN;
    /// mirrors the assigned counters locally; evicts the previous
    /// buffer-cache entry and caches the new wire payload (the bincode
    /// encoding of `tuple`, which doubles as the `Record.data` a leader
    /// forwards to `next`, §4.4.3) by its freshly assigned UN; bumps the
    /// live row count.
    pub async fn commit(&self, key: &[StoreValue], tuple: Vec<StoreValue>) -> Result<(Object, StoreCommit)> {
        let _gate = self.write_gate.lock().await;

        let (shard, vn_to_write, orig_un, was_insert) = {
            let objects = self.objects.lock();
            let obj = objects.get(key).ok_or_else(|| internal_err!("commit on a key with no in-flight object"))?;
            if !obj.is_in_flight() {
                internal!("commit on an object that is not in flight: {:?}", obj.state);
            }
            // Only an update bumps `vn` at commit; a fresh insert keeps its
            // initial `vn == 0` (matching the original's `AnyObject::commit_`,
            // which leaves `m_vn` untouched on insert and relies elsewhere on
            // `vn == 0` to mean "never updated"). A delete encodes the next
            // deletion generation off whatever `vn` the row already carried.
            let vn_to_write = match obj.state {
                ObjectState::Delete => -(obj.vn.max(0)) - 1,
                ObjectState::Update => obj.vn + 1,
                _ => obj.vn,
            };
            (obj.shard, vn_to_write, obj.orig_un, obj.state == ObjectState::Insert)
        };

        let wire_payload = bincode::serialize(&tuple).map_err(|e| internal_err!("failed to encode row for replication: {e}"))?;
        let record = WriteRecord { shard, tuple, vn: vn_to_write };
        let store_commit = self
            .store
            .write(record)
            .await
            .map_err(|e| Error::CommitFailure(e.to_string()))?;

        self.next_un[shard as usize].fetch_max(store_commit.un + 1, Ordering::AcqRel);
        self.next_sn.fetch_max(store_commit.sn + 1);

        let committed = {
            let mut objects = self.objects.lock();
            let obj = objects.get_mut(key).ok_or_else(|| internal_err!("object vanished mid-commit"))?;
            obj.vn = vn_to_write;
            obj.un = store_commit.un;
            obj.sn = store_commit.sn;
            obj.state = if obj.state == ObjectState::Delete { ObjectState::Deleted } else { ObjectState::Committed };
            obj.clone()
        };

        {
            let mut buffers = self.buffers.lock();
            buffers.remove(&orig_un);
            buffers.insert(store_commit.un, wire_payload);
        }

        match committed.state {
            ObjectState::Committed if was_insert => {
                self.count.fetch_add(1, Ordering::Relaxed);
            }
            ObjectState::Deleted => {
                self.count.fetch_sub(1, Ordering::Relaxed);
            }
            _ => {}
        }

        Ok((committed, store_commit))
    }

    /// Abort the in-flight object at `key` (§4.4.5 `abort_`): restores its
    /// prior UN and drops it back to `Undefined` without ever reaching the
    /// store.
    pub async fn abort(&self, key: &[StoreValue]) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        let mut objects = self.objects.lock();
        let obj = objects.get_mut(key).ok_or_else(|| internal_err!("abort on a key with no in-flight object"))?;
        obj.abort();
        Ok(())
    }

    /// Outbound buffer-cache lookup for replication/recovery (§4.4.3): a
    /// recent write's wire payload, if still cached.
    pub fn buffered(&self, un: u64) -> Option<Vec<u8>> {
        self.buffers.lock().get(&un).cloned()
    }

    /// Fall back to the store for a UN no longer in the buffer cache
    /// (§4.4.3: "Recovery is emitted from the outbound buffer cache if
    /// present, else by `store.recover`").
    pub async fn recover(&self, shard: u8, un: u64) -> Result<Option<zdb_store::row::Row>> {
        self.store.recover(shard, un).await
    }

    /// Apply a record a leader replicated to this follower, preserving its
    /// exact `(un, sn)` rather than minting fresh ones (§4.4.3
    /// convergence invariant), and mirror the advanced counters locally.
    pub async fn apply_replicated(&self, shard: u8, un: u64, sn: u128, vn: i64, tuple: Vec<StoreValue>) -> Result<()> {
        self.store.apply_replicated(shard, un, sn, vn, tuple).await?;
        self.next_un[shard as usize].fetch_max(un + 1, Ordering::AcqRel);
        self.next_sn.fetch_max(sn + 1);
        Ok(())
    }

    /// Evict `(table, shard, un)`'s buffered payload on a `Commit` frame
    /// from the leader (§4.4.3: followers "wait for commits from the
    /// leader to evict their mirror cache").
    pub fn evict(&self, un: u64) {
        self.buffers.lock().remove(&un);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheMode;
    use zdb_store::memory::MemoryTable;
    use zdb_store::table::TableSchema;
    use zdb_store::value::Direction;

    fn cfg() -> TableCfg {
        TableCfg { id: "accounts".into(), n_shards: 2, cache_mode: CacheMode::Rows }
    }

    fn schema() -> TableSchema {
        TableSchema { table_id: "accounts".into(), n_shards: 2, n_fields: 2, key_fields: vec![(0, Direction::Asc)] }
    }

    fn table() -> Table {
        let store = Arc::new(MemoryTable::new(schema()));
        let opened = OpenedTable { count: 0, next_un: vec![0, 0], next_sn: 0 };
        Table::new(cfg(), store, opened, Arc::new(SnCounter::new(0)))
    }

    #[tokio::test]
    async fn insert_then_commit_assigns_un_sn_and_bumps_count() {
        let t = table();
        let key = vec![StoreValue::I64(1)];
        t.begin_insert(key.clone(), 0).await.unwrap();
        let tuple = vec![StoreValue::I64(1), StoreValue::I64(10)];
        let (obj, commit) = t.commit(&key, tuple.clone()).await.unwrap();

        assert_eq!(commit.un, 0);
        assert_eq!(commit.sn, 0);
        assert_eq!(obj.vn, 0);
        assert_eq!(obj.state, ObjectState::Committed);
        assert_eq!(t.count(), 1);
        assert_eq!(t.next_un_for_shard(0), 1);
        assert_eq!(t.buffered(0), Some(bincode::serialize(&tuple).unwrap()));
    }

    #[tokio::test]
    async fn delete_commit_decrements_count_and_encodes_vn_negative() {
        let t = table();
        let key = vec![StoreValue::I64(1)];
        t.begin_insert(key.clone(), 0).await.unwrap();
        t.commit(&key, vec![StoreValue::I64(1), StoreValue::I64(10)]).await.unwrap();

        t.begin_delete(key.clone(), 0, 0, 0).await.unwrap();
        let (obj, _) = t.commit(&key, vec![StoreValue::I64(1), StoreValue::I64(10)]).await.unwrap();

        assert_eq!(obj.state, ObjectState::Deleted);
        assert!(obj.vn < 0);
        assert_eq!(t.count(), 0);
        // The prior UN's buffer was evicted when the delete committed.
        assert_eq!(t.buffered(0), None);
    }

    #[tokio::test]
    async fn abort_never_reaches_the_store() {
        let t = table();
        let key = vec![StoreValue::I64(1)];
        t.begin_insert(key.clone(), 0).await.unwrap();
        t.abort(&key).await.unwrap();
        assert_eq!(t.count(), 0);
        assert_eq!(t.next_un_for_shard(0), 0);
    }

    #[tokio::test]
    async fn apply_replicated_preserves_the_leaders_un_and_advances_the_mirror() {
        let t = table();
        t.apply_replicated(1, 7, 42, 0, vec![StoreValue::I64(9), StoreValue::I64(90)]).await.unwrap();
        assert_eq!(t.next_un_for_shard(1), 8);

        let row = t.recover(1, 7).await.unwrap().expect("row was applied");
        assert_eq!(row.sn, 42);
    }
}
