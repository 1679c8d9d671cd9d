//! In-memory reference store (§4.3): "a complete in-memory reference
//! implementation is part of the core." Rows live in a `{UN-indexed tree,
//! K-ordered tree per key}`, exactly as specified; comparators honor each
//! key field's configured ascending/descending direction.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use async_trait::async_trait;

use crate::row::Row;
use crate::table::{Commit, OpenedTable, SelectParams, StoreEngine, StoreTable, TableSchema, WriteRecord};
use crate::value::{Direction, StoreValue};
use zdb_errors::{internal_err, Result};

/// A key tuple ordered per the owning table's `key_fields` directions,
/// usable as a `BTreeMap` key (the "K-ordered tree" of §4.3).
#[derive(Clone)]
struct OrderedKey {
    values: Vec<StoreValue>,
    key_fields: Arc<Vec<(usize, Direction)>>,
}

impl PartialEq for OrderedKey {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}
impl Eq for OrderedKey {}

impl PartialOrd for OrderedKey {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedKey {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        for (i, &(_, dir)) in self.key_fields.iter().enumerate() {
            let ord = self.values[i].cmp(&other.values[i]);
            let ord = if dir == Direction::Desc { ord.reverse() } else { ord };
            if ord != CmpOrdering::Equal {
                return ord;
            }
        }
        CmpOrdering::Equal
    }
}

struct Inner {
    schema: TableSchema,
    key_fields: Arc<Vec<(usize, Direction)>>,
    by_un: BTreeMap<(u8, u64), Row>,
    by_key: BTreeMap<OrderedKey, Row>,
    next_un: Vec<u64>,
    next_sn: u128,
    live_count: u64,
}

impl Inner {
    fn key(&self, tuple: &[StoreValue]) -> OrderedKey {
        OrderedKey { values: self.schema.key_of(tuple), key_fields: Arc::clone(&self.key_fields) }
    }
}

/// In-memory [`StoreTable`]: rows never survive the process; used for
/// tests and as the reference the on-disk engine's behavior is checked
/// against.
pub struct MemoryTable {
    inner: Mutex<Inner>,
}

impl MemoryTable {
    /// Construct an empty table for `schema`.
    pub fn new(schema: TableSchema) -> MemoryTable {
        let key_fields = Arc::new(schema.key_fields.clone());
        let n_shards = schema.n_shards as usize;
        MemoryTable {
            inner: Mutex::new(Inner {
                schema,
                key_fields,
                by_un: BTreeMap::new(),
                by_key: BTreeMap::new(),
                next_un: vec![0; n_shards],
                next_sn: 0,
                live_count: 0,
            }),
        }
    }
}

#[async_trait]
impl StoreTable for MemoryTable {
    async fn write(&self, record: WriteRecord) -> Result<Commit> {
        let mut inner = self.inner.lock();
        let shard = record.shard as usize;
        if shard >= inner.next_un.len() {
            return Err(internal_err!("write targets shard {shard} but table has {} shards", inner.next_un.len()));
        }

        let un = inner.next_un[shard];
        let sn = inner.next_sn;
        inner.next_un[shard] = un.checked_add(1).ok_or_else(|| internal_err!("UN overflow on shard {shard}"))?;
        inner.next_sn = sn.checked_add(1).ok_or_else(|| internal_err!("global SN overflow"))?;

        let key = inner.key(&record.tuple);
        let was_live = inner.by_key.get(&key).map(Row::is_live).unwrap_or(false);
        let row = Row { un, sn, vn: record.vn, tuple: record.tuple };

        inner.by_un.insert((record.shard, un), row.clone());
        let now_live = row.is_live();
        inner.by_key.insert(key, row);

        match (was_live, now_live) {
            (false, true) => inner.live_count += 1,
            (true, false) => inner.live_count = inner.live_count.saturating_sub(1),
            _ => {}
        }

        tracing::trace!(table = %inner.schema.table_id, shard = record.shard, un, sn = %sn, "store write committed");
        Ok(Commit { un, sn })
    }

    async fn recover(&self, shard: u8, un: u64) -> Result<Option<Row>> {
        let inner = self.inner.lock();
        Ok(inner.by_un.get(&(shard, un)).cloned())
    }

    async fn apply_replicated(&self, shard: u8, un: u64, sn: u128, vn: i64, tuple: Vec<StoreValue>) -> Result<()> {
        let mut inner = self.inner.lock();
        let shard_idx = shard as usize;
        if shard_idx >= inner.next_un.len() {
            return Err(internal_err!("replicated write targets shard {shard} but table has {} shards", inner.next_un.len()));
        }

        let key = inner.key(&tuple);
        let was_live = inner.by_key.get(&key).map(Row::is_live).unwrap_or(false);
        let row = Row { un, sn, vn, tuple };

        inner.by_un.insert((shard, un), row.clone());
        let now_live = row.is_live();
        inner.by_key.insert(key, row);

        match (was_live, now_live) {
            (false, true) => inner.live_count += 1,
            (true, false) => inner.live_count = inner.live_count.saturating_sub(1),
            _ => {}
        }

        // A replicated write's un/sn may arrive out of the order this
        // table's own counters would have assigned (catch-up recovery can
        // backfill older UNs after newer ones); only ever advance, never
        // rewind, the next-to-assign counters.
        inner.next_un[shard_idx] = inner.next_un[shard_idx].max(un + 1);
        inner.next_sn = inner.next_sn.max(sn + 1);
        Ok(())
    }

    async fn count(&self, key: &[StoreValue]) -> Result<usize> {
        let inner = self.inner.lock();
        let prefix_len = key.len();
        Ok(inner
            .by_key
            .iter()
            .filter(|(k, row)| row.is_live() && k.values[..prefix_len.min(k.values.len())] == *key)
            .count())
    }

    async fn find(&self, key: &[StoreValue]) -> Result<Option<Row>> {
        let inner = self.inner.lock();
        let lookup = OrderedKey { values: key.to_vec(), key_fields: Arc::clone(&inner.key_fields) };
        Ok(inner.by_key.get(&lookup).filter(|row| row.is_live()).cloned())
    }

    async fn select(&self, params: SelectParams) -> Result<Vec<Row>> {
        let inner = self.inner.lock();
        let seek = params.key.as_ref().map(|k| OrderedKey { values: k.clone(), key_fields: Arc::clone(&inner.key_fields) });

        let mut rows: Vec<Row> = match (&seek, params.forward) {
            (None, true) => inner.by_key.values().cloned().collect(),
            (None, false) => inner.by_key.values().rev().cloned().collect(),
            (Some(seek), true) => inner
                .by_key
                .range(seek.clone()..)
                .filter(|(k, _)| params.inclusive || *k != seek)
                .map(|(_, row)| row.clone())
                .collect(),
            (Some(seek), false) => inner
                .by_key
                .range(..=seek.clone())
                .rev()
                .filter(|(k, _)| params.inclusive || *k != seek)
                .map(|(_, row)| row.clone())
                .collect(),
        };

        rows.retain(Row::is_live);
        rows.truncate(params.limit);
        Ok(rows)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A [`StoreEngine`] that opens [`MemoryTable`]s; every call is a fresh,
/// empty table (there is no on-disk state to recover), matching §4.3's
/// description of the in-memory engine's role as a test/reference backend.
#[derive(Default)]
pub struct MemoryEngine;

#[async_trait]
impl StoreEngine for MemoryEngine {
    async fn open(&self, schema: TableSchema) -> Result<(Arc<dyn StoreTable>, OpenedTable)> {
        let n_shards = schema.n_shards as usize;
        let table = Arc::new(MemoryTable::new(schema));
        Ok((table, OpenedTable { count: 0, next_un: vec![0; n_shards], next_sn: 0 }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> TableSchema {
        TableSchema { table_id: "t".into(), n_shards: 2, n_fields: 2, key_fields: vec![(0, Direction::Asc)] }
    }

    #[tokio::test]
    async fn write_assigns_monotonic_un_per_shard_and_global_sn() {
        let table = MemoryTable::new(schema());
        let c0 = table.write(WriteRecord { shard: 0, tuple: vec![StoreValue::I64(1), StoreValue::I64(10)], vn: 0 }).await.unwrap();
        let c1 = table.write(WriteRecord { shard: 1, tuple: vec![StoreValue::I64(2), StoreValue::I64(20)], vn: 0 }).await.unwrap();
        let c2 = table.write(WriteRecord { shard: 0, tuple: vec![StoreValue::I64(3), StoreValue::I64(30)], vn: 0 }).await.unwrap();

        assert_eq!((c0.un, c1.un, c2.un), (0, 0, 1));
        assert_eq!((c0.sn, c1.sn, c2.sn), (0, 1, 2));
    }

    #[tokio::test]
    async fn find_returns_none_after_delete() {
        let table = MemoryTable::new(schema());
        table.write(WriteRecord { shard: 0, tuple: vec![StoreValue::I64(1), StoreValue::I64(10)], vn: 0 }).await.unwrap();
        assert!(table.find(&[StoreValue::I64(1)]).await.unwrap().is_some());

        table.write(WriteRecord { shard: 0, tuple: vec![StoreValue::I64(1), StoreValue::I64(10)], vn: -1 }).await.unwrap();
        assert!(table.find(&[StoreValue::I64(1)]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recover_reads_a_specific_un() {
        let table = MemoryTable::new(schema());
        let commit = table.write(WriteRecord { shard: 0, tuple: vec![StoreValue::I64(1), StoreValue::I64(10)], vn: 0 }).await.unwrap();
        let row = table.recover(0, commit.un).await.unwrap().expect("row was written");
        assert_eq!(row.tuple[1], StoreValue::I64(10));
    }

    #[tokio::test]
    async fn select_respects_forward_and_limit() {
        let table = MemoryTable::new(schema());
        for k in [3, 1, 2] {
            table.write(WriteRecord { shard: 0, tuple: vec![StoreValue::I64(k), StoreValue::I64(k * 10)], vn: 0 }).await.unwrap();
        }
        let rows = table
            .select(SelectParams { key: None, forward: true, inclusive: true, limit: 2 })
            .await
            .unwrap();
        let keys: Vec<_> = rows.iter().map(|r| r.tuple[0].clone()).collect();
        assert_eq!(keys, vec![StoreValue::I64(1), StoreValue::I64(2)]);
    }

    #[tokio::test]
    async fn apply_replicated_preserves_the_leaders_un_and_sn() {
        let table = MemoryTable::new(schema());
        table
            .apply_replicated(0, 7, 42, 0, vec![StoreValue::I64(1), StoreValue::I64(10)])
            .await
            .unwrap();

        let row = table.recover(0, 7).await.unwrap().expect("row was applied");
        assert_eq!(row.sn, 42);
        assert_eq!(table.find(&[StoreValue::I64(1)]).await.unwrap().unwrap().un, 7);

        // The table's own counters must advance past a replicated write so
        // a later local write (e.g. after a promotion to leader) does not
        // collide with it.
        let next = table.write(WriteRecord { shard: 0, tuple: vec![StoreValue::I64(2), StoreValue::I64(20)], vn: 0 }).await.unwrap();
        assert_eq!(next.un, 8);
        assert_eq!(next.sn, 43);
    }

    #[tokio::test]
    async fn select_honors_descending_key_direction() {
        let schema = TableSchema { table_id: "t".into(), n_shards: 1, n_fields: 2, key_fields: vec![(0, Direction::Desc)] };
        let table = MemoryTable::new(schema);
        for k in [1, 2, 3] {
            table.write(WriteRecord { shard: 0, tuple: vec![StoreValue::I64(k), StoreValue::I64(0)], vn: 0 }).await.unwrap();
        }
        let rows = table
            .select(SelectParams { key: None, forward: true, inclusive: true, limit: 10 })
            .await
            .unwrap();
        let keys: Vec<_> = rows.iter().map(|r| r.tuple[0].clone()).collect();
        assert_eq!(keys, vec![StoreValue::I64(3), StoreValue::I64(2), StoreValue::I64(1)]);
    }
}
