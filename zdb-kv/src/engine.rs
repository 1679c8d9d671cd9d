//! The top-level per-host coordinator (§4.4): owns membership state,
//! drives election, and decides what to replicate to `next`.
//!
//! Per §5's dispatch model, membership and election bookkeeping is
//! single-writer: every mutation against `Inner` runs under one
//! `parking_lot::Mutex`, which gives the same total order §4.4.4's "owning
//! thread" dispatch model asks for without standing up a dedicated OS
//! thread that would otherwise sit idle between heartbeats and election
//! ticks. This is the same call `Table::write_gate` makes (see its doc
//! comment): a lock held only across short, synchronous sections is
//! observably identical to a single-owner thread, so `Engine`'s membership
//! API (`on_heartbeat`, `on_disconnect`, `tick_election_timeout`, ...)
//! stays ordinary synchronous methods a caller on the tokio runtime can
//! call directly. Timers (election timeout, heartbeat broadcast) are
//! driven by `tokio::time::interval` tasks in `zdb-server`, not a
//! dedicated timer wheel.
//!
//! Table writes are different: [`crate::table::Table`] is already async
//! because [`zdb_store::table::StoreTable`] is, so `commit`/`begin_*` here
//! just forward to the table directly.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use parking_lot::Mutex;

use zdb_errors::{internal_err, Result};
use zdb_store::table::Commit as StoreCommit;
use zdb_store::value::StoreValue;

use crate::config::{EngineConfig, HostCfg};
use crate::election::{self, Ranking};
use crate::frame::{Commit as CommitFrame, DbStateEntry, Frame, Heartbeat, Record, RecordKind};
use crate::host::{DbState, GlobalSn, Host, HostState, SnCounter};
use crate::ids::{HostId, TableId};
use crate::object::Object;
use crate::table::Table;

/// Where replicated/commit frames for one peer connection get pushed
/// (§4.4.3). Implemented by `zdb_transport::Cxn` in the running binary; an
/// in-memory channel stands in for it in tests.
pub trait Replicator: Send + Sync {
    /// Enqueue `frame` for delivery to this peer. Returns `false` on
    /// backpressure (§4.4.3: the connection layer propagates a full send
    /// queue back to the caller rather than blocking it).
    fn replicate(&self, frame: Frame) -> bool;
}

struct Inner {
    state: HostState,
    peers: HashMap<HostId, Host>,
    tables: HashMap<TableId, Arc<Table>>,
    leader: Option<HostId>,
    next: Option<HostId>,
    connections: HashMap<HostId, Arc<dyn Replicator>>,
}

/// A running cluster node: membership, election, and the replication
/// decisions layered on top of one or more [`Table`]s (§4.4).
pub struct Engine {
    local: HostCfg,
    cfg: EngineConfig,
    inner: Arc<Mutex<Inner>>,
    next_sn: Arc<SnCounter>,
}

impl Engine {
    /// Construct an engine for `local`, with the rest of the configured
    /// cluster in `peers` (§3.3 `HostCfg`). A standalone host (per its
    /// `HostCfg`) still runs through the same election machinery; with no
    /// other voted peer it simply always wins it.
    pub fn new(local: HostCfg, peers: Vec<HostCfg>, cfg: EngineConfig) -> Engine {
        let mut peer_hosts: HashMap<HostId, Host> = peers.into_iter().map(|p| (p.id, Host::new(p))).collect();
        peer_hosts.insert(local.id, Host::new(local.clone()));

        Engine {
            inner: Arc::new(Mutex::new(Inner {
                state: HostState::Instantiated,
                peers: peer_hosts,
                tables: HashMap::new(),
                leader: None,
                next: None,
                connections: HashMap::new(),
            })),
            next_sn: Arc::new(SnCounter::new(0)),
            local,
            cfg,
        }
    }

    /// This host's identity.
    pub fn local_id(&self) -> HostId {
        self.local.id
    }

    /// Engine-wide timing knobs this host was configured with.
    pub fn cfg(&self) -> EngineConfig {
        self.cfg
    }

    /// The shared global-SN counter, handed to [`Table::new`] when a
    /// caller opens a table against this engine, so every table mirrors
    /// the same cluster-wide sequence (§4.4.4).
    pub fn next_sn(&self) -> Arc<SnCounter> {
        Arc::clone(&self.next_sn)
    }

    /// Current lifecycle state of the local host.
    pub fn state(&self) -> HostState {
        self.inner.lock().state
    }

    /// The currently elected leader, if any.
    pub fn leader(&self) -> Option<HostId> {
        self.inner.lock().leader
    }

    /// This host's replication successor, if any.
    pub fn next(&self) -> Option<HostId> {
        self.inner.lock().next
    }

    /// True if the local host is the currently elected leader.
    pub fn is_leader(&self) -> bool {
        self.leader() == Some(self.local.id)
    }

    /// Register an already-opened table (§4.4.1: every table finishes
    /// opening before the host leaves `Initialized`).
    pub fn register_table(&self, table: Arc<Table>) {
        let id = table.cfg.id.clone();
        self.inner.lock().tables.insert(id, table);
    }

    /// Look up a registered table by id.
    pub fn table(&self, id: &TableId) -> Option<Arc<Table>> {
        self.inner.lock().tables.get(id).cloned()
    }

    fn table_or_err(&self, id: &TableId) -> Result<Arc<Table>> {
        self.table(id).ok_or_else(|| internal_err!("unknown table {id}"))
    }

    /// Register (or replace) the outbound connection to `peer` (§4.4.3).
    pub fn register_connection(&self, peer: HostId, conn: Arc<dyn Replicator>) {
        self.inner.lock().connections.insert(peer, conn);
    }

    /// Drop the outbound connection to `peer`: it stops receiving
    /// replicated frames until reconnected.
    pub fn remove_connection(&self, peer: HostId) {
        self.inner.lock().connections.remove(&peer);
    }

    /// Broadcast this host's current heartbeat to every open connection
    /// (§4.4.2: "each peer transmits its full dbState in every
    /// heartbeat"). Meant to be called on a `heartbeat_freq` tick by
    /// whatever owns the connections (`zdb-server`'s timer task).
    pub fn broadcast_heartbeat(&self) {
        let hb = self.heartbeat_frame();
        let conns: Vec<Arc<dyn Replicator>> = self.inner.lock().connections.values().cloned().collect();
        for conn in conns {
            if !conn.replicate(Frame::Heartbeat(hb.clone())) {
                tracing::warn!("heartbeat dropped from a full send queue");
            }
        }
    }

    /// Mark every voted peer that hasn't heartbeated within `timeout` as
    /// disconnected (§4.4.2: "disconnects expire on heartbeatTimeout").
    /// Meant to be called periodically by the same timer driving
    /// [`Engine::broadcast_heartbeat`].
    pub fn sweep_stale_peers(&self, timeout: std::time::Duration) {
        let stale: Vec<HostId> = {
            let inner = self.inner.lock();
            inner
                .peers
                .iter()
                .filter(|(&id, host)| id != self.local.id && host.voted && host.is_stale(timeout))
                .map(|(&id, _)| id)
                .collect()
        };
        for id in stale {
            self.on_disconnect(id);
        }
    }

    /// Start the local host (§4.4.1): `Initialized`, then immediately
    /// `Electing`. Callers are expected to have finished `register_table`
    /// for every configured table first — this crate has no way to know
    /// when that is true on its own.
    pub fn start(&self) {
        let mut inner = self.inner.lock();
        inner.state = HostState::Electing;
        if let Some(host) = inner.peers.get_mut(&self.local.id) {
            host.state = HostState::Electing;
            host.voted = true;
        }
        self.rerank(&mut inner);
    }

    /// Begin stopping: §4.4.1's `Stopping` state, en route back to
    /// `Initialized` on restart. Drops this host out of the voted set so
    /// peers re-elect around it immediately rather than waiting out
    /// `heartbeat_timeout`.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.state = HostState::Stopping;
        inner.leader = None;
        inner.next = None;
        if let Some(host) = inner.peers.get_mut(&self.local.id) {
            host.state = HostState::Stopping;
            host.voted = false;
        }
    }

    /// Build this host's outgoing heartbeat frame (§4.4.2).
    pub fn heartbeat_frame(&self) -> Heartbeat {
        let mut inner = self.inner.lock();
        self.reflect_local_progress(&mut inner);
        let db_state: Vec<DbStateEntry> = inner
            .tables
            .values()
            .flat_map(|t| (0..t.cfg.n_shards).map(move |s| DbStateEntry { table_id: t.cfg.id.clone(), shard: s, un: t.next_un_for_shard(s) }))
            .collect();
        Heartbeat { host_id: self.local.id, state: inner.state, db_state, next_sn: GlobalSn::Sn(self.next_sn.load()) }
    }

    /// Apply an incoming heartbeat from `from` (§4.4.2): record its
    /// progress, mark it voted, and re-run the ranking. A heartbeat
    /// carrying our own id (a stale echo, or a misconfigured peer sharing
    /// our id) is ignored.
    pub fn on_heartbeat(&self, hb: Heartbeat) {
        if hb.host_id == self.local.id {
            return;
        }
        let db_state = hb.to_db_state();
        let mut inner = self.inner.lock();

        inner
            .peers
            .entry(hb.host_id)
            .and_modify(|h| h.apply_heartbeat(hb.state, db_state.clone()))
            .or_insert_with(|| {
                // A peer we have no static `HostCfg` for (late-joining, or
                // configured only on its own side so far). Synthesize a
                // minimal record with the lowest possible priority so a
                // configured peer never loses a tie to a stranger; its
                // real address/priority arrive once it is added to our
                // configuration.
                let mut host = Host::new(HostCfg {
                    id: hb.host_id,
                    ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    port: 0,
                    priority: u32::MAX,
                    standalone: false,
                });
                host.apply_heartbeat(hb.state, db_state);
                host
            });

        self.rerank(&mut inner);
    }

    /// Mark `peer` disconnected and recompute leader/next (§4.4.6:
    /// connection loss to the leader triggers re-election; loss to `next`
    /// forces a new `next` to be picked and replication to restart
    /// against it).
    pub fn on_disconnect(&self, peer: HostId) {
        let mut inner = self.inner.lock();
        if let Some(host) = inner.peers.get_mut(&peer) {
            host.mark_disconnected();
        }
        inner.connections.remove(&peer);
        self.rerank(&mut inner);
    }

    /// Re-run election on an election-timeout tick (§4.4.2). Only has an
    /// effect while still `Electing`; once a leader is settled, ranking
    /// only re-runs in response to a heartbeat or disconnect.
    pub fn tick_election_timeout(&self) {
        let mut inner = self.inner.lock();
        if inner.state == HostState::Electing {
            self.rerank(&mut inner);
        }
    }

    /// §4.4.6: a fatal store-write failure deactivates a leader so the
    /// rest of the cluster re-elects around it.
    pub fn fail(&self) {
        let mut inner = self.inner.lock();
        inner.state = HostState::Inactive;
        inner.leader = None;
        inner.next = None;
        if let Some(host) = inner.peers.get_mut(&self.local.id) {
            host.state = HostState::Inactive;
            host.voted = false;
        }
        tracing::error!(host = %self.local.id, "store write failed; deactivating and ceding leadership");
    }

    fn reflect_local_progress(&self, inner: &mut Inner) {
        let next_un = inner
            .tables
            .values()
            .flat_map(|t| (0..t.cfg.n_shards).map(move |s| ((t.cfg.id.clone(), s), t.next_un_for_shard(s))))
            .collect();
        let db_state = DbState { next_un, next_sn: GlobalSn::Sn(self.next_sn.load()) };
        let state = inner.state;
        if let Some(host) = inner.peers.get_mut(&self.local.id) {
            host.apply_heartbeat(state, db_state);
        }
    }

    fn rerank(&self, inner: &mut Inner) {
        self.reflect_local_progress(inner);
        let hosts: Vec<Host> = inner.peers.values().cloned().collect();
        match election::rank(&hosts) {
            Ok(Ranking { leader, next }) => {
                let was_leader = inner.leader == Some(self.local.id);
                inner.leader = Some(leader);
                inner.next = next;
                if inner.state == HostState::Electing {
                    inner.state = HostState::Active;
                    if let Some(host) = inner.peers.get_mut(&self.local.id) {
                        host.state = HostState::Active;
                    }
                }
                if leader == self.local.id && !was_leader {
                    tracing::info!(host = %self.local.id, next = ?next, "elected leader");
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "election deadlock: leader left undefined until a heartbeat breaks the tie");
                inner.leader = None;
                inner.next = None;
            }
        }
    }

    /// Begin an insert (§4.4.5 `insert_`) against a registered table.
    pub async fn begin_insert(&self, table_id: &TableId, key: Vec<StoreValue>, shard: u8) -> Result<()> {
        self.table_or_err(table_id)?.begin_insert(key, shard).await
    }

    /// Begin an update (§4.4.5 `update_`) against a registered table.
    pub async fn begin_update(&self, table_id: &TableId, key: Vec<StoreValue>, shard: u8, current_un: u64, current_vn: i64) -> Result<()> {
        self.table_or_err(table_id)?.begin_update(key, shard, current_un, current_vn).await
    }

    /// Begin a delete (§4.4.5 `del_`) against a registered table.
    pub async fn begin_delete(&self, table_id: &TableId, key: Vec<StoreValue>, shard: u8, current_un: u64, current_vn: i64) -> Result<()> {
        self.table_or_err(table_id)?.begin_delete(key, shard, current_un, current_vn).await
    }

    /// Abort the in-flight object at `key` without ever reaching the
    /// store (§4.4.5 `abort_`).
    pub async fn abort(&self, table_id: &TableId, key: &[StoreValue]) -> Result<()> {
        self.table_or_err(table_id)?.abort(key).await
    }

    /// Commit the in-flight object at `key` on `shard` of `table_id`
    /// (§4.4.5 `commit_`), then — only if this host is the current
    /// leader and has an open connection to `next` — forward the freshly
    /// committed row as a `Record` followed by a `Commit` frame (§4.4.3).
    ///
    /// On a store-level failure the in-flight object is aborted and, if
    /// the error is one of §7's failover triggers, this host deactivates
    /// via [`Engine::fail`] so the cluster re-elects.
    pub async fn commit(&self, table_id: &TableId, shard: u8, key: &[StoreValue], tuple: Vec<StoreValue>) -> Result<(Object, StoreCommit)> {
        let table = self.table_or_err(table_id)?;
        match table.commit(key, tuple).await {
            Ok((object, store_commit)) => {
                self.replicate_commit(table_id, shard, &object, &store_commit, &table);
                Ok((object, store_commit))
            }
            Err(err) => {
                let _ = table.abort(key).await;
                if err.is_failover_trigger() {
                    self.fail();
                }
                Err(err)
            }
        }
    }

    fn replicate_commit(&self, table_id: &TableId, shard: u8, object: &Object, store_commit: &StoreCommit, table: &Table) {
        let (is_leader, next, conn) = {
            let inner = self.inner.lock();
            let next = inner.next;
            (inner.leader == Some(self.local.id), next, next.and_then(|id| inner.connections.get(&id).cloned()))
        };
        if !is_leader {
            return;
        }
        let Some(conn) = conn else {
            if next.is_some() {
                tracing::warn!(table = %table_id, "no open connection to replication successor; commit not forwarded");
            }
            return;
        };

        let data = table.buffered(store_commit.un).unwrap_or_default();
        let record = Record { table_id: table_id.clone(), un: store_commit.un, sn: store_commit.sn, vn: object.vn, shard, data, kind: RecordKind::Replication };
        if !conn.replicate(Frame::Record(record)) {
            tracing::warn!(table = %table_id, un = store_commit.un, "replication backpressure: record dropped from send queue");
        }
        let commit_frame = CommitFrame { table_id: table_id.clone(), un: store_commit.un, shard };
        if !conn.replicate(Frame::Commit(commit_frame)) {
            tracing::warn!(table = %table_id, un = store_commit.un, "replication backpressure: commit frame dropped from send queue");
        }
    }

    /// Apply a `Record` a leader sent us, whether live replication or tail
    /// recovery (§4.4.3): both decode the same way and replay at the
    /// sender's exact `(un, sn)`.
    pub async fn apply_record(&self, record: Record) -> Result<()> {
        let table = self.table_or_err(&record.table_id)?;
        let tuple: Vec<StoreValue> = bincode::deserialize(&record.data).map_err(|e| internal_err!("failed to decode replicated row: {e}"))?;
        table.apply_replicated(record.shard, record.un, record.sn, record.vn, tuple).await
    }

    /// Apply an incoming `Commit` frame: evict the follower's mirror cache
    /// entry for the UN that just committed (§4.4.3).
    pub fn apply_commit_frame(&self, commit: CommitFrame) -> Result<()> {
        self.table_or_err(&commit.table_id)?.evict(commit.un);
        Ok(())
    }

    /// Catch `peer` up on `table_id`/`shard` from `from_un` (its reported
    /// next UN) to our current tail, preferring the buffer cache for the
    /// wire bytes but always reading the authoritative `(sn, vn)` back
    /// from the store (§4.4.3: "Recovery is emitted from the outbound
    /// buffer cache if present, else by `store.recover`").
    pub async fn recover_to(&self, peer: HostId, table_id: &TableId, shard: u8, from_un: u64) -> Result<()> {
        let table = self.table_or_err(table_id)?;
        let conn = self.inner.lock().connections.get(&peer).cloned();
        let Some(conn) = conn else {
            return Err(internal_err!("no connection open to {peer}"));
        };

        let tail_un = table.next_un_for_shard(shard);
        for un in from_un..tail_un {
            let Some(row) = table.recover(shard, un).await? else {
                continue;
            };
            let data = match table.buffered(un) {
                Some(buffered) => buffered,
                None => bincode::serialize(&row.tuple).map_err(|e| internal_err!("failed to encode recovery row: {e}"))?,
            };
            let record = Record { table_id: table_id.clone(), un, sn: row.sn, vn: row.vn, shard, data, kind: RecordKind::Recovery };
            if !conn.replicate(Frame::Record(record)) {
                tracing::warn!(%table_id, un, "recovery backpressure: record dropped from send queue");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheMode, TableCfg};
    use crate::host::SnCounter as SnCtr;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Mutex as StdMutex;
    use zdb_store::memory::MemoryTable;
    use zdb_store::table::{OpenedTable, TableSchema};
    use zdb_store::value::Direction;

    struct RecordingReplicator(StdMutex<Vec<Frame>>);

    impl RecordingReplicator {
        fn new() -> Arc<RecordingReplicator> {
            Arc::new(RecordingReplicator(StdMutex::new(Vec::new())))
        }

        fn frames(&self) -> Vec<Frame> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Replicator for RecordingReplicator {
        fn replicate(&self, frame: Frame) -> bool {
            self.0.lock().unwrap().push(frame);
            true
        }
    }

    fn host_cfg(tag: &str, priority: u32) -> HostCfg {
        HostCfg { id: HostId::from_tag(tag), ip: IpAddr::V4(Ipv4Addr::LOCALHOST), port: 0, priority, standalone: false }
    }

    fn heartbeat_of(id: HostId, sn: u128) -> Heartbeat {
        Heartbeat { host_id: id, state: HostState::Electing, db_state: Vec::new(), next_sn: GlobalSn::Sn(sn) }
    }

    fn table_cfg() -> TableCfg {
        TableCfg { id: "accounts".into(), n_shards: 1, cache_mode: CacheMode::Rows }
    }

    fn open_table(next_sn: Arc<SnCtr>) -> Arc<Table> {
        let schema = TableSchema { table_id: "accounts".into(), n_shards: 1, n_fields: 2, key_fields: vec![(0, Direction::Asc)] };
        let store = Arc::new(MemoryTable::new(schema));
        let opened = OpenedTable { count: 0, next_un: vec![0], next_sn: 0 };
        Arc::new(Table::new(table_cfg(), store, opened, next_sn))
    }

    #[test]
    fn two_host_cluster_elects_lower_priority_as_leader() {
        let a = host_cfg("a", 1);
        let b = host_cfg("b", 2);
        let engine = Engine::new(a.clone(), vec![b.clone()], EngineConfig::default());
        engine.start();
        engine.on_heartbeat(heartbeat_of(b.id, 0));

        assert_eq!(engine.leader(), Some(a.id));
        assert_eq!(engine.next(), Some(b.id));
        assert!(engine.is_leader());
    }

    #[test]
    fn disconnecting_the_leader_forces_a_re_election() {
        let a = host_cfg("a", 2);
        let b = host_cfg("b", 1);
        let engine = Engine::new(a.clone(), vec![b.clone()], EngineConfig::default());
        engine.start();
        engine.on_heartbeat(heartbeat_of(b.id, 0));
        assert_eq!(engine.leader(), Some(b.id));

        engine.on_disconnect(b.id);
        assert_eq!(engine.leader(), Some(a.id));
        assert_eq!(engine.next(), None);
    }

    #[tokio::test]
    async fn leader_forwards_committed_rows_to_next() {
        let a = host_cfg("a", 1);
        let b = host_cfg("b", 2);
        let engine = Engine::new(a.clone(), vec![b.clone()], EngineConfig::default());
        let table = open_table(engine.next_sn());
        engine.register_table(Arc::clone(&table));

        let conn = RecordingReplicator::new();
        engine.register_connection(b.id, Arc::clone(&conn) as Arc<dyn Replicator>);

        engine.start();
        engine.on_heartbeat(heartbeat_of(b.id, 0));
        assert!(engine.is_leader());

        let table_id: TableId = "accounts".into();
        let key = vec![StoreValue::I64(1)];
        engine.begin_insert(&table_id, key.clone(), 0).await.unwrap();
        let (object, commit) = engine.commit(&table_id, 0, &key, vec![StoreValue::I64(1), StoreValue::I64(10)]).await.unwrap();

        assert_eq!(commit.un, 0);
        let frames = conn.frames();
        assert_eq!(frames.len(), 2);
        assert!(matches!(&frames[0], Frame::Record(r) if r.un == 0 && r.kind == RecordKind::Replication));
        assert!(matches!(&frames[1], Frame::Commit(c) if c.un == 0));
        assert_eq!(object.state, crate::object::ObjectState::Committed);
    }

    #[tokio::test]
    async fn follower_does_not_forward_its_own_commits() {
        let a = host_cfg("a", 2);
        let b = host_cfg("b", 1);
        let engine = Engine::new(a.clone(), vec![b.clone()], EngineConfig::default());
        let table = open_table(engine.next_sn());
        engine.register_table(Arc::clone(&table));
        let conn = RecordingReplicator::new();
        engine.register_connection(b.id, Arc::clone(&conn) as Arc<dyn Replicator>);

        engine.start();
        engine.on_heartbeat(heartbeat_of(b.id, 0));
        assert!(!engine.is_leader());

        let table_id: TableId = "accounts".into();
        let key = vec![StoreValue::I64(1)];
        engine.begin_insert(&table_id, key.clone(), 0).await.unwrap();
        engine.commit(&table_id, 0, &key, vec![StoreValue::I64(1), StoreValue::I64(10)]).await.unwrap();

        assert!(conn.frames().is_empty());
    }

    #[tokio::test]
    async fn apply_record_then_commit_frame_replays_and_evicts() {
        let a = host_cfg("a", 1);
        let engine = Engine::new(a.clone(), Vec::new(), EngineConfig::default());
        let table = open_table(engine.next_sn());
        engine.register_table(Arc::clone(&table));

        let tuple = vec![StoreValue::I64(5), StoreValue::I64(50)];
        let data = bincode::serialize(&tuple).unwrap();
        let table_id: TableId = "accounts".into();
        engine
            .apply_record(Record { table_id: table_id.clone(), un: 0, sn: 3, vn: 0, shard: 0, data, kind: RecordKind::Replication })
            .await
            .unwrap();

        assert_eq!(table.next_un_for_shard(0), 1);
        assert!(table.buffered(0).is_none());

        engine.apply_commit_frame(CommitFrame { table_id, un: 0, shard: 0 }).unwrap();
    }

    #[test]
    fn broadcast_heartbeat_reaches_every_registered_connection() {
        let a = host_cfg("a", 1);
        let b = host_cfg("b", 2);
        let engine = Engine::new(a.clone(), vec![b.clone()], EngineConfig::default());
        let conn = RecordingReplicator::new();
        engine.register_connection(b.id, Arc::clone(&conn) as Arc<dyn Replicator>);
        engine.start();

        engine.broadcast_heartbeat();

        let frames = conn.frames();
        assert_eq!(frames.len(), 1);
        assert!(matches!(&frames[0], Frame::Heartbeat(hb) if hb.host_id == a.id));
    }

    #[test]
    fn sweep_stale_peers_disconnects_voted_peers_past_the_timeout() {
        let a = host_cfg("a", 2);
        let b = host_cfg("b", 1);
        let engine = Engine::new(a.clone(), vec![b.clone()], EngineConfig::default());
        engine.start();
        engine.on_heartbeat(heartbeat_of(b.id, 0));
        assert_eq!(engine.leader(), Some(b.id));

        engine.sweep_stale_peers(std::time::Duration::from_secs(0));

        // b immediately counts as past a zero timeout and is dropped,
        // forcing a re-election back onto a.
        assert_eq!(engine.leader(), Some(a.id));
    }

    #[test]
    fn sweep_stale_peers_leaves_recently_heard_peers_alone() {
        let a = host_cfg("a", 2);
        let b = host_cfg("b", 1);
        let engine = Engine::new(a.clone(), vec![b.clone()], EngineConfig::default());
        engine.start();
        engine.on_heartbeat(heartbeat_of(b.id, 0));

        engine.sweep_stale_peers(std::time::Duration::from_secs(60));

        assert_eq!(engine.leader(), Some(b.id));
    }

    #[test]
    fn heartbeat_from_an_unconfigured_peer_is_synthesized_with_lowest_priority() {
        let a = host_cfg("a", 1);
        let engine = Engine::new(a.clone(), Vec::new(), EngineConfig::default());
        engine.start();

        let stranger = HostId::from_tag("z");
        engine.on_heartbeat(heartbeat_of(stranger, 100));

        // The stranger out-progresses us but has synthesized lowest
        // priority; since priority only breaks ties and progress differs,
        // it still wins on progress alone.
        assert_eq!(engine.leader(), Some(stranger));
    }
}
