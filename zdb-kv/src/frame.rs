//! RKV message frames (§3.3, §6.1): the payloads carried inside a
//! `zdb-transport`-framed byte stream between peers. The outer
//! length/type/shard header (§6.1 `Hdr`) belongs to the transport layer;
//! this crate only defines what rides inside it.

use serde::{Deserialize, Serialize};

use crate::host::{DbState, GlobalSn, HostState};
use crate::ids::{HostId, TableId};

/// One `(table, shard)` progress entry inside a [`Heartbeat`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbStateEntry {
    /// Table this entry reports progress for.
    pub table_id: TableId,
    /// Shard within the table.
    pub shard: u8,
    /// Next UN the sender expects for this `(table, shard)`.
    pub un: u64,
}

/// Broadcast every `heartbeat_freq` by every host (§4.4.2). Carries the
/// sender's full `dbState` so every peer can rank it without a separate
/// round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Sender's identity.
    pub host_id: HostId,
    /// Sender's current lifecycle state.
    pub state: HostState,
    /// Sender's per-`(table, shard)` progress.
    pub db_state: Vec<DbStateEntry>,
    /// Sender's global next SN.
    pub next_sn: GlobalSn,
}

impl Heartbeat {
    /// Flatten `db_state` into the wire's list-of-entries shape.
    pub fn from_db_state(host_id: HostId, state: HostState, db_state: &DbState) -> Heartbeat {
        let entries = db_state
            .next_un
            .iter()
            .map(|(&(ref table_id, shard), &un)| DbStateEntry { table_id: table_id.clone(), shard, un })
            .collect();
        Heartbeat { host_id, state, db_state: entries, next_sn: db_state.next_sn }
    }

    /// Reconstitute the map-shaped [`DbState`] this heartbeat reported.
    pub fn to_db_state(&self) -> DbState {
        let next_un = self.db_state.iter().map(|e| ((e.table_id.clone(), e.shard), e.un)).collect();
        DbState { next_un, next_sn: self.next_sn }
    }
}

/// Whether a [`Record`] is live replication or tail-catch-up recovery
/// (§4.4.3): both travel as the same frame shape, ordered
/// replication-then-recovery per table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    /// A just-committed write, forwarded to `next` in real time.
    Replication,
    /// A backfill write sent to help a reconnecting or lagging follower
    /// catch up to the leader's tail.
    Recovery,
}

/// A single replicated or recovered row write (§4.4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Table this write belongs to.
    pub table_id: TableId,
    /// Update number assigned by the sender.
    pub un: u64,
    /// Global sequence number assigned by the sender.
    pub sn: u128,
    /// Version number (negative encodes a delete, per [`crate::object`]).
    pub vn: i64,
    /// Shard this write belongs to.
    pub shard: u8,
    /// Opaque serialized row tuple.
    pub data: Vec<u8>,
    /// Why this record was sent.
    pub kind: RecordKind,
}

/// Tells a follower it may evict its mirror cache for `(table_id, shard,
/// un)` (§4.4.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Table the commit applies to.
    pub table_id: TableId,
    /// Update number that committed.
    pub un: u64,
    /// Shard the commit applies to.
    pub shard: u8,
}

/// The three RKV message kinds exchanged between peers (§3.3 "Message
/// frame").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Frame {
    /// §4.4.2 membership/election gossip.
    Heartbeat(Heartbeat),
    /// §4.4.3 replication or recovery payload.
    Record(Record),
    /// §4.4.3 commit-triggered cache eviction signal.
    Commit(Commit),
}
