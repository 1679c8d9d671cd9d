//! Cluster membership state: per-peer lifecycle, reported progress, and
//! the shared global-SN counter a table mirrors after every commit (§3.3
//! `Host`, §4.4.1, §4.4.4).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::HostCfg;
use crate::ids::{HostId, TableId};

/// Lifecycle state of a host (§4.4.1), shared by the local engine and by
/// every peer as reported in its heartbeats.
///
/// Transitions: `Instantiated -> Initialized -> Electing -> {Active |
/// Inactive} -> Stopping -> Initialized`, driven by init, start, the last
/// table finishing its tail-open, election timeout, a peer's heartbeat,
/// and disconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostState {
    /// Constructed but not yet started.
    Instantiated,
    /// Started; tables are opening.
    Initialized,
    /// All tables open; waiting for an election to resolve.
    Electing,
    /// Won the election: this host is the leader or a follower accepting
    /// replication.
    Active,
    /// Disconnected, or deactivated after a fatal store failure (§4.4.6).
    Inactive,
    /// Tearing down; will re-enter `Initialized` on restart.
    Stopping,
}

/// A global commit sequence number, or the fact that a peer has not yet
/// reported one. `NotReady` is declared first so the derived `Ord` places
/// it below every real `Sn(_)` regardless of the wrapped value — an
/// unheard-from peer always ranks last in election (§4.4.2 ADD).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum GlobalSn {
    /// No commit has been reported yet.
    #[default]
    NotReady,
    /// The highest global SN this peer has reported.
    Sn(u128),
}

impl GlobalSn {
    /// The wrapped SN, or `None` if not yet reported.
    pub fn value(&self) -> Option<u128> {
        match self {
            GlobalSn::NotReady => None,
            GlobalSn::Sn(v) => Some(*v),
        }
    }
}

/// One peer's reported replication progress (§3.3 `dbState`): the next UN
/// expected per `(table, shard)`, plus the global SN.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DbState {
    /// Per `(table, shard)` next UN to assign or expect.
    pub next_un: HashMap<(TableId, u8), u64>,
    /// Global next SN; `NotReady` until this peer has committed anything.
    pub next_sn: GlobalSn,
}

impl DbState {
    /// The next UN this peer expects for `(table, shard)`, or `0` if it
    /// has never reported one.
    pub fn un_for(&self, table: &TableId, shard: u8) -> u64 {
        self.next_un.get(&(table.clone(), shard)).copied().unwrap_or(0)
    }
}

/// A runtime peer record (§3.3 `Host`).
#[derive(Debug, Clone)]
pub struct Host {
    /// Static configuration.
    pub cfg: HostCfg,
    /// Last reported lifecycle state.
    pub state: HostState,
    /// Whether this peer's first post-election heartbeat has been
    /// observed (§4.4.2: "votes are implicit").
    pub voted: bool,
    /// Last reported replication progress.
    pub db_state: DbState,
    /// When this peer's most recent heartbeat was applied, for
    /// [`Host::is_stale`]'s `heartbeatTimeout` check (§4.4.2). `None`
    /// until the first heartbeat arrives.
    last_seen: Option<Instant>,
}

impl Host {
    /// Construct a freshly configured, not-yet-heard-from peer record.
    pub fn new(cfg: HostCfg) -> Host {
        Host { cfg, state: HostState::Instantiated, voted: false, db_state: DbState::default(), last_seen: None }
    }

    /// Apply an incoming heartbeat from this peer (§4.4.2): refresh its
    /// reported state and progress, and mark it voted.
    pub fn apply_heartbeat(&mut self, state: HostState, db_state: DbState) {
        self.state = state;
        self.db_state = db_state;
        self.voted = true;
        self.last_seen = Some(Instant::now());
    }

    /// Mark this peer unreachable (§4.4.1 disconnection, §4.4.6 connection
    /// loss). It drops out of the voted set until it heartbeats again.
    pub fn mark_disconnected(&mut self) {
        self.state = HostState::Inactive;
        self.voted = false;
    }

    /// True if this peer has heartbeated before but not within `timeout`
    /// (§4.4.2: "disconnects expire on heartbeatTimeout"). A peer that has
    /// never heartbeated is never stale by this check — it is simply not
    /// yet voted, which the election ranking already accounts for.
    pub fn is_stale(&self, timeout: Duration) -> bool {
        matches!(self.last_seen, Some(seen) if seen.elapsed() > timeout)
    }
}

/// A mirror of the cluster-wide global SN counter, updated (never
/// decreased) after every table commit and read by the heartbeat
/// serialiser (§4.4.4: "exported through a lock-free atomic"). Stable Rust
/// has no `AtomicU128`; an `RwLock<u128>` gives the same single-writer/
/// many-reader access pattern at negligible cost for a value written once
/// per commit and read once per heartbeat tick (documented trade-off, see
/// DESIGN.md).
#[derive(Debug, Default)]
pub struct SnCounter(RwLock<u128>);

impl SnCounter {
    /// Construct a counter starting at `initial`.
    pub fn new(initial: u128) -> SnCounter {
        SnCounter(RwLock::new(initial))
    }

    /// The highest SN observed so far.
    pub fn load(&self) -> u128 {
        *self.0.read()
    }

    /// Advance the counter to `value` if it is higher than the current
    /// one; never moves it backwards.
    pub fn fetch_max(&self, value: u128) {
        let mut guard = self.0.write();
        if value > *guard {
            *guard = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_ranks_below_every_real_sn() {
        assert!(GlobalSn::NotReady < GlobalSn::Sn(0));
        assert!(GlobalSn::Sn(5) < GlobalSn::Sn(6));
    }

    #[test]
    fn sn_counter_only_moves_forward() {
        let counter = SnCounter::new(5);
        counter.fetch_max(3);
        assert_eq!(counter.load(), 5);
        counter.fetch_max(10);
        assert_eq!(counter.load(), 10);
    }

    #[test]
    fn a_peer_that_never_heartbeated_is_never_stale() {
        let host = Host::new(HostCfg { id: HostId::from_tag("a"), ip: "127.0.0.1".parse().unwrap(), port: 0, priority: 1, standalone: false });
        assert!(!host.is_stale(Duration::from_millis(1)));
    }

    #[test]
    fn a_peer_goes_stale_once_heartbeat_timeout_elapses() {
        let mut host = Host::new(HostCfg { id: HostId::from_tag("a"), ip: "127.0.0.1".parse().unwrap(), port: 0, priority: 1, standalone: false });
        host.apply_heartbeat(HostState::Active, DbState::default());
        assert!(!host.is_stale(Duration::from_secs(60)));
        assert!(host.is_stale(Duration::from_secs(0)));
    }
}
