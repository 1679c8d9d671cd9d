//! Static cluster and table configuration (§3.3 `HostCfg`/`TableCfg`, §6.2).

use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ids::{HostId, TableId};

/// One configured peer (§3.3 `HostCfg`). Deserializes directly from the
/// `hosts[]` list of a cluster configuration file (§6.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCfg {
    /// Cluster-wide identity.
    pub id: HostId,
    /// Address the peer listens on.
    pub ip: IpAddr,
    /// Port the peer listens on.
    pub port: u16,
    /// Static tie-break weight for leader ranking (§4.4.2); lower values
    /// rank higher, matching the source convention where priority 1 beats
    /// priority 2 (§8 scenario S5 decides this ordering — see DESIGN.md).
    pub priority: u32,
    /// A standalone host never participates in election: it is always its
    /// own leader and never replicates.
    #[serde(default)]
    pub standalone: bool,
}

/// How aggressively a table's object cache retains committed rows once
/// they are no longer in flight (§3.3 `Table.cfg.cacheMode`; exact
/// eviction policy is left to the table, this only selects the mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Never retain a committed object past its buffer-cache eviction.
    #[display("none")]
    None,
    /// Retain the latest committed version of every row touched so far.
    #[display("rows")]
    Rows,
    /// Eagerly mirror the whole table in the object cache.
    #[display("all")]
    All,
}

/// Static per-table configuration (§3.3 `TableCfg`). Deserializes directly
/// from one entry of the `tables[]` list of a cluster configuration file
/// (§6.2); the schema fields [`crate`]-external callers need to open the
/// backing store table (field count, key fields) live alongside this in
/// the same config entry but aren't part of `TableCfg` itself, since the
/// wire-visible `TableCfg` the source specifies carries only `{id,
/// nShards, cacheMode, threads[]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCfg {
    /// Table identity, as it appears in wire frames.
    pub id: TableId,
    /// Number of shards this table is partitioned into.
    pub n_shards: u8,
    /// Object-cache retention policy.
    pub cache_mode: CacheMode,
}

/// Engine-wide timing knobs (§6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// How often this host broadcasts a heartbeat.
    pub heartbeat_freq: Duration,
    /// How long without a heartbeat before a peer is considered
    /// disconnected.
    pub heartbeat_timeout: Duration,
    /// How long to wait for an election to resolve before retrying.
    pub election_timeout: Duration,
    /// Retry interval for transient connect/accept/store-open failures.
    pub reconnect_freq: Duration,
}

impl Default for EngineConfig {
    fn default() -> EngineConfig {
        EngineConfig {
            heartbeat_freq: Duration::from_millis(500),
            heartbeat_timeout: Duration::from_secs(2),
            election_timeout: Duration::from_secs(3),
            reconnect_freq: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_cfg_round_trips_through_toml() {
        let cfg = HostCfg { id: HostId::from_tag("a"), ip: "127.0.0.1".parse().unwrap(), port: 4001, priority: 1, standalone: false };
        let text = toml::to_string(&cfg).unwrap();
        let back: HostCfg = toml::from_str(&text).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn table_cfg_round_trips_through_toml_with_snake_case_cache_mode() {
        let cfg = TableCfg { id: "accounts".into(), n_shards: 4, cache_mode: CacheMode::Rows };
        let text = toml::to_string(&cfg).unwrap();
        assert!(text.contains("cache_mode = \"rows\""));
        let back: TableCfg = toml::from_str(&text).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn standalone_defaults_to_false_when_omitted() {
        let back: HostCfg = toml::from_str("id = \"a\"\nip = \"127.0.0.1\"\nport = 4001\npriority = 1\n").unwrap();
        assert!(!back.standalone);
    }
}
