//! Cluster configuration file format (§6.2): a single TOML file listing
//! every host and table, split into the types each downstream crate
//! expects (`zdb_kv::config::{HostCfg, TableCfg, EngineConfig}`,
//! `zdb_store::table::TableSchema`, `zdb_ring::RingParams`).

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use zdb_errors::{Error, Result};
use zdb_kv::config::{CacheMode, EngineConfig, HostCfg, TableCfg};
use zdb_kv::ids::HostId;
use zdb_ring::RingParams;
use zdb_store::table::TableSchema;
use zdb_store::value::Direction;

/// Top-level shape of a cluster configuration file.
#[derive(Debug, Deserialize)]
pub struct FileConfig {
    /// Which of `hosts[]` this process runs as.
    pub host_id: String,
    /// Every host participating in the cluster, including this one.
    pub hosts: Vec<HostCfg>,
    /// Tables this host opens on startup.
    pub tables: Vec<TableEntry>,
    /// Engine timing knobs (§6.2); defaulted if the section is omitted.
    #[serde(default)]
    pub timing: Timing,
    /// Per-connection RING sizing (§6.2); defaulted if omitted.
    #[serde(default)]
    pub ring: RingSettings,
}

/// One `tables[]` entry: both the wire-visible [`TableCfg`] fields and the
/// schema fields [`zdb_store::table::StoreEngine::open`] needs to open the
/// backing store table. The source supplies the latter out-of-band via its
/// Flatbuffers schema (§4.3); this workspace's in-memory store needs them
/// written down somewhere, and the per-table config entry is the natural
/// place.
#[derive(Debug, Clone, Deserialize)]
pub struct TableEntry {
    /// Table identity, as it appears in wire frames.
    pub id: String,
    /// Number of shards this table is partitioned into.
    pub n_shards: u8,
    /// Object-cache retention policy.
    #[serde(default = "default_cache_mode")]
    pub cache_mode: CacheMode,
    /// Number of fields in a row's tuple.
    pub n_fields: usize,
    /// Field indices making up the primary key, in priority order. All
    /// ascending — a config format for per-field direction would be easy
    /// to add but nothing in this workspace's scenarios needs one.
    pub key_fields: Vec<usize>,
}

fn default_cache_mode() -> CacheMode {
    CacheMode::Rows
}

impl TableEntry {
    /// The `zdb-kv`-visible half of this entry.
    pub fn table_cfg(&self) -> TableCfg {
        TableCfg { id: self.id.clone().into(), n_shards: self.n_shards, cache_mode: self.cache_mode }
    }

    /// The `zdb-store`-visible half of this entry.
    pub fn schema(&self) -> TableSchema {
        TableSchema {
            table_id: self.id.clone(),
            n_shards: self.n_shards,
            n_fields: self.n_fields,
            key_fields: self.key_fields.iter().map(|&field| (field, Direction::Asc)).collect(),
        }
    }
}

/// Engine timing knobs in config-friendly milliseconds (§6.2). Carries its
/// own struct-level `#[serde(default)]` (backed by its `Default` impl
/// below) so a `[timing]` section naming only some fields still parses —
/// the missing ones fall back individually rather than the whole section
/// needing to be all-or-nothing.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// See [`EngineConfig::heartbeat_freq`].
    pub heartbeat_freq_ms: u64,
    /// See [`EngineConfig::heartbeat_timeout`].
    pub heartbeat_timeout_ms: u64,
    /// See [`EngineConfig::election_timeout`].
    pub election_timeout_ms: u64,
    /// See [`EngineConfig::reconnect_freq`].
    pub reconnect_freq_ms: u64,
}

impl Default for Timing {
    fn default() -> Timing {
        let defaults = EngineConfig::default();
        Timing {
            heartbeat_freq_ms: defaults.heartbeat_freq.as_millis() as u64,
            heartbeat_timeout_ms: defaults.heartbeat_timeout.as_millis() as u64,
            election_timeout_ms: defaults.election_timeout.as_millis() as u64,
            reconnect_freq_ms: defaults.reconnect_freq.as_millis() as u64,
        }
    }
}

impl Timing {
    /// Convert into the `Duration`-based type `zdb-kv` actually uses.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            heartbeat_freq: Duration::from_millis(self.heartbeat_freq_ms),
            heartbeat_timeout: Duration::from_millis(self.heartbeat_timeout_ms),
            election_timeout: Duration::from_millis(self.election_timeout_ms),
            reconnect_freq: Duration::from_millis(self.reconnect_freq_ms),
        }
    }
}

/// Per-connection RING sizing (§6.2 RING config: `{size, ll, cpuset, spin,
/// timeout}`). `cpuset` pinning is not exposed here — this workspace's
/// socket tasks run on the shared tokio runtime rather than pinned OS
/// threads (§4.4.4 ADD dispatch model), so there is no per-connection core
/// to pin.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RingSettings {
    /// Ring capacity in bytes.
    pub size: u32,
    /// Spin exclusively instead of ever parking.
    pub low_latency: bool,
    /// Busy-spin iterations before parking, when not low-latency.
    pub spin: u32,
    /// Upper bound a blocking push/shift call may wait, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for RingSettings {
    fn default() -> RingSettings {
        RingSettings { size: 1 << 20, low_latency: false, spin: 100, timeout_ms: 50 }
    }
}

impl RingSettings {
    /// Convert into the type `zdb-ring` actually uses.
    pub fn ring_params(&self) -> RingParams {
        RingParams { size: self.size, low_latency: self.low_latency, spin: self.spin, timeout: Duration::from_millis(self.timeout_ms) }
    }
}

impl FileConfig {
    /// Load and parse a cluster configuration file. A read or parse
    /// failure is a [`Error::Configuration`] (§7: "refuses to start;
    /// logged Fatal").
    pub fn load(path: &Path) -> Result<FileConfig> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Configuration(format!("reading {}: {e}", path.display())))?;
        toml::from_str(&text).map_err(|e| Error::Configuration(format!("parsing {}: {e}", path.display())))
    }

    /// This process's own [`HostCfg`], per `host_id`.
    pub fn local(&self) -> Result<HostCfg> {
        let id = HostId::from_tag(&self.host_id);
        self.hosts.iter().find(|h| h.id == id).cloned().ok_or_else(|| Error::Configuration(format!("host_id {:?} is not listed in hosts[]", self.host_id)))
    }

    /// Every configured peer other than this process.
    pub fn peers(&self) -> Result<Vec<HostCfg>> {
        let id = HostId::from_tag(&self.host_id);
        Ok(self.hosts.iter().filter(|h| h.id != id).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
        host_id = "a"

        [[hosts]]
        id = "a"
        ip = "127.0.0.1"
        port = 4001
        priority = 1

        [[hosts]]
        id = "b"
        ip = "127.0.0.1"
        port = 4002
        priority = 2

        [[tables]]
        id = "accounts"
        n_shards = 4
        n_fields = 2
        key_fields = [0]

        [timing]
        heartbeat_freq_ms = 250
    "#;

    #[test]
    fn parses_hosts_tables_and_timing() {
        let cfg: FileConfig = toml::from_str(EXAMPLE).unwrap();
        assert_eq!(cfg.hosts.len(), 2);
        assert_eq!(cfg.tables[0].id, "accounts");
        assert_eq!(cfg.tables[0].cache_mode, CacheMode::Rows);
        assert_eq!(cfg.timing.heartbeat_freq_ms, 250);
        // Omitted timing fields fall back to EngineConfig::default()'s
        // values via the container-level #[serde(default)].
        assert_eq!(cfg.timing.election_timeout_ms, Timing::default().election_timeout_ms);
    }

    #[test]
    fn local_and_peers_split_on_host_id() {
        let cfg: FileConfig = toml::from_str(EXAMPLE).unwrap();
        assert_eq!(cfg.local().unwrap().id, HostId::from_tag("a"));
        let peers = cfg.peers().unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].id, HostId::from_tag("b"));
    }

    #[test]
    fn an_unknown_host_id_is_a_configuration_error() {
        let mut cfg: FileConfig = toml::from_str(EXAMPLE).unwrap();
        cfg.host_id = "z".to_string();
        assert!(matches!(cfg.local(), Err(Error::Configuration(_))));
    }

    #[test]
    fn table_schema_projects_the_configured_key_fields() {
        let cfg: FileConfig = toml::from_str(EXAMPLE).unwrap();
        let schema = cfg.tables[0].schema();
        assert_eq!(schema.key_fields, vec![(0, Direction::Asc)]);
    }
}
