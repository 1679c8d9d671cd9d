//! Cluster and table identity types (§3.3 ADD).

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An 8-byte peer identity, compared lexicographically on its raw bytes —
/// the tie-break named last in §4.4.2's ranking rule ("then `id`
/// (lexicographic on the 8-byte ID)").
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostId([u8; 8]);

impl HostId {
    /// Build a host id from a short ASCII tag, zero-padded on the right.
    /// Panics if `tag` is longer than 8 bytes; host ids are assigned from
    /// static configuration, so a too-long tag is a configuration bug, not
    /// a runtime condition to recover from.
    pub fn from_tag(tag: &str) -> HostId {
        assert!(tag.len() <= 8, "host id tag must fit in 8 bytes: {tag:?}");
        let mut bytes = [0u8; 8];
        bytes[..tag.len()].copy_from_slice(tag.as_bytes());
        HostId(bytes)
    }

    /// The raw 8 bytes backing this id, in the order `Ord` compares them.
    pub fn as_bytes(&self) -> [u8; 8] {
        self.0
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostId({self})")
    }
}

/// Serializes/deserializes as the zero-padding-trimmed ASCII tag rather
/// than the raw bytes, so a cluster configuration file (§6.2) can write
/// `id = "a"` instead of an 8-element byte array.
impl Serialize for HostId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let end = self.0.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        let tag = std::str::from_utf8(&self.0[..end]).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(tag)
    }
}

impl<'de> Deserialize<'de> for HostId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        if tag.len() > 8 {
            return Err(serde::de::Error::custom(format!("host id tag must fit in 8 bytes: {tag:?}")));
        }
        Ok(HostId::from_tag(&tag))
    }
}

/// A table identifier as it appears in wire frames and configuration.
/// Backed by an `Arc<str>` so cloning one into every heartbeat's `db_state`
/// vector, and as a map key across every table-shard pair, is cheap —
/// mirroring the teacher's `SqlIdentifier`/`Relation` interned-string
/// newtypes used throughout `readyset-sql`.
#[derive(Clone, Eq)]
pub struct TableId(Arc<str>);

impl TableId {
    /// Borrow the identifier's text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for TableId {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_ref() == other.0.as_ref()
    }
}

impl PartialOrd for TableId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TableId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.as_ref().cmp(other.0.as_ref())
    }
}

impl std::hash::Hash for TableId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.as_ref().hash(state);
    }
}

impl From<&str> for TableId {
    fn from(s: &str) -> TableId {
        TableId(Arc::from(s))
    }
}

impl From<String> for TableId {
    fn from(s: String) -> TableId {
        TableId(Arc::from(s.as_str()))
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableId({:?})", self.0.as_ref())
    }
}

impl Serialize for TableId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TableId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(TableId::from)
    }
}


/// `HostId`'s `Ord`/`Eq` are `#[derive]`d; these laws exist mostly to pin
/// down that the derive compares all 8 bytes lexicographically, not just
/// that it compiles.
#[cfg(test)]
mod host_id_laws {
    use super::*;
    use proptest::prelude::*;

    fn strategy() -> impl Strategy<Value = HostId> {
        any::<[u8; 8]>().prop_map(HostId)
    }

    zdb_util::eq_laws!(#[strategy(strategy())] HostId);
    zdb_util::ord_laws!(#[strategy(strategy())] HostId);
}
