//! The typed tuple representation a store-table's rows are built from
//! (§4.3 ADD: the Rust stand-in for the source's Flatbuffers reflection
//! over an opaque on-disk tuple).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering as CmpOrdering;

/// One field of a row. Closed over the small set of scalar kinds the
/// in-memory reference store needs to compare and order; RKV itself never
/// constructs or inspects one of these (§4.3: "RKV core treats serialised
/// payloads as opaque bytes").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoreValue {
    /// SQL-style absence of a value; sorts before every other variant.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    I64(i64),
    /// 64-bit float. Compared with `total_cmp` so `StoreValue` has a total
    /// order even though `f64` alone does not.
    F64(f64),
    /// Opaque byte string.
    Bytes(Vec<u8>),
    /// UTF-8 text.
    Text(String),
}

impl Eq for StoreValue {}

impl PartialOrd for StoreValue {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for StoreValue {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        use StoreValue::*;
        match (self, other) {
            (Null, Null) => CmpOrdering::Equal,
            (Null, _) => CmpOrdering::Less,
            (_, Null) => CmpOrdering::Greater,
            (Bool(a), Bool(b)) => a.cmp(b),
            (I64(a), I64(b)) => a.cmp(b),
            (F64(a), F64(b)) => a.total_cmp(b),
            (Bytes(a), Bytes(b)) => a.cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            // Heterogeneous comparisons are ordered by variant discriminant
            // so a mixed-type key column still yields a total order rather
            // than panicking; well-formed schemas never actually compare
            // across variants within one field.
            _ => self.discriminant().cmp(&other.discriminant()),
        }
    }
}

impl StoreValue {
    fn discriminant(&self) -> u8 {
        match self {
            StoreValue::Null => 0,
            StoreValue::Bool(_) => 1,
            StoreValue::I64(_) => 2,
            StoreValue::F64(_) => 3,
            StoreValue::Bytes(_) => 4,
            StoreValue::Text(_) => 5,
        }
    }
}

/// Sort direction for one field of a key or select ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// A key is an ordered tuple of fields compared field-by-field against each
/// field's [`Direction`].
#[derive(Debug, Clone, Copy)]
pub struct KeySpec<'a> {
    /// Index (into a row's tuple) and direction for each field of the key,
    /// in comparison priority order.
    pub fields: &'a [(usize, Direction)],
}

impl<'a> KeySpec<'a> {
    /// Extract the key tuple from a row's full tuple.
    pub fn project(&self, tuple: &[StoreValue]) -> Vec<StoreValue> {
        self.fields.iter().map(|&(idx, _)| tuple[idx].clone()).collect()
    }

    /// Compare two projected key tuples honoring each field's direction.
    pub fn compare(&self, a: &[StoreValue], b: &[StoreValue]) -> CmpOrdering {
        for (i, &(_, dir)) in self.fields.iter().enumerate() {
            let ord = a[i].cmp(&b[i]);
            let ord = if dir == Direction::Desc { ord.reverse() } else { ord };
            if ord != CmpOrdering::Equal {
                return ord;
            }
        }
        CmpOrdering::Equal
    }
}
