//! An in-flight row transaction and its lifecycle transitions (§3.3
//! `Object`, §4.4.5).

/// Lifecycle state of one row's in-flight or most-recently-committed
/// change (§3.3, §4.4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    /// Never transitioned; not normally observed once `begin_*` has run.
    Undefined,
    /// An insert is in flight.
    Insert,
    /// An update is in flight.
    Update,
    /// A delete is in flight.
    Delete,
    /// The in-flight insert or update committed.
    Committed,
    /// The in-flight delete committed.
    Deleted,
}

/// One row's transaction state, tracked by a [`crate::table::Table`]'s
/// object cache (§3.3 `Object`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    /// Current lifecycle state.
    pub state: ObjectState,
    /// Update number, assigned at commit.
    pub un: u64,
    /// Global sequence number, assigned at commit.
    pub sn: u128,
    /// Version number: `>= 0` for a live version, `< 0` encodes the
    /// deletion generation `-vn - 1`.
    pub vn: i64,
    /// Owning shard.
    pub shard: u8,
    /// The UN this object had before the in-flight change, used to evict
    /// the prior cached buffer on commit and to restore `un` on abort.
    pub orig_un: u64,
}

impl Object {
    /// Begin an insert on `shard`. A fresh row has no prior UN or version.
    pub fn new_insert(shard: u8) -> Object {
        Object { state: ObjectState::Insert, un: 0, sn: 0, vn: 0, shard, orig_un: 0 }
    }

    /// Begin an update of a row currently at `(current_un, current_vn)`.
    pub fn new_update(shard: u8, current_un: u64, current_vn: i64) -> Object {
        Object { state: ObjectState::Update, un: 0, sn: 0, vn: current_vn, shard, orig_un: current_un }
    }

    /// Begin a delete of a row currently at `(current_un, current_vn)`.
    pub fn new_delete(shard: u8, current_un: u64, current_vn: i64) -> Object {
        Object { state: ObjectState::Delete, un: 0, sn: 0, vn: current_vn, shard, orig_un: current_un }
    }

    /// True while a change is in flight (not yet committed or aborted).
    pub fn is_in_flight(&self) -> bool {
        matches!(self.state, ObjectState::Insert | ObjectState::Update | ObjectState::Delete)
    }

    /// Restore `un` from `orig_un` and drop back to `Undefined` (§4.4.5
    /// `abort_`): the in-flight change never happened.
    pub fn abort(&mut self) {
        self.un = self.orig_un;
        self.state = ObjectState::Undefined;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_restores_the_prior_un_and_drops_the_in_flight_state() {
        let mut obj = Object::new_update(0, 41, 3);
        obj.un = 999; // as if commit had half-run before the abort
        obj.abort();
        assert_eq!(obj.un, 41);
        assert_eq!(obj.state, ObjectState::Undefined);
        assert!(!obj.is_in_flight());
    }

    #[test]
    fn fresh_insert_has_no_prior_un() {
        let obj = Object::new_insert(2);
        assert_eq!(obj.orig_un, 0);
        assert!(obj.is_in_flight());
    }
}
