//! Leader/next ranking (§4.4.2).

use std::cmp::Reverse;

use zdb_errors::{Error, Result};

use crate::host::Host;
use crate::ids::HostId;

/// Who is leader, and who (if anyone) is its replication successor, after
/// ranking every voted peer (§4.4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ranking {
    /// The top-ranked voted peer.
    pub leader: HostId,
    /// The next-ranked voted peer whose progress is at or behind the
    /// leader's, if one exists.
    pub next: Option<HostId>,
}

/// `(dbState progress, priority)`: the first two ranking keys from §4.4.2,
/// used only to detect a tie at the top of the ranking. A tie on this pair
/// leaves the leader undefined (fatal) regardless of `id` — `id` only
/// orders the chain among peers that are *not* tied for the lead, so the
/// deadlock check deliberately stops here rather than using [`full_rank_key`].
///
/// `Reverse(priority)` makes a *lower* configured priority rank *higher*,
/// matching §8 scenario S5 (host with priority 1 outranks priority 2).
fn rank_key(host: &Host) -> (crate::host::GlobalSn, Reverse<u32>) {
    (host.db_state.next_sn, Reverse(host.cfg.priority))
}

/// The full three-key ranking tuple from §4.4.2: `(dbState progress,
/// priority, id)`, compared lexicographically. Used to order the whole
/// chain; `rank_key` above (its first two components) is what decides
/// whether the top of the ranking is tied.
fn full_rank_key(host: &Host) -> (crate::host::GlobalSn, Reverse<u32>, HostId) {
    (host.db_state.next_sn, Reverse(host.cfg.priority), host.cfg.id)
}

/// Rank every voted peer in `hosts` (§4.4.2: "votes are implicit... a peer
/// whose first post-election heartbeat has been observed").
///
/// Returns [`Error::ElectionDeadlock`] if there are no voted peers, or if
/// the top two rank exactly equal on `(dbState progress, priority)` — the
/// caller should log this Fatal and stay `Electing` until a heartbeat
/// breaks the tie, per §4.4.6.
pub fn rank(hosts: &[Host]) -> Result<Ranking> {
    let mut voted: Vec<&Host> = hosts.iter().filter(|h| h.voted).collect();
    if voted.is_empty() {
        return Err(Error::ElectionDeadlock("no voted peers to rank".into()));
    }
    voted.sort_by(|a, b| full_rank_key(b).cmp(&full_rank_key(a)));

    if voted.len() > 1 && rank_key(voted[0]) == rank_key(voted[1]) {
        return Err(Error::ElectionDeadlock(format!(
            "tied top rank between {} and {}",
            voted[0].cfg.id, voted[1].cfg.id
        )));
    }

    let leader = voted[0];
    let leader_progress = leader.db_state.next_sn;
    let next = voted[1..].iter().find(|h| h.db_state.next_sn <= leader_progress).map(|h| h.cfg.id);

    Ok(Ranking { leader: leader.cfg.id, next })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostCfg;
    use crate::host::{DbState, GlobalSn, HostState};
    use std::net::{IpAddr, Ipv4Addr};

    fn host(tag: &str, priority: u32, sn: Option<u128>, voted: bool) -> Host {
        let cfg = HostCfg {
            id: HostId::from_tag(tag),
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            priority,
            standalone: false,
        };
        let mut h = Host::new(cfg);
        h.voted = voted;
        h.state = HostState::Electing;
        h.db_state = DbState { next_un: Default::default(), next_sn: sn.map(GlobalSn::Sn).unwrap_or(GlobalSn::NotReady) };
        h
    }

    #[test]
    fn s5_two_host_election_lower_priority_wins_when_progress_is_tied() {
        let a = host("a", 1, None, true);
        let b = host("b", 2, None, true);
        let ranking = rank(&[a, b]).unwrap();
        assert_eq!(ranking.leader, HostId::from_tag("a"));
        assert_eq!(ranking.next, Some(HostId::from_tag("b")));
    }

    #[test]
    fn higher_progress_outranks_lower_priority_number() {
        let a = host("a", 1, Some(5), true);
        let b = host("b", 2, Some(10), true);
        let ranking = rank(&[a, b]).unwrap();
        assert_eq!(ranking.leader, HostId::from_tag("b"));
    }

    #[test]
    fn unvoted_peers_are_excluded_from_ranking() {
        let a = host("a", 1, None, false);
        let b = host("b", 2, None, true);
        let ranking = rank(&[a, b]).unwrap();
        assert_eq!(ranking.leader, HostId::from_tag("b"));
        assert_eq!(ranking.next, None);
    }

    #[test]
    fn exact_tie_on_progress_and_priority_is_a_deadlock() {
        let a = host("a", 1, Some(5), true);
        let b = host("b", 1, Some(5), true);
        assert!(matches!(rank(&[a, b]), Err(Error::ElectionDeadlock(_))));
    }

    #[test]
    fn three_way_tie_below_the_leader_breaks_on_id() {
        // b, c, d all tie on (progress, priority); only a clearly leads,
        // and its progress (5) is behind all three, so `next` is whichever
        // of b/c/d ranks first in the tied trio. That must follow `id`, not
        // whatever order `hosts` happened to be collected in — run the
        // same four hosts through a few different input orderings and
        // require the same winner every time.
        let a = host("a", 1, Some(20), true);
        let b = host("b", 2, Some(5), true);
        let c = host("c", 2, Some(5), true);
        let d = host("d", 2, Some(5), true);

        let orderings = [[0, 1, 2, 3], [3, 2, 1, 0], [1, 3, 0, 2]];
        let hosts = [a, b, c, d];
        let mut results = Vec::new();
        for order in orderings {
            let permuted: Vec<Host> = order.iter().map(|&i| hosts[i].clone()).collect();
            results.push(rank(&permuted).unwrap());
        }

        for ranking in &results {
            assert_eq!(ranking.leader, HostId::from_tag("a"));
        }
        let next_ids: Vec<_> = results.iter().map(|r| r.next).collect();
        assert!(next_ids.iter().all(|n| *n == next_ids[0]), "id tie-break must be order-independent: {next_ids:?}");
        assert_eq!(next_ids[0], Some(HostId::from_tag("d")));
    }

    #[test]
    fn next_is_the_next_ranked_voted_peer() {
        // Ranked by progress descending: c (15) > b (10) > a (2). Since
        // progress is always the primary sort key, the peer immediately
        // below the leader always satisfies "dbState <= leader.dbState".
        let a = host("a", 3, Some(2), true);
        let b = host("b", 2, Some(10), true);
        let c = host("c", 1, Some(15), true);
        let ranking = rank(&[a, b, c]).unwrap();
        assert_eq!(ranking.leader, HostId::from_tag("c"));
        assert_eq!(ranking.next, Some(HostId::from_tag("b")));
    }
}
