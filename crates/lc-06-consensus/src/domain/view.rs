//! The BFT round state machine.
//!
//! One logical timeline per node, driven by the consensus actor: the actor
//! injects received messages and monotonic-clock ticks; the round returns
//! the events the actor must act on. Commit requires a PREPARE quorum
//! followed by a COMMIT quorum at the same (view, height).
//!
//! Liveness: when the proposer misses its deadline the round votes for
//! view + 1; timeouts double per change up to a cap.

use lc_telemetry::metrics::VIEW_CHANGES;
use shared_types::{Hash, ValidatorId};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Where the round currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the proposer's PRE-PREPARE.
    AwaitingProposal,
    /// Proposal seen; collecting PREPAREs.
    Preparing,
    /// Prepare quorum reached; collecting COMMITs.
    Committing,
    /// Commit quorum reached at this (view, height).
    Committed,
}

/// Events the actor must react to.
#[derive(Clone, Debug, PartialEq)]
pub enum BftEvent {
    /// Broadcast our PREPARE for this proposal.
    BroadcastPrepare { view: u64, block_hash: Hash },
    /// Prepare quorum reached; broadcast our COMMIT.
    BroadcastCommit { view: u64, block_hash: Hash },
    /// Commit quorum reached; the block is final at this (view, height).
    Finalized { view: u64, block_hash: Hash },
    /// Proposer missed its deadline; broadcast VIEW_CHANGE(new_view).
    BroadcastViewChange { new_view: u64, last_committed: u64 },
    /// View-change quorum reached; a new proposer takes over.
    NewView {
        view: u64,
        proposer: ValidatorId,
        silent_proposer: ValidatorId,
    },
}

/// One height's BFT round.
#[derive(Debug)]
pub struct BftRound {
    committee: Vec<ValidatorId>,
    quorum: usize,
    height: u64,
    last_committed: u64,
    view: u64,
    phase: Phase,
    proposal: Option<Hash>,
    prepares: HashSet<ValidatorId>,
    commits: HashSet<ValidatorId>,
    view_change_votes: HashMap<u64, HashSet<ValidatorId>>,
    base_timeout_s: f64,
    timeout_factor: u32,
    timeout_cap_factor: u32,
    deadline: f64,
}

impl BftRound {
    /// Start a round for `height` at monotonic time `now`.
    pub fn new(
        committee: Vec<ValidatorId>,
        quorum: usize,
        height: u64,
        last_committed: u64,
        base_timeout_s: f64,
        timeout_cap_factor: u32,
        now: f64,
    ) -> Self {
        Self {
            committee,
            quorum,
            height,
            last_committed,
            view: 0,
            phase: Phase::AwaitingProposal,
            proposal: None,
            prepares: HashSet::new(),
            commits: HashSet::new(),
            view_change_votes: HashMap::new(),
            base_timeout_s,
            timeout_factor: 1,
            timeout_cap_factor,
            deadline: now + base_timeout_s,
        }
    }

    pub fn view(&self) -> u64 {
        self.view
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Deterministic round-robin proposer for a view.
    pub fn proposer_for(&self, view: u64) -> ValidatorId {
        self.committee[(view as usize) % self.committee.len()]
    }

    pub fn proposer(&self) -> ValidatorId {
        self.proposer_for(self.view)
    }

    /// The proposer announced a candidate. Only the current view's proposer
    /// is listened to; anything else is ignored as stale or hostile.
    pub fn on_pre_prepare(
        &mut self,
        view: u64,
        proposer: ValidatorId,
        block_hash: Hash,
    ) -> Option<BftEvent> {
        if view != self.view
            || proposer != self.proposer()
            || self.phase != Phase::AwaitingProposal
        {
            return None;
        }
        self.proposal = Some(block_hash);
        self.phase = Phase::Preparing;
        Some(BftEvent::BroadcastPrepare {
            view: self.view,
            block_hash,
        })
    }

    /// A committee member's PREPARE arrived.
    pub fn on_prepare(
        &mut self,
        view: u64,
        validator: ValidatorId,
        block_hash: Hash,
    ) -> Option<BftEvent> {
        if view != self.view
            || self.phase != Phase::Preparing
            || self.proposal != Some(block_hash)
            || !self.committee.contains(&validator)
        {
            return None;
        }
        self.prepares.insert(validator);
        if self.prepares.len() >= self.quorum {
            self.phase = Phase::Committing;
            debug!(height = self.height, view, "prepare quorum reached");
            return Some(BftEvent::BroadcastCommit {
                view: self.view,
                block_hash,
            });
        }
        None
    }

    /// A committee member's COMMIT arrived.
    pub fn on_commit(
        &mut self,
        view: u64,
        validator: ValidatorId,
        block_hash: Hash,
    ) -> Option<BftEvent> {
        if view != self.view
            || self.phase != Phase::Committing
            || self.proposal != Some(block_hash)
            || !self.committee.contains(&validator)
        {
            return None;
        }
        self.commits.insert(validator);
        if self.commits.len() >= self.quorum {
            self.phase = Phase::Committed;
            // Two quorum rounds observed at the same (view, height): final.
            return Some(BftEvent::Finalized {
                view: self.view,
                block_hash,
            });
        }
        None
    }

    /// Monotonic-clock tick. Past the deadline the round votes to change
    /// the view.
    pub fn on_tick(&mut self, now: f64) -> Option<BftEvent> {
        if self.phase == Phase::Committed || now < self.deadline {
            return None;
        }
        let new_view = self.view + 1;
        warn!(
            height = self.height,
            view = self.view,
            "proposer silent past deadline, voting for view change"
        );
        // Push the deadline out so we do not spam votes every tick.
        self.deadline = now + self.current_timeout();
        Some(BftEvent::BroadcastViewChange {
            new_view,
            last_committed: self.last_committed,
        })
    }

    /// A VIEW_CHANGE vote arrived (including our own).
    pub fn on_view_change(&mut self, new_view: u64, validator: ValidatorId, now: f64) -> Option<BftEvent> {
        if new_view <= self.view || !self.committee.contains(&validator) {
            return None;
        }
        let votes = self.view_change_votes.entry(new_view).or_default();
        votes.insert(validator);
        if votes.len() < self.quorum {
            return None;
        }

        let silent_proposer = self.proposer();
        self.view = new_view;
        self.phase = Phase::AwaitingProposal;
        self.proposal = None;
        self.prepares.clear();
        self.commits.clear();
        self.view_change_votes.retain(|v, _| *v > new_view);

        // Timeouts double per change up to the cap.
        self.timeout_factor = (self.timeout_factor * 2).min(self.timeout_cap_factor);
        self.deadline = now + self.current_timeout();

        VIEW_CHANGES.inc();
        Some(BftEvent::NewView {
            view: new_view,
            proposer: self.proposer_for(new_view),
            silent_proposer,
        })
    }

    fn current_timeout(&self) -> f64 {
        self.base_timeout_s * self.timeout_factor as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn committee_of(n: u8) -> Vec<ValidatorId> {
        (1..=n).map(|i| [i; 23]).collect()
    }

    fn round() -> BftRound {
        // Committee of 4, quorum 3, 10 s proposals.
        BftRound::new(committee_of(4), 3, 5, 4, 10.0, 8, 0.0)
    }

    const HASH: Hash = [0xB1; 32];

    #[test]
    fn test_happy_path_two_quorum_rounds() {
        let mut round = round();
        let proposer = round.proposer();
        assert_eq!(proposer, [1u8; 23]);

        let event = round.on_pre_prepare(0, proposer, HASH).unwrap();
        assert!(matches!(event, BftEvent::BroadcastPrepare { .. }));

        assert!(round.on_prepare(0, [1u8; 23], HASH).is_none());
        assert!(round.on_prepare(0, [2u8; 23], HASH).is_none());
        let event = round.on_prepare(0, [3u8; 23], HASH).unwrap();
        assert!(matches!(event, BftEvent::BroadcastCommit { .. }));

        assert!(round.on_commit(0, [1u8; 23], HASH).is_none());
        assert!(round.on_commit(0, [2u8; 23], HASH).is_none());
        let event = round.on_commit(0, [4u8; 23], HASH).unwrap();
        assert_eq!(
            event,
            BftEvent::Finalized {
                view: 0,
                block_hash: HASH
            }
        );
        assert_eq!(round.phase(), Phase::Committed);
    }

    #[test]
    fn test_non_proposer_pre_prepare_ignored() {
        let mut round = round();
        assert!(round.on_pre_prepare(0, [2u8; 23], HASH).is_none());
        assert_eq!(round.phase(), Phase::AwaitingProposal);
    }

    #[test]
    fn test_outsider_votes_ignored() {
        let mut round = round();
        round.on_pre_prepare(0, [1u8; 23], HASH);
        assert!(round.on_prepare(0, [9u8; 23], HASH).is_none());
        assert!(round.on_view_change(1, [9u8; 23], 0.0).is_none());
    }

    #[test]
    fn test_silent_proposer_triggers_view_change() {
        let mut round = round();

        // Before the deadline nothing happens.
        assert!(round.on_tick(5.0).is_none());

        // Past the 10 s deadline we vote for view 1.
        let event = round.on_tick(10.5).unwrap();
        assert_eq!(
            event,
            BftEvent::BroadcastViewChange {
                new_view: 1,
                last_committed: 4
            }
        );

        // Quorum of votes (3 of 4) moves the round to view 1.
        assert!(round.on_view_change(1, [2u8; 23], 11.0).is_none());
        assert!(round.on_view_change(1, [3u8; 23], 11.0).is_none());
        let event = round.on_view_change(1, [4u8; 23], 11.0).unwrap();
        assert_eq!(
            event,
            BftEvent::NewView {
                view: 1,
                proposer: [2u8; 23],
                silent_proposer: [1u8; 23],
            }
        );
        assert_eq!(round.view(), 1);

        // The new proposer's proposal is accepted.
        let event = round.on_pre_prepare(1, [2u8; 23], HASH).unwrap();
        assert!(matches!(event, BftEvent::BroadcastPrepare { .. }));
    }

    #[test]
    fn test_timeouts_double_up_to_cap() {
        let mut round = round();
        let mut now = 0.0;
        for change in 1..=5u64 {
            now += 1000.0;
            round.on_tick(now);
            for voter in 2..=4u8 {
                round.on_view_change(change, [voter; 23], now);
            }
            assert_eq!(round.view(), change);
        }
        // Factor doubled 1→2→4→8 and stays capped at 8.
        assert_eq!(round.current_timeout(), 80.0);
    }

    #[test]
    fn test_stale_view_messages_ignored() {
        let mut round = round();
        round.on_tick(10.5);
        for voter in 2..=4u8 {
            round.on_view_change(1, [voter; 23], 11.0);
        }
        // Old-view prepares no longer count.
        round.on_pre_prepare(1, [2u8; 23], HASH);
        assert!(round.on_prepare(0, [3u8; 23], HASH).is_none());
    }
}
