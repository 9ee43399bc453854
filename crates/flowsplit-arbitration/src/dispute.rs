//! Dispute records and the phase state machine.
//!
//! A dispute is created once per challenge and, apart from the receipt map
//! growing during voting/reveal, is immutable after it resolves. Phases are
//! derived lazily from clock comparisons; nothing schedules transitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use flowsplit_core::{Address, Amount, Hash32};

/// Phase of a dispute at a given time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisputeState {
    /// Created, voting delay still running.
    Pending,
    /// Commit window open.
    Active,
    /// Reveal window open.
    Reveal,
    /// Reveal closed with too few revealed votes; terminal-eligible.
    QuorumNotReached,
    /// Reveal closed with quorum met; executable once the appeal window ends.
    Solved,
    /// Ruling executed; terminal.
    Executed,
}

/// Outcome of a resolved dispute.
///
/// A tie resolves to `None` rather than picking a winner: both sides' base
/// deposits are refunded by the arbitrable and the arbitration cost splits
/// evenly (documented tie handling, not a missing ruling).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ruling {
    #[default]
    None,
    Choice(u64),
}

impl Ruling {
    /// Wire value passed to the arbitrable callback; 0 encodes `None`.
    pub fn as_u64(self) -> u64 {
        match self {
            Ruling::None => 0,
            Ruling::Choice(c) => c,
        }
    }
}

/// Per-voter reveal record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub choice: u64,
    /// Weight at dispute creation, not reveal time.
    pub votes: u128,
}

/// One challenge escalated to the arbitrator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Dispute {
    pub id: u64,
    /// Contract to call back with the ruling.
    pub arbitrable: Address,
    pub creation_time: u64,
    /// Snapshot block fixing voting weights for the whole dispute.
    pub creation_block: u64,
    pub voting_start_time: u64,
    pub voting_end_time: u64,
    pub reveal_period_end_time: u64,
    pub appeal_period_end_time: u64,
    /// Number of selectable choices; valid reveals are `1..=choices`.
    pub choices: u64,
    /// Revealed votes required for the ruling to bind.
    pub quorum_votes: u128,
    /// Voting-token supply at the snapshot block.
    pub total_supply: u128,
    pub arbitration_cost: Amount,
    pub ruling: Ruling,
    pub executed: bool,
    /// Per-side arbitration cost share, set only on a tie.
    pub tie_cost_per_side: Option<Amount>,
    pub commitments: BTreeMap<Address, Hash32>,
    pub receipts: BTreeMap<Address, VoteReceipt>,
    pub choice_votes: BTreeMap<u64, u128>,
    pub total_revealed_votes: u128,
}

impl Dispute {
    /// Derive the phase at `now`.
    pub fn state(&self, now: u64) -> DisputeState {
        if self.executed {
            return DisputeState::Executed;
        }
        if now < self.voting_start_time {
            return DisputeState::Pending;
        }
        if now < self.voting_end_time {
            return DisputeState::Active;
        }
        if now < self.reveal_period_end_time {
            return DisputeState::Reveal;
        }
        if self.total_revealed_votes < self.quorum_votes {
            DisputeState::QuorumNotReached
        } else {
            DisputeState::Solved
        }
    }

    /// Earliest time `execute_ruling` can succeed.
    pub fn executable_at(&self) -> u64 {
        self.appeal_period_end_time
    }

    pub fn has_committed(&self, voter: Address) -> bool {
        self.commitments.contains_key(&voter)
    }

    pub fn has_revealed(&self, voter: Address) -> bool {
        self.receipts.contains_key(&voter)
    }

    pub fn receipt(&self, voter: Address) -> Option<&VoteReceipt> {
        self.receipts.get(&voter)
    }

    /// Winning choice and tie detection: highest revealed weight wins; any
    /// tie at the top is inconclusive.
    pub fn tally(&self) -> Ruling {
        let mut best: Option<(u64, u128)> = None;
        let mut tied = false;
        for (&choice, &votes) in &self.choice_votes {
            match best {
                None => best = Some((choice, votes)),
                Some((_, best_votes)) if votes > best_votes => {
                    best = Some((choice, votes));
                    tied = false;
                }
                Some((_, best_votes)) if votes == best_votes => tied = true,
                Some(_) => {}
            }
        }
        match best {
            Some((choice, _)) if !tied => Ruling::Choice(choice),
            _ => Ruling::None,
        }
    }
}
