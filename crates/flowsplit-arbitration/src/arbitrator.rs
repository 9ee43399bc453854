//! The arbitrator: dispute creation, commit/reveal voting, ruling execution.

use std::collections::BTreeMap;

use flowsplit_core::math::mul_div_floor_u128;
use flowsplit_core::{hash, Address, Amount, Bps, Hash32};

use crate::dispute::{Dispute, DisputeState, Ruling, VoteReceipt};
use crate::{ArbitrationError, Result};

/// Lower clamp on the quorum requirement (2% of snapshot supply).
pub const MIN_QUORUM_BPS: u16 = 200;
/// Upper clamp on the quorum requirement (20% of snapshot supply).
pub const MAX_QUORUM_BPS: u16 = 2_000;

/// Voting-weight oracle, snapshotted per block.
///
/// Weights are always read at the dispute's creation block, never at reveal
/// time, so mid-dispute weight shuffling cannot move a ruling.
pub trait VotingPowerSnapshot {
    fn voting_power_at(&self, voter: Address, block: u64) -> u128;
    fn total_supply_at(&self, block: u64) -> u128;
}

/// Receiver of the final ruling (the curation layer).
pub trait Arbitrable {
    fn rule(&mut self, dispute_id: u64, ruling: u64);
}

/// Arbitrator timing and cost parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArbitratorConfig {
    pub voting_delay_secs: u64,
    pub voting_period_secs: u64,
    pub reveal_period_secs: u64,
    pub appeal_period_secs: u64,
    /// Requested quorum; clamped into `[MIN_QUORUM_BPS, MAX_QUORUM_BPS]` at
    /// dispute creation.
    pub quorum_votes_bps: Bps,
    pub arbitration_cost: Amount,
}

impl ArbitratorConfig {
    /// Validating constructor: both voting and reveal windows must be open
    /// for a nonzero duration, or no vote could ever land.
    pub fn new(
        voting_delay_secs: u64,
        voting_period_secs: u64,
        reveal_period_secs: u64,
        appeal_period_secs: u64,
        quorum_votes_bps: Bps,
        arbitration_cost: Amount,
    ) -> Result<ArbitratorConfig> {
        if voting_period_secs == 0 {
            return Err(ArbitrationError::ConfigError(
                "voting period must be nonzero".into(),
            ));
        }
        if reveal_period_secs == 0 {
            return Err(ArbitrationError::ConfigError(
                "reveal period must be nonzero".into(),
            ));
        }
        Ok(ArbitratorConfig {
            voting_delay_secs,
            voting_period_secs,
            reveal_period_secs,
            appeal_period_secs,
            quorum_votes_bps,
            arbitration_cost,
        })
    }

    fn clamped_quorum_bps(&self) -> u128 {
        (self.quorum_votes_bps.get().clamp(MIN_QUORUM_BPS, MAX_QUORUM_BPS)) as u128
    }
}

/// Commit-reveal voting arbitrator over a weight-snapshot oracle.
pub struct Arbitrator<S: VotingPowerSnapshot> {
    config: ArbitratorConfig,
    snapshot: S,
    disputes: BTreeMap<u64, Dispute>,
    next_dispute_id: u64,
}

impl<S: VotingPowerSnapshot> Arbitrator<S> {
    pub fn new(config: ArbitratorConfig, snapshot: S) -> Self {
        Arbitrator {
            config,
            snapshot,
            disputes: BTreeMap::new(),
            next_dispute_id: 1,
        }
    }

    pub fn config(&self) -> &ArbitratorConfig {
        &self.config
    }

    pub fn dispute(&self, id: u64) -> Result<&Dispute> {
        self.disputes
            .get(&id)
            .ok_or(ArbitrationError::DisputeNotFound { id })
    }

    fn dispute_mut(&mut self, id: u64) -> Result<&mut Dispute> {
        self.disputes
            .get_mut(&id)
            .ok_or(ArbitrationError::DisputeNotFound { id })
    }

    pub fn current_state(&self, id: u64, now: u64) -> Result<DisputeState> {
        Ok(self.dispute(id)?.state(now))
    }

    /// Open a dispute for `arbitrable` with `choices` selectable outcomes.
    ///
    /// Postconditions:
    /// - All windows are fixed relative to `now` and never move.
    /// - `quorum_votes = floor(total_supply * clamped_bps / 10_000)` against
    ///   the supply at `creation_block`.
    pub fn create_dispute(
        &mut self,
        arbitrable: Address,
        choices: u64,
        now: u64,
        creation_block: u64,
    ) -> Result<u64> {
        if choices < 2 {
            return Err(ArbitrationError::ConfigError(
                "a dispute needs at least two choices".into(),
            ));
        }

        let total_supply = self.snapshot.total_supply_at(creation_block);
        let quorum_votes =
            mul_div_floor_u128(total_supply, self.config.clamped_quorum_bps(), 10_000)
                .map_err(|e| ArbitrationError::Overflow(e.to_string()))?;

        let voting_start_time = now + self.config.voting_delay_secs;
        let voting_end_time = voting_start_time + self.config.voting_period_secs;
        let reveal_period_end_time = voting_end_time + self.config.reveal_period_secs;
        let appeal_period_end_time = reveal_period_end_time + self.config.appeal_period_secs;

        let id = self.next_dispute_id;
        self.next_dispute_id += 1;
        self.disputes.insert(
            id,
            Dispute {
                id,
                arbitrable,
                creation_time: now,
                creation_block,
                voting_start_time,
                voting_end_time,
                reveal_period_end_time,
                appeal_period_end_time,
                choices,
                quorum_votes,
                total_supply,
                arbitration_cost: self.config.arbitration_cost,
                ruling: Ruling::None,
                executed: false,
                tie_cost_per_side: None,
                commitments: BTreeMap::new(),
                receipts: BTreeMap::new(),
                choice_votes: BTreeMap::new(),
                total_revealed_votes: 0,
            },
        );
        tracing::debug!(id, choices, quorum_votes, total_supply, "dispute created");
        Ok(id)
    }

    /// Store a voter's hashed vote during the commit window.
    ///
    /// Only the hash is stored; the choice stays hidden until reveal, which
    /// blocks vote buying and last-mover copying. One commit per voter; a
    /// second commit is rejected, never overwritten.
    pub fn commit_vote(
        &mut self,
        id: u64,
        voter: Address,
        commitment: Hash32,
        now: u64,
    ) -> Result<()> {
        let dispute = self.dispute_mut(id)?;
        if dispute.state(now) != DisputeState::Active {
            return Err(ArbitrationError::VotingClosed);
        }
        if dispute.has_committed(voter) {
            return Err(ArbitrationError::AlreadyCommitted);
        }
        dispute.commitments.insert(voter, commitment);
        Ok(())
    }

    /// Reveal a committed vote during the reveal window.
    ///
    /// The commitment is recomputed from `(choice, reason, salt)` and must
    /// match bit-for-bit. Weight comes from the creation-block snapshot.
    pub fn reveal_vote(
        &mut self,
        id: u64,
        voter: Address,
        choice: u64,
        reason: &str,
        salt: &[u8; 32],
        now: u64,
    ) -> Result<()> {
        let votes = {
            let dispute = self.dispute(id)?;
            if dispute.state(now) != DisputeState::Reveal {
                return Err(ArbitrationError::RevealClosed);
            }
            let committed = dispute
                .commitments
                .get(&voter)
                .ok_or(ArbitrationError::CommitNotFound)?;
            if dispute.has_revealed(voter) {
                return Err(ArbitrationError::AlreadyRevealed);
            }
            if hash::vote_commitment(choice, reason, salt) != *committed {
                return Err(ArbitrationError::CommitMismatch);
            }
            if choice == 0 || choice > dispute.choices {
                return Err(ArbitrationError::InvalidChoice {
                    choice,
                    choices: dispute.choices,
                });
            }
            let votes = self.snapshot.voting_power_at(voter, dispute.creation_block);
            if votes == 0 {
                return Err(ArbitrationError::NoVotingPower);
            }
            votes
        };

        let dispute = self.dispute_mut(id)?;
        dispute.receipts.insert(voter, VoteReceipt { choice, votes });
        *dispute.choice_votes.entry(choice).or_default() += votes;
        dispute.total_revealed_votes += votes;
        tracing::debug!(id, ?voter, choice, votes, "vote revealed");
        Ok(())
    }

    /// Execute the ruling once reveal and appeal windows have closed.
    ///
    /// Postconditions:
    /// - Invokes the arbitrable callback exactly once (`executed` guard).
    /// - On a tie, the ruling is `None` and the arbitration cost is recorded
    ///   as split evenly between the sides.
    pub fn execute_ruling(
        &mut self,
        id: u64,
        now: u64,
        arbitrable: &mut dyn Arbitrable,
    ) -> Result<Ruling> {
        let dispute = self.dispute_mut(id)?;
        if dispute.executed {
            return Err(ArbitrationError::AlreadyExecuted);
        }
        if now < dispute.executable_at() {
            return Err(ArbitrationError::RulingNotReady);
        }
        if dispute.total_revealed_votes < dispute.quorum_votes {
            return Err(ArbitrationError::QuorumNotReached {
                revealed: dispute.total_revealed_votes,
                required: dispute.quorum_votes,
            });
        }

        let ruling = dispute.tally();
        if ruling == Ruling::None {
            dispute.tie_cost_per_side = Some(Amount(dispute.arbitration_cost.get() / 2));
        }
        dispute.ruling = ruling;
        dispute.executed = true;

        let arbitrable_id = dispute.id;
        tracing::debug!(id = arbitrable_id, ruling = ruling.as_u64(), "ruling executed");
        arbitrable.rule(arbitrable_id, ruling.as_u64());
        Ok(ruling)
    }
}
