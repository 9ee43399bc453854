//! Vote records and allocation validation.
//!
//! Token holders split their voting weight across recipients in basis points.
//! A vote is all-or-nothing: the bps must sum to exactly the percentage
//! scale, and re-voting atomically clears the previous allocations before the
//! new ones apply (the flow module drives the pool-unit side).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::registry::RecipientRegistry;
use crate::{Address, Bps, FlowError, RecipientId, Result, TokenId, Units, BPS_U128};

/// One recipient's share of a token's vote, plus the bonus-pool units this
/// allocation contributed (needed to restore them on re-vote).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteAllocation {
    pub recipient_id: RecipientId,
    pub bps: Bps,
    pub member_units: Units,
}

/// Per-token vote storage, exclusively owned by one flow instance.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VoteState {
    allocations: BTreeMap<TokenId, Vec<VoteAllocation>>,
    /// Voter recorded per token: blocks outdated-signature replay and backs
    /// the `has_voted` query.
    voters: BTreeMap<TokenId, Address>,
}

impl VoteState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_voted(&self, token: TokenId) -> bool {
        self.allocations.contains_key(&token)
    }

    pub fn voter(&self, token: TokenId) -> Option<Address> {
        self.voters.get(&token).copied()
    }

    pub fn allocations(&self, token: TokenId) -> &[VoteAllocation] {
        self.allocations.get(&token).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Remove and return the token's previous allocations (re-vote clearing).
    pub fn take_previous(&mut self, token: TokenId) -> Vec<VoteAllocation> {
        self.allocations.remove(&token).unwrap_or_default()
    }

    pub fn record(&mut self, token: TokenId, voter: Address, allocations: Vec<VoteAllocation>) {
        self.allocations.insert(token, allocations);
        self.voters.insert(token, voter);
    }
}

/// Validate a `(recipient_ids, bps)` allocation pair against the registry.
///
/// Preconditions checked, in order:
/// - equal lengths (`RecipientsAllocationsMismatch`)
/// - at least one entry (`TooFewRecipients`)
/// - every bps strictly positive (`AllocationMustBePositive`)
/// - every recipient active (`NotApprovedRecipient`)
/// - bps sum exactly the percentage scale (`InvalidBpsSum`; not `<=`)
pub fn validate_allocations(
    registry: &RecipientRegistry,
    recipient_ids: &[RecipientId],
    bps: &[Bps],
) -> Result<()> {
    if recipient_ids.len() != bps.len() {
        return Err(FlowError::RecipientsAllocationsMismatch {
            recipients: recipient_ids.len(),
            allocations: bps.len(),
        });
    }
    if recipient_ids.is_empty() {
        return Err(FlowError::TooFewRecipients);
    }

    let mut sum: u128 = 0;
    for (id, share) in recipient_ids.iter().zip(bps) {
        if *share == Bps::ZERO {
            return Err(FlowError::AllocationMustBePositive);
        }
        if !registry.is_active(*id) {
            return Err(FlowError::NotApprovedRecipient { id: *id });
        }
        sum += share.as_u128();
    }

    if sum != BPS_U128 {
        return Err(FlowError::InvalidBpsSum {
            sum,
            expected: BPS_U128,
        });
    }
    Ok(())
}

// =============================================================================
// Vote eligibility (state-proof oracle seam)
// =============================================================================

/// Maximum age of an eligibility proof before it is rejected as stale.
pub const PROOF_FRESHNESS_SECS: u64 = 300;

/// Oracle answering whether `voter` may vote with `token` on behalf of
/// `owner`. Backed externally by state proofs against a beacon-chain root;
/// this kernel only consumes the boolean.
pub trait VoteEligibility {
    fn is_eligible(&self, token: TokenId, owner: Address, voter: Address) -> bool;
}

/// Check an eligibility proof's freshness window, then consult the oracle.
///
/// `proof_timestamp` is the beacon timestamp embedded in the proof; proofs
/// older than [`PROOF_FRESHNESS_SECS`] are rejected before the oracle is even
/// asked.
pub fn check_eligibility(
    oracle: &dyn VoteEligibility,
    token: TokenId,
    owner: Address,
    voter: Address,
    proof_timestamp: u64,
    now: u64,
) -> Result<()> {
    let age_secs = now.saturating_sub(proof_timestamp);
    if age_secs > PROOF_FRESHNESS_SECS {
        return Err(FlowError::StaleEligibilityProof {
            age_secs,
            max_secs: PROOF_FRESHNESS_SECS,
        });
    }
    if !oracle.is_eligible(token, owner, voter) {
        return Err(FlowError::NotEligibleVoter { token });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{RecipientMetadata, RecipientType};

    fn meta(title: &str) -> RecipientMetadata {
        RecipientMetadata {
            title: title.into(),
            description: "d".into(),
            image: "i".into(),
        }
    }

    fn bps(v: u16) -> Bps {
        Bps::new(v).unwrap()
    }

    fn registry_with(n: u8) -> (RecipientRegistry, Vec<RecipientId>) {
        let mut reg = RecipientRegistry::new();
        let ids = (1..=n)
            .map(|i| {
                reg.add(
                    Address([i; 20]),
                    meta(&format!("r{i}")),
                    RecipientType::ExternalAccount,
                )
                .unwrap()
            })
            .collect();
        (reg, ids)
    }

    #[test]
    fn rejects_length_mismatch_and_empty() {
        let (reg, ids) = registry_with(2);
        assert!(matches!(
            validate_allocations(&reg, &ids, &[bps(10_000)]),
            Err(FlowError::RecipientsAllocationsMismatch { .. })
        ));
        assert_eq!(
            validate_allocations(&reg, &[], &[]),
            Err(FlowError::TooFewRecipients)
        );
    }

    #[test]
    fn rejects_zero_allocation() {
        let (reg, ids) = registry_with(2);
        assert_eq!(
            validate_allocations(&reg, &ids, &[bps(10_000), bps(0)]),
            Err(FlowError::AllocationMustBePositive)
        );
    }

    #[test]
    fn rejects_removed_recipient() {
        let (mut reg, ids) = registry_with(2);
        reg.remove(ids[1]).unwrap();
        assert_eq!(
            validate_allocations(&reg, &ids, &[bps(5_000), bps(5_000)]),
            Err(FlowError::NotApprovedRecipient { id: ids[1] })
        );
    }

    #[test]
    fn bps_sum_must_be_exact() {
        let (reg, ids) = registry_with(2);
        assert!(validate_allocations(&reg, &ids, &[bps(4_000), bps(6_000)]).is_ok());
        // under
        assert_eq!(
            validate_allocations(&reg, &ids, &[bps(4_000), bps(5_999)]),
            Err(FlowError::InvalidBpsSum {
                sum: 9_999,
                expected: BPS_U128
            })
        );
        // over
        assert_eq!(
            validate_allocations(&reg, &ids, &[bps(4_002), bps(5_999)]),
            Err(FlowError::InvalidBpsSum {
                sum: 10_001,
                expected: BPS_U128
            })
        );
    }

    #[test]
    fn vote_state_re_vote_clears_previous() {
        let mut votes = VoteState::new();
        let token = TokenId(7);
        let (reg, ids) = registry_with(1);
        drop(reg);

        votes.record(
            token,
            Address([1; 20]),
            vec![VoteAllocation {
                recipient_id: ids[0],
                bps: bps(10_000),
                member_units: Units(42),
            }],
        );
        assert!(votes.has_voted(token));
        assert_eq!(votes.voter(token), Some(Address([1; 20])));

        let prev = votes.take_previous(token);
        assert_eq!(prev.len(), 1);
        assert_eq!(prev[0].member_units, Units(42));
        assert!(!votes.has_voted(token));
    }

    struct FixedOracle(bool);
    impl VoteEligibility for FixedOracle {
        fn is_eligible(&self, _: TokenId, _: Address, _: Address) -> bool {
            self.0
        }
    }

    #[test]
    fn stale_proofs_rejected_before_oracle() {
        let oracle = FixedOracle(true);
        let err = check_eligibility(
            &oracle,
            TokenId(1),
            Address([1; 20]),
            Address([2; 20]),
            1_000,
            1_000 + PROOF_FRESHNESS_SECS + 1,
        );
        assert!(matches!(err, Err(FlowError::StaleEligibilityProof { .. })));

        // exactly at the window edge is still fresh
        assert!(check_eligibility(
            &oracle,
            TokenId(1),
            Address([1; 20]),
            Address([2; 20]),
            1_000,
            1_000 + PROOF_FRESHNESS_SECS,
        )
        .is_ok());
    }

    #[test]
    fn ineligible_voter_rejected() {
        let oracle = FixedOracle(false);
        assert_eq!(
            check_eligibility(
                &oracle,
                TokenId(1),
                Address([1; 20]),
                Address([2; 20]),
                100,
                100
            ),
            Err(FlowError::NotEligibleVoter { token: TokenId(1) })
        );
    }
}
