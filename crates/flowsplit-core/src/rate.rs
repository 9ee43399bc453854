//! Flow-rate splitting and propagation.
//!
//! The incoming gross rate is carved up in a fixed order: the manager reward
//! is taken first, then the remainder is split between the baseline and bonus
//! pools. Both cuts use floor division and the bonus share is always computed
//! as the remainder, so the three parts sum to the gross rate bit-for-bit.
//! Conservation: `manager_reward + baseline + bonus == gross`.

use crate::math::{buffer_with_margin, scale_flow_rate, validate_gross_rate};
use crate::stream::StreamAdapter;
use crate::{Address, Amount, Bps, FlowRate, Result};

/// How a gross rate divides among the three sinks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateSplit {
    pub manager_reward: FlowRate,
    pub baseline: FlowRate,
    pub bonus: FlowRate,
}

impl RateSplit {
    pub fn total(&self) -> i128 {
        self.manager_reward.get() + self.baseline.get() + self.bonus.get()
    }
}

/// Split a desired gross rate.
///
/// Preconditions:
/// - `0 <= gross <= FlowRate::MAX_STREAMABLE` (typed errors otherwise).
///
/// Postconditions:
/// - All three parts are non-negative.
/// - `manager_reward + baseline + bonus == gross` exactly.
pub fn split_flow_rate(
    gross: FlowRate,
    manager_reward_bps: Bps,
    baseline_bps: Bps,
) -> Result<RateSplit> {
    validate_gross_rate(gross)?;

    let manager_reward = scale_flow_rate(gross, manager_reward_bps)?;
    let remaining = FlowRate(gross.get() - manager_reward.get());
    let baseline = scale_flow_rate(remaining, baseline_bps)?;
    // Remainder, never scaled independently: this is what guarantees exact
    // conservation under floor division.
    let bonus = FlowRate(remaining.get() - baseline.get());

    Ok(RateSplit {
        manager_reward,
        baseline,
        bonus,
    })
}

/// Reconcile the direct manager-reward flow with a new target rate.
///
/// The primitive requires flows to be explicitly created and destroyed, hence
/// the three-way branch: 0→positive creates, positive→positive updates,
/// positive→0 deletes. No-op when both sides are zero.
pub fn sync_manager_reward_flow(
    stream: &mut dyn StreamAdapter,
    from: Address,
    reward_pool: Address,
    new_rate: FlowRate,
) -> Result<()> {
    let old_rate = stream.get_flow_rate(from, reward_pool);
    match (old_rate.is_positive(), new_rate.is_positive()) {
        (false, true) => stream.create_flow(from, reward_pool, new_rate),
        (true, true) => stream.update_flow(from, reward_pool, new_rate),
        (true, false) => stream.delete_flow(from, reward_pool),
        (false, false) => Ok(()),
    }
}

/// Outcome of a buffer check before a child rate update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferCheck {
    /// Child holds (or has been topped up to) the required buffer.
    Funded,
    /// Neither child nor parent can cover the requirement; the rate update is
    /// deferred to a later call. Not an error (§ capital-insufficiency).
    Deferred { shortfall: Amount },
}

/// Ensure a child flow holds enough buffer capital for `new_rate`.
///
/// `required = buffer_for_rate(new_rate) * margin_bps / 10_000`. When the
/// child is short and the parent balance covers the shortfall, the parent
/// transfers it; when the parent cannot cover it either, the update is
/// deferred rather than failed, and retry stays caller-driven.
pub fn ensure_child_buffer(
    stream: &mut dyn StreamAdapter,
    parent: Address,
    child: Address,
    new_rate: FlowRate,
    margin_bps: u32,
) -> Result<BufferCheck> {
    let required = buffer_with_margin(stream.buffer_for_rate(new_rate), margin_bps)?;
    let child_balance = stream.balance_of(child);
    if child_balance >= required {
        return Ok(BufferCheck::Funded);
    }

    let shortfall = Amount(required.get() - child_balance.get());
    if stream.balance_of(parent) >= shortfall && stream.transfer(parent, child, shortfall) {
        return Ok(BufferCheck::Funded);
    }

    tracing::warn!(
        ?parent,
        ?child,
        rate = new_rate.get(),
        shortfall = shortfall.get(),
        "child buffer underfunded, rate update deferred"
    );
    Ok(BufferCheck::Deferred { shortfall })
}
