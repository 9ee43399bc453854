//! Flow instance configuration with validation.

use serde::{Deserialize, Serialize};

use crate::{Amount, Bps, FlowError, Result, BPS_U128};

/// Default safety margin applied to child buffer requirements (105%).
///
/// Over-provisions for the primitive's own rounding and for the extra buffer
/// the child's manager-reward sub-flow separately requires.
pub const DEFAULT_BUFFER_MARGIN_BPS: u32 = 10_500;

/// Default voting weight per token (1e18-scale, one full token).
pub const DEFAULT_TOKEN_VOTE_WEIGHT: Amount = Amount(1_000_000_000_000_000_000);

/// Tunable parameters of one flow instance.
///
/// `manager_reward_pool_flow_rate_percent` is taken from the gross rate
/// first; `baseline_pool_flow_rate_percent` applies to the remainder, and the
/// bonus pool receives whatever is left. The split can therefore never double
/// count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Pool-unit weight carried by one voting token.
    pub token_vote_weight: Amount,
    /// Share of the post-manager-reward rate routed to the baseline pool.
    pub baseline_pool_flow_rate_percent: Bps,
    /// Share of the gross rate routed to the manager reward pool.
    pub manager_reward_pool_flow_rate_percent: Bps,
    /// Margin applied to child buffer requirements, bps of scale, `>= 10_000`.
    pub buffer_margin_bps: u32,
}

impl FlowConfig {
    /// Validating constructor.
    ///
    /// Preconditions:
    /// - `buffer_margin_bps >= 10_000` (a margin below 100% would
    ///   under-collateralize child flows).
    /// - `token_vote_weight > 0` (a zero weight makes every vote a no-op).
    pub fn new(
        token_vote_weight: Amount,
        baseline_pool_flow_rate_percent: Bps,
        manager_reward_pool_flow_rate_percent: Bps,
        buffer_margin_bps: u32,
    ) -> Result<FlowConfig> {
        if (buffer_margin_bps as u128) < BPS_U128 {
            return Err(FlowError::ConfigError(format!(
                "buffer margin {buffer_margin_bps} below 100%"
            )));
        }
        if token_vote_weight == Amount::ZERO {
            return Err(FlowError::ConfigError("token vote weight is zero".into()));
        }
        Ok(FlowConfig {
            token_vote_weight,
            baseline_pool_flow_rate_percent,
            manager_reward_pool_flow_rate_percent,
            buffer_margin_bps,
        })
    }

    /// Config a parent hands to a newly instantiated child flow: identical
    /// except the manager-reward percent doubles (capped at 100%), biasing
    /// reward concentration toward leaf flows.
    pub fn for_child(&self) -> FlowConfig {
        FlowConfig {
            manager_reward_pool_flow_rate_percent: self
                .manager_reward_pool_flow_rate_percent
                .doubled_capped(),
            ..*self
        }
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        FlowConfig {
            token_vote_weight: DEFAULT_TOKEN_VOTE_WEIGHT,
            baseline_pool_flow_rate_percent: Bps::new(2_500).expect("constant in range"),
            manager_reward_pool_flow_rate_percent: Bps::new(1_000).expect("constant in range"),
            buffer_margin_bps: DEFAULT_BUFFER_MARGIN_BPS,
        }
    }
}
