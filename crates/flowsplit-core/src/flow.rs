//! Flow instance: composition root of the distribution kernel.
//!
//! One `Flow` owns its recipient registry, its two pools, its vote records
//! and its child flows. Children are owned nodes in a tree (never references
//! back into the graph), so parent→child rate propagation is a plain
//! bounded-depth traversal; the on-chain pattern of reentrant contract calls
//! maps to `&mut self` exclusivity here.
//!
//! Every operation that changes total pool units re-issues the distribution
//! at the current target rate: the streaming primitive does not rebalance a
//! pool on membership change by itself, so the kernel must re-trigger it.

use std::collections::BTreeMap;

use crate::config::FlowConfig;
use crate::math::{add_u128, sub_u128, units_for_allocation};
use crate::pool::{PoolAccounting, BASELINE_MEMBER_UNITS};
use crate::rate::{ensure_child_buffer, split_flow_rate, sync_manager_reward_flow, BufferCheck};
use crate::registry::{Recipient, RecipientMetadata, RecipientRegistry, RecipientType};
use crate::stream::{PoolId, StreamAdapter};
use crate::voting::{validate_allocations, VoteAllocation, VoteState};
use crate::{Address, Amount, Bps, FlowError, FlowRate, RecipientId, Result, TokenId, Units};

/// Maximum nesting depth for child flows.
pub const MAX_FLOW_DEPTH: u32 = 32;

/// One flow instance, possibly nested under a parent flow.
pub struct Flow {
    address: Address,
    owner: Address,
    manager: Address,
    parent: Option<Address>,
    manager_reward_pool: Address,
    config: FlowConfig,
    depth: u32,
    registry: RecipientRegistry,
    pools: PoolAccounting,
    votes: VoteState,
    /// Desired gross rate most recently applied (or deferred toward).
    target_rate: FlowRate,
    children: BTreeMap<RecipientId, Flow>,
    child_sequence: u64,
}

impl Flow {
    /// Create a root flow instance.
    pub fn new(
        stream: &mut dyn StreamAdapter,
        address: Address,
        owner: Address,
        manager: Address,
        manager_reward_pool: Address,
        config: FlowConfig,
    ) -> Result<Flow> {
        Self::new_at_depth(
            stream,
            address,
            owner,
            manager,
            manager_reward_pool,
            None,
            config,
            0,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn new_at_depth(
        stream: &mut dyn StreamAdapter,
        address: Address,
        owner: Address,
        manager: Address,
        manager_reward_pool: Address,
        parent: Option<Address>,
        config: FlowConfig,
        depth: u32,
    ) -> Result<Flow> {
        if address.is_zero() || owner.is_zero() || manager.is_zero() || manager_reward_pool.is_zero()
        {
            return Err(FlowError::AddressZero);
        }
        let pools = PoolAccounting::new(stream, address)?;
        Ok(Flow {
            address,
            owner,
            manager,
            parent,
            manager_reward_pool,
            config,
            depth,
            registry: RecipientRegistry::new(),
            pools,
            votes: VoteState::new(),
            target_rate: FlowRate::ZERO,
            children: BTreeMap::new(),
            child_sequence: 0,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn manager(&self) -> Address {
        self.manager
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn target_rate(&self) -> FlowRate {
        self.target_rate
    }

    pub fn registry(&self) -> &RecipientRegistry {
        &self.registry
    }

    pub fn pools(&self) -> &PoolAccounting {
        &self.pools
    }

    pub fn child(&self, id: RecipientId) -> Option<&Flow> {
        self.children.get(&id)
    }

    pub fn get_recipient(&self, id: RecipientId) -> Option<&Recipient> {
        self.registry.get(id)
    }

    pub fn has_voted(&self, token: TokenId) -> bool {
        self.votes.has_voted(token)
    }

    pub fn voter_of(&self, token: TokenId) -> Option<Address> {
        self.votes.voter(token)
    }

    pub fn vote_allocations(&self, token: TokenId) -> &[VoteAllocation] {
        self.votes.allocations(token)
    }

    pub fn claimable_balance(
        &self,
        stream: &dyn StreamAdapter,
        member: Address,
    ) -> Result<Amount> {
        self.pools.claimable_balance(stream, member)
    }

    pub fn member_total_flow_rate(&self, stream: &dyn StreamAdapter, member: Address) -> FlowRate {
        self.pools.member_total_flow_rate(stream, member)
    }

    // -------------------------------------------------------------------------
    // Authorization
    // -------------------------------------------------------------------------

    fn ensure_owner_or_manager(&self, caller: Address) -> Result<()> {
        if caller == self.owner || caller == self.manager {
            Ok(())
        } else {
            Err(FlowError::NotOwnerOrManager)
        }
    }

    fn ensure_owner_or_parent(&self, caller: Address) -> Result<()> {
        if caller == self.owner || Some(caller) == self.parent {
            Ok(())
        } else {
            Err(FlowError::NotOwnerOrParent)
        }
    }

    // -------------------------------------------------------------------------
    // Recipient lifecycle
    // -------------------------------------------------------------------------

    /// Add an external-account recipient.
    ///
    /// Grants the baseline salary floor plus one bonus unit, so a recipient
    /// nobody has voted for still receives a minimal bonus share.
    pub fn add_recipient(
        &mut self,
        stream: &mut dyn StreamAdapter,
        caller: Address,
        address: Address,
        metadata: RecipientMetadata,
    ) -> Result<RecipientId> {
        self.ensure_owner_or_manager(caller)?;
        if address == self.address {
            return Err(FlowError::RecipientIsSelf);
        }
        let id = self
            .registry
            .add(address, metadata, RecipientType::ExternalAccount)?;
        self.connect_member(stream, address)?;
        self.redistribute(stream)?;
        Ok(id)
    }

    /// Instantiate a nested child flow as a recipient.
    ///
    /// The child inherits the parent's config with the manager-reward percent
    /// doubled (capped at 100%), concentrating reward pressure toward leaf
    /// flows.
    pub fn add_flow_recipient(
        &mut self,
        stream: &mut dyn StreamAdapter,
        caller: Address,
        metadata: RecipientMetadata,
        flow_manager: Address,
        manager_reward_pool: Address,
    ) -> Result<(RecipientId, Address)> {
        self.ensure_owner_or_manager(caller)?;
        if self.depth + 1 > MAX_FLOW_DEPTH {
            return Err(FlowError::ConfigError(format!(
                "flow nesting exceeds depth {MAX_FLOW_DEPTH}"
            )));
        }

        let child_address = crate::hash::child_flow_address(self.address, self.child_sequence);
        let id = self
            .registry
            .add(child_address, metadata, RecipientType::FlowContract)?;
        self.child_sequence += 1;

        let child = Flow::new_at_depth(
            stream,
            child_address,
            self.address,
            flow_manager,
            manager_reward_pool,
            Some(self.address),
            self.config.for_child(),
            self.depth + 1,
        )?;
        self.children.insert(id, child);

        self.connect_member(stream, child_address)?;
        self.redistribute(stream)?;
        tracing::debug!(?id, ?child_address, "child flow added");
        Ok((id, child_address))
    }

    fn connect_member(&mut self, stream: &mut dyn StreamAdapter, member: Address) -> Result<()> {
        self.pools
            .update_baseline_member_units(stream, member, BASELINE_MEMBER_UNITS)?;
        let bonus = self.pools.bonus_member_units(stream, member);
        self.pools
            .update_bonus_member_units(stream, member, Units(add_u128(bonus.get(), 1)?))
    }

    /// Soft-delete a recipient and zero its units in both pools, then force a
    /// redistribution (total-units changes require re-triggering the
    /// distribution on the primitive).
    pub fn remove_recipient(
        &mut self,
        stream: &mut dyn StreamAdapter,
        caller: Address,
        id: RecipientId,
    ) -> Result<()> {
        self.ensure_owner_or_manager(caller)?;
        let address = self.registry.remove(id)?.address;
        self.pools
            .update_baseline_member_units(stream, address, Units::ZERO)?;
        self.pools
            .update_bonus_member_units(stream, address, Units::ZERO)?;
        self.redistribute(stream)
    }

    // -------------------------------------------------------------------------
    // Rate management
    // -------------------------------------------------------------------------

    /// Adopt a new desired gross rate and re-propagate everything.
    ///
    /// Callable by the owner or, for nested flows, the parent instance.
    #[tracing::instrument(skip(self, stream), fields(flow = ?self.address))]
    pub fn set_flow_rate(
        &mut self,
        stream: &mut dyn StreamAdapter,
        caller: Address,
        rate: FlowRate,
    ) -> Result<()> {
        self.ensure_owner_or_parent(caller)?;
        self.apply_flow_rate(stream, rate)
    }

    /// Split `rate`, reconcile the manager-reward flow, point both pool
    /// distributions, and recurse into children.
    fn apply_flow_rate(&mut self, stream: &mut dyn StreamAdapter, rate: FlowRate) -> Result<()> {
        let split = split_flow_rate(
            rate,
            self.config.manager_reward_pool_flow_rate_percent,
            self.config.baseline_pool_flow_rate_percent,
        )?;

        sync_manager_reward_flow(
            stream,
            self.address,
            self.manager_reward_pool,
            split.manager_reward,
        )?;
        stream.distribute_flow(self.address, self.pools.baseline_pool(), split.baseline)?;
        stream.distribute_flow(self.address, self.pools.bonus_pool(), split.bonus)?;
        self.target_rate = rate;

        tracing::debug!(
            gross = rate.get(),
            manager = split.manager_reward.get(),
            baseline = split.baseline.get(),
            bonus = split.bonus.get(),
            "flow rate applied"
        );
        self.propagate_child_rates(stream)
    }

    /// Re-issue the distribution at the current target rate (after any
    /// total-units change).
    fn redistribute(&mut self, stream: &mut dyn StreamAdapter) -> Result<()> {
        self.apply_flow_rate(stream, self.target_rate)
    }

    /// Push each child's pool-derived gross rate down into the child, topping
    /// up its buffer first. Underfunded children are skipped (deferred), not
    /// failed.
    fn propagate_child_rates(&mut self, stream: &mut dyn StreamAdapter) -> Result<()> {
        let parent_address = self.address;
        let margin_bps = self.config.buffer_margin_bps;
        let ids: Vec<RecipientId> = self.children.keys().copied().collect();

        for id in ids {
            let child_address = match self.children.get(&id) {
                Some(child) => child.address,
                None => continue,
            };
            let new_gross = self.pools.member_total_flow_rate(stream, child_address);

            let Some(child) = self.children.get_mut(&id) else {
                continue;
            };
            if new_gross == child.target_rate {
                continue;
            }
            match ensure_child_buffer(stream, parent_address, child_address, new_gross, margin_bps)?
            {
                BufferCheck::Funded => child.apply_flow_rate(stream, new_gross)?,
                BufferCheck::Deferred { .. } => {
                    // Deliberate no-op: retry happens on the next rate or
                    // membership change (caller-driven recovery).
                }
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Voting
    // -------------------------------------------------------------------------

    /// Cast (or re-cast) a token's vote across recipients.
    ///
    /// Re-voting is atomic: all previous allocations are cleared (restoring
    /// bonus units, skipping removed recipients whose units are already
    /// zeroed) before the new ones apply. Units add cumulatively across
    /// voters, they are never overwritten.
    #[tracing::instrument(skip(self, stream, recipient_ids, bps), fields(flow = ?self.address))]
    pub fn cast_vote(
        &mut self,
        stream: &mut dyn StreamAdapter,
        voter: Address,
        token: TokenId,
        recipient_ids: &[RecipientId],
        bps: &[Bps],
    ) -> Result<()> {
        validate_allocations(&self.registry, recipient_ids, bps)?;

        for prev in self.votes.take_previous(token) {
            if !self.registry.is_active(prev.recipient_id) {
                continue;
            }
            let member = match self.registry.get(prev.recipient_id) {
                Some(r) => r.address,
                None => continue,
            };
            let current = self.pools.bonus_member_units(stream, member);
            if current.get() < prev.member_units.get() {
                // Stale allocation: the recipient's units were zeroed by a
                // removal since this vote (a re-add grants a fresh unit),
                // so there is nothing left to restore.
                continue;
            }
            let restored = sub_u128(current.get(), prev.member_units.get())?;
            self.pools
                .update_bonus_member_units(stream, member, Units(restored))?;
        }

        let weight = self.config.token_vote_weight;
        let mut allocations = Vec::with_capacity(recipient_ids.len());
        for (id, share) in recipient_ids.iter().zip(bps) {
            let member = self
                .registry
                .get(*id)
                .ok_or(FlowError::InvalidRecipientId { id: *id })?
                .address;
            let added = units_for_allocation(weight, *share)?;
            let current = self.pools.bonus_member_units(stream, member);
            let next = add_u128(current.get(), added.get())?;
            self.pools
                .update_bonus_member_units(stream, member, Units(next))?;
            allocations.push(VoteAllocation {
                recipient_id: *id,
                bps: *share,
                member_units: added,
            });
        }

        self.votes.record(token, voter, allocations);
        // Unit totals moved; child rates follow the new pool shares.
        self.redistribute(stream)
    }

    // -------------------------------------------------------------------------
    // Administrative surface
    // -------------------------------------------------------------------------

    pub fn set_baseline_flow_rate_percent(
        &mut self,
        stream: &mut dyn StreamAdapter,
        caller: Address,
        percent: Bps,
    ) -> Result<()> {
        self.ensure_owner_or_manager(caller)?;
        self.config.baseline_pool_flow_rate_percent = percent;
        self.redistribute(stream)
    }

    pub fn set_manager_reward_flow_rate_percent(
        &mut self,
        stream: &mut dyn StreamAdapter,
        caller: Address,
        percent: Bps,
    ) -> Result<()> {
        self.ensure_owner_or_manager(caller)?;
        self.config.manager_reward_pool_flow_rate_percent = percent;
        self.redistribute(stream)
    }

    pub fn set_manager(&mut self, caller: Address, manager: Address) -> Result<()> {
        self.ensure_owner_or_manager(caller)?;
        if manager.is_zero() {
            return Err(FlowError::AddressZero);
        }
        self.manager = manager;
        Ok(())
    }

    /// Redirect the manager-reward flow to a new pool address. The flow to
    /// the old address is torn down and rebuilt at the current split.
    pub fn set_manager_reward_pool(
        &mut self,
        stream: &mut dyn StreamAdapter,
        caller: Address,
        pool: Address,
    ) -> Result<()> {
        self.ensure_owner_or_manager(caller)?;
        if pool.is_zero() {
            return Err(FlowError::AddressZero);
        }
        let old = self.manager_reward_pool;
        if stream.get_flow_rate(self.address, old).is_positive() {
            stream.delete_flow(self.address, old)?;
        }
        self.manager_reward_pool = pool;
        self.redistribute(stream)
    }

    /// Connect a member account to one of this flow's pools so distributions
    /// land in its balance without an explicit claim.
    pub fn connect_pool(
        &mut self,
        stream: &mut dyn StreamAdapter,
        caller: Address,
        pool: PoolId,
        member: Address,
    ) -> Result<()> {
        self.ensure_owner_or_manager(caller)?;
        if stream.connect_pool(pool, member) {
            Ok(())
        } else {
            Err(FlowError::PoolConnectFailed { pool })
        }
    }
}
