//! Weighted pool accounting over the streaming primitive.
//!
//! Each flow instance drives two distribution pools:
//! - **baseline**: an equal salary floor; every active recipient holds the
//!   same fixed unit count.
//! - **bonus**: the vote-weighted discretionary share.
//!
//! Invariant (pool non-degeneracy): a distribution pool with zero total units
//! stalls rate propagation in the primitive, so whenever no real member holds
//! units the flow's own address retains exactly one sentinel unit. The
//! sentinel is cleared again as soon as a real member gains units, keeping
//! payout shares exact.

use crate::math::add_u128;
use crate::stream::{PoolId, StreamAdapter};
use crate::{Address, Amount, FlowError, FlowRate, Result, Units};

/// Fixed baseline units granted to every active recipient (equal salary
/// floor).
pub const BASELINE_MEMBER_UNITS: Units = Units(1_000_000);

/// The two distribution pools of one flow instance.
#[derive(Clone, Copy, Debug)]
pub struct PoolAccounting {
    baseline_pool: PoolId,
    bonus_pool: PoolId,
    /// Address of the owning flow instance; holds the sentinel unit.
    flow_address: Address,
}

impl PoolAccounting {
    /// Create both pools and seed each with the sentinel self-unit (a fresh
    /// pool has no real members yet).
    pub fn new(stream: &mut dyn StreamAdapter, flow_address: Address) -> Result<PoolAccounting> {
        let baseline_pool = stream.create_pool(flow_address);
        let bonus_pool = stream.create_pool(flow_address);
        let accounting = PoolAccounting {
            baseline_pool,
            bonus_pool,
            flow_address,
        };
        accounting.set_units_checked(stream, baseline_pool, flow_address, Units::ONE)?;
        accounting.set_units_checked(stream, bonus_pool, flow_address, Units::ONE)?;
        Ok(accounting)
    }

    pub fn baseline_pool(&self) -> PoolId {
        self.baseline_pool
    }

    pub fn bonus_pool(&self) -> PoolId {
        self.bonus_pool
    }

    fn set_units_checked(
        &self,
        stream: &mut dyn StreamAdapter,
        pool: PoolId,
        member: Address,
        units: Units,
    ) -> Result<()> {
        if !stream.update_member_units(pool, member, units) {
            return Err(FlowError::UnitsUpdateFailed { member });
        }
        Ok(())
    }

    /// Real member units in a pool, i.e. total minus the sentinel self-unit.
    fn real_total_units(&self, stream: &dyn StreamAdapter, pool: PoolId) -> u128 {
        let total = stream.total_units(pool).get();
        let sentinel = stream.member_units(pool, self.flow_address).get();
        total - sentinel
    }

    /// Set a member's units while maintaining the sentinel invariant.
    ///
    /// Preconditions:
    /// - `member` is not the flow's own address (the sentinel holder must
    ///   never double as a real member, or the bookkeeping below would zero
    ///   units it just granted).
    ///
    /// Ordering matters: when the update would empty the pool, the sentinel
    /// is installed *before* the member goes to zero; when the update gives
    /// the pool its first real units, the member is set *before* the sentinel
    /// is cleared. The pool's total therefore never passes through zero.
    fn update_units_with_sentinel(
        &self,
        stream: &mut dyn StreamAdapter,
        pool: PoolId,
        member: Address,
        units: Units,
    ) -> Result<()> {
        if member == self.flow_address {
            return Err(FlowError::RecipientIsSelf);
        }

        let old = stream.member_units(pool, member).get();
        let prospective = self.real_total_units(stream, pool) - old + units.get();

        if prospective == 0 {
            if stream.member_units(pool, self.flow_address).get() == 0 {
                self.set_units_checked(stream, pool, self.flow_address, Units::ONE)?;
            }
            self.set_units_checked(stream, pool, member, units)
        } else {
            self.set_units_checked(stream, pool, member, units)?;
            if stream.member_units(pool, self.flow_address).get() > 0 {
                self.set_units_checked(stream, pool, self.flow_address, Units::ZERO)?;
            }
            Ok(())
        }
    }

    /// Set a member's bonus-pool units.
    pub fn update_bonus_member_units(
        &self,
        stream: &mut dyn StreamAdapter,
        member: Address,
        units: Units,
    ) -> Result<()> {
        self.update_units_with_sentinel(stream, self.bonus_pool, member, units)
    }

    /// Set a member's baseline-pool units.
    pub fn update_baseline_member_units(
        &self,
        stream: &mut dyn StreamAdapter,
        member: Address,
        units: Units,
    ) -> Result<()> {
        self.update_units_with_sentinel(stream, self.baseline_pool, member, units)
    }

    pub fn bonus_member_units(&self, stream: &dyn StreamAdapter, member: Address) -> Units {
        stream.member_units(self.bonus_pool, member)
    }

    pub fn baseline_member_units(&self, stream: &dyn StreamAdapter, member: Address) -> Units {
        stream.member_units(self.baseline_pool, member)
    }

    /// Combined units across both pools.
    pub fn total_member_units(&self, stream: &dyn StreamAdapter, member: Address) -> Result<Units> {
        let sum = add_u128(
            stream.member_units(self.baseline_pool, member).get(),
            stream.member_units(self.bonus_pool, member).get(),
        )?;
        Ok(Units(sum))
    }

    /// Combined claimable balance across both pools.
    pub fn claimable_balance(&self, stream: &dyn StreamAdapter, member: Address) -> Result<Amount> {
        let (baseline, _) = stream.claimable_now(self.baseline_pool, member);
        let (bonus, _) = stream.claimable_now(self.bonus_pool, member);
        Ok(Amount(add_u128(baseline.get(), bonus.get())?))
    }

    /// Combined incoming rate across both pools.
    pub fn member_total_flow_rate(&self, stream: &dyn StreamAdapter, member: Address) -> FlowRate {
        let baseline = stream.get_member_flow_rate(self.baseline_pool, member).get();
        let bonus = stream.get_member_flow_rate(self.bonus_pool, member).get();
        FlowRate(baseline + bonus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::InMemoryStream;

    fn a(b: u8) -> Address {
        Address([b; 20])
    }

    fn setup() -> (InMemoryStream, PoolAccounting) {
        let mut s = InMemoryStream::new();
        let pools = PoolAccounting::new(&mut s, a(0xFF)).unwrap();
        (s, pools)
    }

    #[test]
    fn fresh_pools_carry_the_sentinel() {
        let (s, pools) = setup();
        assert_eq!(s.total_units(pools.baseline_pool()), Units::ONE);
        assert_eq!(s.total_units(pools.bonus_pool()), Units::ONE);
        assert_eq!(s.member_units(pools.bonus_pool(), a(0xFF)), Units::ONE);
    }

    #[test]
    fn first_real_member_displaces_the_sentinel() {
        let (mut s, pools) = setup();
        pools
            .update_bonus_member_units(&mut s, a(1), Units(10))
            .unwrap();
        assert_eq!(s.member_units(pools.bonus_pool(), a(0xFF)), Units::ZERO);
        assert_eq!(s.total_units(pools.bonus_pool()), Units(10));
    }

    #[test]
    fn emptying_the_pool_restores_the_sentinel() {
        let (mut s, pools) = setup();
        pools
            .update_bonus_member_units(&mut s, a(1), Units(10))
            .unwrap();
        pools
            .update_bonus_member_units(&mut s, a(1), Units::ZERO)
            .unwrap();
        assert_eq!(s.member_units(pools.bonus_pool(), a(0xFF)), Units::ONE);
        assert_eq!(s.total_units(pools.bonus_pool()), Units::ONE);
    }

    #[test]
    fn sentinel_keeps_distribution_alive() {
        let (mut s, pools) = setup();
        pools
            .update_bonus_member_units(&mut s, a(1), Units(10))
            .unwrap();
        s.distribute_flow(a(0xFF), pools.bonus_pool(), FlowRate(500))
            .unwrap();

        pools
            .update_bonus_member_units(&mut s, a(1), Units::ZERO)
            .unwrap();
        // rate parked on the sentinel instead of silently dropped
        assert_eq!(s.pool_flow_rate(pools.bonus_pool()), FlowRate(500));
    }

    #[test]
    fn self_address_member_update_is_rejected() {
        let (mut s, pools) = setup();
        assert_eq!(
            pools.update_bonus_member_units(&mut s, a(0xFF), Units(5)),
            Err(FlowError::RecipientIsSelf)
        );
        assert_eq!(
            pools.update_baseline_member_units(&mut s, a(0xFF), Units::ZERO),
            Err(FlowError::RecipientIsSelf)
        );
        // sentinel untouched
        assert_eq!(s.member_units(pools.bonus_pool(), a(0xFF)), Units::ONE);
    }

    #[test]
    fn unit_update_failure_is_typed() {
        let (mut s, pools) = setup();
        s.fail_unit_updates = true;
        assert_eq!(
            pools.update_bonus_member_units(&mut s, a(1), Units(10)),
            Err(FlowError::UnitsUpdateFailed { member: a(1) })
        );
    }

    #[test]
    fn views_sum_both_pools() {
        let (mut s, pools) = setup();
        pools
            .update_baseline_member_units(&mut s, a(1), BASELINE_MEMBER_UNITS)
            .unwrap();
        pools
            .update_bonus_member_units(&mut s, a(1), Units(7))
            .unwrap();
        assert_eq!(
            pools.total_member_units(&s, a(1)).unwrap(),
            Units(BASELINE_MEMBER_UNITS.get() + 7)
        );

        s.distribute_flow(a(0xFF), pools.baseline_pool(), FlowRate(100))
            .unwrap();
        s.distribute_flow(a(0xFF), pools.bonus_pool(), FlowRate(50))
            .unwrap();
        assert_eq!(pools.member_total_flow_rate(&s, a(1)), FlowRate(150));
    }
}
