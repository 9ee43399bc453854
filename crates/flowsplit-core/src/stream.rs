//! Seam to the external continuous-payment primitive.
//!
//! The kernel never talks to the real streaming network directly; everything
//! goes through [`StreamAdapter`]. [`InMemoryStream`] is a deterministic
//! implementation for tests and local simulation, faithful on the semantics
//! the kernel depends on:
//!
//! - `update_member_units` is a non-reverting predicate (returns `false` on
//!   failure instead of erroring).
//! - Distributing into a pool whose total units is zero silently drops the
//!   rate. The pool-accounting layer's sentinel self-unit exists precisely to
//!   keep this degenerate case unreachable.
//! - Direct flows must be explicitly created and deleted; "update to zero" is
//!   not a substitute for deletion.

use std::collections::{BTreeMap, BTreeSet};

use crate::{Address, Amount, FlowError, FlowRate, Result, Units};

/// Identifier for a distribution pool created through the adapter.
pub type PoolId = u64;

/// External streaming-payment primitive operations used by the kernel.
pub trait StreamAdapter {
    /// Create a new distribution pool administered by `admin`.
    fn create_pool(&mut self, admin: Address) -> PoolId;

    /// Set a member's units in a pool.
    ///
    /// Returns `false` if the primitive rejected the update (non-reverting
    /// predicate interface).
    fn update_member_units(&mut self, pool: PoolId, member: Address, units: Units) -> bool;

    /// Point the continuous distribution from `from` into `pool` at `rate`.
    fn distribute_flow(&mut self, from: Address, pool: PoolId, rate: FlowRate) -> Result<()>;

    /// Create a direct flow. Fails if one already exists for `(from, to)`.
    fn create_flow(&mut self, from: Address, to: Address, rate: FlowRate) -> Result<()>;

    /// Update an existing direct flow. Fails if none exists.
    fn update_flow(&mut self, from: Address, to: Address, rate: FlowRate) -> Result<()>;

    /// Delete an existing direct flow. Fails if none exists.
    fn delete_flow(&mut self, from: Address, to: Address) -> Result<()>;

    /// Current rate of the direct flow `(from, to)`, zero if absent.
    fn get_flow_rate(&self, from: Address, to: Address) -> FlowRate;

    /// Rate currently reaching `member` from `pool` (floor pro-rata share).
    fn get_member_flow_rate(&self, pool: PoolId, member: Address) -> FlowRate;

    fn member_units(&self, pool: PoolId, member: Address) -> Units;

    fn total_units(&self, pool: PoolId) -> Units;

    /// Rate currently distributed into the pool (post unit-degeneracy drop).
    fn pool_flow_rate(&self, pool: PoolId) -> FlowRate;

    /// Collateral the primitive requires to keep a flow of `rate` solvent.
    fn buffer_for_rate(&self, rate: FlowRate) -> Amount;

    fn balance_of(&self, account: Address) -> Amount;

    /// Move balance between accounts. Returns `false` on insufficient funds.
    fn transfer(&mut self, from: Address, to: Address, amount: Amount) -> bool;

    /// Connect `member` to a pool so distributions reach its balance without
    /// an explicit claim. Returns `false` if the primitive rejected it.
    fn connect_pool(&mut self, pool: PoolId, member: Address) -> bool;

    /// Net signed rate for an account across flows and pool distributions.
    fn net_flow_rate(&self, account: Address) -> FlowRate;

    /// Amount `member` could claim from `pool` right now, plus the timestamp.
    fn claimable_now(&self, pool: PoolId, member: Address) -> (Amount, u64);
}

#[derive(Clone, Debug, Default)]
struct PoolState {
    units: BTreeMap<Address, Units>,
    /// Pool admin doubles as the distributor until `distribute_flow` repoints
    /// it.
    distributor: Address,
    /// Requested distribution rate; effective rate is zero while the pool has
    /// no units.
    requested_rate: FlowRate,
    claimable: BTreeMap<Address, u128>,
}

impl PoolState {
    fn total_units(&self) -> u128 {
        self.units.values().map(|u| u.get()).sum()
    }

    fn effective_rate(&self) -> i128 {
        if self.total_units() == 0 {
            0
        } else {
            self.requested_rate.get()
        }
    }
}

/// Deterministic in-memory stand-in for the streaming primitive.
#[derive(Default)]
pub struct InMemoryStream {
    now: u64,
    next_pool: PoolId,
    pools: BTreeMap<PoolId, PoolState>,
    flows: BTreeMap<(Address, Address), FlowRate>,
    balances: BTreeMap<Address, u128>,
    connections: BTreeSet<(PoolId, Address)>,
    /// Test hook: when set, all unit updates report failure.
    pub fail_unit_updates: bool,
}

/// Liquidation window the in-memory primitive sizes buffers for.
pub const BUFFER_SECONDS: u128 = 4 * 3600;

impl InMemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    /// Credit an account (test setup; mirrors funding a contract).
    pub fn mint(&mut self, account: Address, amount: Amount) {
        *self.balances.entry(account).or_default() += amount.get();
    }

    /// Advance the clock, accruing pool claimables and settling direct flows.
    pub fn advance_time(&mut self, secs: u64) {
        let dt = secs as u128;

        for pool in self.pools.values_mut() {
            let rate = pool.effective_rate();
            if rate <= 0 {
                continue;
            }
            let total = pool.total_units();
            let gross = rate as u128 * dt;
            for (member, units) in pool.units.clone() {
                if units.get() == 0 {
                    continue;
                }
                let share = gross * units.get() / total;
                *pool.claimable.entry(member).or_default() += share;
            }
            let distributor = pool.distributor;
            let bal = self.balances.entry(distributor).or_default();
            *bal = bal.saturating_sub(gross);
        }

        for ((from, to), rate) in self.flows.clone() {
            if rate.get() <= 0 {
                continue;
            }
            let moved = rate.get() as u128 * dt;
            let bal = self.balances.entry(from).or_default();
            *bal = bal.saturating_sub(moved);
            *self.balances.entry(to).or_default() += moved;
        }

        self.now += secs;
    }

    fn pool(&self, pool: PoolId) -> Result<&PoolState> {
        self.pools
            .get(&pool)
            .ok_or(FlowError::PoolNotFound { pool })
    }

    fn pool_mut(&mut self, pool: PoolId) -> Result<&mut PoolState> {
        self.pools
            .get_mut(&pool)
            .ok_or(FlowError::PoolNotFound { pool })
    }
}

impl StreamAdapter for InMemoryStream {
    fn create_pool(&mut self, admin: Address) -> PoolId {
        let id = self.next_pool;
        self.next_pool += 1;
        self.pools.insert(
            id,
            PoolState {
                distributor: admin,
                ..PoolState::default()
            },
        );
        id
    }

    fn update_member_units(&mut self, pool: PoolId, member: Address, units: Units) -> bool {
        if self.fail_unit_updates {
            return false;
        }
        match self.pools.get_mut(&pool) {
            Some(p) => {
                if units.get() == 0 {
                    p.units.remove(&member);
                } else {
                    p.units.insert(member, units);
                }
                true
            }
            None => false,
        }
    }

    fn distribute_flow(&mut self, from: Address, pool: PoolId, rate: FlowRate) -> Result<()> {
        if rate.get() < 0 {
            return Err(FlowError::FlowRateNegative);
        }
        let p = self.pool_mut(pool)?;
        p.distributor = from;
        p.requested_rate = rate;
        Ok(())
    }

    fn create_flow(&mut self, from: Address, to: Address, rate: FlowRate) -> Result<()> {
        if rate.get() < 0 {
            return Err(FlowError::FlowRateNegative);
        }
        self.flows.insert((from, to), rate);
        Ok(())
    }

    fn update_flow(&mut self, from: Address, to: Address, rate: FlowRate) -> Result<()> {
        if rate.get() < 0 {
            return Err(FlowError::FlowRateNegative);
        }
        match self.flows.get_mut(&(from, to)) {
            Some(r) => {
                *r = rate;
                Ok(())
            }
            None => Err(FlowError::FlowNotFound { from, to }),
        }
    }

    fn delete_flow(&mut self, from: Address, to: Address) -> Result<()> {
        self.flows
            .remove(&(from, to))
            .map(|_| ())
            .ok_or(FlowError::FlowNotFound { from, to })
    }

    fn get_flow_rate(&self, from: Address, to: Address) -> FlowRate {
        self.flows
            .get(&(from, to))
            .copied()
            .unwrap_or(FlowRate::ZERO)
    }

    fn get_member_flow_rate(&self, pool: PoolId, member: Address) -> FlowRate {
        let Ok(p) = self.pool(pool) else {
            return FlowRate::ZERO;
        };
        let total = p.total_units();
        if total == 0 {
            return FlowRate::ZERO;
        }
        let units = p.units.get(&member).map(|u| u.get()).unwrap_or(0);
        FlowRate((p.effective_rate() as u128 * units / total) as i128)
    }

    fn member_units(&self, pool: PoolId, member: Address) -> Units {
        self.pool(pool)
            .ok()
            .and_then(|p| p.units.get(&member).copied())
            .unwrap_or(Units::ZERO)
    }

    fn total_units(&self, pool: PoolId) -> Units {
        self.pool(pool)
            .map(|p| Units(p.total_units()))
            .unwrap_or(Units::ZERO)
    }

    fn pool_flow_rate(&self, pool: PoolId) -> FlowRate {
        self.pool(pool)
            .map(|p| FlowRate(p.effective_rate()))
            .unwrap_or(FlowRate::ZERO)
    }

    fn buffer_for_rate(&self, rate: FlowRate) -> Amount {
        if rate.get() <= 0 {
            return Amount::ZERO;
        }
        Amount(rate.get() as u128 * BUFFER_SECONDS)
    }

    fn balance_of(&self, account: Address) -> Amount {
        Amount(self.balances.get(&account).copied().unwrap_or(0))
    }

    fn transfer(&mut self, from: Address, to: Address, amount: Amount) -> bool {
        let from_bal = self.balances.get(&from).copied().unwrap_or(0);
        if from_bal < amount.get() {
            return false;
        }
        self.balances.insert(from, from_bal - amount.get());
        *self.balances.entry(to).or_default() += amount.get();
        true
    }

    fn connect_pool(&mut self, pool: PoolId, member: Address) -> bool {
        if !self.pools.contains_key(&pool) {
            return false;
        }
        self.connections.insert((pool, member));
        true
    }

    fn net_flow_rate(&self, account: Address) -> FlowRate {
        let mut net: i128 = 0;
        for ((from, to), rate) in &self.flows {
            if *from == account {
                net -= rate.get();
            }
            if *to == account {
                net += rate.get();
            }
        }
        for pool in self.pools.values() {
            let rate = pool.effective_rate();
            if rate == 0 {
                continue;
            }
            if pool.distributor == account {
                net -= rate;
            }
            let total = pool.total_units();
            if total > 0 {
                if let Some(units) = pool.units.get(&account) {
                    net += (rate as u128 * units.get() / total) as i128;
                }
            }
        }
        FlowRate(net)
    }

    fn claimable_now(&self, pool: PoolId, member: Address) -> (Amount, u64) {
        let amount = self
            .pool(pool)
            .ok()
            .and_then(|p| p.claimable.get(&member).copied())
            .unwrap_or(0);
        (Amount(amount), self.now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a(b: u8) -> Address {
        Address([b; 20])
    }

    #[test]
    fn empty_pool_drops_distribution_rate() {
        let mut s = InMemoryStream::new();
        let pool = s.create_pool(a(1));
        s.distribute_flow(a(1), pool, FlowRate(1_000)).unwrap();
        assert_eq!(s.pool_flow_rate(pool), FlowRate::ZERO);

        assert!(s.update_member_units(pool, a(2), Units(10)));
        assert_eq!(s.pool_flow_rate(pool), FlowRate(1_000));
    }

    #[test]
    fn member_rate_is_floor_pro_rata() {
        let mut s = InMemoryStream::new();
        let pool = s.create_pool(a(1));
        s.update_member_units(pool, a(2), Units(1));
        s.update_member_units(pool, a(3), Units(2));
        s.distribute_flow(a(1), pool, FlowRate(100)).unwrap();
        assert_eq!(s.get_member_flow_rate(pool, a(2)), FlowRate(33));
        assert_eq!(s.get_member_flow_rate(pool, a(3)), FlowRate(66));
    }

    #[test]
    fn flow_update_requires_existing_flow() {
        let mut s = InMemoryStream::new();
        assert!(matches!(
            s.update_flow(a(1), a(2), FlowRate(5)),
            Err(FlowError::FlowNotFound { .. })
        ));
        s.create_flow(a(1), a(2), FlowRate(5)).unwrap();
        s.update_flow(a(1), a(2), FlowRate(7)).unwrap();
        assert_eq!(s.get_flow_rate(a(1), a(2)), FlowRate(7));
        s.delete_flow(a(1), a(2)).unwrap();
        assert_eq!(s.get_flow_rate(a(1), a(2)), FlowRate::ZERO);
    }

    #[test]
    fn claimable_accrues_with_time() {
        let mut s = InMemoryStream::new();
        s.mint(a(1), Amount(1_000_000));
        let pool = s.create_pool(a(1));
        s.update_member_units(pool, a(2), Units(1));
        s.update_member_units(pool, a(3), Units(3));
        s.distribute_flow(a(1), pool, FlowRate(4)).unwrap();
        s.advance_time(10);
        assert_eq!(s.claimable_now(pool, a(2)).0, Amount(10));
        assert_eq!(s.claimable_now(pool, a(3)).0, Amount(30));
    }

    #[test]
    fn transfer_fails_on_insufficient_balance() {
        let mut s = InMemoryStream::new();
        s.mint(a(1), Amount(10));
        assert!(!s.transfer(a(1), a(2), Amount(11)));
        assert!(s.transfer(a(1), a(2), Amount(10)));
        assert_eq!(s.balance_of(a(2)), Amount(10));
    }

    #[test]
    fn connect_pool_requires_known_pool() {
        let mut s = InMemoryStream::new();
        assert!(!s.connect_pool(42, a(2)));
        let pool = s.create_pool(a(1));
        assert!(s.connect_pool(pool, a(2)));
    }

    #[test]
    fn net_flow_rate_sums_flows_and_pools() {
        let mut s = InMemoryStream::new();
        let pool = s.create_pool(a(1));
        s.update_member_units(pool, a(2), Units(1));
        s.distribute_flow(a(1), pool, FlowRate(100)).unwrap();
        s.create_flow(a(1), a(2), FlowRate(10)).unwrap();
        assert_eq!(s.net_flow_rate(a(1)), FlowRate(-110));
        assert_eq!(s.net_flow_rate(a(2)), FlowRate(110));
    }
}
