//! Bounded integer arithmetic for rate and unit bookkeeping.
//!
//! All scaling uses floor division (truncation toward zero on non-negative
//! inputs). Remainders are never discarded implicitly: callers that split a
//! quantity compute the last share as the remainder, so the parts always sum
//! to the whole.

use crate::{Amount, Bps, FlowError, FlowRate, Result, Units, BPS_U128};

/// `floor(a * b / denom)` with u128 range checks on the intermediate product.
pub fn mul_div_floor_u128(a: u128, b: u128, denom: u128) -> Result<u128> {
    if denom == 0 {
        return Err(FlowError::Overflow("division by zero".into()));
    }
    let num = a
        .checked_mul(b)
        .ok_or_else(|| FlowError::Overflow("u128 overflow in mul".into()))?;
    Ok(num / denom)
}

pub fn add_u128(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b)
        .ok_or_else(|| FlowError::Overflow("u128 overflow in add".into()))
}

pub fn sub_u128(a: u128, b: u128) -> Result<u128> {
    a.checked_sub(b)
        .ok_or_else(|| FlowError::Overflow("u128 underflow in sub".into()))
}

/// Scale a non-negative flow rate by basis points, rounding down.
///
/// Preconditions:
/// - `rate >= 0` (negative rates are rejected upstream; this function treats
///   a negative input as a caller bug and fails closed).
pub fn scale_flow_rate(rate: FlowRate, bps: Bps) -> Result<FlowRate> {
    if rate.get() < 0 {
        return Err(FlowError::FlowRateNegative);
    }
    let scaled = mul_div_floor_u128(rate.get() as u128, bps.as_u128(), BPS_U128)?;
    // Floor-scaling by bps <= 10_000 never exceeds the input, which already
    // fits in i128.
    Ok(FlowRate(scaled as i128))
}

/// Validate that a desired gross rate is streamable.
pub fn validate_gross_rate(rate: FlowRate) -> Result<()> {
    if rate.get() < 0 {
        return Err(FlowError::FlowRateNegative);
    }
    if rate.get() > FlowRate::MAX_STREAMABLE {
        return Err(FlowError::FlowRateTooHigh { rate: rate.get() });
    }
    Ok(())
}

/// Apply a safety margin (bps of scale, `>= 10_000`) to a buffer requirement.
///
/// The 5% default over-provisions against the primitive's own rounding and
/// the extra buffer a child's manager-reward sub-flow will separately need.
pub fn buffer_with_margin(buffer: Amount, margin_bps: u32) -> Result<Amount> {
    Ok(Amount(mul_div_floor_u128(
        buffer.get(),
        margin_bps as u128,
        BPS_U128,
    )?))
}

/// Vote-weight scaling denominator: weights are 1e18-scale token amounts and
/// pool units are kept 1e15 times coarser to stay well inside `uint128`.
pub const UNITS_DOWNSCALE: u128 = 1_000_000_000_000_000;

/// Convert a vote weight share into pool units:
/// `floor(weight * bps / 10_000 / 1e15)`.
pub fn units_for_allocation(weight: Amount, bps: Bps) -> Result<Units> {
    let scaled = mul_div_floor_u128(weight.get(), bps.as_u128(), BPS_U128)?;
    Ok(Units(scaled / UNITS_DOWNSCALE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn mul_div_floor_rejects_zero_denominator() {
        assert!(mul_div_floor_u128(1, 1, 0).is_err());
    }

    #[test]
    fn scale_flow_rate_floors() {
        // 1001 * 3333 / 10000 = 333.6333 -> 333
        let r = scale_flow_rate(FlowRate(1001), Bps::new(3_333).unwrap()).unwrap();
        assert_eq!(r.get(), 333);
    }

    #[test]
    fn scale_flow_rate_rejects_negative() {
        assert_eq!(
            scale_flow_rate(FlowRate(-1), Bps::ZERO),
            Err(FlowError::FlowRateNegative)
        );
    }

    #[test]
    fn gross_rate_bounds() {
        assert!(validate_gross_rate(FlowRate(0)).is_ok());
        assert!(validate_gross_rate(FlowRate(FlowRate::MAX_STREAMABLE)).is_ok());
        assert_eq!(
            validate_gross_rate(FlowRate(-5)),
            Err(FlowError::FlowRateNegative)
        );
        assert!(matches!(
            validate_gross_rate(FlowRate(FlowRate::MAX_STREAMABLE + 1)),
            Err(FlowError::FlowRateTooHigh { .. })
        ));
    }

    #[test]
    fn buffer_margin_five_percent() {
        let b = buffer_with_margin(Amount(1_000), 10_500).unwrap();
        assert_eq!(b.get(), 1_050);
    }

    #[test]
    fn units_for_allocation_matches_reference() {
        // weight 1e18, 5000 bps -> 5e17 / 1e15 = 500 units
        let u = units_for_allocation(
            Amount(1_000_000_000_000_000_000),
            Bps::new(5_000).unwrap(),
        )
        .unwrap();
        assert_eq!(u.get(), 500);
    }

    proptest! {
        #[test]
        fn scaled_rate_never_exceeds_input(
            rate in 0i128..=FlowRate::MAX_STREAMABLE,
            bps in 0u16..=10_000u16,
        ) {
            let scaled = scale_flow_rate(FlowRate(rate), Bps::new(bps).unwrap()).unwrap();
            prop_assert!(scaled.get() <= rate);
            prop_assert!(scaled.get() >= 0);
        }

        #[test]
        fn units_monotone_in_bps(
            weight in 0u128..=u64::MAX as u128,
            b1 in 0u16..=10_000u16,
            b2 in 0u16..=10_000u16,
        ) {
            let (lo, hi) = if b1 <= b2 { (b1, b2) } else { (b2, b1) };
            let u_lo = units_for_allocation(Amount(weight), Bps::new(lo).unwrap()).unwrap();
            let u_hi = units_for_allocation(Amount(weight), Bps::new(hi).unwrap()).unwrap();
            prop_assert!(u_lo.get() <= u_hi.get());
        }
    }
}
