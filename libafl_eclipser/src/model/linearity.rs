//! Shared slope-inference core: fits a line through three samples of one
//! branch, tolerating a single wrap-around at the compared operand's width.
//!
use crate::bigint::{BigInt, Fraction};
use crate::error::Error;

/// A fitted line: `y = y0 + slope * (x - x0)`, plus the `target` value of
/// `y` the caller is trying to hit. Shared by [`super::linear_equation`] and
/// [`super::linear_inequality`] results.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Linearity {
    pub slope: Fraction,
    pub x0: BigInt,
    pub y0: BigInt,
    pub target: BigInt,
}

fn calc_slope(x1: &BigInt, x2: &BigInt, y1: &BigInt, y2: &BigInt) -> Fraction {
    Fraction::new(y2.clone() - y1.clone(), x2.clone() - x1.clone())
}

/// Infers a common slope across `(x1,y1) (x2,y2) (x3,y3)`, trying the four
/// wrap-repair cases before giving up.
///
/// Returns `Fraction::zero()` (numerator `0`) when no slope fits even after
/// considering wrap-around: callers treat a zero numerator as `NonLinear`.
///
/// # Errors
/// Returns [`Error::Unreachable`] if `x1 >= x2` or `x2 >= x3`: callers must
/// always hand in samples already sorted by `x`.
pub fn find_common_slope(
    cmp_size: usize,
    x1: &BigInt,
    x2: &BigInt,
    x3: &BigInt,
    y1: &BigInt,
    y2: &BigInt,
    y3: &BigInt,
) -> Result<Fraction, Error> {
    if x1 >= x2 || x2 >= x3 {
        return Err(Error::unreachable("BranchInfo out of order"));
    }
    // The wrap modulus for a `cmp_size`-byte operand: one past its unsigned
    // max, matching the `unsigned_wrap` used by `linear_equation`/
    // `linear_inequality` for the same `cmp_size`.
    let wrapper = crate::branch::branch_info::unsigned_max(cmp_size as u8) + BigInt::from(1u64);
    let slope12 = calc_slope(x1, x2, y1, y2);
    let slope23 = calc_slope(x2, x3, y2, y3);

    if slope12 == slope23 {
        return Ok(slope12);
    }
    if y1 < y2 && y3 < y1 && calc_slope(x2, x3, y2, &(y3.clone() + wrapper.clone())) == slope12 {
        return Ok(slope12);
    }
    if y2 > y3 && y1 < y3 && calc_slope(x1, x2, &(y1.clone() + wrapper.clone()), y2) == slope23 {
        return Ok(slope23);
    }
    if y1 > y2 && y3 > y1 && calc_slope(x2, x3, y2, &(y3.clone() - wrapper.clone())) == slope12 {
        return Ok(slope12);
    }
    if y2 < y3 && y1 > y3 && calc_slope(x1, x2, &(y1.clone() - wrapper), y2) == slope23 {
        return Ok(slope23);
    }
    Ok(Fraction::zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_slope_with_no_wrap() {
        let s = find_common_slope(
            1,
            &BigInt::from(1u64),
            &BigInt::from(2u64),
            &BigInt::from(3u64),
            &BigInt::from(10u64),
            &BigInt::from(20u64),
            &BigInt::from(30u64),
        )
        .unwrap();
        assert_eq!(s, Fraction::new(BigInt::from(10u64), BigInt::from(1u64)));
    }

    #[test]
    fn out_of_order_samples_is_unreachable_error() {
        let r = find_common_slope(
            1,
            &BigInt::from(3u64),
            &BigInt::from(2u64),
            &BigInt::from(1u64),
            &BigInt::zero(),
            &BigInt::zero(),
            &BigInt::zero(),
        );
        assert!(matches!(r, Err(Error::Unreachable(..))));
    }

    #[test]
    fn nonlinear_samples_return_zero_slope() {
        let s = find_common_slope(
            1,
            &BigInt::from(1u64),
            &BigInt::from(2u64),
            &BigInt::from(3u64),
            &BigInt::from(10u64),
            &BigInt::from(5u64),
            &BigInt::from(999u64),
        )
        .unwrap();
        assert!(s.is_zero());
    }

    #[test]
    fn wrap_repair_case_recovers_descending_slope() {
        // y1 < y2, then y3 wraps back below y1: slope12 should still describe
        // the post-wrap sequence once W is added back to y3.
        let cmp_size = 1usize; // 1-byte operand, W = 256
        let w = BigInt::from(256u64);
        let y1 = BigInt::from(10u64);
        let y2 = BigInt::from(20u64);
        let y3_wrapped = BigInt::from(30u64) - w; // simulate wrap below y1
        let s = find_common_slope(
            cmp_size,
            &BigInt::from(1u64),
            &BigInt::from(2u64),
            &BigInt::from(3u64),
            &y1,
            &y2,
            &y3_wrapped,
        )
        .unwrap();
        assert_eq!(s, Fraction::new(BigInt::from(10u64), BigInt::from(1u64)));
    }
}
