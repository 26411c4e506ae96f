//! Inequality solving: when an exact equation solution doesn't exist, finds
//! an interval `[low, high]` straddling the point where the modeled operand
//! would cross its target.
//!
use alloc::vec::Vec;

use crate::bigint::{bytes_to_bigint, BigInt, Endian, Fraction};
use crate::branch::{branch_info, BranchInfo, CompareType, Signedness};
use crate::error::Error;

use super::linear_equation::{self, LinearEquation};
use super::linearity::{find_common_slope, Linearity};
use super::Context;

#[derive(Clone, Debug)]
enum Result_ {
    NonLinear,
    Unsolvable,
    Solvable(SimpleLinearInequality),
}

/// The "loose" half of a [`LinearInequality`]: a list of `(low, high)` split
/// points bracketing where the target crosses, one per wrap-sibling tried.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SimpleLinearInequality {
    pub endian: Endian,
    pub chunk_size: usize,
    pub linearity: Linearity,
    pub split_points: Vec<(BigInt, BigInt)>,
}

/// A modeled inequality: an exact equation solution when one exists
/// (`tight_inequality`), the interval-based fallback when it doesn't
/// (`loose_inequality`), or both.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LinearInequality {
    pub tight_inequality: Option<LinearEquation>,
    pub loose_inequality: Option<SimpleLinearInequality>,
    pub sign: Signedness,
}

fn concat_bytes(chunk_size: usize, br_info: &BranchInfo, ctx: &Context) -> Result<Vec<u8>, Error> {
    linear_equation::concat_bytes(chunk_size, br_info, ctx)
}

fn solve_aux(slope: &Fraction, x0: &BigInt, y0: &BigInt, target_y: &BigInt) -> Option<(BigInt, BigInt)> {
    let num = slope.numerator();
    let den = slope.denominator();
    let candidate = x0.clone() + (target_y.clone() - y0.clone()) * den.clone() / num.clone();
    let check_y = y0.clone() + (candidate.clone() - x0.clone()) * num.clone() / den.clone();

    if *target_y == check_y {
        Some((candidate.clone() - BigInt::from(1u64), candidate + BigInt::from(1u64)))
    } else if check_y > *target_y && !num.is_negative() && !num.is_zero() {
        Some((candidate.clone() - BigInt::from(1u64), candidate))
    } else if check_y > *target_y && num.is_negative() {
        Some((candidate.clone(), candidate + BigInt::from(1u64)))
    } else if check_y < *target_y && !num.is_negative() && !num.is_zero() {
        Some((candidate.clone(), candidate + BigInt::from(1u64)))
    } else if check_y < *target_y && num.is_negative() {
        Some((candidate.clone() - BigInt::from(1u64), candidate))
    } else {
        None
    }
}

fn solve(
    slope: &Fraction,
    x0: &BigInt,
    y0: &BigInt,
    target_y: &BigInt,
    chunk_size: usize,
    cmp_size: usize,
    sign: Signedness,
) -> Vec<(BigInt, BigInt)> {
    let target_ys = match sign {
        Signedness::Signed => {
            let signed_wrap = branch_info::signed_max(cmp_size as u8) + BigInt::from(1u64);
            [-signed_wrap.clone(), target_y.clone(), signed_wrap]
        }
        Signedness::Unsigned => {
            let unsigned_wrap = branch_info::unsigned_max(cmp_size as u8) + BigInt::from(1u64);
            [BigInt::zero(), target_y.clone(), unsigned_wrap]
        }
    };

    let mut solved: Vec<(BigInt, BigInt)> = target_ys
        .into_iter()
        .filter_map(|y| solve_aux(slope, x0, y0, &y))
        .collect();
    solved.sort();
    solved.dedup();
    let max = branch_info::unsigned_max(chunk_size as u8);
    solved.retain(|(low, high)| !low.is_negative() && *high <= max);
    solved
}

fn generate(
    endian: Endian,
    chunk_size: usize,
    cmp_size: usize,
    slope: Fraction,
    target_y: BigInt,
    x0: BigInt,
    y0: BigInt,
    sign: Signedness,
) -> Result_ {
    let sols = solve(&slope, &x0, &y0, &target_y, chunk_size, cmp_size, sign);
    if sols.is_empty() {
        Result_::Unsolvable
    } else {
        Result_::Solvable(SimpleLinearInequality {
            endian,
            chunk_size,
            linearity: Linearity { slope, x0, y0, target: target_y },
            split_points: sols,
        })
    }
}

fn find_as_n_byte_chunk(
    ctx: &Context,
    endian: Endian,
    chunk_size: usize,
    br1: &BranchInfo,
    br2: &BranchInfo,
    br3: &BranchInfo,
) -> Result<Result_, Error> {
    let cmp_size = br1.operand_size as usize;
    let sign = if br1.branch_type == CompareType::SignedSize { Signedness::Signed } else { Signedness::Unsigned };
    if ctx.bytes.len() < chunk_size - 1 {
        return Err(Error::invalid_argument("Invalid size"));
    }
    let x1 = bytes_to_bigint(endian, &concat_bytes(chunk_size, br1, ctx)?);
    let x2 = bytes_to_bigint(endian, &concat_bytes(chunk_size, br2, ctx)?);
    let x3 = bytes_to_bigint(endian, &concat_bytes(chunk_size, br3, ctx)?);

    if br1.operand1 == br2.operand1 && br2.operand1 == br3.operand1 {
        let y1 = branch_info::interpret_as(sign, br1.operand_size, br1.operand2);
        let y2 = branch_info::interpret_as(sign, br2.operand_size, br2.operand2);
        let y3 = branch_info::interpret_as(sign, br3.operand_size, br3.operand2);
        let slope = find_common_slope(cmp_size, &x1, &x2, &x3, &y1, &y2, &y3)?;
        if slope.numerator().is_zero() {
            return Ok(Result_::NonLinear);
        }
        let target_y = BigInt::from(br1.operand1);
        Ok(generate(endian, chunk_size, cmp_size, slope, target_y, x1, y1, sign))
    } else if br1.operand2 == br2.operand2 && br2.operand2 == br3.operand2 {
        let y1 = branch_info::interpret_as(sign, br1.operand_size, br1.operand1);
        let y2 = branch_info::interpret_as(sign, br2.operand_size, br2.operand1);
        let y3 = branch_info::interpret_as(sign, br3.operand_size, br3.operand1);
        let slope = find_common_slope(cmp_size, &x1, &x2, &x3, &y1, &y2, &y3)?;
        if slope.numerator().is_zero() {
            return Ok(Result_::NonLinear);
        }
        let target_y = BigInt::from(br1.operand2);
        Ok(generate(endian, chunk_size, cmp_size, slope, target_y, x1, y1, sign))
    } else {
        Ok(Result_::NonLinear)
    }
}

const CHUNK_SHAPES: [(Endian, usize); 7] = [
    (Endian::BE, 1),
    (Endian::BE, 2),
    (Endian::LE, 2),
    (Endian::BE, 4),
    (Endian::LE, 4),
    (Endian::BE, 8),
    (Endian::LE, 8),
];

fn find_aux(
    ctx: &Context,
    shapes: &[(Endian, usize)],
    triple: &[BranchInfo; 3],
) -> Result<Option<SimpleLinearInequality>, Error> {
    let Some((&(endian, chunk_size), rest)) = shapes.split_first() else {
        return Ok(None);
    };
    match find_as_n_byte_chunk(ctx, endian, chunk_size, &triple[0], &triple[1], &triple[2])? {
        Result_::NonLinear => Ok(None),
        Result_::Unsolvable => find_aux(ctx, rest, triple),
        Result_::Solvable(ineq) => Ok(Some(ineq)),
    }
}

fn find_loose(ctx: &Context, triple: &[BranchInfo; 3]) -> Result<Option<SimpleLinearInequality>, Error> {
    let max_len = ctx.bytes.len() + 1;
    let end = CHUNK_SHAPES.iter().position(|(_, size)| *size > max_len).unwrap_or(CHUNK_SHAPES.len());
    find_aux(ctx, &CHUNK_SHAPES[..end], triple)
}

/// Combines [`linear_equation::find`] (the `tight_inequality`) with the
/// interval-based [`find_loose`] (the `loose_inequality`); `None` only when
/// both come back empty.
///
/// # Errors
/// Propagates errors from either underlying search.
pub fn find(ctx: &Context, triple: &[BranchInfo; 3]) -> Result<Option<LinearInequality>, Error> {
    let tight = linear_equation::find(ctx, triple)?;
    let loose = find_loose(ctx, triple)?;
    if tight.is_none() && loose.is_none() {
        return Ok(None);
    }
    let sign = if triple[0].branch_type == CompareType::SignedSize { Signedness::Signed } else { Signedness::Unsigned };
    Ok(Some(LinearInequality { tight_inequality: tight, loose_inequality: loose, sign }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::Direction;

    fn br(try_value: u64, operand1: u64, operand2: u64, branch_type: CompareType) -> BranchInfo {
        BranchInfo {
            inst_addr: 0,
            branch_type,
            try_value: BigInt::from(try_value),
            operand_size: 1,
            operand1,
            operand2,
            distance: BigInt::zero(),
        }
    }

    #[test]
    fn finds_loose_interval_when_no_exact_hit() {
        let ctx = Context { bytes: alloc::vec![], byte_dir: Direction::Right };
        // y = 2x + 1, target operand1 = 43 has no exact odd-x preimage issue-free here.
        let triple = [
            br(1, 3, 1, CompareType::UnsignedSize),
            br(2, 5, 2, CompareType::UnsignedSize),
            br(3, 7, 3, CompareType::UnsignedSize),
        ];
        let found = find(&ctx, &triple).unwrap();
        assert!(found.is_some());
    }
}
