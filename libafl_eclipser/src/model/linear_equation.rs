//! Exact linear-equation solving: given a fitted slope and a target value,
//! finds integer byte-chunks that would make the branch's operand hit that
//! target exactly.
//!
use alloc::vec;
use alloc::vec::Vec;

use crate::bigint::{bytes_to_bigint, BigInt, Endian, Fraction};
use crate::branch::{branch_info, BranchInfo};
use crate::error::Error;

use super::linearity::{find_common_slope, Linearity};
use super::Context;

/// Outcome of trying to fit one chunk shape to a branch-info triple.
#[derive(Clone, Debug)]
pub enum EquationResult {
    NonLinear,
    Unsolvable,
    Solvable(LinearEquation),
}

/// A solved linear equation: one or more candidate byte-chunk values that
/// make the modeled operand hit its target exactly.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LinearEquation {
    pub endian: Endian,
    pub chunk_size: usize,
    pub linearity: Linearity,
    pub solutions: Vec<BigInt>,
}

/// Builds the `k`-byte sample for a chunk of `chunk_size` starting at the
/// cursor toward `ctx.byte_dir`, substituting this sample's try-value byte
/// in place of the live cursor byte.
///
/// # Errors
/// Returns [`Error::InvalidArgument`] for `Direction::Stay`.
pub fn concat_bytes(chunk_size: usize, br_info: &BranchInfo, ctx: &Context) -> Result<Vec<u8>, Error> {
    let try_byte = br_info.try_value.to_u64().unwrap_or(0) as u8;
    match ctx.byte_dir {
        crate::branch::Direction::Stay => {
            Err(Error::invalid_argument("Byte cursor cannot be staying"))
        }
        crate::branch::Direction::Left => {
            let len = ctx.bytes.len();
            let mut bytes = ctx.bytes[len + 1 - chunk_size..].to_vec();
            bytes.push(try_byte);
            Ok(bytes)
        }
        crate::branch::Direction::Right => {
            let mut bytes = vec![try_byte];
            bytes.extend_from_slice(&ctx.bytes[..chunk_size - 1]);
            Ok(bytes)
        }
    }
}

fn solve_aux(slope: &Fraction, x0: &BigInt, y0: &BigInt, target_y: &BigInt) -> Option<BigInt> {
    let num = slope.numerator();
    let den = slope.denominator();
    let candidate = x0.clone() + (target_y.clone() - y0.clone()) * den.clone() / num.clone();
    if target_y.clone() - y0.clone() == (candidate.clone() - x0.clone()) * num.clone() / den.clone() {
        Some(candidate)
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
) -> Vec<BigInt> {
    let unsigned_wrap = branch_info::unsigned_max(cmp_size as u8) + BigInt::from(1u64);
    let target_ys = [
        target_y.clone(),
        target_y.clone() + unsigned_wrap.clone(),
        target_y.clone() - unsigned_wrap,
    ];
    let mut solved: Vec<BigInt> = target_ys
        .into_iter()
        .filter_map(|y| solve_aux(slope, x0, y0, &y))
        .collect();
    solved.sort();
    solved.dedup();
    let max = branch_info::unsigned_max(chunk_size as u8);
    solved.retain(|v| !v.is_negative() && *v <= max);
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
) -> EquationResult {
    let sols = solve(&slope, &x0, &y0, &target_y, chunk_size, cmp_size);
    if sols.is_empty() {
        EquationResult::Unsolvable
    } else {
        EquationResult::Solvable(LinearEquation {
            endian,
            chunk_size,
            linearity: Linearity { slope, x0, y0, target: target_y },
            solutions: sols,
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
) -> Result<EquationResult, Error> {
    let cmp_size = br1.operand_size as usize;
    if ctx.bytes.len() < chunk_size - 1 {
        return Err(Error::invalid_argument("Invalid size"));
    }
    let x1 = bytes_to_bigint(endian, &concat_bytes(chunk_size, br1, ctx)?);
    let x2 = bytes_to_bigint(endian, &concat_bytes(chunk_size, br2, ctx)?);
    let x3 = bytes_to_bigint(endian, &concat_bytes(chunk_size, br3, ctx)?);

    if br1.operand1 == br2.operand1 && br2.operand1 == br3.operand1 {
        let (y1, y2, y3) = (
            BigInt::from(br1.operand2),
            BigInt::from(br2.operand2),
            BigInt::from(br3.operand2),
        );
        let slope = find_common_slope(cmp_size, &x1, &x2, &x3, &y1, &y2, &y3)?;
        if slope.numerator().is_zero() {
            return Ok(EquationResult::NonLinear);
        }
        let target_y = BigInt::from(br1.operand1);
        Ok(generate(endian, chunk_size, cmp_size, slope, target_y, x1, y1))
    } else if br1.operand2 == br2.operand2 && br2.operand2 == br3.operand2 {
        let (y1, y2, y3) = (
            BigInt::from(br1.operand1),
            BigInt::from(br2.operand1),
            BigInt::from(br3.operand1),
        );
        let slope = find_common_slope(cmp_size, &x1, &x2, &x3, &y1, &y2, &y3)?;
        if slope.numerator().is_zero() {
            return Ok(EquationResult::NonLinear);
        }
        let target_y = BigInt::from(br1.operand2);
        Ok(generate(endian, chunk_size, cmp_size, slope, target_y, x1, y1))
    } else {
        Ok(EquationResult::NonLinear)
    }
}

/// The seven chunk shapes tried in order: single bytes first, then widening
/// big- then little-endian multi-byte chunks.
const CHUNK_SHAPES: [(Endian, usize); 7] = [
    (Endian::BE, 1),
    (Endian::BE, 2),
    (Endian::LE, 2),
    (Endian::BE, 4),
    (Endian::LE, 4),
    (Endian::BE, 8),
    (Endian::LE, 8),
];

fn find_aux(ctx: &Context, shapes: &[(Endian, usize)], triple: &[BranchInfo; 3]) -> Result<Option<LinearEquation>, Error> {
    let Some((&(endian, chunk_size), rest)) = shapes.split_first() else {
        return Ok(None);
    };
    match find_as_n_byte_chunk(ctx, endian, chunk_size, &triple[0], &triple[1], &triple[2])? {
        EquationResult::NonLinear => Ok(None),
        EquationResult::Unsolvable => find_aux(ctx, rest, triple),
        EquationResult::Solvable(eq) => Ok(Some(eq)),
    }
}

/// Tries each chunk shape in [`CHUNK_SHAPES`] order (skipping shapes wider
/// than `ctx.bytes.len() + 1`), stopping at the first [`EquationResult::Solvable`]
/// and aborting the whole search the moment a shape comes back [`EquationResult::NonLinear`].
///
/// # Errors
/// Propagates [`Error::Unreachable`] from [`find_common_slope`] if the triple
/// is not sorted by `try_value`, and [`Error::InvalidArgument`] if `ctx`'s
/// cursor direction is `Stay`.
pub fn find(ctx: &Context, triple: &[BranchInfo; 3]) -> Result<Option<LinearEquation>, Error> {
    let max_len = ctx.bytes.len() + 1;
    let end = CHUNK_SHAPES.iter().position(|(_, size)| *size > max_len).unwrap_or(CHUNK_SHAPES.len());
    find_aux(ctx, &CHUNK_SHAPES[..end], triple)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::{CompareType, Direction};

    fn br(try_value: u64, operand1: u64, operand2: u64) -> BranchInfo {
        BranchInfo {
            inst_addr: 0,
            branch_type: CompareType::Equality,
            try_value: BigInt::from(try_value),
            operand_size: 1,
            operand1,
            operand2,
            distance: BigInt::zero(),
        }
    }

    #[test]
    fn solves_identity_relation_for_one_byte_chunk() {
        // operand2 == try_value exactly: y = x, target operand1 = 42.
        let ctx = Context { bytes: alloc::vec![0u8; 0], byte_dir: Direction::Right };
        let triple = [br(1, 42, 1), br(2, 42, 2), br(3, 42, 3)];
        let found = find(&ctx, &triple).unwrap();
        let eq = found.expect("expected a solvable one-byte chunk");
        assert!(eq.solutions.contains(&BigInt::from(42u64)));
    }

    #[test]
    fn nonlinear_triple_yields_no_solution() {
        let ctx = Context { bytes: alloc::vec![0u8; 0], byte_dir: Direction::Right };
        let triple = [br(1, 42, 7), br(2, 42, 3), br(3, 42, 900)];
        assert!(find(&ctx, &triple).unwrap().is_none());
    }
}
