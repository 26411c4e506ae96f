//! Turns a fitted branch model into concrete candidate byte-chunks a [`Seed`]
//! can be mutated with.
//!
//! `model::linear_equation`/`model::linear_inequality` already do the
//! chunk-shape search and hand back `BigInt` solutions; this module is the
//! thin layer that (a) picks which of equation/inequality/monotonicity
//! applies to a given run of samples and (b) converts their `BigInt` results
//! into the little/big-endian byte chunks `Seed::fix_cur_bytes` expects,
//! keeping `model` about fitting and this module about byte production.

use alloc::vec::Vec;

use crate::bigint::{bigint_to_bytes, BigInt, Endian};
use crate::branch::BranchInfo;
use crate::error::Error;
use crate::model::linear_equation::{self, LinearEquation};
use crate::model::linear_inequality::{self, LinearInequality};
use crate::model::monotonicity::{self, Monotonicity};
use crate::model::Context;

/// What modeling a branch's samples turned up.
#[derive(Clone, Debug)]
pub enum ModelOutcome {
    /// Fewer than 3 distinct try-values were observed for this branch.
    NoModel,
    /// The samples don't lie on a line at any chunk size; not worth
    /// retrying with more samples of the same branch.
    NonLinear,
    Equation(LinearEquation),
    Inequality(LinearInequality),
    Monotonic(Monotonicity),
}

/// Sorts `samples` by `try_value` and removes exact duplicates (repeated
/// try-values give no extra information to the modeler and would violate
/// `find_common_slope`'s strict-ordering precondition).
fn sort_and_dedup_by_try_value(samples: &[BranchInfo]) -> Vec<BranchInfo> {
    let mut sorted: Vec<BranchInfo> = samples.to_vec();
    sorted.sort_by(|a, b| a.try_value.cmp(&b.try_value));
    sorted.dedup_by(|a, b| a.try_value == b.try_value);
    sorted
}

/// Fits a model to one branch's observed samples: tries the linear-equation
/// path first, then linear-inequality, then falls back to monotonicity over
/// every de-duplicated sample rather than just the first three, since
/// monotonicity benefits from the fuller picture.
///
/// # Errors
/// Propagates [`Error::Unreachable`] from [`crate::model::linearity::find_common_slope`]
/// if `samples` somehow contains out-of-order entries after sorting (a
/// programmer-error bug in this function, not caller input), and
/// [`Error::InvalidArgument`] if `ctx`'s cursor direction is `Stay`.
pub fn fit(ctx: &Context, samples: &[BranchInfo]) -> Result<ModelOutcome, Error> {
    let sorted = sort_and_dedup_by_try_value(samples);
    if sorted.len() < 3 {
        return Ok(ModelOutcome::NoModel);
    }
    let triple = [sorted[0].clone(), sorted[1].clone(), sorted[2].clone()];

    if let Some(eq) = linear_equation::find(ctx, &triple)? {
        return Ok(ModelOutcome::Equation(eq));
    }
    if let Some(ineq) = linear_inequality::find(ctx, &triple)? {
        return Ok(ModelOutcome::Inequality(ineq));
    }
    if let Some(mono) = monotonicity::find(&sorted)? {
        return Ok(ModelOutcome::Monotonic(mono));
    }
    Ok(ModelOutcome::NonLinear)
}

/// Every solution of a [`LinearEquation`], rendered as a concrete byte chunk
/// in its own endianness/chunk-size.
#[must_use]
pub fn equation_candidates(eq: &LinearEquation) -> Vec<Vec<u8>> {
    eq.solutions
        .iter()
        .map(|v| bigint_to_bytes(eq.endian, eq.chunk_size, v.clone()))
        .collect()
}

/// Byte-chunk candidates for a [`LinearInequality`]: prefers the exact
/// `tight_inequality` solution set (identical to solving the equation
/// directly) and otherwise takes the midpoint of each `loose_inequality`
/// split-point pair, rounding toward the lower bound.
#[must_use]
pub fn inequality_candidates(ineq: &LinearInequality) -> Vec<Vec<u8>> {
    if let Some(eq) = &ineq.tight_inequality {
        return equation_candidates(eq);
    }
    let Some(loose) = &ineq.loose_inequality else {
        return Vec::new();
    };
    let two = BigInt::from(2u64);
    loose
        .split_points
        .iter()
        .map(|(low, high)| {
            let mid = (low.clone() + high.clone()) / two.clone();
            bigint_to_bytes(loose.endian, loose.chunk_size, mid)
        })
        .collect()
}

/// The midpoint try-value of a [`Monotonicity`] bracket, as a big-endian byte
/// chunk of its current `byte_len`. Monotonic brackets always narrow in
/// big-endian order (the byte being grown is the most significant one of an
/// ever-widening prefix), so there is no endianness choice here the way
/// there is for equation/inequality chunks.
#[must_use]
pub fn monotonic_midpoint_bytes(mono: &Monotonicity) -> Vec<u8> {
    let two = BigInt::from(2u64);
    let mid = (mono.lower_x.clone() + mono.upper_x.clone()) / two;
    bigint_to_bytes(Endian::BE, mono.byte_len as usize, mid)
}

/// `true` once a [`Monotonicity`] bracket can no longer be meaningfully
/// narrowed: the interval has collapsed to adjacent integers and growing the
/// byte width further would exceed `max_byte_len` (the concolic round's
/// cutoff on how many extra executions it will spend binary-searching one
/// branch).
#[must_use]
pub fn monotonic_search_exhausted(mono: &Monotonicity, max_byte_len: u32) -> bool {
    let collapsed = mono.upper_x.clone() - mono.lower_x.clone() <= BigInt::from(1u64);
    collapsed && mono.byte_len >= max_byte_len
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
    fn fit_reports_no_model_under_three_samples() {
        let ctx = Context { bytes: alloc::vec![], byte_dir: Direction::Right };
        let samples = [br(1, 1, 1), br(2, 2, 2)];
        assert!(matches!(fit(&ctx, &samples).unwrap(), ModelOutcome::NoModel));
    }

    #[test]
    fn fit_prefers_equation_over_inequality() {
        let ctx = Context { bytes: alloc::vec![], byte_dir: Direction::Right };
        let samples = [br(1, 42, 1), br(2, 42, 2), br(3, 42, 3)];
        let outcome = fit(&ctx, &samples).unwrap();
        assert!(matches!(outcome, ModelOutcome::Equation(_)));
    }

    #[test]
    fn equation_candidates_render_expected_bytes() {
        let ctx = Context { bytes: alloc::vec![], byte_dir: Direction::Right };
        let triple = [br(1, 42, 1), br(2, 42, 2), br(3, 42, 3)];
        let eq = linear_equation::find(&ctx, &triple).unwrap().unwrap();
        let candidates = equation_candidates(&eq);
        assert!(candidates.contains(&alloc::vec![0x2au8]));
    }

    #[test]
    fn monotonic_midpoint_lies_between_bounds() {
        let mono = Monotonicity {
            lower_x: BigInt::from(10u64),
            lower_y: None,
            upper_x: BigInt::from(20u64),
            upper_y: None,
            target_y: BigInt::from(0u64),
            tendency: crate::model::monotonicity::Tendency::Incr,
            byte_len: 1,
        };
        let bytes = monotonic_midpoint_bytes(&mono);
        assert_eq!(bytes, alloc::vec![15u8]);
    }

    #[test]
    fn monotonic_search_exhausted_requires_both_collapse_and_byte_len() {
        let collapsed_small = Monotonicity {
            lower_x: BigInt::from(5u64),
            lower_y: None,
            upper_x: BigInt::from(6u64),
            upper_y: None,
            target_y: BigInt::from(0u64),
            tendency: crate::model::monotonicity::Tendency::Incr,
            byte_len: 1,
        };
        assert!(!monotonic_search_exhausted(&collapsed_small, 2));
        assert!(monotonic_search_exhausted(&collapsed_small, 1));
    }
}
