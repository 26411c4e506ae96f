//! Grey-box concolic round: for one popped seed, samples try-values at
//! the cursor, traces the branches those samples hit, fits a model to each
//! candidate branch, solves it into concrete byte-chunks, and scores the
//! resulting seeds' coverage.
//!
//! Performs the sample/group/solve/execute/relocate pipeline for one round,
//! split across named functions below. Requires `std` (process spawning via
//! [`Executor`]).
#![cfg(feature = "std")]

use std::vec::Vec;

use alloc::collections::BTreeMap;
use alloc::vec;

use libafl_bolts::rands::Rand;

use crate::bigint::{bytes_to_bigint, Endian};
use crate::branch::{
    branch_info, BranchInfo, BranchPoint, CompareType, CoverageGain, Direction, Priority, Signal,
    Signedness,
};
use crate::byteval::ByteVal;
use crate::error::Error;
use crate::executor::Executor;
use crate::model::monotonicity::{self, Monotonicity};
use crate::model::Context;
use crate::options::FuzzOption;
use crate::queue::test_case::{SaveKind, TestCaseStore};
use crate::queue::SeedQueue;
use crate::seed::Seed;
use crate::solver::{self, ModelOutcome};

/// Extra executions the monotonic binary search for one branch will spend
/// narrowing its bracket before giving up and taking the current midpoint.
const MAX_MONOTONIC_BYTE_LEN: u32 = 4;

/// One round's execution/test-case bookkeeping, fed back into the
/// scheduler's fairness clock by the caller.
#[derive(Clone, Copy, Debug, Default)]
pub struct RoundStats {
    pub execs: u64,
    pub test_cases: u64,
}

/// Draws `n_spawn` try-values uniformly from the current cursor byte's
/// allowed range under `seed`'s [`crate::byteval::InputSource`].
fn sample_try_values(rand: &mut impl Rand, seed: &Seed, n_spawn: usize) -> Vec<u8> {
    let (lo, hi) = seed.get_cur_byte_val().min_max(seed.source());
    let span = u64::from(hi) - u64::from(lo) + 1;
    (0..n_spawn).map(|_| lo + rand.below(span) as u8).collect()
}

/// Assigns each record in one execution's branch trace a per-address visit
/// index, first occurrence of `inst_addr` in this trace getting `idx = 0`,
/// the second `idx = 1`, and so on — the per-run half of a [`BranchPoint`].
fn indexed_branch_points(trace: &[BranchInfo]) -> Vec<(BranchPoint, BranchInfo)> {
    let mut seen: BTreeMap<u64, u32> = BTreeMap::new();
    trace
        .iter()
        .map(|info| {
            let idx = seen.entry(info.inst_addr).or_insert(0);
            let point = BranchPoint { addr: info.inst_addr, idx: *idx };
            *idx += 1;
            (point, info.clone())
        })
        .collect()
}

/// Groups every sampled run's branch trace by [`BranchPoint`], accumulating
/// one `Vec<BranchInfo>` of observed samples per point across all runs.
fn group_by_branch_point(traces: &[Vec<BranchInfo>]) -> BTreeMap<BranchPoint, Vec<BranchInfo>> {
    let mut grouped: BTreeMap<BranchPoint, Vec<BranchInfo>> = BTreeMap::new();
    for trace in traces {
        for (point, info) in indexed_branch_points(trace) {
            grouped.entry(point).or_default().push(info);
        }
    }
    grouped
}

/// Picks at most `n_solve` branch points worth modeling: those with 3+
/// samples, ranked by how many runs they actually appeared in (most first),
/// ties broken by `BranchPoint` so the selection is deterministic across
/// identical reruns.
fn select_candidates(
    grouped: BTreeMap<BranchPoint, Vec<BranchInfo>>,
    n_solve: usize,
) -> Vec<(BranchPoint, Vec<BranchInfo>)> {
    let mut candidates: Vec<(BranchPoint, Vec<BranchInfo>)> =
        grouped.into_iter().filter(|(_, samples)| samples.len() >= 3).collect();
    candidates.sort_by(|a, b| {
        b.1.len().cmp(&a.1.len()).then(a.0.addr.cmp(&b.0.addr)).then(a.0.idx.cmp(&b.0.idx))
    });
    candidates.truncate(n_solve);
    candidates
}

/// Whether `samples`' constant operand is `operand1` (so the branch's other,
/// varying operand is `operand2`) — the same split `model::monotonicity::find`
/// uses to decide which operand to track, needed again here so the binary
/// search can interpret each new observation the same way.
fn target_is_operand1(samples: &[BranchInfo]) -> bool {
    let head = &samples[0];
    samples.iter().all(|s| s.operand1 == head.operand1)
}

/// Narrows a [`Monotonicity`] bracket with new executions at its midpoint
/// until it collapses or [`MAX_MONOTONIC_BYTE_LEN`] is reached. Each iteration re-executes `seed` with the midpoint chunk fixed
/// at the cursor and looks the branch back up in the resulting trace by its
/// [`BranchPoint`]; if the branch no longer fires (control flow diverged
/// enough that this `BranchPoint` wasn't hit), the search stops where it is.
///
/// # Errors
/// Propagates [`Error`] from re-executing the target.
fn binary_search_monotonic(
    opt: &FuzzOption,
    executor: &mut Executor,
    seed: &Seed,
    cursor_dir: Direction,
    point: BranchPoint,
    samples: &[BranchInfo],
    mut mono: Monotonicity,
) -> Result<(Monotonicity, u64), Error> {
    let head = &samples[0];
    let sign = if head.branch_type == CompareType::UnsignedSize {
        Signedness::Unsigned
    } else {
        Signedness::Signed
    };
    let op1_is_target = target_is_operand1(samples);

    let mut execs = 0u64;
    while !solver::monotonic_search_exhausted(&mono, MAX_MONOTONIC_BYTE_LEN) {
        let bytes = solver::monotonic_midpoint_bytes(&mono);
        let x = bytes_to_bigint(Endian::BE, &bytes);
        let Ok(candidate) = seed.fix_cur_bytes(cursor_dir, &bytes) else {
            break;
        };
        let exec = executor.execute_branch(opt, &candidate, false)?;
        execs += 1;
        let Some((_, info)) =
            indexed_branch_points(&exec.branches).into_iter().find(|(p, _)| *p == point)
        else {
            break;
        };
        let y = if op1_is_target {
            branch_info::interpret_as(sign, info.operand_size, info.operand2)
        } else {
            branch_info::interpret_as(sign, info.operand_size, info.operand1)
        };
        mono = monotonicity::update(mono, x, y);
    }
    Ok((mono, execs))
}

/// Runs one grey-box concolic round for `seed`, popped from `queue` at
/// `priority`: samples the cursor byte, fits and solves models for the
/// branches those samples traced, executes and classifies every resulting
/// candidate seed, persists the worthwhile ones via `test_cases`, and
/// re-enqueues survivors (plus the popped seed itself, stepped forward) into
/// `queue`.
///
/// # Errors
/// Returns [`Error::InvalidArgument`] if `seed`'s cursor direction is
/// `Direction::Stay`; otherwise propagates [`Error`]s from the executor
/// (recoverable ones, like [`Error::Timeout`], are intended to be caught
/// by the caller per [`Error::is_recoverable`] and treated as a dropped
/// round, not retried here).
#[allow(clippy::too_many_arguments)]
pub fn run_round(
    opt: &FuzzOption,
    rand: &mut impl Rand,
    executor: &mut Executor,
    test_cases: &mut TestCaseStore,
    queue: &mut SeedQueue,
    priority: Priority,
    seed: &Seed,
) -> Result<RoundStats, Error> {
    let mut stats = RoundStats::default();
    let cursor_dir = seed.get_byte_cursor_dir();
    if cursor_dir == Direction::Stay {
        return Err(Error::invalid_argument(
            "run_round() requires a seed whose cursor_dir is Left or Right",
        ));
    }

    // 1-2. Sample n_spawn try-values and fetch each one's branch trace.
    let try_values = sample_try_values(rand, seed, opt.n_spawn);
    let mut traces = Vec::with_capacity(try_values.len());
    for &v in &try_values {
        let mut trial = seed.clone();
        trial.update_cur_byte_inplace(ByteVal::Sampled { v });
        let exec = executor.execute_branch(opt, &trial, false)?;
        stats.execs += 1;
        traces.push(exec.branches);
    }

    // 3. Group by BranchPoint and cap the candidate count at n_solve.
    let candidates = select_candidates(group_by_branch_point(&traces), opt.n_solve);

    let update_bound = seed.query_update_bound(cursor_dir)?;
    let neighbor_bytes: Vec<u8> =
        seed.query_neighbor_bytes(cursor_dir)?.into_iter().take(update_bound).collect();
    let ctx = Context { bytes: neighbor_bytes, byte_dir: cursor_dir };

    // 4. Fit and solve a model per candidate branch, collecting every
    // resulting candidate seed.
    let mut candidate_seeds: Vec<Seed> = Vec::new();
    for (point, samples) in &candidates {
        let outcome = solver::fit(&ctx, samples)?;
        let chunks: Vec<Vec<u8>> = match outcome {
            ModelOutcome::NoModel | ModelOutcome::NonLinear => continue,
            ModelOutcome::Equation(eq) => solver::equation_candidates(&eq),
            ModelOutcome::Inequality(ineq) => solver::inequality_candidates(&ineq),
            ModelOutcome::Monotonic(mono) => {
                let (narrowed, execs) =
                    binary_search_monotonic(opt, executor, seed, cursor_dir, *point, samples, mono)?;
                stats.execs += execs;
                vec![solver::monotonic_midpoint_bytes(&narrowed)]
            }
        };
        for chunk in chunks {
            if let Ok(candidate) = seed.fix_cur_bytes(cursor_dir, &chunk) {
                candidate_seeds.push(candidate);
            }
        }
    }

    // 5-7. Execute, classify, persist, and relocate every candidate.
    for candidate in candidate_seeds {
        let exec = executor.execute_branch(opt, &candidate, true)?;
        stats.execs += 1;

        if let Some(kind) = test_cases.save(&candidate, exec.signal, exec.coverage_gain, None)? {
            if kind == SaveKind::Queue {
                stats.test_cases += 1;
            }
            if matches!(exec.coverage_gain, CoverageGain::NewEdge) {
                log::debug!("new edge found at cursor {}", candidate.cursor_pos());
            }
        }

        if exec.signal == Signal::Normal {
            if let Some(new_priority) = Priority::of_coverage_gain(exec.coverage_gain) {
                for relocated in candidate.relocate_cursor() {
                    queue.enqueue_inplace(new_priority, relocated);
                }
            }
        }
    }

    // 8. Step the source seed's cursor forward and re-enqueue at its own priority.
    let mut stepped = seed.clone();
    if stepped.proceed_cursor_inplace() {
        queue.enqueue_inplace(priority, stepped);
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::CompareType;
    use crate::bigint::BigInt;
    use crate::byteval::InputSource;
    use libafl_bolts::rands::StdRand;

    fn br(addr: u64, try_value: u64, operand1: u64, operand2: u64) -> BranchInfo {
        BranchInfo {
            inst_addr: addr,
            branch_type: CompareType::Equality,
            try_value: BigInt::from(try_value),
            operand_size: 1,
            operand1,
            operand2,
            distance: BigInt::zero(),
        }
    }

    #[test]
    fn indexed_branch_points_assigns_sequential_idx_per_address() {
        let trace = vec![br(0x100, 1, 1, 1), br(0x200, 1, 1, 1), br(0x100, 2, 2, 2)];
        let points = indexed_branch_points(&trace);
        assert_eq!(points[0].0, BranchPoint { addr: 0x100, idx: 0 });
        assert_eq!(points[1].0, BranchPoint { addr: 0x200, idx: 0 });
        assert_eq!(points[2].0, BranchPoint { addr: 0x100, idx: 1 });
    }

    #[test]
    fn group_by_branch_point_accumulates_across_traces() {
        let traces = vec![
            vec![br(0x100, 1, 1, 1)],
            vec![br(0x100, 2, 1, 2)],
            vec![br(0x100, 3, 1, 3)],
        ];
        let grouped = group_by_branch_point(&traces);
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[&BranchPoint { addr: 0x100, idx: 0 }].len(), 3);
    }

    #[test]
    fn select_candidates_drops_branches_with_under_three_samples() {
        let mut grouped = BTreeMap::new();
        grouped.insert(BranchPoint { addr: 1, idx: 0 }, vec![br(1, 1, 1, 1), br(1, 2, 1, 2)]);
        grouped.insert(
            BranchPoint { addr: 2, idx: 0 },
            vec![br(2, 1, 1, 1), br(2, 2, 1, 2), br(2, 3, 1, 3)],
        );
        let selected = select_candidates(grouped, 5);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].0, BranchPoint { addr: 2, idx: 0 });
    }

    #[test]
    fn select_candidates_caps_at_n_solve() {
        let mut grouped = BTreeMap::new();
        for addr in 0..5u64 {
            grouped.insert(
                BranchPoint { addr, idx: 0 },
                vec![br(addr, 1, 1, 1), br(addr, 2, 1, 2), br(addr, 3, 1, 3)],
            );
        }
        let selected = select_candidates(grouped, 2);
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn sample_try_values_stay_within_source_range() {
        let mut rand = StdRand::with_seed(42);
        let seed = Seed::with_bytes(InputSource::StdInput, b"abc").unwrap();
        let values = sample_try_values(&mut rand, &seed, 50);
        assert_eq!(values.len(), 50);
        assert!(values.iter().all(|&v| v <= 127));
    }

    #[test]
    fn target_is_operand1_detects_the_constant_side() {
        let samples = [br(1, 1, 42, 1), br(1, 2, 42, 2), br(1, 3, 42, 3)];
        assert!(target_is_operand1(&samples));
        let samples2 = [br(1, 1, 1, 42), br(1, 2, 2, 42), br(1, 3, 3, 42)];
        assert!(!target_is_operand1(&samples2));
    }
}
