//! Main fuzz loop: orchestrates the fairness clock, the seed queue, and one
//! grey-box concolic round per popped seed, until the wall-clock `timelimit`
//! runs out.
//!
//! Requires `std` (wall-clock time via the caller-supplied clock, filesystem
//! seeding).
#![cfg(feature = "std")]

use std::fs;
use std::path::PathBuf;
use std::string::String;
use std::vec::Vec;

use libafl_bolts::rands::Rand;

use crate::branch::Priority;
use crate::concolic;
use crate::error::Error;
use crate::executor::Executor;
use crate::options::{FuzzOption, SYNC_N};
use crate::queue::test_case::TestCaseStore;
use crate::queue::SeedQueue;
use crate::scheduler::Scheduler;
use crate::seed::Seed;
use crate::sync::SyncState;

/// Populates `queue` from `opt.input_dir` — one `Normal`-priority seed per
/// non-empty regular file found, visited in sorted order for determinism —
/// or, absent a supplied corpus (or if it turns out to contain nothing
/// usable), a single freshly-constructed [`Seed::new`].
///
/// # Errors
/// Propagates I/O errors listing or reading `opt.input_dir`.
fn seed_initial_queue(opt: &FuzzOption, queue: &mut SeedQueue) -> Result<(), Error> {
    let Some(input_dir) = &opt.input_dir else {
        queue.enqueue_inplace(Priority::Normal, Seed::new(opt.fuzz_source.clone()));
        return Ok(());
    };

    let mut paths: Vec<PathBuf> = fs::read_dir(input_dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let mut seeded_any = false;
    for path in paths {
        let bytes = fs::read(&path)?;
        if bytes.is_empty() {
            continue;
        }
        let seed = Seed::with_bytes(opt.fuzz_source.clone(), &bytes)?;
        queue.enqueue_inplace(Priority::Normal, seed);
        seeded_any = true;
    }
    if !seeded_any {
        queue.enqueue_inplace(Priority::Normal, Seed::new(opt.fuzz_source.clone()));
    }
    Ok(())
}

/// One assembled fuzzing session's mutable state: the seed worklist, the
/// executor (and the global coverage bitmap it owns), test-case
/// persistence, the fairness clock, and AFL-sync bookkeeping.
///
/// Exists for construction convenience only — [`fuzz_loop`] and
/// [`fuzz_until_empty`] destructure it back into independent `&mut`
/// bindings before entering their main loop, so the borrow checker sees
/// disjoint fields rather than a `&mut self` shared across every step.
pub struct FuzzState {
    pub queue: SeedQueue,
    pub executor: Executor,
    pub test_cases: TestCaseStore,
    pub scheduler: Scheduler,
    pub sync: SyncState,
}

impl FuzzState {
    /// # Errors
    /// Propagates I/O errors creating `opt.out_dir`'s subdirectories or
    /// seeding the initial queue from `opt.input_dir`.
    pub fn new(opt: &FuzzOption, now_millis: u64) -> Result<Self, Error> {
        let mut queue = SeedQueue::new();
        seed_initial_queue(opt, &mut queue)?;
        Ok(FuzzState {
            queue,
            executor: Executor::new(&opt.out_dir)?,
            test_cases: TestCaseStore::new(&opt.out_dir)?,
            scheduler: Scheduler::new(now_millis),
            sync: SyncState::new(),
        })
    }
}

/// Treats a recoverable round error as a logged, skipped round; propagates
/// anything else.
fn handle_round_error(err: Error) -> Result<(), Error> {
    if err.is_recoverable() {
        log::warn!("recovered from a bad round: {err}");
        Ok(())
    } else {
        Err(err)
    }
}

/// Runs concolic rounds until `opt.timelimit` seconds have elapsed
/// (`timelimit < 0` means unbounded — the loop then runs until the seed
/// queue empties, same end condition as [`fuzz_until_empty`]).
///
/// `now_millis`/`sleep_millis` are injected rather than calling
/// `std::time`/`std::thread::sleep` directly, so callers (including tests)
/// can drive a deterministic fake clock.
///
/// # Errors
/// Propagates any non-recoverable [`Error`] (per [`Error::is_recoverable`])
/// out of queue seeding, a concolic round, or AFL sync.
pub fn fuzz_loop(
    opt: &FuzzOption,
    rand: &mut impl Rand,
    mut now_millis: impl FnMut() -> u64,
    mut sleep_millis: impl FnMut(u64),
) -> Result<(), Error> {
    let start = now_millis();
    let FuzzState { mut queue, mut executor, mut test_cases, mut scheduler, mut sync } =
        FuzzState::new(opt, start)?;

    let mut round_execs: u64 = 0;
    let mut round_no: u64 = 0;

    loop {
        if opt.timelimit >= 0 {
            let elapsed_sec = now_millis().saturating_sub(start) / 1000;
            if elapsed_sec as i64 >= opt.timelimit {
                break;
            }
        }
        let Some((priority, seed)) = queue.dequeue_inplace() else {
            break;
        };
        if !seed.has_unfixed_byte() {
            continue;
        }

        match concolic::run_round(opt, rand, &mut executor, &mut test_cases, &mut queue, priority, &seed) {
            Ok(stats) => round_execs += stats.execs,
            Err(e) => handle_round_error(e)?,
        }

        round_no += 1;
        if round_no % SYNC_N == 0 {
            sync.run(opt, &mut queue, &mut |s| {
                let exec = executor.execute_coverage(opt, s)?;
                Ok((exec.signal, exec.coverage_gain))
            })?;
        }

        if let Some(sleep_ms) =
            scheduler.check_and_reserve_time(now_millis(), round_execs, test_cases.round_tcs)
        {
            sleep_millis(sleep_ms);
            round_execs = 0;
            test_cases.round_tcs = 0;
        }
    }
    Ok(())
}

/// Drains the seed queue completely with no wall-clock bound, no fairness
/// sleeping, and no AFL sync — a deterministic variant for replaying a
/// fixed corpus to exhaustion, distinct from the long-running fuzz loop
/// above.
///
/// # Errors
/// Propagates any non-recoverable [`Error`] out of queue seeding or a
/// concolic round.
pub fn fuzz_until_empty(opt: &FuzzOption, rand: &mut impl Rand) -> Result<(), Error> {
    let mut queue = SeedQueue::new();
    seed_initial_queue(opt, &mut queue)?;
    let mut executor = Executor::new(&opt.out_dir)?;
    let mut test_cases = TestCaseStore::new(&opt.out_dir)?;

    while let Some((priority, seed)) = queue.dequeue_inplace() {
        if !seed.has_unfixed_byte() {
            continue;
        }
        match concolic::run_round(opt, rand, &mut executor, &mut test_cases, &mut queue, priority, &seed) {
            Ok(_) => {}
            Err(e) => handle_round_error(e)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::Arch;
    use crate::byteval::InputSource;
    use alloc::collections::BTreeMap as Map;

    fn opt(out_dir: &str, input_dir: Option<String>) -> FuzzOption {
        FuzzOption {
            verbosity: 0,
            timelimit: -1,
            out_dir: out_dir.into(),
            sync_dir: None,
            target_prog: String::new(),
            exec_timeout: 1000,
            architecture: Arch::X64,
            fork_server: false,
            input_dir,
            arg: String::new(),
            fuzz_source: InputSource::StdInput,
            n_solve: 1,
            n_spawn: 1,
            splited_args: Map::new(),
            native_splited_args: Vec::new(),
        }
    }

    fn tmp_dir(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(std::format!("eclipser-fuzz-test-{name}-{:x}", std::process::id()));
        p
    }

    #[test]
    fn seeding_without_input_dir_enqueues_one_fresh_seed() {
        let dir = tmp_dir("no-input");
        let mut queue = SeedQueue::new();
        seed_initial_queue(&opt(dir.to_str().unwrap(), None), &mut queue).unwrap();
        assert!(!queue.is_empty());
        let (priority, seed) = queue.dequeue_inplace().unwrap();
        assert_eq!(priority, Priority::Normal);
        assert!(seed.has_unfixed_byte());
        assert!(queue.is_empty());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn seeding_from_input_dir_loads_every_nonempty_file() {
        let dir = tmp_dir("with-input");
        let corpus = dir.join("corpus");
        fs::create_dir_all(&corpus).unwrap();
        fs::write(corpus.join("a"), b"hello").unwrap();
        fs::write(corpus.join("b"), b"world").unwrap();
        fs::write(corpus.join("empty"), b"").unwrap();

        let mut queue = SeedQueue::new();
        seed_initial_queue(
            &opt(dir.to_str().unwrap(), Some(corpus.to_str().unwrap().into())),
            &mut queue,
        )
        .unwrap();

        let mut count = 0;
        while let Some((priority, _)) = queue.dequeue_inplace() {
            assert_eq!(priority, Priority::Normal);
            count += 1;
        }
        assert_eq!(count, 2);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn seeding_from_empty_input_dir_falls_back_to_a_fresh_seed() {
        let dir = tmp_dir("empty-input");
        let corpus = dir.join("corpus");
        fs::create_dir_all(&corpus).unwrap();

        let mut queue = SeedQueue::new();
        seed_initial_queue(
            &opt(dir.to_str().unwrap(), Some(corpus.to_str().unwrap().into())),
            &mut queue,
        )
        .unwrap();
        assert!(!queue.is_empty());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn fuzz_loop_stops_immediately_once_timelimit_has_elapsed() {
        let dir = tmp_dir("timelimit");
        let mut o = opt(dir.to_str().unwrap(), None);
        o.timelimit = 10;
        let mut rand = libafl_bolts::rands::StdRand::with_seed(1);
        // Clock already past the limit before the first iteration: the loop
        // must exit without ever touching the executor (no target_prog is
        // configured, so any execution attempt would fail).
        let result = fuzz_loop(&o, &mut rand, || 20_000, |_| {});
        assert!(result.is_ok());
        let _ = fs::remove_dir_all(&dir);
    }
}
