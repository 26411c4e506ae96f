//! Fairness clock: when running alongside an AFL instance sharing the same
//! target, periodically measures this engine's own grey-box efficiency and
//! sleeps to give AFL a proportional share of CPU time.
//!
use crate::options::{RAND_FUZZ_EFFICIENCY, ROUND_SIZE, SLEEP_FACTOR_MAX, SLEEP_FACTOR_MIN};

/// Wall-clock anchor for one scheduling round, plus the counters it reads at
/// round end. Threaded explicitly through the caller rather than kept as
/// module-level statics, so the engine stays free of global mutable state.
#[derive(Clone, Debug)]
pub struct Scheduler {
    round_start: u64,
}

impl Scheduler {
    /// Starts a new fairness clock, anchored at `now_millis`.
    #[must_use]
    pub fn new(now_millis: u64) -> Self {
        Self { round_start: now_millis }
    }

    /// Fraction of this round's executions that produced a new test case.
    /// `round_execs == 0` is treated as zero efficiency rather than dividing
    /// by zero.
    fn decide_sleep_factor(round_execs: u64, round_tcs: u64) -> f64 {
        let grey_conc_efficiency = if round_execs == 0 { 0.0 } else { round_tcs as f64 / round_execs as f64 };
        log::info!("grey-box concolic efficiency = {grey_conc_efficiency}");
        // GREY_CONC_EFF : RAND_FUZZ_EFF = 1 : 2 * factor + 1
        let factor = if grey_conc_efficiency == 0.0 {
            SLEEP_FACTOR_MAX
        } else {
            (RAND_FUZZ_EFFICIENCY / grey_conc_efficiency - 1.0) / 2.0
        };
        factor.max(SLEEP_FACTOR_MIN).min(SLEEP_FACTOR_MAX)
    }

    /// Checks whether a round's execution budget ([`ROUND_SIZE`]) has been
    /// used up and, if so, computes and returns how long to sleep (in
    /// milliseconds) to rebalance resource use with AFL. Resets `self`'s
    /// round anchor to `now_millis` whenever it fires.
    ///
    /// Callers are responsible for actually sleeping: this crate has no
    /// platform-sleep primitive of its own (see `executor`'s `std`-gated
    /// process spawning for the analogous split).
    #[must_use]
    pub fn check_and_reserve_time(&mut self, now_millis: u64, round_execs: u64, round_tcs: u64) -> Option<u64> {
        if round_execs <= ROUND_SIZE {
            return None;
        }
        let sleep_factor = Self::decide_sleep_factor(round_execs, round_tcs);
        let round_elapsed = now_millis.saturating_sub(self.round_start);
        let sleep_time = (round_elapsed as f64 * sleep_factor) as u64;
        log::info!(
            "elapsed round time: {} sec, decided sleep time: {} sec",
            round_elapsed / 1000,
            sleep_time / 1000
        );
        self.round_start = now_millis;
        Some(sleep_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_round_size_does_nothing() {
        let mut sched = Scheduler::new(0);
        let out = sched.check_and_reserve_time(1000, 5, 5);
        assert!(out.is_none());
    }

    #[test]
    fn zero_efficiency_sleeps_at_max_factor() {
        let mut sched = Scheduler::new(0);
        let out = sched.check_and_reserve_time(10_000, 20_000, 0).unwrap();
        assert_eq!(out, (10_000.0 * SLEEP_FACTOR_MAX) as u64);
    }

    #[test]
    fn round_anchor_resets_after_firing() {
        let mut sched = Scheduler::new(0);
        let _ = sched.check_and_reserve_time(10_000, 20_000, 1);
        assert_eq!(sched.round_start, 10_000);
    }
}
