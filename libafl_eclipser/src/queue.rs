//! The worklist of seeds awaiting their next concolic round: two FIFOs keyed
//! by [`Priority`], favoreds drained ahead of normals. Also the test-case
//! persistence layer (`TestCaseStore`, `std`-only) that decides which
//! directory under `out_dir` a classified execution's bytes land in.
//!
use alloc::collections::VecDeque;

use crate::branch::Priority;
use crate::seed::Seed;

/// Two deques, one per [`Priority`]. `Favored` seeds (those that found a new
/// edge) are always dequeued ahead of `Normal` ones.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct SeedQueue {
    favoreds: VecDeque<Seed>,
    normals: VecDeque<Seed>,
}

impl SeedQueue {
    #[must_use]
    pub fn new() -> Self {
        Self { favoreds: VecDeque::new(), normals: VecDeque::new() }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.favoreds.is_empty() && self.normals.is_empty()
    }

    pub fn enqueue_inplace(&mut self, priority: Priority, seed: Seed) {
        match priority {
            Priority::Favored => self.favoreds.push_back(seed),
            Priority::Normal => self.normals.push_back(seed),
        }
    }

    /// Pops the next seed to fuzz: favoreds first, falling back to normals.
    /// Returns the [`Priority`] of whichever deque it actually pulled from,
    /// so a requeued favored seed keeps its tier (see `DESIGN.md` for why
    /// this departs from returning a constant tag here).
    pub fn dequeue_inplace(&mut self) -> Option<(Priority, Seed)> {
        if let Some(seed) = self.favoreds.pop_front() {
            Some((Priority::Favored, seed))
        } else {
            self.normals.pop_front().map(|seed| (Priority::Normal, seed))
        }
    }
}

/// Test-case persistence: writes a seed's concrete bytes under the right
/// subdirectory of `out_dir` and keeps the monotonic `id:NNNNNN` counter plus
/// the per-round test-case count [`crate::scheduler::Scheduler`]'s fairness
/// clock divides by.
#[cfg(feature = "std")]
pub mod test_case {
    use std::fs;
    use std::path::PathBuf;
    use std::string::String;

    use crate::branch::{CoverageGain, Signal};
    use crate::error::Error;
    use crate::seed::Seed;

    /// Which subdirectory of `out_dir` a classified execution's bytes were
    /// written under.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub enum SaveKind {
        Queue,
        Crash,
        Hang,
    }

    #[derive(Debug)]
    pub struct TestCaseStore {
        out_dir: PathBuf,
        next_id: u32,
        /// Number of test cases saved (`Queue` only) during the current
        /// scheduler round; reset by the caller after each
        /// [`crate::scheduler::Scheduler::check_and_reserve_time`] firing.
        pub round_tcs: u64,
    }

    impl TestCaseStore {
        /// # Errors
        /// Propagates I/O errors creating `queue/`, `crashes/`, `hangs/`
        /// under `out_dir`.
        pub fn new(out_dir: impl Into<PathBuf>) -> Result<Self, Error> {
            let out_dir = out_dir.into();
            for sub in ["queue", "crashes", "hangs"] {
                fs::create_dir_all(out_dir.join(sub))?;
            }
            Ok(Self { out_dir, next_id: 0, round_tcs: 0 })
        }

        fn next_file_name(&mut self, src: Option<&str>) -> String {
            let id = self.next_id;
            self.next_id += 1;
            match src {
                Some(src) => std::format!("id:{id:06},src:{src}"),
                None => std::format!("id:{id:06}"),
            }
        }

        /// Classifies one execution's outcome and, if it's worth keeping,
        /// writes `seed`'s concrete bytes to the matching subdirectory.
        /// `NoGain` coverage with a `Normal` signal is not persisted at all.
        ///
        /// # Errors
        /// Propagates I/O errors writing the test-case file.
        pub fn save(
            &mut self,
            seed: &Seed,
            signal: Signal,
            coverage_gain: CoverageGain,
            src: Option<&str>,
        ) -> Result<Option<SaveKind>, Error> {
            let kind = if signal.is_crash() {
                Some(SaveKind::Crash)
            } else if signal.is_timeout() {
                Some(SaveKind::Hang)
            } else if !matches!(coverage_gain, CoverageGain::NoGain) {
                Some(SaveKind::Queue)
            } else {
                None
            };
            let Some(kind) = kind else {
                return Ok(None);
            };
            let sub = match kind {
                SaveKind::Queue => "queue",
                SaveKind::Crash => "crashes",
                SaveKind::Hang => "hangs",
            };
            let file_name = self.next_file_name(src);
            fs::write(self.out_dir.join(sub).join(file_name), seed.concretize())?;
            if kind == SaveKind::Queue {
                self.round_tcs += 1;
            }
            Ok(Some(kind))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::byteval::InputSource;

        fn tmp_dir(name: &str) -> PathBuf {
            let mut p = std::env::temp_dir();
            p.push(std::format!("eclipser-test-case-{name}-{:x}", std::process::id()));
            p
        }

        #[test]
        fn new_path_is_persisted_under_queue() {
            let dir = tmp_dir("newpath");
            let mut store = TestCaseStore::new(&dir).unwrap();
            let seed = Seed::with_bytes(InputSource::StdInput, b"abc").unwrap();
            let kind = store.save(&seed, Signal::Normal, CoverageGain::NewPath, None).unwrap();
            assert_eq!(kind, Some(SaveKind::Queue));
            assert_eq!(store.round_tcs, 1);
            assert!(dir.join("queue").join("id:000000").exists());
            let _ = fs::remove_dir_all(&dir);
        }

        #[test]
        fn no_gain_normal_exit_is_not_persisted() {
            let dir = tmp_dir("nogain");
            let mut store = TestCaseStore::new(&dir).unwrap();
            let seed = Seed::with_bytes(InputSource::StdInput, b"abc").unwrap();
            let kind = store.save(&seed, Signal::Normal, CoverageGain::NoGain, None).unwrap();
            assert_eq!(kind, None);
            assert_eq!(store.round_tcs, 0);
            let _ = fs::remove_dir_all(&dir);
        }

        #[test]
        fn crash_goes_to_crashes_regardless_of_coverage() {
            let dir = tmp_dir("crash");
            let mut store = TestCaseStore::new(&dir).unwrap();
            let seed = Seed::with_bytes(InputSource::StdInput, b"abc").unwrap();
            let kind = store.save(&seed, Signal::SigSegv, CoverageGain::NoGain, None).unwrap();
            assert_eq!(kind, Some(SaveKind::Crash));
            assert!(dir.join("crashes").join("id:000000").exists());
            let _ = fs::remove_dir_all(&dir);
        }

        #[test]
        fn ids_increase_monotonically_across_saves() {
            let dir = tmp_dir("ids");
            let mut store = TestCaseStore::new(&dir).unwrap();
            let seed = Seed::with_bytes(InputSource::StdInput, b"abc").unwrap();
            store.save(&seed, Signal::Normal, CoverageGain::NewPath, None).unwrap();
            store.save(&seed, Signal::Normal, CoverageGain::NewEdge, None).unwrap();
            assert!(dir.join("queue").join("id:000000").exists());
            assert!(dir.join("queue").join("id:000001").exists());
            let _ = fs::remove_dir_all(&dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byteval::InputSource;

    #[test]
    fn drains_favoreds_before_normals() {
        let mut q = SeedQueue::new();
        q.enqueue_inplace(Priority::Normal, Seed::new(InputSource::StdInput));
        q.enqueue_inplace(Priority::Favored, Seed::new(InputSource::StdInput));
        let (pr, _) = q.dequeue_inplace().unwrap();
        assert_eq!(pr, Priority::Favored);
        let (pr2, _) = q.dequeue_inplace().unwrap();
        assert_eq!(pr2, Priority::Normal);
        assert!(q.is_empty());
    }

    #[test]
    fn dequeue_reports_the_queue_it_actually_came_from() {
        let mut q = SeedQueue::new();
        q.enqueue_inplace(Priority::Normal, Seed::new(InputSource::StdInput));
        let (pr, _) = q.dequeue_inplace().unwrap();
        assert_eq!(pr, Priority::Normal);
    }

    #[test]
    fn empty_queue_dequeues_nothing() {
        let mut q = SeedQueue::new();
        assert!(q.dequeue_inplace().is_none());
    }
}
