//! AFL interoperability: periodically imports new test cases dropped by
//! sibling AFL instances sharing the same `sync_dir` into our own
//! [`SeedQueue`], scored the same way a freshly-generated seed would be.
//!
//! Requires the `std` feature (filesystem access).
#![cfg(feature = "std")]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::vec::Vec;

use crate::branch::{CoverageGain, Priority, Signal};
use crate::options::FuzzOption;
use crate::queue::SeedQueue;
use crate::seed::Seed;

/// Per-`sync_dir` high-water mark of imported AFL test-case numbers, so a
/// repeated [`Run`] only imports test cases it hasn't seen yet.
#[derive(Default)]
pub struct SyncState {
    map_imports: HashMap<PathBuf, u32>,
}

/// Parses an AFL queue filename of the form `id:NNNNNN...` into its test
/// case number. Anything that doesn't start with `id:` or whose digits don't
/// parse is not an AFL test case and is ignored.
#[must_use]
pub fn try_parse_tc_num(tc_path: &Path) -> Option<u32> {
    let name = tc_path.file_name()?.to_str()?;
    let digits = name.strip_prefix("id:")?;
    let digits = digits.get(0..6)?;
    digits.parse().ok()
}

impl SyncState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn import_seed(
        &self,
        opt: &FuzzOption,
        tc_path: &Path,
        seed_queue: &mut SeedQueue,
        get_coverage: &mut dyn FnMut(&Seed) -> Result<(Signal, CoverageGain), crate::error::Error>,
    ) -> Result<(), crate::error::Error> {
        let bytes = fs::read(tc_path)?;
        let seed = Seed::with_bytes(opt.fuzz_source.clone(), bytes)?;
        let (_signal, cov_gain) = get_coverage(&seed)?;
        if let Some(priority) = Priority::of_coverage_gain(cov_gain) {
            seed_queue.enqueue_inplace(priority, seed);
        }
        Ok(())
    }

    fn sync_test_case(
        &self,
        opt: &FuzzOption,
        max_import: u32,
        seed_queue: &mut SeedQueue,
        acc_max_import: &mut u32,
        tc_path: &Path,
        get_coverage: &mut dyn FnMut(&Seed) -> Result<(Signal, CoverageGain), crate::error::Error>,
    ) -> Result<(), crate::error::Error> {
        let Some(num) = try_parse_tc_num(tc_path) else {
            return Ok(());
        };
        if num > max_import {
            log::debug!("synchronizing seed queue with {}", tc_path.display());
            *acc_max_import = (*acc_max_import).max(num);
            self.import_seed(opt, tc_path, seed_queue, get_coverage)?;
        }
        Ok(())
    }

    fn sync_from_dir(
        &mut self,
        opt: &FuzzOption,
        seed_queue: &mut SeedQueue,
        dir: &Path,
        get_coverage: &mut dyn FnMut(&Seed) -> Result<(Signal, CoverageGain), crate::error::Error>,
    ) -> Result<(), crate::error::Error> {
        let max_import = self.map_imports.get(dir).copied().unwrap_or(0);
        let tc_dir = dir.join("queue");
        let mut acc_max_import = max_import;
        if let Ok(entries) = fs::read_dir(&tc_dir) {
            for entry in entries.flatten() {
                self.sync_test_case(
                    opt,
                    max_import,
                    seed_queue,
                    &mut acc_max_import,
                    &entry.path(),
                    get_coverage,
                )?;
            }
        }
        if acc_max_import > max_import {
            self.map_imports.insert(dir.to_path_buf(), acc_max_import);
        }
        Ok(())
    }

    /// Scans every sibling directory under `opt.sync_dir` (skipping our own
    /// `opt.out_dir`) for new AFL-style `queue/id:*` test cases and enqueues
    /// any that gain coverage.
    ///
    /// # Errors
    /// Propagates I/O errors reading a sibling's queue, and whatever
    /// `get_coverage` returns for an imported seed.
    pub fn run(
        &mut self,
        opt: &FuzzOption,
        seed_queue: &mut SeedQueue,
        get_coverage: &mut dyn FnMut(&Seed) -> Result<(Signal, CoverageGain), crate::error::Error>,
    ) -> Result<(), crate::error::Error> {
        let Some(sync_dir) = &opt.sync_dir else {
            return Ok(());
        };
        let out_dir = fs::canonicalize(&opt.out_dir).unwrap_or_else(|_| PathBuf::from(&opt.out_dir));
        let sync_dir = fs::canonicalize(sync_dir).unwrap_or_else(|_| PathBuf::from(sync_dir));

        let mut sub_dirs = Vec::new();
        if let Ok(entries) = fs::read_dir(&sync_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path != out_dir && path.is_dir() {
                    sub_dirs.push(path);
                }
            }
        }
        for d in sub_dirs {
            self.sync_from_dir(opt, seed_queue, &d, get_coverage)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_afl_test_case_names() {
        assert_eq!(try_parse_tc_num(Path::new("id:000042,src:000000")), Some(42));
    }

    #[test]
    fn rejects_non_afl_names() {
        assert_eq!(try_parse_tc_num(Path::new("README.md")), None);
        assert_eq!(try_parse_tc_num(Path::new("id:abcdef")), None);
        assert_eq!(try_parse_tc_num(Path::new("id:12")), None);
    }
}
