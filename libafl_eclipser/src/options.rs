//! Tunable engine constants and the `FuzzOption` configuration bag.
//!
//! Configuration is kept as a flat struct filled in by an external CLI
//! layer rather than a builder, since every option here is a scalar or a
//! small enum with no incremental construction story.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::branch::{Arch, Tracer};
use crate::byteval::InputSource;
use crate::error::Error;

/// Size, in bytes, of the shared-memory edge-coverage bitmap. Must track the
/// instrumentation patches' own bitmap size.
pub const BITMAP_SIZE: usize = 0x10000;

/// Synchronize the seed queue with the sibling AFL instance every `SYNC_N`
/// iterations of the fuzzing loop.
pub const SYNC_N: u64 = 10;

/// Number of executions treated as one scheduling round (see `scheduler`).
pub const ROUND_SIZE: u64 = 10_000;

pub const SLEEP_FACTOR_MIN: f64 = 0.0;
pub const SLEEP_FACTOR_MAX: f64 = 4.0;

/// Weight the fairness clock gives to purely-random mutation throughput
/// relative to this engine's own round budget.
pub const RAND_FUZZ_EFFICIENCY: f64 = 0.0005;

/// Default execution timeout bounds, in milliseconds. A binary-level
/// concolic round runs several traced executions per candidate rather than
/// AFL's single byte-mutated run, so it is given a higher ceiling than AFL's
/// own default.
pub const EXEC_TIMEOUT_MIN: u64 = 400;
pub const EXEC_TIMEOUT_MAX: u64 = 4_000;

/// Largest contiguous run of bytes a solver may propose fixing in one shot.
pub const MAX_CHUNK_LEN: usize = 10;

/// Length a freshly-constructed seed's byte vector is padded to when no
/// initial corpus is supplied.
pub const INIT_INPUT_LEN: usize = 16;

/// Hard ceiling on how long any single seed's byte vector may grow.
pub const MAX_INPUT_LEN: usize = 1_048_576;

/// Width, in consecutive branch visits, that branch-combination heuristics
/// look across when correlating nearby compares.
pub const BRANCH_COMB_WINDOW: usize = 6;

/// All engine tuning knobs and target-invocation details, built once by an
/// external CLI/harness and threaded by reference through every subsystem.
#[derive(Clone, Debug)]
pub struct FuzzOption {
    /// Unused by this crate directly; an external CLI/harness may read it to
    /// pick a `log::set_max_level`.
    pub verbosity: i32,
    /// Wall-clock budget in seconds, or `-1` for unbounded.
    pub timelimit: i64,
    pub out_dir: String,
    pub sync_dir: Option<String>,
    pub target_prog: String,
    pub exec_timeout: u64,
    pub architecture: Arch,
    pub fork_server: bool,
    pub input_dir: Option<String>,
    /// Raw, unsplit command-line argument string for the target program.
    pub arg: String,
    pub fuzz_source: InputSource,
    /// Cap on how many of a round's candidate branches the solver visits.
    pub n_solve: usize,
    /// Number of try-values spawned per branch when sampling for a model.
    pub n_spawn: usize,
    /// Target-program arguments, split once by [`split_cmd_line_arg`] and
    /// cached per tracer kind (the tracer binary path is prepended to each).
    pub splited_args: BTreeMap<TracerKey, Vec<String>>,
    /// `target_prog` followed by its split arguments, with no tracer prefix;
    /// used by `executor::native_execute`.
    pub native_splited_args: Vec<String>,
}

/// `Tracer` wrapped in a newtype so it can key a `BTreeMap` without forcing
/// every other consumer of `Tracer` to reason about its ordering.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub struct TracerKey(pub Tracer);

impl From<Tracer> for TracerKey {
    fn from(t: Tracer) -> Self {
        TracerKey(t)
    }
}

const TRACERS: [Tracer; 3] = [Tracer::Coverage, Tracer::Branch, Tracer::BBCount];

impl FuzzOption {
    /// Splits `self.arg` and populates `splited_args`/`native_splited_args`.
    /// Must be called once after construction and before any execution;
    /// `executor::select_tracer` supplies the per-architecture tracer path
    /// that gets prepended ahead of the target's own arguments.
    ///
    /// # Errors
    /// Propagates a [`crate::error::Error::ExecutionFailure`] if the tracer
    /// binary for `self.architecture` cannot be located.
    pub fn split_args(
        &mut self,
        select_tracer: impl Fn(Tracer, Arch) -> Result<String, Error>,
    ) -> Result<(), Error> {
        let args = split_cmd_line_arg(&self.arg);

        let mut native = Vec::with_capacity(args.len() + 1);
        native.push(self.target_prog.clone());
        native.extend(args.iter().cloned());
        self.native_splited_args = native;

        for tracer in TRACERS {
            let tracer_path = select_tracer(tracer, self.architecture)?;
            let mut v = Vec::with_capacity(args.len() + 1);
            v.push(tracer_path);
            v.extend(args.iter().cloned());
            self.splited_args.insert(TracerKey(tracer), v);
        }
        Ok(())
    }
}

/// Splits a shell-style argument string on unescaped whitespace, honoring
/// single and double quoting. Covers the subset target-argument strings
/// actually use (no globbing, no variable expansion).
#[must_use]
pub fn split_cmd_line_arg(arg_str: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut has_token = false;

    for c in arg_str.chars() {
        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                has_token = true;
            }
            '"' if !in_single => {
                in_double = !in_double;
                has_token = true;
            }
            c if c.is_whitespace() && !in_single && !in_double => {
                if has_token {
                    out.push(core::mem::take(&mut cur));
                    has_token = false;
                }
            }
            c => {
                cur.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        out.push(cur);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_plain_whitespace() {
        assert_eq!(split_cmd_line_arg("-a  -b   -c"), vec!["-a", "-b", "-c"]);
    }

    #[test]
    fn honors_quoting() {
        assert_eq!(
            split_cmd_line_arg(r#"-o "a b" 'c d'"#),
            vec!["-o", "a b", "c d"]
        );
    }

    #[test]
    fn empty_string_splits_to_nothing() {
        assert!(split_cmd_line_arg("").is_empty());
        assert!(split_cmd_line_arg("   ").is_empty());
    }
}
