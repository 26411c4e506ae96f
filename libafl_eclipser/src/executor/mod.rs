//! Drives the instrumented tracer against a [`Seed`]'s concrete bytes and
//! turns its output (branch trace, coverage log, shared bitmap) into typed
//! results the rest of the engine consumes.
//!
//! [`Executor::native_execute`] is the one-shot `execvpe`/epoll path;
//! [`forkserver::ForkServer`] is the persistent path used once
//! `fork_server` is enabled. Requires `std` (process spawning, filesystem
//! I/O, mmap).
#![cfg(feature = "std")]

pub mod forkserver;
pub mod parse;

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::string::String;
use std::time::{Duration, Instant};
use std::vec::Vec;

use nix::sys::signal::{self, Signal as NixSignal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::branch::{Arch, BranchInfo, CoverageGain, Signal, Tracer};
use crate::error::Error;
use crate::options::{FuzzOption, TracerKey, BITMAP_SIZE};
use crate::seed::Seed;
use forkserver::ForkServer;
use parse::{parse_branch_trace, parse_coverage_log};

const ENV_FORK_SERVER: &str = "ECL_FORK_SERVER";
const ENV_BRANCH_LOG: &str = "ECL_BRANCH_LOG";
const ENV_COVERAGE_LOG: &str = "ECL_COVERAGE_LOG";
const ENV_BITMAP_LOG: &str = "ECL_BITMAP_LOG";
const ENV_BRANCH_ADDR: &str = "ECL_BRANCH_ADDR";
const ENV_BRANCH_IDX: &str = "ECL_BRANCH_IDX";
const ENV_MEASURE_COV: &str = "ECL_MEASURE_COV";

/// How long (after `SIGTERM`) the executor waits before escalating to
/// `SIGKILL`.
const SIGTERM_GRACE_MS: u64 = 400;

/// Selects the tracer binary for `(tracer, arch)` under `libexec_dir`.
///
/// # Errors
/// Never fails today (the naming scheme is total over `Tracer`/`Arch`); kept
/// fallible because the eventual external harness may want to check the
/// binary actually exists on disk before returning it.
pub fn select_tracer(libexec_dir: &Path, tracer: Tracer, arch: Arch) -> Result<String, Error> {
    let arch_str = match arch {
        Arch::X86 => "x86",
        Arch::X64 => "x64",
    };
    let tracer_str = match tracer {
        Tracer::Coverage => "coverage",
        Tracer::Branch => "branch",
        Tracer::BBCount => "bbcount",
    };
    let path = libexec_dir.join(std::format!("qemu-trace-{tracer_str}-{arch_str}"));
    Ok(path.to_string_lossy().into_owned())
}

/// Outcome of one traced execution: how the target exited, the branch trace
/// it recorded (empty for `native_execute`, which skips instrumentation),
/// and whether it touched bitmap bits the global map hadn't seen yet.
#[derive(Debug)]
pub struct ExecResult {
    pub signal: Signal,
    pub branches: Vec<BranchInfo>,
    pub coverage_gain: CoverageGain,
}

/// Owns the per-run scratch files (`.stdin`, `.branch`, `.coverage`,
/// `.bitmap`) under `out_dir`, the global coverage bitmap they get compared
/// against, and a forkserver per [`Tracer`] once one has been started.
///
/// This struct is the single owner of `bitmap`; callers only ever see it
/// through [`Executor::classify_coverage`]'s read-then-merge step.
pub struct Executor {
    stdin_path: PathBuf,
    branch_log_path: PathBuf,
    coverage_log_path: PathBuf,
    bitmap_log_path: PathBuf,
    bitmap: Vec<u8>,
    forkservers: BTreeMap<TracerKey, ForkServer>,
}

impl Executor {
    /// # Errors
    /// Propagates I/O errors creating `out_dir` and the zeroed bitmap log
    /// file the tracer mmaps into.
    pub fn new(out_dir: &str) -> Result<Self, Error> {
        let dir = PathBuf::from(out_dir);
        fs::create_dir_all(&dir)?;
        let bitmap_log_path = dir.join(".bitmap");
        fs::write(&bitmap_log_path, alloc::vec![0u8; BITMAP_SIZE])?;
        Ok(Executor {
            stdin_path: dir.join(".stdin"),
            branch_log_path: dir.join(".branch"),
            coverage_log_path: dir.join(".coverage"),
            bitmap_log_path,
            bitmap: alloc::vec![0u8; BITMAP_SIZE],
            forkservers: BTreeMap::new(),
        })
    }

    fn setup_stdin_file(&self, seed: &Seed) -> Result<(), Error> {
        let mut f = OpenOptions::new().create(true).write(true).truncate(true).open(&self.stdin_path)?;
        f.write_all(&seed.concretize())?;
        Ok(())
    }

    fn base_env(&self, measure_cov: bool, branch_addr: u64, branch_idx: u32) -> Vec<(String, String)> {
        alloc::vec![
            (ENV_BRANCH_LOG.into(), self.branch_log_path.to_string_lossy().into_owned()),
            (ENV_COVERAGE_LOG.into(), self.coverage_log_path.to_string_lossy().into_owned()),
            (ENV_BITMAP_LOG.into(), self.bitmap_log_path.to_string_lossy().into_owned()),
            (ENV_BRANCH_ADDR.into(), branch_addr.to_string()),
            (ENV_BRANCH_IDX.into(), branch_idx.to_string()),
            (ENV_MEASURE_COV.into(), if measure_cov { "1".into() } else { "0".into() }),
        ]
    }

    /// Runs the target once through the one-shot (non-forkserver) path: a
    /// plain `fork`/`exec` with stdin fed from [`Self::stdin_path`], waited
    /// on with the `exec_timeout`/`SIGTERM`/`SIGKILL` escalation schedule.
    ///
    /// # Errors
    /// Propagates [`Error::ExecutionFailure`] for spawn/wait failures.
    fn run_once(
        &self,
        argv: &[String],
        env: &[(String, String)],
        exec_timeout_ms: u64,
    ) -> Result<Signal, Error> {
        let stdin_file = File::open(&self.stdin_path)?;
        let mut cmd = Command::new(&argv[0]);
        if argv.len() > 1 {
            cmd.args(&argv[1..]);
        }
        cmd.env_clear();
        for (k, v) in env {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::from(stdin_file));
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::execution_failure(alloc::format!("failed to spawn target: {e}")))?;
        let pid = Pid::from_raw(child.id() as i32);

        let deadline = Instant::now() + Duration::from_millis(exec_timeout_ms);
        loop {
            match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => {
                    if Instant::now() >= deadline {
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
                Ok(status) => return Ok(Self::classify_status(&status)),
                Err(e) => {
                    return Err(Error::execution_failure(alloc::format!("waitpid failed: {e}")))
                }
            }
        }

        // Timed out: SIGTERM, brief grace period, then SIGKILL.
        let _ = signal::kill(pid, NixSignal::SIGTERM);
        let term_deadline = Instant::now() + Duration::from_millis(SIGTERM_GRACE_MS);
        loop {
            match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => {
                    if Instant::now() >= term_deadline {
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
                Ok(_) => return Ok(Signal::SigAlrm),
                Err(_) => break,
            }
        }
        let _ = signal::kill(pid, NixSignal::SIGKILL);
        let _ = child.wait();
        Ok(Signal::SigAlrm)
    }

    fn classify_status(status: &WaitStatus) -> Signal {
        match status {
            WaitStatus::Exited(_, code) if *code == 0 => Signal::Normal,
            WaitStatus::Exited(..) => Signal::Error,
            WaitStatus::Signaled(_, NixSignal::SIGSEGV, _) => Signal::SigSegv,
            WaitStatus::Signaled(_, NixSignal::SIGILL, _) => Signal::SigIll,
            WaitStatus::Signaled(_, NixSignal::SIGABRT, _) => Signal::SigAbrt,
            WaitStatus::Signaled(_, NixSignal::SIGFPE, _) => Signal::SigFpe,
            WaitStatus::Signaled(_, NixSignal::SIGALRM, _) => Signal::SigAlrm,
            WaitStatus::Signaled(..) => Signal::Error,
            _ => Signal::Error,
        }
    }

    fn forkserver_for(
        &mut self,
        tracer: Tracer,
        opt: &FuzzOption,
        argv: &[String],
        env: &[(String, String)],
    ) -> Result<&ForkServer, Error> {
        let key = TracerKey(tracer);
        if !self.forkservers.contains_key(&key) {
            let base_fd = match tracer {
                Tracer::Branch => forkserver::BRANCH_BASE_FD,
                Tracer::Coverage | Tracer::BBCount => forkserver::COVERAGE_BASE_FD,
            };
            let srv = ForkServer::spawn(&argv[0], &argv[1..], env, base_fd, opt.exec_timeout * 10)?;
            self.forkservers.insert(key, srv);
        }
        Ok(self.forkservers.get(&key).expect("just inserted"))
    }

    fn run_via_forkserver(
        &mut self,
        tracer: Tracer,
        opt: &FuzzOption,
        argv: &[String],
        env: &[(String, String)],
    ) -> Result<Signal, Error> {
        let exec_timeout = opt.exec_timeout;
        let srv = self.forkserver_for(tracer, opt, argv, env)?;
        let pid = srv.request_fork(exec_timeout * 10)?;
        match srv.wait_status(exec_timeout) {
            Ok(raw_status) => Ok(Self::classify_raw_status(raw_status)),
            Err(Error::Timeout(..)) => {
                srv.signal_target(pid, NixSignal::SIGTERM);
                match srv.wait_status(SIGTERM_GRACE_MS) {
                    Ok(raw) => Ok(Self::classify_raw_status(raw)),
                    Err(_) => {
                        srv.signal_target(pid, NixSignal::SIGKILL);
                        Ok(Signal::SigAlrm)
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    fn classify_raw_status(raw: i32) -> Signal {
        if libc::WIFEXITED(raw) {
            if libc::WEXITSTATUS(raw) == 0 {
                Signal::Normal
            } else {
                Signal::Error
            }
        } else if libc::WIFSIGNALED(raw) {
            match libc::WTERMSIG(raw) {
                s if s == libc::SIGSEGV => Signal::SigSegv,
                s if s == libc::SIGILL => Signal::SigIll,
                s if s == libc::SIGABRT => Signal::SigAbrt,
                s if s == libc::SIGFPE => Signal::SigFpe,
                s if s == libc::SIGALRM => Signal::SigAlrm,
                _ => Signal::Error,
            }
        } else {
            Signal::Error
        }
    }

    /// Runs the target with `seed`'s bytes under the `Branch` tracer and
    /// parses the resulting [`BranchInfo`] trace. `measure_cov` also
    /// requests a coverage classification in the same run (via
    /// `ECL_MEASURE_COV`), avoiding a second execution when the caller needs
    /// both.
    ///
    /// # Errors
    /// Propagates [`Error::ExecutionFailure`]/[`Error::Timeout`] from the
    /// run itself; [`Error::ParseFailure`] is swallowed (an empty branch
    /// trace is returned instead).
    pub fn execute_branch(
        &mut self,
        opt: &FuzzOption,
        seed: &Seed,
        measure_cov: bool,
    ) -> Result<ExecResult, Error> {
        self.setup_stdin_file(seed)?;
        let argv = opt
            .splited_args
            .get(&TracerKey(Tracer::Branch))
            .ok_or_else(|| Error::invalid_argument("FuzzOption::split_args() was never called"))?
            .clone();
        let mut env = self.base_env(measure_cov, 0, 0);
        env.push((ENV_FORK_SERVER.into(), if opt.fork_server { "1".into() } else { "0".into() }));

        let signal = if opt.fork_server {
            self.run_via_forkserver(Tracer::Branch, opt, &argv, &env)?
        } else {
            self.run_once(&argv, &env, opt.exec_timeout)?
        };

        let branches = parse_branch_trace(&self.branch_log_path).unwrap_or_default();
        let coverage_gain = if measure_cov {
            self.classify_coverage()?
        } else {
            CoverageGain::NoGain
        };
        Ok(ExecResult { signal, branches, coverage_gain })
    }

    /// Runs the target with `seed`'s bytes under the `Coverage` tracer and
    /// classifies the run's coverage gain against the global bitmap.
    ///
    /// # Errors
    /// Propagates [`Error::ExecutionFailure`]/[`Error::Timeout`] from the run.
    pub fn execute_coverage(&mut self, opt: &FuzzOption, seed: &Seed) -> Result<ExecResult, Error> {
        self.setup_stdin_file(seed)?;
        let argv = opt
            .splited_args
            .get(&TracerKey(Tracer::Coverage))
            .ok_or_else(|| Error::invalid_argument("FuzzOption::split_args() was never called"))?
            .clone();
        let mut env = self.base_env(true, 0, 0);
        env.push((ENV_FORK_SERVER.into(), if opt.fork_server { "1".into() } else { "0".into() }));

        let signal = if opt.fork_server {
            self.run_via_forkserver(Tracer::Coverage, opt, &argv, &env)?
        } else {
            self.run_once(&argv, &env, opt.exec_timeout)?
        };

        let coverage_gain = self.classify_coverage()?;
        Ok(ExecResult { signal, branches: Vec::new(), coverage_gain })
    }

    /// Runs the target directly (no tracer, no instrumentation) for quick
    /// crash reproduction or sanity checks outside the grey-box loop.
    ///
    /// # Errors
    /// Propagates [`Error::ExecutionFailure`]/[`Error::Timeout`].
    pub fn native_execute(&mut self, opt: &FuzzOption, seed: &Seed) -> Result<Signal, Error> {
        self.setup_stdin_file(seed)?;
        self.run_once(&opt.native_splited_args, &[], opt.exec_timeout)
    }

    /// Reads the two-line `.coverage` log and, if `found_new_edge`/
    /// `found_new_path` report anything, merges the run's `.bitmap` log into
    /// [`Self::bitmap`] — the only place that bitmap is ever written.
    ///
    /// # Errors
    /// Propagates I/O/parse errors reading either log file.
    fn classify_coverage(&mut self) -> Result<CoverageGain, Error> {
        let (found_new_edge, found_new_path) = parse_coverage_log(&self.coverage_log_path)
            .unwrap_or((false, false));
        let gain = if found_new_edge {
            CoverageGain::NewEdge
        } else if found_new_path {
            CoverageGain::NewPath
        } else {
            CoverageGain::NoGain
        };
        if !matches!(gain, CoverageGain::NoGain) {
            if let Ok(run_bitmap) = fs::read(&self.bitmap_log_path) {
                for (g, r) in self.bitmap.iter_mut().zip(run_bitmap.iter()) {
                    *g |= *r;
                }
            }
        }
        Ok(gain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::Arch;

    #[test]
    fn select_tracer_names_follow_the_documented_scheme() {
        let dir = PathBuf::from("/opt/eclipser/libexec");
        let p = select_tracer(&dir, Tracer::Coverage, Arch::X64).unwrap();
        assert!(p.ends_with("qemu-trace-coverage-x64"));
        let p = select_tracer(&dir, Tracer::Branch, Arch::X86).unwrap();
        assert!(p.ends_with("qemu-trace-branch-x86"));
        let p = select_tracer(&dir, Tracer::BBCount, Arch::X64).unwrap();
        assert!(p.ends_with("qemu-trace-bbcount-x64"));
    }

    #[test]
    fn classify_status_maps_exit_codes_and_signals() {
        assert_eq!(
            Executor::classify_status(&WaitStatus::Exited(Pid::from_raw(1), 0)),
            Signal::Normal
        );
        assert_eq!(
            Executor::classify_status(&WaitStatus::Exited(Pid::from_raw(1), 1)),
            Signal::Error
        );
        assert_eq!(
            Executor::classify_status(&WaitStatus::Signaled(Pid::from_raw(1), NixSignal::SIGSEGV, false)),
            Signal::SigSegv
        );
    }

    #[test]
    fn new_executor_creates_scratch_files_under_out_dir() {
        let dir = std::env::temp_dir().join(std::format!("eclipser-executor-test-{:x}", std::process::id()));
        let exec = Executor::new(dir.to_str().unwrap()).unwrap();
        assert!(exec.bitmap_log_path.exists());
        assert_eq!(exec.bitmap.len(), BITMAP_SIZE);
        let _ = fs::remove_dir_all(&dir);
    }
}
