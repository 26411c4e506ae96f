//! The AFL-style forkserver handshake: a long-lived tracer
//! process that forks a fresh target for every request instead of paying
//! `execve`'s cost each run.
//!
//! This module is the controller half only; the forkserver loop itself
//! lives in the external tracer binary.

use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, BorrowedFd, IntoRawFd, OwnedFd, RawFd};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::string::String;

use nix::poll::{PollFd, PollFlags, PollTimeout};
use nix::sys::signal::{self, Signal as NixSignal};
use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::Pid;

use crate::error::Error;

/// Control-plane file descriptor pairs the forkserver protocol is pinned to:
/// the tracer reads fork requests on `ctl_fd` and writes pid/status replies
/// on `ctl_fd + 1`.
pub const COVERAGE_BASE_FD: RawFd = 198;
pub const BRANCH_BASE_FD: RawFd = 194;

/// A running forkserver: the tracer process plus the two pipe ends this side
/// of the protocol owns. One of these is kept alive per [`crate::branch::Tracer`]
/// kind across many fuzz-loop iterations.
pub struct ForkServer {
    child: Child,
    /// Our write end of the pipe the tracer's `ctl_fd` reads from.
    ctl_write: File,
    /// Our read end of the pipe the tracer writes `ctl_fd + 1` replies to.
    st_read: File,
}

fn poll_readable(fd: RawFd, timeout_ms: u64) -> Result<(), Error> {
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    let mut pfd = [PollFd::new(borrowed, PollFlags::POLLIN)];
    let timeout = PollTimeout::try_from(timeout_ms as i32).unwrap_or(PollTimeout::MAX);
    let n = nix::poll::poll(&mut pfd, timeout)
        .map_err(|e| Error::execution_failure(alloc::format!("poll() on forkserver pipe failed: {e}")))?;
    if n == 0 {
        return Err(Error::timeout("forkserver pipe read timed out"));
    }
    Ok(())
}

fn read_u32_with_timeout(file: &File, timeout_ms: u64) -> Result<u32, Error> {
    poll_readable(file.as_raw_fd(), timeout_ms)?;
    let mut buf = [0u8; 4];
    (&*file)
        .read_exact(&mut buf)
        .map_err(|e| Error::execution_failure(alloc::format!("short read from forkserver pipe: {e}")))?;
    Ok(u32::from_ne_bytes(buf))
}

fn write_u32(file: &File, value: u32) -> Result<(), Error> {
    (&*file).write_all(&value.to_ne_bytes())?;
    Ok(())
}

impl ForkServer {
    /// Spawns the tracer binary with `ECL_FORK_SERVER=1` and the protocol's
    /// pipe fds dup'd onto `base_fd`/`base_fd + 1` in the child, then blocks
    /// for the ready handshake.
    ///
    /// # Errors
    /// Returns [`Error::ExecutionFailure`] if the pipes or the process itself
    /// can't be created, and [`Error::Timeout`] if the ready handshake
    /// doesn't arrive in time.
    pub fn spawn(
        tracer_path: &str,
        target_argv: &[String],
        env: &[(String, String)],
        base_fd: RawFd,
        init_timeout_ms: u64,
    ) -> Result<Self, Error> {
        // ctl: our write end -> child's read end at `base_fd`.
        // st: child's write end at `base_fd + 1` -> our read end.
        let (ctl_read, ctl_write): (OwnedFd, OwnedFd) = nix::unistd::pipe()
            .map_err(|e| Error::execution_failure(alloc::format!("pipe() failed: {e}")))?;
        let (st_read, st_write): (OwnedFd, OwnedFd) = nix::unistd::pipe()
            .map_err(|e| Error::execution_failure(alloc::format!("pipe() failed: {e}")))?;

        let ctl_read_fd = ctl_read.into_raw_fd();
        let st_write_fd = st_write.into_raw_fd();

        let mut cmd = Command::new(tracer_path);
        if let Some(prog) = target_argv.first() {
            cmd.arg(prog);
        }
        if target_argv.len() > 1 {
            cmd.args(&target_argv[1..]);
        }
        cmd.env_clear();
        for (k, v) in env {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());

        // Dup the protocol pipes onto the fixed fds the tracer expects,
        // after fork but before exec, in the child only.
        unsafe {
            cmd.pre_exec(move || {
                if ctl_read_fd != base_fd {
                    nix::unistd::dup2(ctl_read_fd, base_fd)
                        .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
                }
                if st_write_fd != base_fd + 1 {
                    nix::unistd::dup2(st_write_fd, base_fd + 1)
                        .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
                }
                Ok(())
            });
        }

        let child = cmd
            .spawn()
            .map_err(|e| Error::execution_failure(alloc::format!("failed to spawn tracer: {e}")))?;

        // The child has its own copies of these (post-fork, pre-exec dup2'd
        // onto the fixed fds); close ours so EOF behaves once the child exits.
        let _ = nix::unistd::close(ctl_read_fd);
        let _ = nix::unistd::close(st_write_fd);

        let server = ForkServer {
            child,
            ctl_write: File::from(ctl_write),
            st_read: File::from(st_read),
        };

        // Ready handshake: the tracer writes one 4-byte word once its own
        // forkserver loop is listening.
        let _ = read_u32_with_timeout(&server.st_read, init_timeout_ms)?;
        Ok(server)
    }

    /// Requests a fresh fork of the target and returns its pid.
    ///
    /// # Errors
    /// Propagates pipe I/O failures and [`Error::Timeout`] if the tracer
    /// doesn't respond within `timeout_ms`.
    pub fn request_fork(&self, timeout_ms: u64) -> Result<Pid, Error> {
        write_u32(&self.ctl_write, 0)?;
        let pid = read_u32_with_timeout(&self.st_read, timeout_ms)?;
        Ok(Pid::from_raw(pid as i32))
    }

    /// Blocks for the forked target's exit status, as reported by the
    /// tracer's forkserver loop over the status pipe (not `waitpid` — the
    /// tracer itself reaps the child and relays its status).
    ///
    /// # Errors
    /// Propagates pipe I/O failures and [`Error::Timeout`] if the target
    /// outruns `timeout_ms`; callers are responsible for then sending
    /// `SIGTERM`/`SIGKILL` to `pid` via the usual timeout escalation.
    pub fn wait_status(&self, timeout_ms: u64) -> Result<i32, Error> {
        Ok(read_u32_with_timeout(&self.st_read, timeout_ms)? as i32)
    }

    /// Sends `sig` directly to the currently-forked target, bypassing the
    /// tracer (used by the timeout escalation path: `SIGTERM` then, after a
    /// grace period, `SIGKILL`).
    pub fn signal_target(&self, pid: Pid, sig: NixSignal) {
        let _ = signal::kill(pid, sig);
    }
}

impl Drop for ForkServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = waitpid(Pid::from_raw(self.child.id() as i32), Some(WaitPidFlag::WNOHANG));
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_fds_have_the_documented_offset() {
        assert_eq!(COVERAGE_BASE_FD + 1, 199);
        assert_eq!(BRANCH_BASE_FD + 1, 195);
    }
}
