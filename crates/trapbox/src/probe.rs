//! Kernel support probe.
//!
//! Whether the kernel accepts BPF filters can only be learned by installing
//! one, and installation is irreversible, so the test runs in a forked
//! child. The child installs a minimal three-outcome policy, checks that a
//! denied `getpid` really fails with the policy's errno, and reports the
//! verdict through its exit status. The child's stderr is redirected into
//! a pipe: a probe that fails *with* diagnostic output means the compiler
//! itself misbehaved, which is a security bug and fatal in the parent, not
//! a sign of a kernel without seccomp.

use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};

use rustix::pipe::{pipe_with, PipeFlags};

use crate::error::die;
use crate::outcome::Outcome;
use crate::policy::SyscallPolicy;
use crate::sandbox::Sandbox;

/// The policy the probe child installs: deny `getpid` with a recognizable
/// errno, allow `exit_group` so the child can report, fail everything else
/// in an equally recognizable way.
pub(crate) struct ProbePolicy;

impl SyscallPolicy for ProbePolicy {
    fn evaluate(&self, sysno: i32) -> Outcome {
        match i64::from(sysno) {
            n if n == libc::SYS_getpid => Outcome::Errno(libc::EPERM as u16),
            n if n == libc::SYS_exit_group => Outcome::Allow,
            _ => Outcome::Errno(libc::EINVAL as u16),
        }
    }
}

/// Exit status the child reports when the filter demonstrably ran.
const PROBE_OK_STATUS: i32 = 100;

/// Fork a child and test-install a filter in it.
///
/// Returns false only when the kernel genuinely lacks support. Failures of
/// the trusted-path setup itself (signal masking, pipe creation, fork) are
/// fatal: an attacker who can induce them must not be able to talk the
/// caller into running unsandboxed.
pub(crate) fn kernel_supports_filters(proc_fd: Option<BorrowedFd<'_>>) -> bool {
    // Block all signals before forking so the test cannot be manipulated
    // by an unexpected signal.
    let mut all: libc::sigset_t = unsafe { std::mem::zeroed() };
    let mut old: libc::sigset_t = unsafe { std::mem::zeroed() };
    // SAFETY: both sets are valid for writes.
    if unsafe {
        libc::sigfillset(&mut all) != 0 || libc::sigprocmask(libc::SIG_BLOCK, &all, &mut old) != 0
    } {
        die("sigprocmask() failed");
    }

    let (pipe_read, pipe_write) = match pipe_with(PipeFlags::CLOEXEC) {
        Ok(ends) => ends,
        Err(_) => die("failed to create probe diagnostic pipe"),
    };

    // SAFETY: fork is called with all signals blocked; the child only runs
    // async-signal-unsafe code on the path that installs a fresh filter.
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        // Restore the mask on a best-effort basis, then give up. Returning
        // "not supported" here would let a crafted fork failure talk us
        // into running without a sandbox.
        unsafe { libc::sigprocmask(libc::SIG_SETMASK, &old, std::ptr::null_mut()) };
        die("fork() failed unexpectedly");
    }

    if pid == 0 {
        probe_child(proc_fd, pipe_write.as_raw_fd());
    }

    // Parent.
    // SAFETY: restoring the previously saved mask.
    if unsafe { libc::sigprocmask(libc::SIG_SETMASK, &old, std::ptr::null_mut()) } != 0 {
        die("sigprocmask() failed");
    }
    drop(pipe_write);

    let mut status: libc::c_int = 0;
    loop {
        // SAFETY: status is valid for writes.
        let ret = unsafe { libc::waitpid(pid, &mut status, 0) };
        if ret == pid {
            break;
        }
        if ret == -1 && trapbox_sys::last_errno() == rustix::io::Errno::INTR {
            continue;
        }
        die("waitpid() failed unexpectedly");
    }

    if libc::WIFEXITED(status) && libc::WEXITSTATUS(status) == PROBE_OK_STATUS {
        return true;
    }

    // The child did not confirm the filter. Without diagnostics that is a
    // kernel without seccomp-BPF; with diagnostics the compiler failed a
    // self-check inside the child, which must not be shrugged off.
    let diagnostic = drain(pipe_read.as_fd());
    if !diagnostic.is_empty() {
        die(&format!(
            "seccomp probe child failed: {}",
            String::from_utf8_lossy(&diagnostic).trim_end()
        ));
    }
    tracing::debug!("kernel does not support seccomp-BPF filters");
    false
}

/// Child side. Never returns.
fn probe_child(proc_fd: Option<BorrowedFd<'_>>, pipe_write: RawFd) -> ! {
    // Forward everything the child would say to the parent.
    // SAFETY: dup2 onto stderr; the pipe fd is valid.
    unsafe { libc::dup2(pipe_write, 2) };

    let mut sandbox = Sandbox::new_quiet();
    sandbox.set_policy(ProbePolicy, None);
    if let Some(fd) = proc_fd {
        if let Ok(owned) = fd.try_clone_to_owned() {
            sandbox.set_proc_fd(owned);
        }
    }
    sandbox.start_dry_run();

    // The filter is supposedly live. Prove it ran by observing the errno it
    // assigns to getpid.
    // SAFETY: raw syscalls with no pointer arguments.
    unsafe {
        if libc::syscall(libc::SYS_getpid) < 0
            && *libc::__errno_location() == libc::EPERM
        {
            libc::syscall(libc::SYS_exit_group, PROBE_OK_STATUS as libc::c_long);
        }
        libc::abort();
    }
}

/// Read the pipe to EOF.
fn drain(fd: BorrowedFd<'_>) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        // SAFETY: buf is valid for writes of its length.
        let n = unsafe { libc::read(fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
        if n <= 0 {
            if n == -1 && trapbox_sys::last_errno() == rustix::io::Errno::INTR {
                continue;
            }
            return out;
        }
        out.extend_from_slice(&buf[..n as usize]);
    }
}
