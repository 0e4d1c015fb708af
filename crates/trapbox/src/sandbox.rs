//! The sandbox handle: status machine, policy registration, installation.
//!
//! One `Sandbox` owns the process-wide sandboxing state. The intended use
//! is a single handle created at program start, queried with [`supports`],
//! configured with [`set_policy`], and consumed by [`start`]; once `start`
//! succeeds the kernel enforces the filter for the rest of the process's
//! life and the handle only reports [`Status::Enabled`].
//!
//! [`supports`]: Sandbox::supports
//! [`set_policy`]: Sandbox::set_policy
//! [`start`]: Sandbox::start
//!
//! ## Status machine
//!
//! ```text
//! Unknown ──probe ok──────────▶ Available ◀─────▶ Unavailable
//!    │                             │    (single/multi-threaded flips)
//!    └──probe failed─▶ Unsupported │
//!                                  └──start──▶ Enabled (terminal)
//! ```

use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

use rustix::fs::{Mode, OFlags};

use trapbox_sys::abi::BPF_MAXINSNS;
use trapbox_sys::bpf::{SockFilter, SockFprog};
use trapbox_sys::seccomp;

use crate::error::{die, die_quietly};
use crate::policy::{validate_policy, ArgPolicy, SyscallPolicy};
use crate::probe;
use crate::program;
use crate::trap;

/// Where the sandbox stands for this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Support has not been determined yet.
    Unknown,
    /// The kernel cannot install filters. Permanent.
    Unsupported,
    /// The kernel can install filters and the process is single-threaded.
    Available,
    /// The kernel can install filters but the process is currently
    /// multi-threaded. Clears when the extra threads exit.
    Unavailable,
    /// The filter is installed and enforced. Terminal.
    Enabled,
}

struct PolicyEntry {
    syscalls: Box<dyn SyscallPolicy>,
    /// Reserved for the argument-inspection extension; registration aborts
    /// while one is supplied.
    #[allow(dead_code)]
    args: Option<Box<dyn ArgPolicy>>,
}

/// Owning handle for the process-wide sandbox state.
pub struct Sandbox {
    status: Status,
    proc_fd: Option<OwnedFd>,
    policies: Vec<PolicyEntry>,
    /// Suppresses tracing output; set in the probe child so nothing but
    /// fatal diagnostics reaches the parent's pipe.
    quiet: bool,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            status: Status::Unknown,
            proc_fd: None,
            policies: Vec::new(),
            quiet: false,
        }
    }

    pub(crate) fn new_quiet() -> Self {
        Self {
            quiet: true,
            ..Self::new()
        }
    }

    /// The cached status; does not re-probe.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Provide a `/proc` descriptor for the thread check during `start`.
    ///
    /// Optional: without one, `start` opens `/proc` itself and degrades to
    /// an optimistic thread check when that fails.
    pub fn set_proc_fd(&mut self, fd: OwnedFd) {
        self.proc_fd = Some(fd);
    }

    /// Register the policy the filter will enforce.
    ///
    /// Exactly one policy must be registered before [`start`]; stacking is
    /// reserved. The policy must deny every number outside the filterable
    /// range (and, on x86-64, the x32 compat bank) or registration aborts.
    /// `arg_policy` is accepted for forward compatibility and must be
    /// `None`.
    ///
    /// [`start`]: Sandbox::start
    pub fn set_policy<P>(&mut self, policy: P, arg_policy: Option<Box<dyn ArgPolicy>>)
    where
        P: SyscallPolicy + 'static,
    {
        if arg_policy.is_some() {
            die("argument evaluators are not implemented");
        }
        if let Err(e) = validate_policy(&policy) {
            die(&format!("refusing to register policy: {e}"));
        }
        self.policies.push(PolicyEntry {
            syscalls: Box::new(policy),
            args: arg_policy,
        });
    }

    /// Advisory support check.
    ///
    /// On the first call this forks a probe child and test-installs a
    /// filter there; later calls only re-examine single-threadedness.
    /// `proc_fd` is a descriptor for `/proc`; without one the thread check
    /// optimistically passes.
    pub fn supports(&mut self, proc_fd: Option<BorrowedFd<'_>>) -> Status {
        match self.status {
            Status::Enabled | Status::Unsupported => {}
            Status::Available => {
                // The runtime environment may have grown threads since the
                // last look.
                if !is_single_threaded(proc_fd) {
                    self.status = Status::Unavailable;
                }
            }
            Status::Unavailable => {
                // Unavailable is only ever entered from Available when the
                // process turns out to be multi-threaded; the cached probe
                // verdict itself stays good.
                if is_single_threaded(proc_fd) {
                    self.status = Status::Available;
                }
            }
            Status::Unknown => {
                self.status = if probe::kernel_supports_filters(proc_fd) {
                    Status::Available
                } else {
                    Status::Unsupported
                };
                // The probe child is single-threaded by construction; the
                // caller may not be.
                if self.status == Status::Available && !is_single_threaded(proc_fd) {
                    self.status = Status::Unavailable;
                }
                if !self.quiet {
                    tracing::debug!(status = ?self.status, "seccomp probe finished");
                }
            }
        }
        self.status
    }

    /// Compile the registered policy and install the filter. Irreversible.
    ///
    /// Aborts the process on any unsafe condition: starting while known
    /// unavailable or already enabled, a multi-threaded caller, no (or more
    /// than one) registered policy, a policy the compiler rejects, or a
    /// kernel that refuses the filter. There is no "continued without a
    /// sandbox" return.
    pub fn start(&mut self) {
        self.start_internal(false);
    }

    /// Probe-child variant: kernel refusal of the install prctls aborts
    /// without a diagnostic so the parent reads it as lack of support.
    pub(crate) fn start_dry_run(&mut self) {
        self.start_internal(true);
    }

    fn start_internal(&mut self, dry_run: bool) {
        match self.status {
            Status::Unsupported | Status::Unavailable => {
                die("cannot start sandbox: it is known to be unavailable");
            }
            Status::Enabled => {
                die("cannot start sandbox twice; register policies with set_policy instead");
            }
            Status::Unknown | Status::Available => {}
        }

        if self.proc_fd.is_none() {
            // Degraded mode: without /proc the thread check below has
            // nothing to look at and assumes the best.
            self.proc_fd = rustix::fs::open(
                "/proc",
                OFlags::RDONLY | OFlags::DIRECTORY | OFlags::CLOEXEC,
                Mode::empty(),
            )
            .ok();
        }

        if !is_single_threaded(self.proc_fd.as_ref().map(AsFd::as_fd)) {
            die("cannot start sandbox from a multi-threaded process");
        }

        // Done with /proc. The descriptor must be gone before the filter
        // exists, in case the policy denies close().
        drop(self.proc_fd.take());

        if let Err(e) = trap::install_sigsys_handler() {
            die(&format!("failed to install SIGSYS handler: {e}"));
        }

        if self.policies.len() != 1 {
            die("exactly one policy must be registered before start");
        }
        let policy = self.policies[0].syscalls.as_ref();

        let program = match program::compile(policy) {
            Ok(program) => program,
            Err(e) => die(&format!("seccomp filter compilation failed: {e}")),
        };

        #[cfg(debug_assertions)]
        if let Err(e) = crate::verify::verify_program(&program, policy) {
            die(&format!("seccomp filter verification failed: {e}"));
        }

        if !self.quiet {
            tracing::debug!(instructions = program.len(), "installing seccomp filter");
        }

        // Move the program onto this stack frame and give the heap buffer
        // back first: after PR_SET_SECCOMP the allocator's syscalls are
        // subject to the policy too.
        let mut stack_program = [SockFilter::stmt(0, 0); BPF_MAXINSNS];
        let len = program.len();
        stack_program[..len].copy_from_slice(&program);
        drop(program);

        let fprog = SockFprog {
            len: len as u16,
            filter: stack_program.as_ptr(),
        };

        if let Err(e) = seccomp::set_no_new_privs() {
            if dry_run {
                die_quietly();
            }
            die(&format!("prctl(PR_SET_NO_NEW_PRIVS) failed: {e}"));
        }
        // SAFETY: fprog points at a program that was verified against the
        // policy and lives on this stack frame for the duration of the
        // call.
        if let Err(e) = unsafe { seccomp::install_filter(&fprog) } {
            if dry_run {
                die_quietly();
            }
            die(&format!("prctl(PR_SET_SECCOMP) failed: {e}"));
        }

        self.status = Status::Enabled;
    }
}

/// A single-threaded process has exactly three links on `/proc/self/task`:
/// `.`, `..` and one task entry.
pub(crate) fn is_single_threaded(proc_fd: Option<BorrowedFd<'_>>) -> bool {
    let Some(proc_fd) = proc_fd else {
        // Cannot determine whether the process is single-threaded. Hope
        // for the best.
        return true;
    };
    let task = match rustix::fs::openat(
        proc_fd,
        "self/task",
        OFlags::RDONLY | OFlags::DIRECTORY | OFlags::CLOEXEC,
        Mode::empty(),
    ) {
        Ok(fd) => fd,
        Err(_) => return false,
    };
    match rustix::fs::fstat(&task) {
        Ok(stat) => stat.st_nlink == 3,
        Err(_) => false,
    }
}
