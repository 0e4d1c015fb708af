//! SIGSYS trap handler.
//!
//! System calls the filter classifies as `Trap` are delivered to the
//! process as a synchronous SIGSYS. The handler runs on the signal frame of
//! the interrupted call and must be async-signal-safe: no allocation, no
//! locks, no buffered I/O. It patches the machine context so the trapped
//! call appears to have returned `-default_deny_errno`, which is the
//! designated place to grow per-syscall emulation later.

use std::ffi::c_void;

use trapbox_sys::abi::{DEFAULT_DENY_ERRNO, SYS_SECCOMP_SI_CODE};

/// Install the SIGSYS handler with `SA_SIGINFO` and unblock SIGSYS.
///
/// # Errors
///
/// Returns the raw errno if `sigaction` or `sigprocmask` fails.
pub(crate) fn install_sigsys_handler() -> Result<(), rustix::io::Errno> {
    let handler: extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut c_void) = sig_sys;

    // SAFETY: sigaction/sigset manipulation with valid, zeroed structs.
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = handler as usize;
        sa.sa_flags = libc::SA_SIGINFO;
        if libc::sigaction(libc::SIGSYS, &sa, std::ptr::null_mut()) != 0 {
            return Err(trapbox_sys::last_errno());
        }

        let mut mask: libc::sigset_t = std::mem::zeroed();
        if libc::sigemptyset(&mut mask) != 0
            || libc::sigaddset(&mut mask, libc::SIGSYS) != 0
            || libc::sigprocmask(libc::SIG_UNBLOCK, &mask, std::ptr::null_mut()) != 0
        {
            return Err(trapbox_sys::last_errno());
        }
    }
    Ok(())
}

/// The handler itself.
///
/// The kernel ABI wants a negative value in the return-value register,
/// while errno values are positive and the register is wider than the
/// errno. The negation happens at pointer width with the sign preserved.
extern "C" fn sig_sys(signo: libc::c_int, info: *mut libc::siginfo_t, context: *mut c_void) {
    if signo != libc::SIGSYS || info.is_null() || context.is_null() {
        std::process::abort();
    }
    // SAFETY: info points at the siginfo the kernel delivered.
    if unsafe { (*info).si_code } != SYS_SECCOMP_SI_CODE {
        std::process::abort();
    }

    // SAFETY: errno access is async-signal-safe; __errno_location is a
    // valid thread-local pointer.
    let old_errno = unsafe { *libc::__errno_location() };

    let rc = -i64::from(DEFAULT_DENY_ERRNO);

    // SAFETY: context points at the ucontext_t for this signal frame; the
    // register written is the one the kernel reads the syscall result from.
    #[cfg(target_arch = "x86_64")]
    unsafe {
        let ctx = &mut *context.cast::<libc::ucontext_t>();
        ctx.uc_mcontext.gregs[libc::REG_RAX as usize] = rc;
    }
    #[cfg(target_arch = "aarch64")]
    unsafe {
        let ctx = &mut *context.cast::<libc::ucontext_t>();
        ctx.uc_mcontext.regs[0] = rc as u64;
    }

    // SAFETY: as above.
    unsafe {
        *libc::__errno_location() = old_errno;
    }
}
