//! Filter installation and availability.
//!
//! Installation is the two-step prctl protocol: `PR_SET_NO_NEW_PRIVS` must
//! succeed before `PR_SET_SECCOMP`, or the kernel refuses the filter from
//! an unprivileged process. Both steps are irreversible.

use rustix::io::Errno;

use crate::bpf::SockFprog;
use crate::last_errno;

/// Returns true if the kernel was built with seccomp support.
pub fn seccomp_available() -> bool {
    // SAFETY: PR_GET_SECCOMP reads process state and takes no pointers.
    unsafe { libc::prctl(libc::PR_GET_SECCOMP, 0, 0, 0, 0) >= 0 }
}

/// Sets the no-new-privs bit for this process.
///
/// # Errors
///
/// Returns the raw errno if the prctl fails.
pub fn set_no_new_privs() -> Result<(), Errno> {
    // SAFETY: PR_SET_NO_NEW_PRIVS takes no pointers.
    let ret = unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) };
    if ret != 0 {
        return Err(last_errno());
    }
    Ok(())
}

/// Installs a seccomp filter for the current thread.
///
/// The caller must have set no-new-privs first; the kernel rejects the
/// filter otherwise.
///
/// # Safety
///
/// `fprog.filter` must point at `fprog.len` valid instructions for the
/// duration of the call, and the program must be well-formed. Once this
/// returns `Ok`, every subsequent system call is subject to the filter;
/// there is no way to remove it.
///
/// # Errors
///
/// Returns the raw errno if the kernel refuses the filter.
pub unsafe fn install_filter(fprog: &SockFprog) -> Result<(), Errno> {
    let ret = unsafe {
        libc::prctl(
            libc::PR_SET_SECCOMP,
            libc::SECCOMP_MODE_FILTER,
            fprog as *const SockFprog,
            0,
            0,
        )
    };
    if ret != 0 {
        return Err(last_errno());
    }
    Ok(())
}
