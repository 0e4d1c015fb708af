//! Fatal-error primitive.
//!
//! Unsafe conditions on the installation path (policy violations, failed
//! trusted-path setup, a kernel that refuses the filter after probing) must
//! never degrade into an unsandboxed process, so they terminate it. The
//! diagnostic goes to stderr with a raw write: in the probe child stderr is
//! the diagnostic pipe back to the parent, and buffered I/O or allocation
//! may not be usable on every path that dies.

/// Write `msg` to stderr and abort the process.
pub(crate) fn die(msg: &str) -> ! {
    // SAFETY: writing a valid buffer to fd 2; failure is ignored.
    unsafe {
        libc::write(2, msg.as_ptr().cast(), msg.len());
        libc::write(2, b"\n".as_ptr().cast(), 1);
    }
    std::process::abort();
}

/// Abort without a diagnostic.
///
/// Used where the silent exit is the signal: the probe child's dry-run
/// install swallows kernel refusal this way so the parent can tell "no
/// kernel support" (empty pipe) from a compiler bug (diagnostic on the
/// pipe).
pub(crate) fn die_quietly() -> ! {
    std::process::abort();
}
