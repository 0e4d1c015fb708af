//! Low-level seccomp-BPF kernel ABI for trapbox.
//!
//! This crate holds everything that is bit-exact kernel interface and nothing
//! that is policy: the classic BPF instruction encoding, the seccomp return
//! actions, the per-target audit architecture constants, and the two prctl
//! calls that install a filter. The policy-to-filter compiler lives in the
//! `trapbox` crate and consumes these.
//!
//! ## Modules
//!
//! - **abi** - per-target constants (`seccomp_data` offsets, actions,
//!   architecture numbers, syscall-number bounds)
//! - **bpf** - `sock_filter` / `sock_fprog` and instruction builders
//! - **seccomp** - availability check and filter installation
//!
//! # Safety
//!
//! This crate contains raw syscall wrappers. Casts between integer types
//! are unavoidable when interfacing with the kernel ABI.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod abi;
pub mod bpf;
pub mod seccomp;

#[inline]
pub fn last_errno() -> rustix::io::Errno {
    // SAFETY: __errno_location always returns a valid thread-local pointer.
    rustix::io::Errno::from_raw_os_error(unsafe { *libc::__errno_location() })
}
