//! trapbox: seccomp-BPF sandboxing for single-threaded Linux processes.
//!
//! A policy classifies every possible system call number into an outcome
//! (allow, trap, or fail with an errno); trapbox compiles that policy into
//! a BPF filter program and installs it so the kernel enforces it on every
//! subsequent system call. Installation is irreversible by design: there
//! is no way to relax or remove the filter, and no failure mode that
//! silently leaves the process unsandboxed.
//!
//! ## Quick start
//!
//! ```ignore
//! use trapbox::{Outcome, Sandbox, Status};
//!
//! let mut sandbox = Sandbox::new();
//! if sandbox.supports(None) != Status::Available {
//!     panic!("no seccomp-BPF on this system");
//! }
//! sandbox.set_policy(
//!     |nr: i32| match i64::from(nr) {
//!         n if n == libc::SYS_getpid => Outcome::Errno(libc::EPERM as u16),
//!         n if (0..=1023).contains(&n) => Outcome::Allow,
//!         _ => Outcome::Errno(libc::ENOSYS as u16),
//!     },
//!     None,
//! );
//! sandbox.start(); // from here on the kernel enforces the policy
//! ```
//!
//! ## Requirements and limits
//!
//! - Linux with `CONFIG_SECCOMP_FILTER` (probed at runtime, see
//!   [`Sandbox::supports`])
//! - the process must be single-threaded when [`Sandbox::start`] runs;
//!   threads created afterwards inherit the filter
//! - syscall arguments are not inspected; [`Outcome::InspectArg`] is
//!   reserved and rejected by the compiler

pub mod outcome;
pub mod policy;
pub mod program;
pub mod ranges;
pub mod sandbox;
pub mod verify;

mod error;
mod probe;
mod trap;

pub use outcome::Outcome;
pub use policy::{ArgPolicy, SyscallPolicy};
pub use ranges::Range;
pub use sandbox::{Sandbox, Status};
