//! Per-target kernel constants.
//!
//! Every `offsetof`-style number the filter compiler relies on lives here,
//! so the emitter never computes layout on its own. Values come from
//! `/usr/include/linux/seccomp.h`, `/usr/include/linux/audit.h` and
//! `/usr/include/linux/filter.h`.

/// Offset of `seccomp_data.nr` (the syscall number, 32-bit load).
pub const SECCOMP_DATA_NR_OFFSET: u32 = 0;

/// Offset of `seccomp_data.arch` (the audit architecture, 32-bit load).
pub const SECCOMP_DATA_ARCH_OFFSET: u32 = 4;

// Seccomp filter return actions. The low 16 bits of ERRNO carry data; the
// Linux ABI only honors errno values up to 4095.
pub const SECCOMP_RET_KILL: u32 = 0x0000_0000;
pub const SECCOMP_RET_TRAP: u32 = 0x0003_0000;
pub const SECCOMP_RET_ERRNO: u32 = 0x0005_0000;
pub const SECCOMP_RET_ALLOW: u32 = 0x7fff_0000;

/// Mask for the errno payload of a `SECCOMP_RET_ERRNO` action.
pub const SECCOMP_RET_ERRNO_MASK: u32 = 0x0000_0fff;

/// Largest errno value the kernel conveys to user space.
pub const ERRNO_MAX: u16 = 4095;

/// `si_code` reported in `siginfo_t` when SIGSYS originates from seccomp.
/// See `/usr/include/linux/seccomp.h` (`SYS_SECCOMP`); not exported by libc.
pub const SYS_SECCOMP_SI_CODE: i32 = 1;

/// Kernel limit on filter program length (`BPF_MAXINSNS`).
pub const BPF_MAXINSNS: usize = 4096;

/// Errno returned for system calls denied without a more specific outcome.
/// Also the value the SIGSYS handler synthesises for trapped calls.
pub const DEFAULT_DENY_ERRNO: u16 = libc::EPERM as u16;

/// Audit architecture constant of the build target, compared against
/// `seccomp_data.arch` by the filter prologue.
/// `AUDIT_ARCH_X86_64 = EM_X86_64 | __AUDIT_ARCH_64BIT | __AUDIT_ARCH_LE`.
#[cfg(target_arch = "x86_64")]
pub const SECCOMP_ARCH: u32 = 62 | 0x8000_0000 | 0x4000_0000;

/// `AUDIT_ARCH_AARCH64 = EM_AARCH64 | __AUDIT_ARCH_64BIT | __AUDIT_ARCH_LE`.
#[cfg(target_arch = "aarch64")]
pub const SECCOMP_ARCH: u32 = 183 | 0x8000_0000 | 0x4000_0000;

/// On x86-64 the x32 compat ABI shares the audit architecture with the
/// native one and is distinguished by this bit in the syscall number. The
/// prologue kills any number carrying it. aarch64 compat callers show up
/// under a different `seccomp_data.arch`, so no such bit exists there.
#[cfg(target_arch = "x86_64")]
pub const COMPAT_SYSCALL_BIT: u32 = 0x4000_0000;

/// Lowest syscall number assigned on this target.
pub const MIN_SYSCALL: u32 = 0;

/// Upper bound of the syscall-number walk. Above the highest assigned
/// number on both supported targets, with headroom for newer kernels.
pub const MAX_SYSCALL: u32 = 1023;
