//! Terminal outcomes a policy may assign to a system call number.

use thiserror::Error;

use trapbox_sys::abi::{
    ERRNO_MAX, SECCOMP_RET_ALLOW, SECCOMP_RET_ERRNO, SECCOMP_RET_ERRNO_MASK, SECCOMP_RET_TRAP,
};

/// What the kernel should do with a system call.
///
/// `Allow` is the only permitting outcome; `Trap` and `Errno` are denied
/// outcomes. `InspectArg` is reserved for a future argument-inspection
/// extension and is rejected by the compiler. The `KILL` filter action is
/// not expressible by policies; only the architecture-check prologue emits
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Execute the system call normally.
    Allow,
    /// Deliver SIGSYS; the trap handler synthesises the return value.
    Trap,
    /// Fail the call with `-errno` without executing it. Valid range
    /// `1..=4095`.
    Errno(u16),
    /// Reserved: defer the decision to an argument evaluator for argument
    /// `1..=6`. Compilation fails while no such evaluator exists.
    InspectArg(u8),
}

impl Outcome {
    /// True for outcomes that prevent the system call from executing.
    pub fn is_denied(self) -> bool {
        matches!(self, Outcome::Trap | Outcome::Errno(_))
    }
}

/// Why an outcome has no filter action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("errno {0} outside the Linux ABI range 1..=4095")]
    ErrnoOutOfRange(u16),

    #[error("argument inspection is not implemented")]
    InspectArgNotImplemented,
}

/// Map an outcome to the 32-bit action value the filter returns for it.
pub fn action_for(outcome: Outcome) -> Result<u32, ActionError> {
    match outcome {
        Outcome::Allow => Ok(SECCOMP_RET_ALLOW),
        Outcome::Trap => Ok(SECCOMP_RET_TRAP),
        Outcome::Errno(e) => {
            if e == 0 || e > ERRNO_MAX {
                return Err(ActionError::ErrnoOutOfRange(e));
            }
            Ok(SECCOMP_RET_ERRNO | (u32::from(e) & SECCOMP_RET_ERRNO_MASK))
        }
        Outcome::InspectArg(_) => Err(ActionError::InspectArgNotImplemented),
    }
}
