//! Policy traits and registration preconditions.
//!
//! A policy classifies every 32-bit system call number into an [`Outcome`].
//! The compiler evaluates it repeatedly at the same points and assumes
//! equal answers, so implementations must be effectively pure.

use thiserror::Error;

use trapbox_sys::abi::{MAX_SYSCALL, MIN_SYSCALL};

use crate::outcome::Outcome;

/// A total, deterministic map from syscall number to outcome.
pub trait SyscallPolicy {
    fn evaluate(&self, sysno: i32) -> Outcome;
}

/// Closures are policies.
impl<F> SyscallPolicy for F
where
    F: Fn(i32) -> Outcome,
{
    fn evaluate(&self, sysno: i32) -> Outcome {
        self(sysno)
    }
}

/// Reserved: evaluates the arguments of a call the filter could not decide
/// on number alone. Registering one aborts until [`Outcome::InspectArg`]
/// compilation exists.
pub trait ArgPolicy {
    fn evaluate(&self, sysno: i32, args: &[u64; 6]) -> Outcome;
}

/// Why a policy cannot be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// The policy permits a number outside the filterable range. Such
    /// numbers never correspond to real kernel entry points; permitting
    /// them makes the policy's tail behavior ambiguous.
    #[error("policy must deny out-of-range syscall number {0}")]
    PermitsOutOfRange(i64),

    /// x86-64 only: the policy permits a number in the x32 compat bank,
    /// which the emitted prologue unconditionally kills.
    #[error("policy must deny compat-bank syscall number {0:#x}")]
    PermitsCompatBank(i64),
}

/// Check the registration preconditions on a policy.
///
/// The policy must deny `-1`, `i32::MAX`, `i32::MIN` and both numbers just
/// outside the filterable range; on x86-64 it must also deny the x32 compat
/// bank, checked at the bank's boundary points.
pub fn validate_policy(policy: &dyn SyscallPolicy) -> Result<(), PolicyError> {
    let out_of_range: [i64; 5] = [
        -1,
        i64::from(i32::MAX),
        i64::from(i32::MIN),
        i64::from(MIN_SYSCALL) - 1,
        i64::from(MAX_SYSCALL) + 1,
    ];
    for nr in out_of_range {
        if !policy.evaluate(nr as i32).is_denied() {
            return Err(PolicyError::PermitsOutOfRange(nr));
        }
    }

    #[cfg(target_arch = "x86_64")]
    {
        use trapbox_sys::abi::COMPAT_SYSCALL_BIT;
        let bank: [u32; 3] = [
            COMPAT_SYSCALL_BIT,
            COMPAT_SYSCALL_BIT | MAX_SYSCALL,
            COMPAT_SYSCALL_BIT | 0x3fff_ffff,
        ];
        for nr in bank {
            if !policy.evaluate(nr as i32).is_denied() {
                return Err(PolicyError::PermitsCompatBank(i64::from(nr)));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deny_all(_: i32) -> Outcome {
        Outcome::Errno(libc::EPERM as u16)
    }

    #[test]
    fn deny_all_passes() {
        assert!(validate_policy(&deny_all).is_ok());
    }

    #[test]
    fn allow_all_rejected() {
        let policy = |_: i32| Outcome::Allow;
        assert_eq!(
            validate_policy(&policy),
            Err(PolicyError::PermitsOutOfRange(-1))
        );
    }

    #[test]
    fn allowing_int_max_rejected() {
        let policy = |nr: i32| {
            if nr == i32::MAX {
                Outcome::Allow
            } else {
                Outcome::Errno(libc::EPERM as u16)
            }
        };
        assert_eq!(
            validate_policy(&policy),
            Err(PolicyError::PermitsOutOfRange(i64::from(i32::MAX)))
        );
    }

    #[test]
    fn allowing_int_min_rejected() {
        let policy = |nr: i32| {
            if nr == i32::MIN {
                Outcome::Allow
            } else {
                Outcome::Errno(libc::EPERM as u16)
            }
        };
        assert_eq!(
            validate_policy(&policy),
            Err(PolicyError::PermitsOutOfRange(i64::from(i32::MIN)))
        );
    }

    #[test]
    fn allowing_past_max_syscall_rejected() {
        let past = i64::from(MAX_SYSCALL) + 1;
        let policy = move |nr: i32| {
            if i64::from(nr) == past {
                Outcome::Allow
            } else {
                Outcome::Errno(libc::EPERM as u16)
            }
        };
        assert_eq!(
            validate_policy(&policy),
            Err(PolicyError::PermitsOutOfRange(past))
        );
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn allowing_compat_bank_rejected() {
        use trapbox_sys::abi::COMPAT_SYSCALL_BIT;
        let policy = |nr: i32| {
            if nr as u32 == COMPAT_SYSCALL_BIT {
                Outcome::Allow
            } else {
                Outcome::Errno(libc::EPERM as u16)
            }
        };
        assert_eq!(
            validate_policy(&policy),
            Err(PolicyError::PermitsCompatBank(i64::from(COMPAT_SYSCALL_BIT)))
        );
    }

    #[test]
    fn trap_counts_as_denied() {
        let policy = |nr: i32| {
            if (0..=MAX_SYSCALL as i32).contains(&nr) {
                Outcome::Allow
            } else {
                Outcome::Trap
            }
        };
        assert!(validate_policy(&policy).is_ok());
    }
}
