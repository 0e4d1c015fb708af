//! Range-coalescing compiler front end.
//!
//! `seccomp_data` defines the syscall number as a signed 32-bit integer,
//! but BPF compares unsigned quantities. The walk therefore enumerates the
//! assigned syscall range as unsigned numbers and then verifies that the
//! rest of the 32-bit space, positive and negative, all map to the same
//! outcome as the tail of the walk. That shared outcome becomes the default
//! for everything not covered by an explicit range.

use thiserror::Error;

use trapbox_sys::abi::{MAX_SYSCALL, MIN_SYSCALL};

use crate::outcome::Outcome;
use crate::policy::SyscallPolicy;

/// A run of consecutive syscall numbers with the same outcome. Bounds are
/// inclusive and interpreted as unsigned 32-bit numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub from: u32,
    pub to: u32,
    pub outcome: Outcome,
}

impl Range {
    pub fn new(from: u32, to: u32, outcome: Outcome) -> Self {
        Self { from, to, outcome }
    }
}

/// Why a policy has no range table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RangeError {
    /// The policy's decisions on out-of-range numbers differ from its tail
    /// decision, so no single default outcome exists.
    #[error("invalid seccomp policy: out-of-range decisions diverge from the default outcome")]
    InconsistentDefault,
}

/// Coalesce a policy into a range table covering all of `[0, u32::MAX]`.
///
/// The table satisfies: first range starts at 0, ranges are contiguous and
/// monotone, the last range ends at `u32::MAX`, and no two adjacent ranges
/// share an outcome.
pub fn find_ranges(policy: &dyn SyscallPolicy) -> Result<Vec<Range>, RangeError> {
    let mut ranges = Vec::new();
    let mut old_sysnum: u32 = 0;
    let mut old_outcome = policy.evaluate(old_sysnum as i32);

    for sysnum in MIN_SYSCALL.max(1)..=MAX_SYSCALL + 1 {
        let outcome = policy.evaluate(sysnum as i32);
        if outcome != old_outcome {
            ranges.push(Range::new(old_sysnum, sysnum - 1, old_outcome));
            old_sysnum = sysnum;
            old_outcome = outcome;
        }
    }

    // The walk ran past MAX_SYSCALL, so old_outcome is the candidate default
    // for every remaining number. It must agree with the policy across the
    // rest of the signed 32-bit space or the policy is ambiguous.
    if old_outcome != policy.evaluate(i32::MAX)
        || old_outcome != policy.evaluate(i32::MIN)
        || old_outcome != policy.evaluate(-1)
    {
        return Err(RangeError::InconsistentDefault);
    }
    ranges.push(Range::new(old_sysnum, u32::MAX, old_outcome));

    Ok(ranges)
}
