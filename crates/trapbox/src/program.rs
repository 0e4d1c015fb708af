//! Bytecode emitter: range table to BPF filter program.
//!
//! The emitted program is a linear decision chain. Each range test costs
//! one jump per system call at runtime; a balanced tree would be
//! `O(log N)` and can replace this emitter as long as the exhaustive
//! equivalence check in `verify` still passes.
//!
//! ## Program layout
//!
//! ```text
//! [0]    LOAD seccomp_data.arch
//! [1]    JEQ  SECCOMP_ARCH      -> [3], else fall through
//! [2]    RET  KILL
//! [3]    LOAD seccomp_data.nr
//! [4]    JSET compat bit        -> [5], else [6]   (x86-64 only)
//! [5]    RET  KILL                                 (x86-64 only)
//! [..]   per range: JGT to -> skip, RET action; final range RET only
//! [last] RET  ERRNO|default    safety net, unreachable for well-formed
//!                              range tables
//! ```

use thiserror::Error;

use trapbox_sys::abi::{
    BPF_MAXINSNS, DEFAULT_DENY_ERRNO, SECCOMP_ARCH, SECCOMP_DATA_ARCH_OFFSET,
    SECCOMP_DATA_NR_OFFSET, SECCOMP_RET_ERRNO, SECCOMP_RET_KILL,
};
use trapbox_sys::bpf::{SockFilter, BPF_JEQ, BPF_JGT, BPF_JMP, BPF_K};

use crate::outcome::{action_for, ActionError};
use crate::policy::SyscallPolicy;
use crate::ranges::{find_ranges, Range, RangeError};

/// Why a range table has no filter program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error(transparent)]
    Ranges(#[from] RangeError),

    #[error("range table is empty")]
    EmptyRangeTable,

    #[error("range table does not start at 0")]
    BadFirstRange,

    #[error("range table does not end at u32::MAX")]
    BadLastRange,

    #[error("range table is not contiguous at {0}")]
    Discontiguous(u32),

    #[error("outcome for syscalls {from}..={to}: {source}")]
    BadOutcome {
        from: u32,
        to: u32,
        source: ActionError,
    },

    #[error("filter program length {0} exceeds the kernel limit")]
    ProgramTooLong(usize),
}

/// Compile a policy into a ready-to-install filter program.
///
/// Equal policies compile to byte-identical programs.
pub fn compile(policy: &dyn SyscallPolicy) -> Result<Vec<SockFilter>, CompileError> {
    let ranges = find_ranges(policy)?;
    ranges_to_bpf(&ranges)
}

/// Emit the filter program for a well-formed range table.
pub fn ranges_to_bpf(ranges: &[Range]) -> Result<Vec<SockFilter>, CompileError> {
    check_range_table(ranges)?;

    let mut program = Vec::with_capacity(ranges.len() * 2 + 8);

    // Refuse syscalls issued under a different architecture before looking
    // at the number: tables are not compatible across architectures.
    program.push(SockFilter::load_abs(SECCOMP_DATA_ARCH_OFFSET));
    program.push(SockFilter::jump(BPF_JMP | BPF_JEQ | BPF_K, SECCOMP_ARCH, 1, 0));
    program.push(SockFilter::ret(SECCOMP_RET_KILL));

    program.push(SockFilter::load_abs(SECCOMP_DATA_NR_OFFSET));

    // The x32 bank shares our audit arch; a native build must never let a
    // compat-numbered call through to the range tests.
    #[cfg(target_arch = "x86_64")]
    {
        use trapbox_sys::abi::COMPAT_SYSCALL_BIT;
        use trapbox_sys::bpf::BPF_JSET;
        program.push(SockFilter::jump(
            BPF_JMP | BPF_JSET | BPF_K,
            COMPAT_SYSCALL_BIT,
            0,
            1,
        ));
        program.push(SockFilter::ret(SECCOMP_RET_KILL));
    }

    for range in ranges {
        let action = action_for(range.outcome).map_err(|source| CompileError::BadOutcome {
            from: range.from,
            to: range.to,
            source,
        })?;
        if range.to < u32::MAX {
            program.push(SockFilter::jump(BPF_JMP | BPF_JGT | BPF_K, range.to, 1, 0));
        }
        program.push(SockFilter::ret(action));
    }

    // Unreachable for a well-formed table; still deny by default rather
    // than fall off the end of the program.
    program.push(SockFilter::ret(
        SECCOMP_RET_ERRNO | u32::from(DEFAULT_DENY_ERRNO),
    ));

    if program.len() > BPF_MAXINSNS {
        return Err(CompileError::ProgramTooLong(program.len()));
    }
    Ok(program)
}

fn check_range_table(ranges: &[Range]) -> Result<(), CompileError> {
    let Some(first) = ranges.first() else {
        return Err(CompileError::EmptyRangeTable);
    };
    if first.from != 0 {
        return Err(CompileError::BadFirstRange);
    }
    if ranges[ranges.len() - 1].to != u32::MAX {
        return Err(CompileError::BadLastRange);
    }
    for pair in ranges.windows(2) {
        if pair[0].to.checked_add(1) != Some(pair[1].from) {
            return Err(CompileError::Discontiguous(pair[1].from));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::Outcome;
    use trapbox_sys::abi::SECCOMP_RET_ALLOW;
    use trapbox_sys::bpf::{BPF_ABS, BPF_LD, BPF_RET, BPF_W};

    const EPERM: u16 = libc::EPERM as u16;

    /// Instructions ahead of the first range test.
    const fn prologue_len() -> usize {
        if cfg!(target_arch = "x86_64") {
            6
        } else {
            4
        }
    }

    fn deny_all(_: i32) -> Outcome {
        Outcome::Errno(EPERM)
    }

    #[test]
    fn prologue_checks_arch_first() {
        let program = compile(&deny_all).unwrap();
        assert_eq!(program[0].code, BPF_LD | BPF_W | BPF_ABS);
        assert_eq!(program[0].k, SECCOMP_DATA_ARCH_OFFSET);
        assert_eq!(program[1].k, SECCOMP_ARCH);
        assert_eq!(program[2], SockFilter::ret(SECCOMP_RET_KILL));
        assert_eq!(program[3].k, SECCOMP_DATA_NR_OFFSET);
    }

    #[test]
    fn default_deny_is_prologue_plus_single_return() {
        let program = compile(&deny_all).unwrap();
        // Single range: one RET, then the safety net.
        assert_eq!(program.len(), prologue_len() + 2);
        assert_eq!(
            program[prologue_len()],
            SockFilter::ret(SECCOMP_RET_ERRNO | u32::from(EPERM))
        );
    }

    #[test]
    fn two_range_policy_emits_jgt_chain() {
        let policy = |nr: i32| {
            if (0..=10).contains(&nr) {
                Outcome::Allow
            } else {
                Outcome::Errno(13)
            }
        };
        let program = compile(&policy).unwrap();
        let p = prologue_len();
        assert_eq!(
            program[p],
            SockFilter::jump(BPF_JMP | BPF_JGT | BPF_K, 10, 1, 0)
        );
        assert_eq!(program[p + 1], SockFilter::ret(SECCOMP_RET_ALLOW));
        assert_eq!(program[p + 2], SockFilter::ret(SECCOMP_RET_ERRNO | 13));
        assert_eq!(program.len(), p + 4);
    }

    #[test]
    fn compilation_is_deterministic() {
        let policy = |nr: i32| {
            if (0..=200).contains(&nr) && nr % 3 != 0 {
                Outcome::Allow
            } else {
                Outcome::Errno(EPERM)
            }
        };
        assert_eq!(compile(&policy).unwrap(), compile(&policy).unwrap());
    }

    #[test]
    fn inspect_arg_fails_compilation() {
        let policy = |nr: i32| {
            if nr == 2 {
                Outcome::InspectArg(1)
            } else {
                Outcome::Errno(EPERM)
            }
        };
        assert!(matches!(
            compile(&policy),
            Err(CompileError::BadOutcome {
                from: 2,
                to: 2,
                source: ActionError::InspectArgNotImplemented,
            })
        ));
    }

    #[test]
    fn errno_out_of_range_fails_compilation() {
        let policy = |nr: i32| {
            if nr == 2 {
                Outcome::Errno(4096)
            } else {
                Outcome::Errno(EPERM)
            }
        };
        assert!(matches!(
            compile(&policy),
            Err(CompileError::BadOutcome { .. })
        ));
    }

    #[test]
    fn malformed_tables_rejected() {
        assert_eq!(ranges_to_bpf(&[]), Err(CompileError::EmptyRangeTable));
        assert_eq!(
            ranges_to_bpf(&[Range::new(1, u32::MAX, Outcome::Errno(EPERM))]),
            Err(CompileError::BadFirstRange)
        );
        assert_eq!(
            ranges_to_bpf(&[Range::new(0, 100, Outcome::Errno(EPERM))]),
            Err(CompileError::BadLastRange)
        );
        assert_eq!(
            ranges_to_bpf(&[
                Range::new(0, 10, Outcome::Allow),
                Range::new(12, u32::MAX, Outcome::Errno(EPERM)),
            ]),
            Err(CompileError::Discontiguous(12))
        );
    }

    #[test]
    fn final_instruction_is_safety_net() {
        let program = compile(&deny_all).unwrap();
        let last = program[program.len() - 1];
        assert_eq!(last.code, BPF_RET | BPF_K);
        assert_eq!(last.k, SECCOMP_RET_ERRNO | u32::from(DEFAULT_DENY_ERRNO));
    }
}
