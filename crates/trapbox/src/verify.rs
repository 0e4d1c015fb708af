//! Filter program verification.
//!
//! Re-executes an emitted program against synthetic per-syscall data for
//! every number the compiler reasoned about, asserting that the program
//! returns exactly the action the policy asked for. `start` runs this in
//! debug builds so an emitter bug surfaces at installation time instead of
//! shipping a filter that diverges from its policy.
//!
//! The interpreter covers precisely the instruction forms the emitter
//! produces; anything else is reported as a malformed program.

use thiserror::Error;

use trapbox_sys::abi::{
    MAX_SYSCALL, MIN_SYSCALL, SECCOMP_ARCH, SECCOMP_DATA_ARCH_OFFSET, SECCOMP_DATA_NR_OFFSET,
    SECCOMP_RET_KILL,
};
use trapbox_sys::bpf::{
    SockFilter, BPF_ABS, BPF_JEQ, BPF_JGT, BPF_JMP, BPF_JSET, BPF_K, BPF_LD, BPF_RET, BPF_W,
};

use crate::outcome::action_for;
use crate::policy::SyscallPolicy;

/// The two `seccomp_data` fields the emitted programs load.
#[derive(Debug, Clone, Copy)]
pub struct SyscallData {
    pub nr: u32,
    pub arch: u32,
}

impl SyscallData {
    /// Data for a native-architecture call of `sysno`.
    pub fn native(sysno: i32) -> Self {
        Self {
            nr: sysno as u32,
            arch: SECCOMP_ARCH,
        }
    }
}

/// Why a program failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("instruction {pc}: unsupported opcode {code:#06x}")]
    UnsupportedInstruction { pc: usize, code: u16 },

    #[error("instruction {pc}: load from unsupported offset {offset}")]
    UnsupportedOffset { pc: usize, offset: u32 },

    #[error("jump past the end of the program at instruction {pc}")]
    JumpOutOfBounds { pc: usize },

    #[error("program ran off the end without returning")]
    NoReturn,

    #[error("syscall {sysno}: program returned {actual:#010x}, policy wants {expected:#010x}")]
    Mismatch {
        sysno: i64,
        expected: u32,
        actual: u32,
    },
}

/// Execute a filter program against one synthetic `seccomp_data`.
///
/// Jumps in emitted programs are forward-only, so execution always
/// terminates.
pub fn run_filter(program: &[SockFilter], data: &SyscallData) -> Result<u32, VerifyError> {
    let mut acc: u32 = 0;
    let mut pc = 0usize;

    while pc < program.len() {
        let insn = &program[pc];
        match insn.code {
            c if c == BPF_LD | BPF_W | BPF_ABS => {
                acc = match insn.k {
                    SECCOMP_DATA_NR_OFFSET => data.nr,
                    SECCOMP_DATA_ARCH_OFFSET => data.arch,
                    offset => return Err(VerifyError::UnsupportedOffset { pc, offset }),
                };
                pc += 1;
            }
            c if c == BPF_RET | BPF_K => return Ok(insn.k),
            c if c == BPF_JMP | BPF_JEQ | BPF_K
                || c == BPF_JMP | BPF_JGT | BPF_K
                || c == BPF_JMP | BPF_JSET | BPF_K =>
            {
                let taken = match c & !(BPF_JMP | BPF_K) {
                    BPF_JEQ => acc == insn.k,
                    BPF_JGT => acc > insn.k,
                    _ => acc & insn.k != 0,
                };
                let disp = if taken { insn.jt } else { insn.jf };
                pc = pc
                    .checked_add(1 + disp as usize)
                    .ok_or(VerifyError::JumpOutOfBounds { pc })?;
                if pc > program.len() {
                    return Err(VerifyError::JumpOutOfBounds { pc: pc - 1 - disp as usize });
                }
            }
            code => return Err(VerifyError::UnsupportedInstruction { pc, code }),
        }
    }
    Err(VerifyError::NoReturn)
}

/// Check a program against its policy over the whole space the compiler
/// reasoned about: the assigned syscall range, the out-of-range probe
/// points, and an architecture mismatch.
pub fn verify_program(
    program: &[SockFilter],
    policy: &dyn SyscallPolicy,
) -> Result<(), VerifyError> {
    for sysno in MIN_SYSCALL..=MAX_SYSCALL {
        check_one(program, policy, sysno as i32)?;
    }

    let probes: [i32; 5] = [
        -1,
        i32::MAX,
        i32::MIN,
        (i64::from(MIN_SYSCALL) - 1) as i32,
        (i64::from(MAX_SYSCALL) + 1) as i32,
    ];
    for sysno in probes {
        check_one(program, policy, sysno)?;
    }

    #[cfg(target_arch = "x86_64")]
    {
        use trapbox_sys::abi::COMPAT_SYSCALL_BIT;
        check_one(program, policy, COMPAT_SYSCALL_BIT as i32)?;
        check_one(program, policy, (COMPAT_SYSCALL_BIT | MAX_SYSCALL) as i32)?;
    }

    // A foreign-architecture call must die regardless of the number.
    let foreign = SyscallData {
        nr: 0,
        arch: !SECCOMP_ARCH,
    };
    let actual = run_filter(program, &foreign)?;
    if actual != SECCOMP_RET_KILL {
        return Err(VerifyError::Mismatch {
            sysno: 0,
            expected: SECCOMP_RET_KILL,
            actual,
        });
    }

    Ok(())
}

fn check_one(
    program: &[SockFilter],
    policy: &dyn SyscallPolicy,
    sysno: i32,
) -> Result<(), VerifyError> {
    let expected = expected_action(policy, sysno);
    let actual = run_filter(program, &SyscallData::native(sysno))?;
    if actual != expected {
        return Err(VerifyError::Mismatch {
            sysno: i64::from(sysno),
            expected,
            actual,
        });
    }
    Ok(())
}

/// The action the installed filter must return for `sysno`: the policy's
/// outcome, except that the prologue kills the x86-64 compat bank before
/// any range test runs.
fn expected_action(policy: &dyn SyscallPolicy, sysno: i32) -> u32 {
    #[cfg(target_arch = "x86_64")]
    {
        use trapbox_sys::abi::COMPAT_SYSCALL_BIT;
        if sysno as u32 & COMPAT_SYSCALL_BIT != 0 {
            return SECCOMP_RET_KILL;
        }
    }
    // The policy passed compilation, so the mapping cannot fail here.
    action_for(policy.evaluate(sysno)).unwrap_or(SECCOMP_RET_KILL)
}
