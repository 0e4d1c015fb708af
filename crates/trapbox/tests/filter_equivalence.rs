//! Exhaustive equivalence between policies and their compiled filters.
//!
//! These tests never install anything; they run the emitted programs
//! through the crate's BPF interpreter and compare against the policy for
//! every number the compiler reasons about.

use trapbox::outcome::Outcome;
use trapbox::program::compile;
use trapbox::ranges::{find_ranges, Range};
use trapbox::verify::{run_filter, verify_program, SyscallData};

use trapbox_sys::abi::{
    MAX_SYSCALL, SECCOMP_RET_ALLOW, SECCOMP_RET_ERRNO, SECCOMP_RET_KILL, SECCOMP_RET_TRAP,
};

const EPERM: u16 = libc::EPERM as u16;

fn allowlist_policy(nr: i32) -> Outcome {
    const ALLOWED: &[i64] = &[
        libc::SYS_read,
        libc::SYS_write,
        libc::SYS_close,
        libc::SYS_fstat,
        libc::SYS_mmap,
        libc::SYS_munmap,
        libc::SYS_brk,
        libc::SYS_exit_group,
    ];
    if ALLOWED.contains(&i64::from(nr)) {
        Outcome::Allow
    } else {
        Outcome::Errno(EPERM)
    }
}

fn mixed_policy(nr: i32) -> Outcome {
    match i64::from(nr) {
        n if n == libc::SYS_getpid => Outcome::Trap,
        n if n == libc::SYS_mkdirat => Outcome::Errno(libc::EACCES as u16),
        n if (0..=i64::from(MAX_SYSCALL)).contains(&n) => Outcome::Allow,
        _ => Outcome::Errno(libc::ENOSYS as u16),
    }
}

/// Deterministic policy with many small ranges.
fn striped_policy(nr: i32) -> Outcome {
    if !(0..=MAX_SYSCALL as i32).contains(&nr) {
        return Outcome::Errno(EPERM);
    }
    match nr % 5 {
        0 | 3 => Outcome::Allow,
        1 => Outcome::Errno(EPERM),
        2 => Outcome::Trap,
        _ => Outcome::Errno(libc::EINVAL as u16),
    }
}

#[test]
fn allowlist_policy_matches_filter_everywhere() {
    let program = compile(&allowlist_policy).unwrap();
    verify_program(&program, &allowlist_policy).unwrap();
}

#[test]
fn mixed_policy_matches_filter_everywhere() {
    let program = compile(&mixed_policy).unwrap();
    verify_program(&program, &mixed_policy).unwrap();
}

#[test]
fn striped_policy_matches_filter_everywhere() {
    let program = compile(&striped_policy).unwrap();
    verify_program(&program, &striped_policy).unwrap();
}

#[test]
fn compiling_twice_is_byte_identical() {
    for policy in [allowlist_policy, mixed_policy, striped_policy] {
        assert_eq!(compile(&policy).unwrap(), compile(&policy).unwrap());
    }
}

#[test]
fn range_table_policy_reproduces_its_table() {
    let table = vec![
        Range::new(0, 2, Outcome::Errno(EPERM)),
        Range::new(3, 3, Outcome::Allow),
        Range::new(4, 100, Outcome::Errno(EPERM)),
        Range::new(101, 101, Outcome::Trap),
        Range::new(102, u32::MAX, Outcome::Errno(EPERM)),
    ];
    let lookup = table.clone();
    let policy = move |nr: i32| {
        let nr = nr as u32;
        lookup
            .iter()
            .find(|r| r.from <= nr && nr <= r.to)
            .map(|r| r.outcome)
            .unwrap()
    };
    assert_eq!(find_ranges(&policy).unwrap(), table);
}

#[test]
fn boundary_numbers() {
    let policy = |nr: i32| {
        if (0..=10).contains(&nr) {
            Outcome::Allow
        } else {
            Outcome::Errno(13)
        }
    };
    let program = compile(&policy).unwrap();

    let allow = SECCOMP_RET_ALLOW;
    let deny = SECCOMP_RET_ERRNO | 13;
    // Numbers carrying bit 30 are killed by the prologue on x86-64 and
    // plain policy business on aarch64.
    let high_bit = if cfg!(target_arch = "x86_64") {
        SECCOMP_RET_KILL
    } else {
        deny
    };

    let cases: &[(i64, u32)] = &[
        (0, allow),
        (1, allow),
        (10, allow),
        (11, deny),
        (i64::from(MAX_SYSCALL), deny),
        (i64::from(MAX_SYSCALL) + 1, deny),
        (i64::from(i32::MIN), deny),
        (-1, high_bit),
        (i64::from(i32::MAX), high_bit),
        (0x4000_0000, high_bit),
        (0xffff_ffff, high_bit),
    ];
    for &(sysno, expected) in cases {
        let data = SyscallData::native(sysno as i32);
        assert_eq!(
            run_filter(&program, &data).unwrap(),
            expected,
            "syscall {sysno:#x}"
        );
    }
}

#[test]
fn default_deny_program_shape() {
    let policy = |_: i32| Outcome::Errno(EPERM);
    let program = compile(&policy).unwrap();
    let prologue = if cfg!(target_arch = "x86_64") { 6 } else { 4 };
    // Prologue, one return for the single range, the safety net.
    assert_eq!(program.len(), prologue + 2);
    assert_eq!(program[prologue].k, SECCOMP_RET_ERRNO | u32::from(EPERM));
}

#[test]
fn trap_action_reaches_the_filter() {
    let program = compile(&mixed_policy).unwrap();
    let data = SyscallData::native(libc::SYS_getpid as i32);
    assert_eq!(run_filter(&program, &data).unwrap(), SECCOMP_RET_TRAP);
}

#[test]
fn inconsistent_policy_fails_compilation() {
    let policy = |nr: i32| {
        if nr == i32::MAX {
            Outcome::Allow
        } else {
            Outcome::Errno(1)
        }
    };
    let err = compile(&policy).unwrap_err();
    assert!(err.to_string().contains("invalid seccomp policy"));
}
