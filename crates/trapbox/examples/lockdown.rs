//! Install a filter that forbids creating directories, then demonstrate
//! the denial from inside the sandbox.
//!
//! ```sh
//! cargo run --example lockdown
//! ```

use trapbox::{Outcome, Sandbox, Status};
use trapbox_sys::abi::MAX_SYSCALL;

fn makes_directories(n: i64) -> bool {
    // glibc routes mkdir(3) through either entry point depending on the
    // architecture.
    #[cfg(target_arch = "x86_64")]
    if n == libc::SYS_mkdir {
        return true;
    }
    n == libc::SYS_mkdirat
}

fn policy(nr: i32) -> Outcome {
    match i64::from(nr) {
        n if makes_directories(n) => Outcome::Errno(libc::EPERM as u16),
        n if (0..=i64::from(MAX_SYSCALL)).contains(&n) => Outcome::Allow,
        _ => Outcome::Errno(libc::ENOSYS as u16),
    }
}

fn main() {
    let mut sandbox = Sandbox::new();
    match sandbox.supports(None) {
        Status::Available => {}
        status => {
            eprintln!("sandbox not available here: {status:?}");
            std::process::exit(1);
        }
    }

    sandbox.set_policy(policy, None);
    sandbox.start();
    println!("sandbox enabled: {:?}", sandbox.status());

    match std::fs::create_dir("/tmp/trapbox-demo") {
        Err(e) => println!("mkdir denied as intended: {e}"),
        Ok(()) => {
            println!("mkdir unexpectedly succeeded");
            std::process::exit(1);
        }
    }
}
