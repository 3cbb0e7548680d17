//! Bare-metal test harness.
//!
//! Integration tests under `kernel/tests/` are `no_std`/`no_main` binaries
//! with their own `_start`; they call [`test_runner`] directly (there is no
//! libtest on this target) and report results over the serial line before
//! exiting QEMU through the ISA debug-exit device at port 0xf4.

use crate::error::KernelResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    Success = 0x10,
    Failed = 0x11,
}

/// Exit QEMU via the `isa-debug-exit` device. Requires the kernel to be run
/// with `-device isa-debug-exit,iobase=0xf4,iosize=0x04`.
pub fn exit_qemu(exit_code: QemuExitCode) -> ! {
    // SAFETY: port 0xf4 is only meaningful under QEMU with isa-debug-exit
    // attached; this function is only reachable from test binaries.
    unsafe {
        crate::arch::x86::port::outl(0xf4, exit_code as u32);
    }
    unreachable!("isa-debug-exit did not terminate the VM");
}

pub fn test_panic_handler(info: &core::panic::PanicInfo) -> ! {
    crate::serial_println!("[failed]\n");
    crate::serial_println!("Error: {}\n", info);
    exit_qemu(QemuExitCode::Failed)
}

/// A runnable test case. The blanket impl lets any `Fn() -> KernelResult<()>`
/// be passed straight to [`test_runner`].
pub trait Testable {
    fn run(&self) -> KernelResult<()>;
    fn name(&self) -> &'static str;
}

impl<T> Testable for T
where
    T: Fn() -> KernelResult<()>,
{
    fn run(&self) -> KernelResult<()> {
        self()
    }

    fn name(&self) -> &'static str {
        core::any::type_name::<T>()
    }
}

/// Run every test, reporting pass/fail per test over serial, then exit QEMU
/// with [`QemuExitCode::Failed`] if any test failed.
pub fn test_runner(tests: &[&dyn Testable]) -> ! {
    crate::serial_println!("running {} tests", tests.len());
    let mut failed = 0;
    for test in tests {
        crate::serial_print!("test {} ... ", test.name());
        match test.run() {
            Ok(()) => crate::serial_println!("ok"),
            Err(e) => {
                crate::serial_println!("FAILED: {}", e);
                failed += 1;
            }
        }
    }
    if failed == 0 {
        exit_qemu(QemuExitCode::Success)
    } else {
        crate::serial_println!("{} test(s) failed", failed);
        exit_qemu(QemuExitCode::Failed)
    }
}

/// Declare a kernel test function, for use in `kernel/tests/*.rs` binaries
/// that have no libtest harness.
#[macro_export]
macro_rules! kernel_test {
    (fn $name:ident() $body:block) => {
        pub fn $name() -> $crate::error::KernelResult<()> {
            $body
        }
    };
}

#[macro_export]
macro_rules! kernel_assert {
    ($cond:expr) => {
        if !$cond {
            return Err($crate::error::KernelError::InvalidArgument {
                name: stringify!($cond),
                value: "assertion failed",
            });
        }
    };
}

#[macro_export]
macro_rules! kernel_assert_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err($crate::error::KernelError::InvalidArgument {
                name: stringify!($left == $right),
                value: "assertion failed",
            });
        }
    };
}
