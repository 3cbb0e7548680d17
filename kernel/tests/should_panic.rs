//! A binary that is expected to panic. Its panic handler reports success;
//! reaching the end of `_start` without panicking is the failure case.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use jarvis_kernel::serial_println;
use jarvis_kernel::test_framework::{exit_qemu, QemuExitCode};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("should_panic: panicking on purpose...");
    should_fail();
    serial_println!("should_panic: did not panic!");
    exit_qemu(QemuExitCode::Failed)
}

fn should_fail() {
    assert_eq!(1, 2, "1 does not equal 2, as expected");
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    serial_println!("[ok] panicked as expected: {}", info);
    exit_qemu(QemuExitCode::Success)
}
