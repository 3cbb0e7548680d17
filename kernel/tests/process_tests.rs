//! Process table and PCB lifecycle tests. Boots just enough of the kernel
//! (heap, frame allocator, VMM, process table) to create real processes
//! without bringing up interrupts or ever actually switching to one.

#![no_std]
#![no_main]

extern crate alloc;

use core::panic::PanicInfo;

use jarvis_kernel::error::KernelResult;
use jarvis_kernel::process::{self, creation, pcb::ProcessState};
use jarvis_kernel::test_framework::{exit_qemu, test_panic_handler, QemuExitCode};
use jarvis_kernel::{kernel_assert, kernel_assert_eq, serial_println};

/// Matches QEMU's `-m 128` test configuration; only used to size the frame
/// allocator, not actually validated against installed RAM here.
const TEST_MEM_UPPER_KIB: u32 = 128 * 1024;

#[no_mangle]
pub extern "C" fn _start() -> ! {
    jarvis_kernel::mm::init(TEST_MEM_UPPER_KIB).expect("mm init");
    process::init().expect("process init");

    serial_println!("Starting process tests...");
    run(create_process_starts_ready, "create_process_starts_ready");
    run(created_processes_get_distinct_pids, "created_processes_get_distinct_pids");
    run(reap_frees_zombie_slots, "reap_frees_zombie_slots");
    run(runnable_count_ignores_zombies, "runnable_count_ignores_zombies");
    serial_println!("All tests passed!");

    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

fn run(test: fn() -> KernelResult<()>, name: &str) {
    serial_println!("test {} ...", name);
    if let Err(e) = test() {
        serial_println!("test {} FAILED: {}", name, e);
        exit_qemu(QemuExitCode::Failed);
    }
}

fn create_process_starts_ready() -> KernelResult<()> {
    let pid = creation::create_process(None, 0x0040_0000, 8)?;
    let state = process::with_pcb(pid, |p| p.state);
    kernel_assert_eq!(state, Some(ProcessState::Ready));
    let exit_code = process::with_pcb(pid, |p| p.exit_code);
    kernel_assert_eq!(exit_code, Some(0));
    Ok(())
}

fn created_processes_get_distinct_pids() -> KernelResult<()> {
    let a = creation::create_process(None, 0x0040_0000, 4)?;
    let b = creation::create_process(None, 0x0040_0000, 4)?;
    kernel_assert!(a != b);
    Ok(())
}

fn reap_frees_zombie_slots() -> KernelResult<()> {
    let pid = creation::create_process(None, 0x0040_0000, 2)?;
    process::with_pcb(pid, |p| p.state = ProcessState::Zombie);
    process::reap();
    kernel_assert!(process::with_pcb(pid, |p| p.state).is_none());
    Ok(())
}

fn runnable_count_ignores_zombies() -> KernelResult<()> {
    let before = process::runnable_count();
    let pid = creation::create_process(None, 0x0040_0000, 1)?;
    kernel_assert_eq!(process::runnable_count(), before + 1);

    process::with_pcb(pid, |p| p.state = ProcessState::Zombie);
    kernel_assert_eq!(process::runnable_count(), before);

    process::reap();
    Ok(())
}
