//! Exercises the global heap allocator standalone, without the rest of the
//! boot sequence -- [`jarvis_kernel::mm::heap::init`] only needs its own
//! static arena, not the frame allocator or paging.

#![no_std]
#![no_main]

extern crate alloc;

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::panic::PanicInfo;

use jarvis_kernel::test_framework::{exit_qemu, test_panic_handler, QemuExitCode};
use jarvis_kernel::{kernel_assert_eq, serial_println};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    jarvis_kernel::mm::heap::init().expect("heap init");

    serial_println!("Starting allocator tests...");
    run(small_allocations_round_trip, "small_allocations_round_trip");
    run(vec_growth_reallocates, "vec_growth_reallocates");
    run(large_allocation_uses_arena, "large_allocation_uses_arena");
    run(freed_memory_is_reusable, "freed_memory_is_reusable");
    serial_println!("All tests passed!");

    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

fn run(test: fn() -> jarvis_kernel::error::KernelResult<()>, name: &str) {
    serial_println!("test {} ...", name);
    if let Err(e) = test() {
        serial_println!("test {} FAILED: {}", name, e);
        exit_qemu(QemuExitCode::Failed);
    }
}

fn small_allocations_round_trip() -> jarvis_kernel::error::KernelResult<()> {
    let boxed = Box::new(42u32);
    kernel_assert_eq!(*boxed, 42);
    drop(boxed);
    Ok(())
}

fn vec_growth_reallocates() -> jarvis_kernel::error::KernelResult<()> {
    let mut v = Vec::new();
    for i in 0..2000u32 {
        v.push(i);
    }
    kernel_assert_eq!(v.len(), 2000);
    kernel_assert_eq!(v[1999], 1999);
    Ok(())
}

fn large_allocation_uses_arena() -> jarvis_kernel::error::KernelResult<()> {
    // Bigger than the largest size class (1024 B), so this is carved
    // straight out of the large arena rather than a size-class free list.
    let big: Vec<u8> = alloc::vec![0u8; 8192];
    kernel_assert_eq!(big.len(), 8192);
    Ok(())
}

fn freed_memory_is_reusable() -> jarvis_kernel::error::KernelResult<()> {
    for _ in 0..100 {
        let v: Vec<u8> = alloc::vec![0xAA; 256];
        kernel_assert_eq!(v[0], 0xAA);
    }
    Ok(())
}
