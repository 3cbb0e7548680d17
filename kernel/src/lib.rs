//! Jarvis kernel: a 32-bit protected-mode monolithic kernel.
//!
//! `lib.rs` hosts the entire kernel; `main.rs` is a thin shim so the
//! `[[bin]]` target links in this crate's `#[no_mangle]` entry point
//! (`arch::x86::entry::_start`).

#![no_std]
#![cfg_attr(target_os = "none", no_main)]
#![feature(naked_functions)]
#![cfg_attr(target_os = "none", feature(alloc_error_handler))]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(not(target_os = "none"))]
extern crate std;

#[macro_use]
pub mod print;
#[macro_use]
pub mod serial;

pub mod arch;
pub mod bootstrap;
pub mod drivers;
pub mod error;
pub mod fs;
pub mod mm;
pub mod printk;
pub mod process;
pub mod sched;
pub mod sync;
pub mod syscall;
pub mod test_framework;

#[cfg(all(feature = "alloc", target_os = "none"))]
#[global_allocator]
static ALLOCATOR: mm::heap::KernelAllocator = mm::heap::KernelAllocator::new();

#[cfg(all(feature = "alloc", not(target_os = "none")))]
#[global_allocator]
static SYSTEM_ALLOCATOR: std::alloc::System = std::alloc::System;

#[cfg(target_os = "none")]
#[alloc_error_handler]
fn alloc_error_handler(layout: core::alloc::Layout) -> ! {
    panic!("heap allocation failed: {:?}", layout);
}

/// Called from [`arch::x86::entry::kernel_entry`] once the multiboot magic
/// has been verified. Runs every boot stage and then the scheduler's main
/// loop; does not return on success.
#[cfg_attr(not(test), no_mangle)]
pub fn kernel_main(multiboot_info_addr: u32) -> ! {
    kprintln!("Jarvis-OS kernel v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = bootstrap::kernel_init(multiboot_info_addr) {
        panic!("kernel initialization failed: {}", e);
    }

    sched::run()
}

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    kprintln!("[PANIC] {}", info);
    serial_println!("[PANIC] {}", info);
    arch::x86::halt();
}

#[cfg(test)]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    test_framework::test_panic_handler(info)
}
