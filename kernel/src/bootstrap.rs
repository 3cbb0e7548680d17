//! Staged kernel initialization.
//!
//! Each stage only depends on the stage before it, so bringing up a new
//! subsystem never requires threading extra calls into unrelated modules.
//! `$print_fn` lets the same stage bodies serve a bare-metal target (VGA +
//! serial) and a future second architecture without duplicating the text.

use crate::{arch, drivers, error::KernelResult, fs, mm, process, sched};

#[macro_export]
macro_rules! define_bootstrap_stages {
    ($print_fn:ident) => {
        pub fn stage1_start() {
            $print_fn!("[BOOTSTRAP] Stage 1: hardware (GDT/IDT/PIC/PIT)");
        }
        pub fn stage1_complete() {
            $print_fn!("[BOOTSTRAP] hardware initialized");
        }

        pub fn stage2_start() {
            $print_fn!("[BOOTSTRAP] Stage 2: memory management");
        }
        pub fn stage2_complete() {
            $print_fn!("[BOOTSTRAP] memory management initialized");
        }

        pub fn stage3_start() {
            $print_fn!("[BOOTSTRAP] Stage 3: process table and scheduler");
        }
        pub fn stage3_complete() {
            $print_fn!("[BOOTSTRAP] process table and scheduler initialized");
        }

        pub fn stage4_start() {
            $print_fn!("[BOOTSTRAP] Stage 4: drivers");
        }
        pub fn stage4_complete() {
            $print_fn!("[BOOTSTRAP] drivers initialized");
        }

        pub fn stage5_start() {
            $print_fn!("[BOOTSTRAP] Stage 5: virtual filesystem");
        }
        pub fn stage5_complete() {
            $print_fn!("[BOOTSTRAP] virtual filesystem mounted");
        }

        pub fn stage6_start() {
            $print_fn!("[BOOTSTRAP] Stage 6: scheduler activation");
        }
        pub fn stage6_complete() {
            $print_fn!("[KERNEL] boot sequence complete");
        }
    };
}

macro_rules! boot_print {
    ($s:expr) => {
        crate::kprintln!($s)
    };
}

define_bootstrap_stages!(boot_print);

pub const BOOTSTRAP_PID: u64 = 0;

/// Run every initialization stage in order. Returns only on failure; on
/// success control passes to [`crate::sched::run`] and never returns.
pub fn kernel_init(multiboot_info_addr: u32) -> KernelResult<()> {
    stage1_start();
    // SAFETY: called exactly once, before any interrupt source is enabled.
    unsafe {
        core::arch::asm!("cli", options(nomem, nostack));
    }
    arch::x86::gdt::init();
    arch::x86::idt::init();
    arch::x86::pic::init();
    arch::x86::pit::init(crate::sched::TICK_HZ);
    stage1_complete();

    stage2_start();
    let mem_upper_kib = arch::x86::multiboot::parse_mem_upper_kib(multiboot_info_addr);
    mm::init(mem_upper_kib)?;
    {
        let mut writer = arch::x86::vga::WRITER.lock();
        let _ = crate::printk!(
            &mut *writer,
            "[BOOTSTRAP] %u KiB upper memory, %u frames free\n",
            mem_upper_kib,
            mm::frame_allocator::free_count() as u32
        );
    }
    stage2_complete();

    stage3_start();
    process::init()?;
    sched::init()?;
    stage3_complete();

    stage4_start();
    drivers::init()?;
    stage4_complete();

    stage5_start();
    fs::init()?;
    stage5_complete();

    stage6_start();
    process::creation::spawn_init_process()?;
    // SAFETY: every init stage above has completed; it is now safe to take
    // interrupts (the timer tick drives preemption from this point on).
    unsafe {
        core::arch::asm!("sti", options(nomem, nostack));
    }
    stage6_complete();

    Ok(())
}
