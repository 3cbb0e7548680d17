//! Kernel-stack context switch.
//!
//! A process's `saved_register_frame_ptr` (see the PCB, `process::pcb`)
//! points at a [`CalleeSavedFrame`] sitting on top of its kernel stack.
//! Switching contexts is just "save the callee-saved registers and esp for
//! the outgoing task, then restore them for the incoming task" -- the
//! cheap half of a task switch; the expensive half (address space, TSS
//! esp0) is done by the scheduler before calling this.

use core::arch::asm;

/// Registers a function call does not already preserve across `call`, saved
/// by [`switch_to`] on the outgoing kernel stack.
#[repr(C)]
pub struct CalleeSavedFrame {
    pub ebx: u32,
    pub esi: u32,
    pub edi: u32,
    pub ebp: u32,
    pub eip: u32,
}

/// Switch the live kernel stack from `old_esp_slot` to `new_esp`.
///
/// # Safety
/// `old_esp_slot` must point at the `saved_register_frame_ptr` field of the
/// currently-running process's PCB, and `new_esp` must be a stack pointer
/// previously produced by [`prepare_initial_frame`] or a prior call to this
/// function for a task that is not currently running elsewhere. Must be
/// called with interrupts disabled.
#[naked]
pub unsafe extern "C" fn switch_to(old_esp_slot: *mut u32, new_esp: u32) {
    // SAFETY: naked function body; the calling convention places
    // `old_esp_slot` in [esp+4] and `new_esp` in [esp+8] per cdecl.
    unsafe {
        asm!(
            "push ebp",
            "push edi",
            "push esi",
            "push ebx",
            "mov eax, [esp + 20]", // old_esp_slot
            "mov [eax], esp",
            "mov esp, [esp + 24]", // new_esp
            "pop ebx",
            "pop esi",
            "pop edi",
            "pop ebp",
            "ret",
            options(noreturn),
        );
    }
}

/// Build the initial kernel-stack frame for a brand-new process so that the
/// first [`switch_to`] into it "returns" into `entry_trampoline`, which in
/// turn drops to ring 3 at `user_entry`/`user_stack`.
///
/// Returns the esp value to store as `saved_register_frame_ptr`.
pub fn prepare_initial_frame(
    kernel_stack_top: u32,
    user_entry: u32,
    user_stack: u32,
) -> u32 {
    // SAFETY: `kernel_stack_top` is the high end of a freshly allocated,
    // exclusively-owned kernel stack; writes stay within the reserved
    // region below it.
    unsafe {
        let mut sp = kernel_stack_top as *mut u32;

        sp = sp.sub(1);
        *sp = user_stack;
        sp = sp.sub(1);
        *sp = user_entry;
        sp = sp.sub(1);
        *sp = entry_trampoline as u32;

        // CalleeSavedFrame restored by switch_to's epilogue: ebp, edi, esi, ebx.
        sp = sp.sub(1);
        *sp = 0; // ebp
        sp = sp.sub(1);
        *sp = 0; // edi
        sp = sp.sub(1);
        *sp = 0; // esi
        sp = sp.sub(1);
        *sp = 0; // ebx

        sp as u32
    }
}

/// Build the initial kernel-stack frame for a process that runs entirely in
/// ring 0 (the bootstrap/init task -- every other process is a ring 3
/// user process built with [`prepare_initial_frame`]). The first
/// `switch_to` into this task "returns" straight into `entry`, with no
/// privilege transition.
///
/// Returns the esp value to store as `saved_register_frame_ptr`.
pub fn prepare_initial_kernel_frame(kernel_stack_top: u32, entry: extern "C" fn() -> !) -> u32 {
    // SAFETY: see `prepare_initial_frame`.
    unsafe {
        let mut sp = kernel_stack_top as *mut u32;

        sp = sp.sub(1);
        *sp = entry as u32;

        sp = sp.sub(1);
        *sp = 0; // ebp
        sp = sp.sub(1);
        *sp = 0; // edi
        sp = sp.sub(1);
        *sp = 0; // esi
        sp = sp.sub(1);
        *sp = 0; // ebx

        sp as u32
    }
}

/// Reached via `ret` from the first `switch_to` into a new task. Pops the
/// user entry point and stack saved by [`prepare_initial_frame`] and drops
/// to ring 3 via `iretd`.
#[naked]
unsafe extern "C" fn entry_trampoline() {
    // SAFETY: naked function; stack layout matches `prepare_initial_frame`.
    unsafe {
        asm!(
            "pop eax", // user_entry
            "pop ebx", // user_stack
            "mov cx, {user_data}",
            "mov ds, cx",
            "mov es, cx",
            "mov fs, cx",
            "mov gs, cx",
            "push {user_data}",
            "push ebx",
            "pushfd",
            "push {user_code}",
            "push eax",
            "iretd",
            user_data = const crate::arch::x86::gdt::USER_DATA_SELECTOR as u32,
            user_code = const crate::arch::x86::gdt::USER_CODE_SELECTOR as u32,
            options(noreturn),
        );
    }
}
