//! Interrupt Descriptor Table: 256 entries, one shared stub per vector class.
//!
//! Vectors 0-31 are CPU exceptions, 32-47 are PIC-remapped IRQs, and 0x80 is
//! the syscall trap gate (DPL=3 so ring 3 code may execute `int 0x80`).
//! Every vector funnels into [`common_interrupt_entry`], matching the
//! "shared stub, branch on vector number" design used throughout this
//! kernel's interrupt handling.

use core::mem::size_of;

use spin::Mutex;

use crate::arch::x86::pic;

pub const SYSCALL_VECTOR: u8 = 0x80;
pub const TIMER_VECTOR: u8 = 32;
pub const KEYBOARD_VECTOR: u8 = 33;

const GATE_INTERRUPT_RING0: u8 = 0x8E;
const GATE_INTERRUPT_RING3: u8 = 0xEE;

#[derive(Clone, Copy)]
#[repr(C, packed)]
struct IdtEntry {
    offset_low: u16,
    selector: u16,
    zero: u8,
    type_attr: u8,
    offset_high: u16,
}

impl IdtEntry {
    const fn missing() -> Self {
        IdtEntry { offset_low: 0, selector: 0, zero: 0, type_attr: 0, offset_high: 0 }
    }

    fn new(handler: u32, type_attr: u8) -> Self {
        IdtEntry {
            offset_low: (handler & 0xFFFF) as u16,
            selector: crate::arch::x86::gdt::KERNEL_CODE_SELECTOR,
            zero: 0,
            type_attr,
            offset_high: ((handler >> 16) & 0xFFFF) as u16,
        }
    }
}

#[repr(C, packed)]
struct IdtPointer {
    limit: u16,
    base: u32,
}

struct IdtTable([IdtEntry; 256]);
// SAFETY: mutated only in `init()`, before interrupts are enabled.
unsafe impl Sync for IdtTable {}

static IDT: Mutex<IdtTable> = Mutex::new(IdtTable([IdtEntry::missing(); 256]));

/// Stub table generated in assembly: one tiny entry point per vector that
/// pushes the vector number (and a dummy error code for vectors that don't
/// push one natively) and jumps to [`common_interrupt_entry`].
///
/// Implemented with a macro-generated `global_asm!` block rather than 256
/// hand-written functions.
macro_rules! isr_stub_no_error_code {
    ($name:ident, $vector:expr) => {
        core::arch::global_asm!(
            concat!(".global ", stringify!($name)),
            concat!(stringify!($name), ":"),
            "push 0",
            concat!("push ", stringify!($vector)),
            "jmp common_interrupt_stub",
        );
    };
}

macro_rules! isr_stub_with_error_code {
    ($name:ident, $vector:expr) => {
        core::arch::global_asm!(
            concat!(".global ", stringify!($name)),
            concat!(stringify!($name), ":"),
            concat!("push ", stringify!($vector)),
            "jmp common_interrupt_stub",
        );
    };
}

core::arch::global_asm!(
    r#"
.extern common_interrupt_entry
common_interrupt_stub:
    pusha
    push ds
    push es
    push fs
    push gs
    mov ax, 0x10
    mov ds, ax
    mov es, ax
    mov fs, ax
    mov gs, ax
    push esp
    call common_interrupt_entry
    add esp, 4
    pop gs
    pop fs
    pop es
    pop ds
    popa
    add esp, 8
    iretd
"#
);

isr_stub_no_error_code!(isr0, 0);
isr_stub_with_error_code!(isr8, 8);
isr_stub_with_error_code!(isr13, 13);
isr_stub_with_error_code!(isr14, 14);
isr_stub_no_error_code!(isr32, 32);
isr_stub_no_error_code!(isr33, 33);
isr_stub_no_error_code!(isr0x80, 0x80);

extern "C" {
    fn isr0();
    fn isr8();
    fn isr13();
    fn isr14();
    fn isr32();
    fn isr33();
    fn isr0x80();
}

/// Raw register state captured by the shared stub, as pushed on the kernel
/// stack. Matches the PCB's `saved_register_frame_ptr` layout.
#[repr(C)]
pub struct InterruptFrame {
    pub gs: u32,
    pub fs: u32,
    pub es: u32,
    pub ds: u32,
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub esp_dummy: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub vector: u32,
    pub error_code: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub user_esp: u32,
    pub user_ss: u32,
}

/// Entry point reached from every vector via `common_interrupt_stub`.
///
/// Dispatches to the exception handler, the timer tick, the keyboard
/// driver, or the syscall table, then returns so the stub can `iretd`.
#[no_mangle]
extern "C" fn common_interrupt_entry(frame: *mut InterruptFrame) {
    // SAFETY: `frame` is the stack address pushed by `common_interrupt_stub`,
    // which always leaves a fully-initialized `InterruptFrame` in place.
    let frame = unsafe { &mut *frame };
    match frame.vector {
        0 => panic!("divide-by-zero exception, eip={:#x}", frame.eip),
        8 => panic!("double fault, error_code={:#x}", frame.error_code),
        13 => panic!(
            "general protection fault, error_code={:#x}, eip={:#x}",
            frame.error_code, frame.eip
        ),
        14 => {
            let fault_addr: u32;
            // SAFETY: reading CR2 is side-effect-free and always valid inside
            // a page fault handler.
            unsafe {
                core::arch::asm!("mov {0}, cr2", out(reg) fault_addr);
            }
            crate::mm::page_fault::handle_page_fault(fault_addr, frame.error_code, frame);
        }
        v if v == TIMER_VECTOR as u32 => {
            pic::send_eoi(0);
            crate::arch::timer::tick();
        }
        v if v == KEYBOARD_VECTOR as u32 => {
            crate::drivers::keyboard::handle_irq();
            pic::send_eoi(1);
        }
        v if v == SYSCALL_VECTOR as u32 => {
            let result = crate::syscall::dispatch(
                frame.eax as usize,
                frame.ebx as usize,
                frame.ecx as usize,
                frame.edx as usize,
                frame.esi as usize,
                frame.edi as usize,
            );
            frame.eax = result as u32;
        }
        other => panic!("unhandled interrupt vector {}", other),
    }
}

/// Populate the IDT and load it with `lidt`.
pub fn init() {
    let mut idt = IDT.lock();
    idt.0[0] = IdtEntry::new(isr0 as u32, GATE_INTERRUPT_RING0);
    idt.0[8] = IdtEntry::new(isr8 as u32, GATE_INTERRUPT_RING0);
    idt.0[13] = IdtEntry::new(isr13 as u32, GATE_INTERRUPT_RING0);
    idt.0[14] = IdtEntry::new(isr14 as u32, GATE_INTERRUPT_RING0);
    idt.0[32] = IdtEntry::new(isr32 as u32, GATE_INTERRUPT_RING0);
    idt.0[33] = IdtEntry::new(isr33 as u32, GATE_INTERRUPT_RING0);
    idt.0[0x80] = IdtEntry::new(isr0x80 as u32, GATE_INTERRUPT_RING3);

    let ptr = IdtPointer {
        limit: (size_of::<[IdtEntry; 256]>() - 1) as u16,
        base: idt.0.as_ptr() as u32,
    };
    // SAFETY: `ptr` references the `'static` IDT populated above.
    unsafe {
        core::arch::asm!("lidt [{0}]", in(reg) &ptr);
    }
}
