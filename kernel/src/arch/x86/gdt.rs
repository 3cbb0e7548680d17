//! Global Descriptor Table and Task State Segment for 32-bit protected mode.
//!
//! Five descriptors: null, kernel code/data (ring 0), user code/data (ring 3),
//! plus the TSS used only to hold `esp0`/`ss0` for ring 3 -> ring 0
//! transitions (this kernel does not use hardware task switching).

use core::mem::size_of;

use lazy_static::lazy_static;
use spin::Mutex;

pub const KERNEL_CODE_SELECTOR: u16 = 0x08;
pub const KERNEL_DATA_SELECTOR: u16 = 0x10;
pub const USER_CODE_SELECTOR: u16 = 0x18 | 3;
pub const USER_DATA_SELECTOR: u16 = 0x20 | 3;
pub const TSS_SELECTOR: u16 = 0x28;

#[derive(Clone, Copy)]
#[repr(C, packed)]
struct GdtEntry {
    limit_low: u16,
    base_low: u16,
    base_mid: u8,
    access: u8,
    granularity: u8,
    base_high: u8,
}

impl GdtEntry {
    const fn null() -> Self {
        GdtEntry { limit_low: 0, base_low: 0, base_mid: 0, access: 0, granularity: 0, base_high: 0 }
    }

    const fn new(base: u32, limit: u32, access: u8, flags: u8) -> Self {
        GdtEntry {
            limit_low: (limit & 0xFFFF) as u16,
            base_low: (base & 0xFFFF) as u16,
            base_mid: ((base >> 16) & 0xFF) as u8,
            access,
            granularity: (((limit >> 16) & 0x0F) as u8) | (flags << 4),
            base_high: ((base >> 24) & 0xFF) as u8,
        }
    }
}

#[repr(C, packed)]
struct GdtPointer {
    limit: u16,
    base: u32,
}

/// 32-bit TSS. Only `esp0`/`ss0` are used; the rest exists because the
/// processor expects the full 104-byte structure when an entry is loaded
/// with `ltr`, even though this kernel switches tasks in software.
#[repr(C, packed)]
pub struct Tss {
    prev_tss: u32,
    pub esp0: u32,
    pub ss0: u32,
    esp1: u32,
    ss1: u32,
    esp2: u32,
    ss2: u32,
    cr3: u32,
    eip: u32,
    eflags: u32,
    eax: u32,
    ecx: u32,
    edx: u32,
    ebx: u32,
    esp: u32,
    ebp: u32,
    esi: u32,
    edi: u32,
    es: u32,
    cs: u32,
    ss: u32,
    ds: u32,
    fs: u32,
    gs: u32,
    ldt: u32,
    trap: u16,
    iomap_base: u16,
}

impl Tss {
    const fn new() -> Self {
        Tss {
            prev_tss: 0,
            esp0: 0,
            ss0: KERNEL_DATA_SELECTOR as u32,
            esp1: 0,
            ss1: 0,
            esp2: 0,
            ss2: 0,
            cr3: 0,
            eip: 0,
            eflags: 0,
            eax: 0,
            ecx: 0,
            edx: 0,
            ebx: 0,
            esp: 0,
            ebp: 0,
            esi: 0,
            edi: 0,
            es: 0,
            cs: 0,
            ss: 0,
            ds: 0,
            fs: 0,
            gs: 0,
            ldt: 0,
            trap: 0,
            iomap_base: size_of::<Tss>() as u16,
        }
    }
}

lazy_static! {
    static ref TSS: Mutex<Tss> = Mutex::new(Tss::new());
}

struct GdtTable([GdtEntry; 6]);
// SAFETY: the table is only mutated during `init()`, before any other CPU
// is brought up, and read-only thereafter.
unsafe impl Sync for GdtTable {}

static GDT: Mutex<GdtTable> = Mutex::new(GdtTable([GdtEntry::null(); 6]));

/// Build the GDT, load it with `lgdt`, reload the segment registers, and
/// load the TSS selector with `ltr`.
pub fn init() {
    let tss_base = {
        let tss = TSS.lock();
        &*tss as *const Tss as u32
    };
    let tss_limit = size_of::<Tss>() as u32 - 1;

    {
        let mut gdt = GDT.lock();
        gdt.0[0] = GdtEntry::null();
        gdt.0[1] = GdtEntry::new(0, 0xFFFFF, 0x9A, 0xC); // kernel code
        gdt.0[2] = GdtEntry::new(0, 0xFFFFF, 0x92, 0xC); // kernel data
        gdt.0[3] = GdtEntry::new(0, 0xFFFFF, 0xFA, 0xC); // user code, DPL=3
        gdt.0[4] = GdtEntry::new(0, 0xFFFFF, 0xF2, 0xC); // user data, DPL=3
        gdt.0[5] = GdtEntry::new(tss_base, tss_limit, 0x89, 0x0); // TSS, DPL=0
    }

    let gdt_ptr = GdtPointer {
        limit: (size_of::<[GdtEntry; 6]>() - 1) as u16,
        base: GDT.lock().0.as_ptr() as u32,
    };

    // SAFETY: `gdt_ptr` references a `'static`-lived table populated above;
    // the far jump reloads CS with the kernel code selector and the
    // subsequent moves reload the data segment registers, as required
    // immediately after `lgdt`.
    unsafe {
        core::arch::asm!(
            "lgdt [{0}]",
            "mov ax, {1:x}",
            "mov ds, ax",
            "mov es, ax",
            "mov fs, ax",
            "mov gs, ax",
            "mov ss, ax",
            "push {2:e}",
            "lea eax, [2f]",
            "push eax",
            "retf",
            "2:",
            in(reg) &gdt_ptr,
            in(reg) KERNEL_DATA_SELECTOR,
            in(reg) KERNEL_CODE_SELECTOR as u32,
            out("eax") _,
        );
        core::arch::asm!("ltr ax", in("ax") TSS_SELECTOR, options(nostack, preserves_flags));
    }
}

/// Update the ring-0 stack pointer used when the CPU transitions from ring 3
/// to ring 0 (interrupt, exception, or `int 0x80`).
///
/// Called by the scheduler on every context switch, with interrupts
/// disabled.
pub fn set_kernel_stack(esp0: u32) {
    TSS.lock().esp0 = esp0;
}
