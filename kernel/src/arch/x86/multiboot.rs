//! Multiboot 1 header and info-struct parsing.
//!
//! This kernel is loaded by a multiboot1-compliant loader (GRUB legacy,
//! QEMU's `-kernel` direct boot). The header's `flags` field requests
//! aligned modules and the memory map; the bootloader hands back a
//! `multiboot_info` structure whose `mem_upper` field (offset 8, in KiB)
//! is the only field this kernel consults directly -- the size of
//! installed RAM above the first megabyte.

use core::arch::global_asm;

const MULTIBOOT1_MAGIC: u32 = 0x1BADB002;
const MULTIBOOT1_FLAGS: u32 = 0x0000_0003; // align modules on page boundaries + provide mem map

global_asm!(
    r#"
.section .multiboot, "a"
.align 4
multiboot_header_start:
    .long 0x1BADB002
    .long 0x00000003
    .long -(0x1BADB002 + 0x00000003)
multiboot_header_end:
"#
);

/// Layout of the fields this kernel reads from the multiboot1 info
/// structure. Only the leading fields up to `mem_upper` are modeled; later
/// fields (boot device, cmdline, module list, memory map) are unused.
#[repr(C)]
struct MultibootInfo {
    flags: u32,
    mem_lower: u32,
    mem_upper: u32,
}

/// Read `mem_upper` (KiB of RAM above 1 MiB) out of the multiboot1 info
/// structure at `info_addr`.
///
/// # Panics
/// Panics if bit 0 of `flags` is clear, meaning the bootloader did not
/// provide memory-size information -- booting without it is not supported.
pub fn parse_mem_upper_kib(info_addr: u32) -> u32 {
    // SAFETY: `info_addr` is the physical address the bootloader passed in
    // EBX at kernel entry, per the multiboot1 specification; it has not yet
    // been touched by kernel code so the structure it points to is intact.
    let info = unsafe { &*(info_addr as *const MultibootInfo) };
    assert!(info.flags & 0x1 != 0, "bootloader did not provide mem_lower/mem_upper");
    info.mem_upper
}

pub const fn header_magic() -> u32 {
    MULTIBOOT1_MAGIC
}

pub const fn header_flags() -> u32 {
    MULTIBOOT1_FLAGS
}
