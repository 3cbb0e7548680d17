//! Memory management: physical frames, the kernel heap, paging, and faults.
//!
//! Four independent concerns live here, in boot order: the frame allocator
//! (a bitmap over physical memory), the kernel heap (a size-class
//! segregated allocator backed by a static arena, independent of the frame
//! allocator), the paging/VMM layer (page directories built from frames),
//! and the page-fault handler that ties the VMM and per-process memory
//! regions together.

#![allow(dead_code)]

pub mod frame_allocator;
pub mod heap;
pub mod page_fault;
pub mod page_table;
pub mod vmm;

use crate::error::KernelResult;

/// Size of a physical page frame and a virtual page, in bytes.
pub const PAGE_SIZE: u32 = 4096;

/// A physical address. 32-bit: this kernel targets protected-mode x86
/// without PAE.
pub type PhysAddr = u32;

/// A virtual address.
pub type VirtAddr = u32;

/// Round `addr` down to the nearest page boundary.
pub const fn page_align_down(addr: u32) -> u32 {
    addr & !(PAGE_SIZE - 1)
}

/// Round `addr` up to the nearest page boundary.
pub const fn page_align_up(addr: u32) -> u32 {
    page_align_down(addr.wrapping_add(PAGE_SIZE - 1))
}

/// Bring up the memory subsystem: frame allocator, then heap, then VMM.
///
/// `mem_upper_kib` is the multiboot `mem_upper` field (KiB of memory above
/// the first megabyte), used to bound the frame allocator.
pub fn init(mem_upper_kib: u32) -> KernelResult<()> {
    frame_allocator::init(mem_upper_kib);
    kprintln!(
        "[MM] frame allocator: {} frames free",
        frame_allocator::free_count()
    );

    heap::init()?;
    kprintln!("[MM] heap initialized ({} bytes)", heap::HEAP_SIZE);

    vmm::init()?;
    kprintln!("[MM] paging initialized, kernel template built");

    Ok(())
}
