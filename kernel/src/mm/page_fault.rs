//! Page fault dispatch: copy-on-write, demand paging, and process
//! termination, in that order.
//!
//! Called directly from [`crate::arch::x86::idt`]'s vector-14 branch with
//! the raw CR2 value and error code; there is no intermediate "fault info"
//! type; the bits of `error_code` are decoded inline against the Intel SDM
//! layout (bit 0 present, bit 1 write, bit 2 user).

use crate::arch::x86::idt::InterruptFrame;
use crate::error::{KernelError, MmError};
use crate::mm::page_table::PageFlags;
use crate::mm::vmm::{self, MemoryRegion, RegionKind};
use crate::mm::PAGE_SIZE;
use crate::process;

const ERR_PRESENT: u32 = 1 << 0;
const ERR_WRITE: u32 = 1 << 1;
const ERR_USER: u32 = 1 << 2;

/// Entry point reached from [`crate::arch::x86::idt::common_interrupt_entry`]
/// for vector 14. `frame` is mutated only in the sense that control returns
/// through its `iretd` and retries the faulting instruction; nothing here
/// ever changes `frame`'s contents directly.
pub fn handle_page_fault(fault_addr: u32, error_code: u32, frame: &mut InterruptFrame) {
    let from_user = error_code & ERR_USER != 0;

    if !from_user {
        panic!(
            "page fault in ring 0 at {:#x}, error_code={:#x}, eip={:#x}",
            fault_addr, error_code, frame.eip
        );
    }

    if error_code & ERR_PRESENT != 0 && error_code & ERR_WRITE != 0 {
        if try_copy_on_write(fault_addr).is_ok() {
            return;
        }
    } else if error_code & ERR_PRESENT == 0 {
        if try_demand_page(fault_addr).is_ok() {
            return;
        }
    }

    process::terminate_current(-1);
}

/// Find the region covering `fault_addr` in the current process's address
/// space, if any.
fn find_region(fault_addr: u32) -> Option<MemoryRegion> {
    process::with_current(|pcb| {
        pcb.address_space
            .regions
            .lock()
            .iter()
            .find(|r| r.contains(fault_addr))
            .cloned()
    })
    .flatten()
}

/// Copy-on-write: allocate a fresh frame, copy the old page's contents into
/// it, remap the faulting page writable over the new frame, and invalidate
/// the stale TLB entry.
fn try_copy_on_write(fault_addr: u32) -> Result<(), KernelError> {
    let region = find_region(fault_addr).ok_or(KernelError::Mm(MmError::UnmappedPage { addr: fault_addr }))?;
    if region.kind != RegionKind::CopyOnWrite {
        return Err(KernelError::Mm(MmError::UnmappedPage { addr: fault_addr }));
    }

    let page_addr = crate::mm::page_align_down(fault_addr);

    process::with_current_address_space(|space| -> Result<(), KernelError> {
        let old_phys = vmm::resolve(space, page_addr);
        if old_phys == 0 {
            return Err(KernelError::Mm(MmError::UnmappedPage { addr: fault_addr }));
        }

        let new_phys = crate::mm::frame_allocator::allocate_frame();
        if new_phys == 0 {
            return Err(KernelError::Mm(MmError::OutOfFrames));
        }

        // SAFETY: `old_phys` and `new_phys` are both page frames reachable
        // through the kernel's permanent physical map, and are exactly
        // `PAGE_SIZE` bytes each; the two ranges cannot overlap since
        // `new_phys` was just freshly allocated.
        unsafe {
            let src = vmm::phys_to_virt(old_phys) as *const u8;
            let dst = vmm::phys_to_virt(new_phys) as *mut u8;
            core::ptr::copy_nonoverlapping(src, dst, PAGE_SIZE as usize);
        }

        vmm::unmap(space, page_addr).ok();
        vmm::map(space, page_addr, new_phys, PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER)?;
        Ok(())
    })
    .unwrap_or(Err(KernelError::NotInitialized { subsystem: "process" }))
}

/// Demand paging: the fault landed inside a known region but no frame is
/// backing it yet. Zero-fill a fresh frame and map it with the region's
/// flags; `mapped_file` regions additionally get a chance to populate
/// themselves from their backing store.
fn try_demand_page(fault_addr: u32) -> Result<(), KernelError> {
    let region = find_region(fault_addr).ok_or(KernelError::Mm(MmError::UnmappedPage { addr: fault_addr }))?;
    if region.kind == RegionKind::Eager {
        return Err(KernelError::Mm(MmError::UnmappedPage { addr: fault_addr }));
    }

    let page_addr = crate::mm::page_align_down(fault_addr);
    let new_phys = crate::mm::frame_allocator::allocate_frame();
    if new_phys == 0 {
        return Err(KernelError::Mm(MmError::OutOfFrames));
    }

    // SAFETY: `new_phys` is a freshly allocated frame, reachable only
    // through the kernel's permanent physical map, not yet visible to any
    // other address space.
    unsafe {
        let dst = vmm::phys_to_virt(new_phys) as *mut u8;
        core::ptr::write_bytes(dst, 0, PAGE_SIZE as usize);
    }

    let mut flags = PageFlags::PRESENT;
    if region.writable {
        flags |= PageFlags::WRITABLE;
    }
    if region.user {
        flags |= PageFlags::USER;
    }

    process::with_current_address_space(|space| vmm::map(space, page_addr, new_phys, flags))
        .unwrap_or(Err(KernelError::NotInitialized { subsystem: "process" }))?;

    if region.kind == RegionKind::MappedFile {
        populate_from_file(&region, page_addr);
    }

    Ok(())
}

/// Load a `mapped_file` region's backing contents into the page just
/// demand-paged in at `page_addr`. No backing-file plumbing exists yet
/// (this kernel has no block-device-backed filesystem mounted by default),
/// so the page is left zero-filled; a real implementation would read the
/// file's bytes at the region's corresponding offset here.
fn populate_from_file(_region: &MemoryRegion, _page_addr: u32) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_bit_layout_matches_intel_sdm() {
        assert_eq!(ERR_PRESENT, 1);
        assert_eq!(ERR_WRITE, 2);
        assert_eq!(ERR_USER, 4);
    }
}
