//! Virtual memory manager: per-process address spaces built on top of the
//! 32-bit non-PAE page tables in [`super::page_table`].
//!
//! An [`AddressSpace`] owns a page directory. Directory entries 0..767 are
//! private to the address space (user code, data, stack, mmap'd regions);
//! entries 768..1023 (`KERNEL_DIRECTORY_START..`) are shared and identical
//! across every address space, copied once from a kernel template built by
//! [`init`].
//!
//! The template also carries a low-memory identity window (entries
//! `0..LOW_IDENTITY_ENTRIES`, virtual == physical) so the kernel, which is
//! linked and already executing at low physical addresses when paging turns
//! on, keeps running across a page-directory switch. This window is copied
//! into every address space alongside the kernel half -- a boot-support
//! exception to the "0..767 is private" rule, recorded in `DESIGN.md`.
//! Everything the frame allocator can ever hand out is additionally mapped
//! once, permanently, at `KERNEL_OFFSET + phys` in the kernel half, so
//! kernel code can dereference any physical address (a fresh page table, a
//! process's page directory) without needing that address space active.

use core::arch::asm;

use spin::Mutex;

use super::page_table::{split_virtual_address, Entry, PageFlags, Table, ENTRIES, KERNEL_DIRECTORY_START};
use super::{frame_allocator, PAGE_SIZE};
use crate::error::{KernelError, KernelResult, MmError};
use crate::sync::once_lock::GlobalState;

/// Virtual offset at which the kernel maps the whole of the physical memory
/// it manages. `phys_to_virt`/`virt_to_phys` convert between a physical
/// address and its mapping here.
pub const KERNEL_OFFSET: u32 = 0xC000_0000;

/// Low physical memory identity-mapped virtual == physical, so currently
/// executing kernel code survives a page-directory switch.
const LOW_IDENTITY_MIB: u32 = 32;
const LOW_IDENTITY_ENTRIES: usize = (LOW_IDENTITY_MIB / 4) as usize;

const DIR_SPAN: u32 = 4 * 1024 * 1024;

/// Convert a physical address to the kernel's permanent mapping of it.
pub fn phys_to_virt(p: u32) -> u32 {
    p.wrapping_add(KERNEL_OFFSET)
}

/// Inverse of [`phys_to_virt`].
pub fn virt_to_phys(v: u32) -> u32 {
    v.wrapping_sub(KERNEL_OFFSET)
}

fn table_at(phys: u32) -> *mut Table {
    phys_to_virt(phys) as *mut Table
}

/// A description of one mapped (or about-to-be-demand-paged) region of a
/// process's address space. Regions are kept in a `Vec` rather than an
/// intrusive list -- the allocator is already available by the time any
/// process exists, and there is no benefit here to hand-rolled linkage.
#[derive(Debug, Clone)]
pub struct MemoryRegion {
    pub base: u32,
    pub length: u32,
    pub kind: RegionKind,
    pub writable: bool,
    pub user: bool,
}

impl MemoryRegion {
    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.base && addr < self.base + self.length
    }
}

/// What backs a [`MemoryRegion`] and how a fault inside it should be
/// serviced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// Backed by memory already mapped at process-creation time (code,
    /// initialized data). A fault here is always an error.
    Eager,
    /// Not yet backed by any frame; the first access demand-pages a zeroed
    /// frame in.
    Anonymous,
    /// Shared with a parent across a fork, currently read-only; a write
    /// fault splits it via copy-on-write.
    CopyOnWrite,
    /// Backed by a file. The first access demand-pages a zeroed frame in,
    /// then hands off to [`crate::mm::page_fault::populate_from_file`] to
    /// load the backing contents; that hook is currently a stub.
    MappedFile,
}

/// An owned page directory plus the bookkeeping needed to service faults
/// inside it.
pub struct AddressSpace {
    pub directory_phys: u32,
    pub regions: Mutex<alloc::vec::Vec<MemoryRegion>>,
    /// Next virtual address `mmap` with no hint (`addr == 0`) hands out.
    /// Bumped by each such call; never reused, even across `munmap`, so a
    /// syscall implementation this small does not need to track holes.
    pub mmap_cursor: Mutex<u32>,
}

/// Base of the region `mmap` with no address hint allocates from: above the
/// fixed user code/stack layout ([`crate::process::creation`]), well below
/// [`KERNEL_OFFSET`].
pub const MMAP_BASE: u32 = 0x5000_0000;

static KERNEL_TEMPLATE: GlobalState<Mutex<u32>> = GlobalState::new();

const BOOTSTRAP_TABLES: usize = 160;

struct BootstrapPool {
    tables: [Table; BOOTSTRAP_TABLES],
    used: usize,
}

static mut BOOTSTRAP: BootstrapPool = BootstrapPool {
    tables: [Table::empty(); BOOTSTRAP_TABLES],
    used: 0,
};

/// Hand out the next unused table from the static bootstrap pool. Only
/// used while building the kernel template, before any process exists;
/// ordinary page tables for process-private mappings come from the frame
/// allocator instead.
///
/// # Safety
/// Must only be called during single-threaded kernel bring-up.
unsafe fn bootstrap_alloc_table() -> *mut Table {
    let pool = &mut *core::ptr::addr_of_mut!(BOOTSTRAP);
    assert!(pool.used < BOOTSTRAP_TABLES, "bootstrap page-table pool exhausted");
    let t = &mut pool.tables[pool.used] as *mut Table;
    pool.used += 1;
    t
}

/// Build the kernel template directory and enable paging.
///
/// # Safety
/// Must run exactly once, early in [`super::init`], before any process or
/// second address space exists.
unsafe fn build_kernel_template() -> u32 {
    let dir_ptr = bootstrap_alloc_table();
    let dir = &mut *dir_ptr;

    for idx in 0..LOW_IDENTITY_ENTRIES {
        let pt_ptr = bootstrap_alloc_table();
        let pt = &mut *pt_ptr;
        for ti in 0..ENTRIES {
            let phys = (idx as u32) * DIR_SPAN + (ti as u32) * PAGE_SIZE;
            pt.entries[ti] = Entry::new(phys, PageFlags::PRESENT | PageFlags::WRITABLE);
        }
        dir.entries[idx] = Entry::new(pt_ptr as u32, PageFlags::PRESENT | PageFlags::WRITABLE);
    }

    let ceiling = frame_allocator::MAX_MANAGED_CEILING;
    let dir_entries_needed = ((ceiling + DIR_SPAN - 1) / DIR_SPAN) as usize;
    for idx in 0..dir_entries_needed {
        let target = KERNEL_DIRECTORY_START + idx;
        if target >= ENTRIES {
            break;
        }
        let pt_ptr = bootstrap_alloc_table();
        let pt = &mut *pt_ptr;
        for ti in 0..ENTRIES {
            let phys = (idx as u32) * DIR_SPAN + (ti as u32) * PAGE_SIZE;
            pt.entries[ti] = Entry::new(phys, PageFlags::PRESENT | PageFlags::WRITABLE);
        }
        dir.entries[target] = Entry::new(pt_ptr as u32, PageFlags::PRESENT | PageFlags::WRITABLE);
    }

    dir_ptr as u32
}

/// # Safety
/// Loads `dir_phys` into CR3 and sets CR0.PG. Must only be called once, with
/// `dir_phys` pointing at a fully built template whose low identity window
/// covers every address currently in use by the kernel (code, stack, this
/// function itself).
unsafe fn enable_paging(dir_phys: u32) {
    asm!(
        "mov cr3, {dir}",
        "mov {tmp}, cr0",
        "or {tmp}, 0x80000000",
        "mov cr0, {tmp}",
        dir = in(reg) dir_phys,
        tmp = out(reg) _,
        options(nostack, preserves_flags),
    );
}

fn invalidate_tlb(vaddr: u32) {
    // SAFETY: invlpg on a single address is always safe; worst case it
    // evicts a TLB entry that gets refilled on next access.
    unsafe {
        asm!("invlpg [{0}]", in(reg) vaddr, options(nostack, preserves_flags));
    }
}

/// Build the kernel template and switch the CPU into paged mode.
pub fn init() -> KernelResult<()> {
    // SAFETY: called once from `mm::init`, before any second address space
    // or process exists.
    let dir_phys = unsafe { build_kernel_template() };
    let _ = KERNEL_TEMPLATE.init(Mutex::new(dir_phys));
    unsafe { enable_paging(dir_phys) };
    Ok(())
}

fn template_phys() -> u32 {
    KERNEL_TEMPLATE.with(|t| *t.lock()).unwrap_or(0)
}

/// Allocate a fresh page directory, populate its kernel half (and the
/// boot-support low identity window) from the template, and leave the
/// private half empty.
pub fn create_address_space() -> KernelResult<AddressSpace> {
    let dir_phys = frame_allocator::allocate_frame();
    if dir_phys == 0 {
        return Err(KernelError::Mm(MmError::OutOfFrames));
    }

    // SAFETY: dir_phys is a fresh frame in the kernel's permanent physical
    // map; no other address space references it yet.
    let dir = unsafe { &mut *table_at(dir_phys) };
    for e in dir.entries.iter_mut() {
        *e = Entry::empty();
    }

    let template = unsafe { &*table_at(template_phys()) };
    for idx in 0..LOW_IDENTITY_ENTRIES {
        dir.entries[idx] = template.entries[idx];
    }
    for idx in KERNEL_DIRECTORY_START..ENTRIES {
        dir.entries[idx] = template.entries[idx];
    }

    Ok(AddressSpace {
        directory_phys: dir_phys,
        regions: Mutex::new(alloc::vec::Vec::new()),
        mmap_cursor: Mutex::new(MMAP_BASE),
    })
}

/// Free every private page table (not the frames they map -- those are the
/// caller's responsibility via `free_pages`/region teardown) and the
/// directory itself. Shared kernel-half and boot-identity tables are left
/// alone.
pub fn destroy_address_space(a: &AddressSpace) {
    // SAFETY: caller guarantees no other CPU references this address space
    // (it belongs to a process past the point of being scheduled again).
    let dir = unsafe { &*table_at(a.directory_phys) };
    for idx in LOW_IDENTITY_ENTRIES..KERNEL_DIRECTORY_START {
        let entry = dir.entries[idx];
        if entry.is_present() {
            frame_allocator::free_frame(entry.frame_addr());
        }
    }
    frame_allocator::free_frame(a.directory_phys);
}

/// Install a mapping for a single page, creating a page table on demand if
/// the covering directory entry is not yet present.
pub fn map(a: &AddressSpace, vaddr: u32, paddr: u32, flags: PageFlags) -> KernelResult<()> {
    let (dir_idx, tbl_idx, _) = split_virtual_address(vaddr);

    // SAFETY: a.directory_phys is a frame owned by this address space,
    // permanently reachable via the kernel's physical map.
    let dir = unsafe { &mut *table_at(a.directory_phys) };
    let dir_entry = dir.entries[dir_idx];

    let table_phys = if dir_entry.is_present() {
        dir_entry.frame_addr()
    } else {
        let new_phys = frame_allocator::allocate_frame();
        if new_phys == 0 {
            return Err(KernelError::Mm(MmError::OutOfFrames));
        }
        let new_table = unsafe { &mut *table_at(new_phys) };
        for e in new_table.entries.iter_mut() {
            *e = Entry::empty();
        }
        let mut dir_flags = PageFlags::PRESENT | PageFlags::WRITABLE;
        if flags.contains(PageFlags::USER) {
            dir_flags |= PageFlags::USER;
        }
        dir.entries[dir_idx] = Entry::new(new_phys, dir_flags);
        new_phys
    };

    let table = unsafe { &mut *table_at(table_phys) };
    table.entries[tbl_idx] = Entry::new(paddr, flags);
    invalidate_tlb(vaddr);
    Ok(())
}

/// Remove the mapping at `vaddr`, freeing the frame it pointed at. Returns
/// [`MmError::UnmappedPage`] if nothing was mapped there.
pub fn unmap(a: &AddressSpace, vaddr: u32) -> KernelResult<()> {
    let (dir_idx, tbl_idx, _) = split_virtual_address(vaddr);
    let dir = unsafe { &mut *table_at(a.directory_phys) };
    let dir_entry = dir.entries[dir_idx];
    if !dir_entry.is_present() {
        return Err(KernelError::Mm(MmError::UnmappedPage { addr: vaddr }));
    }

    let table = unsafe { &mut *table_at(dir_entry.frame_addr()) };
    let entry = table.entries[tbl_idx];
    if !entry.is_present() {
        return Err(KernelError::Mm(MmError::UnmappedPage { addr: vaddr }));
    }

    let frame = entry.frame_addr();
    table.entries[tbl_idx] = Entry::empty();
    frame_allocator::free_frame(frame);
    invalidate_tlb(vaddr);
    Ok(())
}

/// Translate `vaddr` to its mapped physical address, or `0` if unmapped.
pub fn resolve(a: &AddressSpace, vaddr: u32) -> u32 {
    let (dir_idx, tbl_idx, offset) = split_virtual_address(vaddr);
    let dir = unsafe { &*table_at(a.directory_phys) };
    let dir_entry = dir.entries[dir_idx];
    if !dir_entry.is_present() {
        return 0;
    }
    let table = unsafe { &*table_at(dir_entry.frame_addr()) };
    let entry = table.entries[tbl_idx];
    if !entry.is_present() {
        return 0;
    }
    entry.frame_addr() | offset
}

/// Load `a`'s directory into CR3, making it the active address space.
pub fn switch_to(a: &AddressSpace) {
    // SAFETY: a.directory_phys is a valid, fully populated directory (its
    // kernel half came from the template, its private half from prior
    // `map` calls).
    unsafe {
        asm!("mov cr3, {0}", in(reg) a.directory_phys, options(nostack, preserves_flags));
    }
}

/// Allocate `count` fresh frames and map them contiguously starting at
/// `vaddr`. Rolls back everything it mapped if a later page fails.
pub fn allocate_pages(a: &AddressSpace, vaddr: u32, count: u32, flags: PageFlags) -> KernelResult<()> {
    let mut mapped = 0;
    for i in 0..count {
        let v = vaddr + i * PAGE_SIZE;
        let p = frame_allocator::allocate_frame();
        if p == 0 || map(a, v, p, flags).is_err() {
            if p != 0 {
                frame_allocator::free_frame(p);
            }
            for j in 0..mapped {
                let _ = unmap(a, vaddr + j * PAGE_SIZE);
            }
            return Err(KernelError::Mm(MmError::OutOfFrames));
        }
        mapped += 1;
    }
    Ok(())
}

/// Map `count` pages of already-owned physical memory starting at
/// `paddr` to virtual addresses starting at `vaddr`.
pub fn map_pages(a: &AddressSpace, vaddr: u32, paddr: u32, count: u32, flags: PageFlags) -> KernelResult<()> {
    let mut mapped = 0;
    for i in 0..count {
        let v = vaddr + i * PAGE_SIZE;
        let p = paddr + i * PAGE_SIZE;
        if map(a, v, p, flags).is_err() {
            for j in 0..mapped {
                let _ = unmap(a, vaddr + j * PAGE_SIZE);
            }
            return Err(KernelError::Mm(MmError::OutOfFrames));
        }
        mapped += 1;
    }
    Ok(())
}

/// Unmap and free `count` pages starting at `vaddr`.
pub fn free_pages(a: &AddressSpace, vaddr: u32, count: u32) -> KernelResult<()> {
    for i in 0..count {
        unmap(a, vaddr + i * PAGE_SIZE)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phys_virt_round_trips() {
        assert_eq!(virt_to_phys(phys_to_virt(0x0020_0000)), 0x0020_0000);
    }

    #[test]
    fn low_identity_window_covers_boot_footprint() {
        assert!(LOW_IDENTITY_ENTRIES * 4 >= 16, "must cover at least the reserved low 16 MiB");
    }
}
