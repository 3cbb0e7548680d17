//! Page directory / page table entry layout for 32-bit non-PAE paging.
//!
//! A 32-bit virtual address splits 10/10/12: the top 10 bits index a page
//! directory (1024 entries), the next 10 index a page table (1024
//! entries), and the low 12 bits are the in-page offset. Both levels share
//! the same entry encoding.

use bitflags::bitflags;

use super::PAGE_SIZE;

/// Number of entries in a page directory or page table.
pub const ENTRIES: usize = 1024;

/// First directory entry belonging to the kernel half of the address
/// space (high 1 GiB: entries 768..1023, i.e. virtual addresses
/// `0xC000_0000` and up).
pub const KERNEL_DIRECTORY_START: usize = 768;

bitflags! {
    /// Flag bits shared by page-directory and page-table entries.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u32 {
        const PRESENT        = 1 << 0;
        const WRITABLE       = 1 << 1;
        const USER           = 1 << 2;
        const WRITE_THROUGH  = 1 << 3;
        const CACHE_DISABLED = 1 << 4;
        const ACCESSED       = 1 << 5;
        const DIRTY          = 1 << 6;
    }
}

/// A single page-directory or page-table entry: a 4 KiB-aligned physical
/// address plus flag bits in the low 12 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Entry(u32);

impl Entry {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn new(frame_addr: u32, flags: PageFlags) -> Self {
        debug_assert!(frame_addr % PAGE_SIZE == 0, "frame address must be page-aligned");
        Self((frame_addr & !(PAGE_SIZE - 1)) | flags.bits())
    }

    pub fn is_present(self) -> bool {
        self.flags().contains(PageFlags::PRESENT)
    }

    pub fn frame_addr(self) -> u32 {
        self.0 & !(PAGE_SIZE - 1)
    }

    pub fn flags(self) -> PageFlags {
        PageFlags::from_bits_truncate(self.0 & (PAGE_SIZE - 1))
    }

    pub fn set_flags(&mut self, flags: PageFlags) {
        self.0 = self.frame_addr() | flags.bits();
    }

    pub fn set_frame_addr(&mut self, frame_addr: u32) {
        self.0 = (frame_addr & !(PAGE_SIZE - 1)) | self.flags().bits();
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// A page directory or page table: 1024 four-byte entries, naturally
/// page-sized and thus always frame-allocatable as a unit.
#[derive(Clone, Copy)]
#[repr(C, align(4096))]
pub struct Table {
    pub entries: [Entry; ENTRIES],
}

impl Table {
    pub const fn empty() -> Self {
        Self { entries: [Entry::empty(); ENTRIES] }
    }
}

/// Split a virtual address into `(directory_index, table_index, offset)`.
pub fn split_virtual_address(vaddr: u32) -> (usize, usize, u32) {
    let dir_index = (vaddr >> 22) as usize & 0x3FF;
    let table_index = (vaddr >> 12) as usize & 0x3FF;
    let offset = vaddr & 0xFFF;
    (dir_index, table_index, offset)
}

/// Reassemble a virtual address from its directory index, table index and
/// offset.
pub fn make_virtual_address(dir_index: usize, table_index: usize, offset: u32) -> u32 {
    ((dir_index as u32) << 22) | ((table_index as u32) << 12) | (offset & 0xFFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_reassemble_round_trips() {
        let vaddr = 0xC010_2040u32;
        let (d, t, o) = split_virtual_address(vaddr);
        assert_eq!(make_virtual_address(d, t, o), vaddr);
    }

    #[test]
    fn kernel_half_starts_at_3gib() {
        let (d, _, _) = split_virtual_address(0xC000_0000);
        assert_eq!(d, KERNEL_DIRECTORY_START);
    }

    #[test]
    fn entry_roundtrips_frame_and_flags() {
        let e = Entry::new(0x0040_0000, PageFlags::PRESENT | PageFlags::WRITABLE);
        assert_eq!(e.frame_addr(), 0x0040_0000);
        assert!(e.flags().contains(PageFlags::WRITABLE));
        assert!(!e.flags().contains(PageFlags::USER));
    }
}
