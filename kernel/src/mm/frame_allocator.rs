//! Physical frame allocator: a bitmap of 4 KiB frames above a configured
//! base, first-fit, reference counted.
//!
//! The allocator is deliberately simple (§4.2 of the design spec): one bit
//! per frame records allocated/free, a parallel array records the
//! reference count of each allocated frame. There is no NUMA awareness, no
//! buddy system and no locking beyond the single global spinlock -- this
//! kernel is single-CPU, and the frame allocator is otherwise protected by
//! interrupts being disabled during page-fault handling and scheduling.

use spin::Mutex;

use crate::sync::once_lock::GlobalState;

/// Size of a physical frame.
pub const FRAME_SIZE: u32 = 4096;

/// Physical memory below this address is reserved for the BIOS data area,
/// the real-mode IVT, video memory and the loaded kernel image itself, and
/// is never handed out by this allocator.
pub const RESERVED_BASE: u32 = 16 * 1024 * 1024;

/// Upper bound on the amount of physical memory this allocator can track
/// (512 MiB). Chosen so the bitmap and refcount table are static arrays
/// sized at compile time rather than heap-allocated (the frame allocator
/// must be usable before the heap exists).
const MAX_FRAMES: usize = 131_072;
const BITMAP_WORDS: usize = MAX_FRAMES / 64;

/// Upper bound on the physical address this allocator will ever hand out,
/// used by the VMM to size the kernel's permanent physical-memory mapping.
pub const MAX_MANAGED_CEILING: u32 = RESERVED_BASE + (MAX_FRAMES as u32) * FRAME_SIZE;

struct FrameTable {
    /// One bit per tracked frame; set means allocated.
    bitmap: [u64; BITMAP_WORDS],
    /// Reference count per tracked frame. A frame is free iff its count is
    /// zero, which is exactly when its bitmap bit is clear.
    ref_counts: [u16; MAX_FRAMES],
    /// First frame number managed by this allocator (`RESERVED_BASE /
    /// FRAME_SIZE`, until `init` narrows it to the detected memory size).
    base_frame: u32,
    /// Number of frames managed, starting at `base_frame`.
    frame_count: u32,
    /// Count of tracked frames with a reference count of zero.
    free_count: u32,
}

impl FrameTable {
    const fn empty() -> Self {
        Self {
            bitmap: [0; BITMAP_WORDS],
            ref_counts: [0; MAX_FRAMES],
            base_frame: 0,
            frame_count: 0,
            free_count: 0,
        }
    }

    fn index_of(&self, addr: u32) -> Option<usize> {
        if addr % FRAME_SIZE != 0 {
            return None;
        }
        let frame_num = addr / FRAME_SIZE;
        if frame_num < self.base_frame {
            return None;
        }
        let idx = (frame_num - self.base_frame) as usize;
        if idx as u32 >= self.frame_count {
            return None;
        }
        Some(idx)
    }

    fn is_set(&self, idx: usize) -> bool {
        self.bitmap[idx / 64] & (1u64 << (idx % 64)) != 0
    }

    fn set(&mut self, idx: usize) {
        self.bitmap[idx / 64] |= 1u64 << (idx % 64);
    }

    fn clear(&mut self, idx: usize) {
        self.bitmap[idx / 64] &= !(1u64 << (idx % 64));
    }

    /// First-fit scan for a free frame.
    fn allocate(&mut self) -> u32 {
        for idx in 0..self.frame_count as usize {
            if !self.is_set(idx) {
                self.set(idx);
                self.ref_counts[idx] = 1;
                self.free_count -= 1;
                return (self.base_frame + idx as u32) * FRAME_SIZE;
            }
        }
        0
    }

    fn free(&mut self, addr: u32) {
        let Some(idx) = self.index_of(addr) else {
            return;
        };
        if self.ref_counts[idx] == 0 {
            return;
        }
        self.ref_counts[idx] -= 1;
        if self.ref_counts[idx] == 0 {
            self.clear(idx);
            self.free_count += 1;
        }
    }

    fn inc_ref(&mut self, addr: u32) {
        if let Some(idx) = self.index_of(addr) {
            if self.is_set(idx) {
                self.ref_counts[idx] = self.ref_counts[idx].saturating_add(1);
            }
        }
    }
}

static TABLE: GlobalState<Mutex<FrameTable>> = GlobalState::new();

/// Initialize the frame allocator from the multiboot `mem_upper` field
/// (KiB of memory above the first megabyte). Frames below [`RESERVED_BASE`]
/// are never tracked; everything from there to the detected memory size
/// (capped at the allocator's static capacity) starts free.
pub fn init(mem_upper_kib: u32) {
    let total_bytes = (mem_upper_kib as u64) * 1024;
    let total_frames = (total_bytes / FRAME_SIZE as u64) as u32;
    let base_frame = RESERVED_BASE / FRAME_SIZE;
    let frame_count = total_frames
        .saturating_sub(base_frame)
        .min(MAX_FRAMES as u32);

    let mut table = FrameTable::empty();
    table.base_frame = base_frame;
    table.frame_count = frame_count;
    table.free_count = frame_count;

    // An already-initialized allocator (e.g. a second boot in tests) just
    // keeps its prior state; this subsystem initializes once.
    let _ = TABLE.init(Mutex::new(table));
}

/// Allocate a 4 KiB-aligned physical frame and set its reference count to
/// one. Returns `0` (never a valid frame address, since frame 0 always
/// falls below [`RESERVED_BASE`]) if no frame is free.
pub fn allocate_frame() -> u32 {
    TABLE
        .with_mut(|t| t.lock().allocate())
        .unwrap_or(0)
}

/// Decrement `addr`'s reference count; when it reaches zero the frame
/// returns to the free pool. Addresses outside the managed range, or not
/// frame-aligned, are silently ignored.
pub fn free_frame(addr: u32) {
    TABLE.with_mut(|t| t.lock().free(addr));
}

/// Increment the reference count of an already-allocated frame (used when
/// a frame becomes shared across address spaces, e.g. by `fork`-style
/// sharing before a copy-on-write fault splits it).
pub fn inc_ref(addr: u32) {
    TABLE.with_mut(|t| t.lock().inc_ref(addr));
}

/// Number of tracked frames with a reference count of zero.
pub fn free_count() -> usize {
    TABLE.with(|t| t.lock().free_count as usize).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(mem_upper_kib: u32) -> FrameTable {
        let total_frames = (mem_upper_kib as u64 * 1024 / FRAME_SIZE as u64) as u32;
        let base_frame = RESERVED_BASE / FRAME_SIZE;
        let frame_count = total_frames.saturating_sub(base_frame).min(MAX_FRAMES as u32);
        let mut t = FrameTable::empty();
        t.base_frame = base_frame;
        t.frame_count = frame_count;
        t.free_count = frame_count;
        t
    }

    #[test]
    fn e1_boot_free_count() {
        let t = fresh(65536);
        assert_eq!(t.free_count, 12288);
    }

    #[test]
    fn allocate_then_free_conserves_count() {
        let mut t = fresh(65536);
        let before = t.free_count;
        let addr = t.allocate();
        assert_ne!(addr, 0);
        t.free(addr);
        assert_eq!(t.free_count, before);
    }

    #[test]
    fn m_allocations_leave_k_minus_m_free() {
        let mut t = fresh(65536);
        let k = t.free_count;
        let m = 100;
        for _ in 0..m {
            assert_ne!(t.allocate(), 0);
        }
        assert_eq!(t.free_count, k - m);
    }

    #[test]
    fn refcounted_frame_survives_one_free() {
        let mut t = fresh(65536);
        let addr = t.allocate();
        t.inc_ref(addr);
        t.free(addr);
        assert!(t.is_set(t.index_of(addr).unwrap()));
        t.free(addr);
        assert!(!t.is_set(t.index_of(addr).unwrap()));
    }

    #[test]
    fn out_of_range_free_is_ignored() {
        let mut t = fresh(65536);
        let before = t.free_count;
        t.free(0);
        t.free(1);
        assert_eq!(t.free_count, before);
    }
}
