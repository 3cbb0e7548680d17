//! Kernel heap: a size-class segregated free-list allocator.
//!
//! Seven fixed size classes (16 B .. 1024 B) each own an independent free
//! list behind their own spinlock. Anything larger, and the slabs classes
//! refill from, come out of one large arena: a doubly linked physical chunk
//! list behind a separate spinlock, best-fit searched and coalesced on free.
//! The refill path is the only place a class lock and the arena lock are
//! both involved, and it always drops the class lock before taking the
//! arena lock and reacquires after, so the two locks never nest the other
//! way around.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{addr_of_mut, NonNull};

use spin::Mutex;

use crate::error::{KernelError, KernelResult};
use crate::sync::once_lock::GlobalState;

/// Total bytes backing the kernel heap. This kernel has no notion of an
/// extensible heap: the whole pool is carved out of a static array once at
/// boot and managed entirely by the size classes and the large arena below.
pub const HEAP_SIZE: usize = 4 * 1024 * 1024;

/// Minimum allocation unit and alignment guarantee.
const MIN_ALLOC: usize = 16;

const SIZE_CLASSES: [usize; 7] = [16, 32, 64, 128, 256, 512, 1024];

/// Sentinel `class` value meaning "large arena chunk", one past the last
/// real size-class index.
const LARGE: u8 = SIZE_CLASSES.len() as u8;

/// Size of a slab carved out of the large arena to refill an empty class
/// free list.
const SLAB_SIZE: usize = 4096;

/// Chunk header, stored immediately before every payload this allocator
/// hands out. `prev`/`next` are physical-order neighbors within the large
/// arena for chunks with `class == LARGE`; for size-class chunks they are
/// unused except that `next` is repurposed as the free-list link while the
/// chunk sits on its class's free list.
#[repr(C, align(16))]
struct ChunkHeader {
    prev: *mut ChunkHeader,
    next: *mut ChunkHeader,
    size: usize,
    class: u8,
    allocated: bool,
}

const HEADER_SIZE: usize = core::mem::size_of::<ChunkHeader>();

const fn round_up_16(n: usize) -> usize {
    (n + (MIN_ALLOC - 1)) & !(MIN_ALLOC - 1)
}

/// Smallest size class that fits `n`, or `None` if it belongs in the large
/// arena.
fn class_for(n: usize) -> Option<usize> {
    SIZE_CLASSES.iter().position(|&c| c >= n)
}

unsafe fn payload_ptr(header: *mut ChunkHeader) -> *mut u8 {
    // SAFETY: caller guarantees `header` points at a valid chunk header;
    // the payload always begins immediately after it.
    unsafe { (header as *mut u8).add(HEADER_SIZE) }
}

unsafe fn header_of(payload: *mut u8) -> *mut ChunkHeader {
    // SAFETY: caller guarantees `payload` was handed out by this allocator,
    // which always places a header exactly `HEADER_SIZE` bytes before it.
    unsafe { payload.sub(HEADER_SIZE) as *mut ChunkHeader }
}

// ---------------------------------------------------------------------------
// Size-class free lists
// ---------------------------------------------------------------------------

struct ClassFreeList {
    head: *mut ChunkHeader,
}

impl ClassFreeList {
    const fn new() -> Self {
        Self { head: core::ptr::null_mut() }
    }
}

// SAFETY: every `ChunkHeader` reachable from `head` lives in the static
// `HEAP_MEMORY` region and is only ever touched through a `CLASS_LOCKS`
// mutex guard, so the raw pointer carries no thread-local state.
unsafe impl Send for ClassFreeList {}

static CLASS_LOCKS: [Mutex<ClassFreeList>; SIZE_CLASSES.len()] =
    [const { Mutex::new(ClassFreeList::new()) }; SIZE_CLASSES.len()];

fn pop_class_free(c: usize) -> Option<NonNull<u8>> {
    let mut list = CLASS_LOCKS[c].lock();
    let head = list.head;
    if head.is_null() {
        return None;
    }
    // SAFETY: `head` was pushed by `push_class_free` or written fresh by
    // `refill_class`, always a valid chunk of this class.
    unsafe {
        list.head = (*head).next;
        (*head).allocated = true;
        Some(NonNull::new_unchecked(payload_ptr(head)))
    }
}

fn push_class_free(c: usize, header: *mut ChunkHeader) {
    let mut list = CLASS_LOCKS[c].lock();
    // SAFETY: `header` belongs to class `c` and is not currently linked
    // into any free list (it was just popped, or is being carved fresh).
    unsafe {
        (*header).allocated = false;
        (*header).next = list.head;
    }
    list.head = header;
}

// ---------------------------------------------------------------------------
// Large arena
// ---------------------------------------------------------------------------

struct LargeArena {
    head: *mut ChunkHeader,
}

// SAFETY: see `ClassFreeList` above; the same reasoning applies to the
// arena's physical chunk list.
unsafe impl Send for LargeArena {}

impl LargeArena {
    /// Best-fit search over the physical chunk list, splitting the winning
    /// chunk if the remainder is large enough to stand on its own.
    fn allocate(&mut self, n: usize) -> Option<NonNull<u8>> {
        let mut best: *mut ChunkHeader = core::ptr::null_mut();
        let mut cur = self.head;
        // SAFETY: `cur` walks a list built entirely by this module; every
        // node remains valid until coalesced away by `free`.
        unsafe {
            while !cur.is_null() {
                if !(*cur).allocated && (*cur).size >= n && (best.is_null() || (*cur).size < (*best).size) {
                    best = cur;
                }
                cur = (*cur).next;
            }
            if best.is_null() {
                return None;
            }

            let remainder = (*best).size - n;
            if remainder >= HEADER_SIZE + MIN_ALLOC {
                let split = (best as *mut u8).add(HEADER_SIZE + n) as *mut ChunkHeader;
                split.write(ChunkHeader {
                    prev: best,
                    next: (*best).next,
                    size: remainder - HEADER_SIZE,
                    class: LARGE,
                    allocated: false,
                });
                if !(*split).next.is_null() {
                    (*(*split).next).prev = split;
                }
                (*best).next = split;
                (*best).size = n;
            }
            (*best).allocated = true;
            Some(NonNull::new_unchecked(payload_ptr(best)))
        }
    }

    fn free(&mut self, header: *mut ChunkHeader) {
        // SAFETY: `header` is a chunk this arena previously handed out,
        // still linked into the physical list at its original position.
        unsafe {
            (*header).allocated = false;
            self.coalesce(header);
        }
    }

    /// Merge `chunk` with an immediately following or preceding free
    /// neighbor, in either direction.
    ///
    /// # Safety
    /// `chunk` must be a currently-free node in this arena's physical list.
    unsafe fn coalesce(&mut self, chunk: *mut ChunkHeader) {
        // SAFETY: caller guarantees `chunk` is a valid, currently-free node
        // already linked into this arena's physical list.
        unsafe {
            let next = (*chunk).next;
            if !next.is_null() && !(*next).allocated {
                (*chunk).size += HEADER_SIZE + (*next).size;
                (*chunk).next = (*next).next;
                if !(*next).next.is_null() {
                    (*(*next).next).prev = chunk;
                }
            }

            let prev = (*chunk).prev;
            if !prev.is_null() && !(*prev).allocated {
                (*prev).size += HEADER_SIZE + (*chunk).size;
                (*prev).next = (*chunk).next;
                if !(*chunk).next.is_null() {
                    (*(*chunk).next).prev = prev;
                }
            }
        }
    }

    /// Shrink `slab`'s payload to `used` bytes and splice a fresh free
    /// chunk of `tail_payload` bytes in right after it, coalescing it with
    /// whatever free chunk may already follow. Used when [`refill_class`]
    /// carves same-sized chunks out of a slab and has leftover bytes worth
    /// reclaiming.
    ///
    /// # Safety
    /// `slab` must be an allocated chunk owned exclusively by the caller,
    /// with at least `used + HEADER_SIZE + tail_payload` payload bytes.
    unsafe fn split_slab_tail(&mut self, slab: *mut ChunkHeader, used: usize, tail_payload: usize) {
        // SAFETY: see function-level safety comment; `tail` lands strictly
        // inside `slab`'s own payload, before its end.
        unsafe {
            let tail = (slab as *mut u8).add(HEADER_SIZE + used) as *mut ChunkHeader;
            let old_next = (*slab).next;
            tail.write(ChunkHeader {
                prev: slab,
                next: old_next,
                size: tail_payload,
                class: LARGE,
                allocated: false,
            });
            if !old_next.is_null() {
                (*old_next).prev = tail;
            }
            (*slab).next = tail;
            (*slab).size = used;
            self.coalesce(tail);
        }
    }
}

static ARENA: GlobalState<Mutex<LargeArena>> = GlobalState::new();

fn alloc_large(n: usize) -> Option<NonNull<u8>> {
    ARENA.with_mut(|a| a.lock().allocate(n)).flatten()
}

fn free_large(header: *mut ChunkHeader) {
    ARENA.with_mut(|a| a.lock().free(header));
}

/// Carve a fresh [`SLAB_SIZE`]-byte slab out of the large arena into
/// `4096 / (size + header)` chunks of class `c`, pushing them all onto its
/// free list, and return any sufficiently large leftover to the arena.
fn refill_class(c: usize) -> Option<()> {
    let class_size = SIZE_CLASSES[c];
    let stride = HEADER_SIZE + class_size;
    let slab = alloc_large(SLAB_SIZE)?;
    // SAFETY: `slab` is a payload pointer `alloc_large` just returned,
    // exclusively owned by this call until we finish carving it.
    let slab_header = unsafe { header_of(slab.as_ptr()) };
    let base = slab.as_ptr();

    let count = SLAB_SIZE / stride;
    for i in 0..count {
        // SAFETY: each iteration writes a disjoint `stride`-byte slice of
        // the `SLAB_SIZE` bytes this call exclusively owns.
        unsafe {
            let header = base.add(i * stride) as *mut ChunkHeader;
            header.write(ChunkHeader {
                prev: core::ptr::null_mut(),
                next: core::ptr::null_mut(),
                size: class_size,
                class: c as u8,
                allocated: false,
            });
            push_class_free(c, header);
        }
    }

    let leftover = SLAB_SIZE - count * stride;
    if leftover >= HEADER_SIZE + MIN_ALLOC {
        ARENA.with_mut(|a| {
            // SAFETY: `slab_header` is the arena chunk backing this slab;
            // `count * stride` bytes of its payload were just consumed by
            // the loop above, and the rest is free for the arena to reclaim.
            unsafe { a.lock().split_slab_tail(slab_header, count * stride, leftover - HEADER_SIZE) }
        });
    }

    Some(())
}

// ---------------------------------------------------------------------------
// Public allocate/free
// ---------------------------------------------------------------------------

fn raw_alloc(n: usize) -> Option<NonNull<u8>> {
    let rounded = round_up_16(n.max(1));
    match class_for(rounded) {
        Some(c) => {
            if let Some(ptr) = pop_class_free(c) {
                return Some(ptr);
            }
            refill_class(c)?;
            pop_class_free(c)
        }
        None => alloc_large(rounded),
    }
}

fn raw_free(ptr: *mut u8) {
    // SAFETY: `ptr` was handed out by `raw_alloc`, which always places a
    // `ChunkHeader` exactly `HEADER_SIZE` bytes before it.
    let header = unsafe { header_of(ptr) };
    // SAFETY: `header` is a live chunk header written by either the class
    // carving path or `LargeArena::allocate`.
    let class = unsafe { (*header).class };
    if class == LARGE {
        free_large(header);
    } else {
        push_class_free(class as usize, header);
    }
}

#[repr(align(16))]
struct HeapStorage([u8; HEAP_SIZE]);

/// Static backing store for the entire heap. Never referenced outside
/// [`init`], which hands its one and only chunk header to the arena.
static mut HEAP_MEMORY: HeapStorage = HeapStorage([0; HEAP_SIZE]);

/// Build the heap's single root chunk spanning all of [`HEAP_MEMORY`] and
/// register the arena. Must run exactly once, before any allocation.
pub fn init() -> KernelResult<()> {
    // SAFETY: called once during boot, before interrupts are enabled and
    // before any other code can reference `HEAP_MEMORY`.
    let root = unsafe {
        let base = addr_of_mut!(HEAP_MEMORY) as *mut u8;
        let header = base as *mut ChunkHeader;
        header.write(ChunkHeader {
            prev: core::ptr::null_mut(),
            next: core::ptr::null_mut(),
            size: HEAP_SIZE - HEADER_SIZE,
            class: LARGE,
            allocated: false,
        });
        header
    };

    ARENA
        .init(Mutex::new(LargeArena { head: root }))
        .map_err(|_| KernelError::AlreadyExists { resource: "heap arena", id: 0 })
}

/// The allocator registered as this kernel's `#[global_allocator]`.
pub struct KernelAllocator;

impl KernelAllocator {
    pub const fn new() -> Self {
        Self
    }
}

impl Default for KernelAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: `alloc`/`dealloc` never unwind, and every pointer `alloc` returns
// has a valid `ChunkHeader` exactly `HEADER_SIZE` bytes before it for
// `dealloc` to read back (double-free and foreign pointers are undefined
// behavior here, not diagnosed).
unsafe impl GlobalAlloc for KernelAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        raw_alloc(layout.size()).map_or(core::ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        if !ptr.is_null() {
            raw_free(ptr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_for_picks_smallest_fit() {
        assert_eq!(class_for(1), Some(0));
        assert_eq!(class_for(16), Some(0));
        assert_eq!(class_for(17), Some(1));
        assert_eq!(class_for(24), Some(1)); // 24 rounds to 32, class index 1
        assert_eq!(class_for(1024), Some(6));
        assert_eq!(class_for(1025), None);
    }

    #[test]
    fn round_up_16_rounds_correctly() {
        assert_eq!(round_up_16(1), 16);
        assert_eq!(round_up_16(16), 16);
        assert_eq!(round_up_16(17), 32);
        assert_eq!(round_up_16(24), 32);
    }

    /// Build a standalone arena over a local buffer, independent of the
    /// module-level [`ARENA`] singleton, so arena logic can be exercised
    /// without interfering with other tests or requiring [`init`].
    fn local_arena(buf: &mut [u8]) -> LargeArena {
        assert!(buf.len() >= HEADER_SIZE + MIN_ALLOC);
        let base = buf.as_mut_ptr();
        // SAFETY: `buf` is exclusively owned by this test for its whole
        // lifetime, and is large enough to hold one root chunk header.
        let root = unsafe {
            let header = base as *mut ChunkHeader;
            header.write(ChunkHeader {
                prev: core::ptr::null_mut(),
                next: core::ptr::null_mut(),
                size: buf.len() - HEADER_SIZE,
                class: LARGE,
                allocated: false,
            });
            header
        };
        LargeArena { head: root }
    }

    #[test]
    fn large_alloc_then_free_restores_single_free_chunk() {
        let mut buf = [0u8; 1024];
        let mut arena = local_arena(&mut buf);

        let p = arena.allocate(64).expect("allocation should succeed");
        // SAFETY: `p` was just returned by `allocate` over `buf`.
        let header = unsafe { header_of(p.as_ptr()) };
        arena.free(header);

        // SAFETY: walking the arena's own list after a free that should
        // have coalesced everything back into the original root chunk.
        unsafe {
            assert!(!(*arena.head).allocated);
            assert_eq!((*arena.head).size, buf.len() - HEADER_SIZE);
            assert!((*arena.head).next.is_null());
        }
    }

    #[test]
    fn large_alloc_splits_and_coalesces_on_free() {
        let mut buf = [0u8; 4096];
        let mut arena = local_arena(&mut buf);

        let a = arena.allocate(256).unwrap();
        let b = arena.allocate(256).unwrap();
        let c = arena.allocate(256).unwrap();

        // SAFETY: each pointer was returned by `allocate` over `buf` above.
        unsafe {
            header_of(a.as_ptr());
            let hb = header_of(b.as_ptr());
            let hc = header_of(c.as_ptr());

            arena.free(hb);
            // `b`'s neighbors (`a`, `c`) are both still allocated, so the
            // middle free chunk stays on its own.
            assert!(!(*hb).allocated);

            arena.free(hc);
            // Freeing `c` should coalesce backward into `b`.
            assert!((*hb).size > 256);
        }
    }

    #[test]
    fn small_class_allocation_reuses_freed_address() {
        // Exercise the module-level allocator end to end. `init` may have
        // already run in another test in this binary; either way, a
        // matched alloc/free/alloc pair on a small class must return the
        // same address.
        let _ = init();

        let p1 = raw_alloc(24).expect("first alloc should succeed");
        raw_free(p1.as_ptr());
        let p2 = raw_alloc(24).expect("second alloc should succeed");
        assert_eq!(p1, p2);
    }

    #[test]
    fn refill_carves_expected_chunk_count() {
        let _ = init();
        let stride = HEADER_SIZE + SIZE_CLASSES[0];
        let expected = SLAB_SIZE / stride;

        // Drain any chunks already sitting on class 0's free list from
        // other tests, then refill once and count what lands on it.
        while pop_class_free(0).is_some() {}
        refill_class(0).expect("refill should succeed while the arena has room");

        let mut count = 0;
        while pop_class_free(0).is_some() {
            count += 1;
        }
        assert_eq!(count, expected);
    }
}
