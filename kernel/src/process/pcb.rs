//! Process control block: everything the scheduler and syscall layer need
//! to know about one process.

use alloc::boxed::Box;
use alloc::sync::Arc;

use crate::fs::FdTable;
use crate::mm::vmm::AddressSpace;

/// Process identifier. `0` is reserved for the bootstrap/init process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u32);

/// Number of priority levels: 0 is highest, 15 is lowest.
pub const PRIORITY_LEVELS: u8 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Ready,
    Running,
    Blocked,
    /// Exited but not yet reaped; `exit_code` is valid.
    Zombie,
}

/// Ring the process runs in. All user processes run at `User`; the
/// bootstrap/init process is the only one that ever runs at `Kernel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    Kernel,
    User,
}

pub const KERNEL_STACK_SIZE: usize = 16 * 1024;

/// One process. Kept in a fixed-size, index-addressed table
/// ([`crate::process`]) rather than behind individual heap allocations
/// tracked by pointer -- ready queues then link entries by [`Pid`] through
/// `next_in_queue` instead of through a linked list of boxes.
pub struct Pcb {
    pub pid: Pid,
    pub parent: Option<Pid>,
    pub priority: u8,
    pub base_priority: u8,
    pub state: ProcessState,
    pub privilege: Privilege,
    pub address_space: Arc<AddressSpace>,

    /// Saved stack pointer; valid only while `state != Running`. Restored by
    /// [`crate::arch::x86::context::switch_to`] to resume this process.
    pub saved_esp: u32,
    /// Top of this process's private kernel stack, loaded into the TSS by
    /// [`crate::arch::x86::gdt::set_kernel_stack`] whenever it is scheduled.
    pub kernel_stack_top: u32,
    /// Backing storage for the kernel stack, kept alive for the process's
    /// entire lifetime.
    kernel_stack: Box<[u8]>,

    pub fd_table: FdTable,
    pub exit_code: i32,

    /// Ticks remaining in the process's current scheduling quantum.
    pub time_slice: u32,
    /// Tick at which a `Blocked` process becomes `Ready` again (0 if blocked
    /// indefinitely, e.g. waiting on I/O rather than a timer).
    pub wakeup_tick: u64,

    /// Next process in whatever intrusive queue currently holds this PCB
    /// (a ready queue, or none). `None` terminates the chain.
    pub next_in_queue: Option<Pid>,
}

impl Pcb {
    pub fn new(
        pid: Pid,
        parent: Option<Pid>,
        priority: u8,
        privilege: Privilege,
        address_space: Arc<AddressSpace>,
    ) -> Self {
        let kernel_stack = alloc::vec![0u8; KERNEL_STACK_SIZE].into_boxed_slice();
        let kernel_stack_top = kernel_stack.as_ptr() as u32 + KERNEL_STACK_SIZE as u32;
        Self {
            pid,
            parent,
            priority,
            base_priority: priority,
            state: ProcessState::Ready,
            privilege,
            address_space,
            saved_esp: kernel_stack_top,
            kernel_stack_top,
            kernel_stack,
            fd_table: FdTable::new(),
            exit_code: 0,
            time_slice: time_slice_for(priority),
            wakeup_tick: 0,
            next_in_queue: None,
        }
    }
}

/// Time slice length in ticks for a given priority: higher-priority
/// (numerically lower) processes get shorter slices so the scheduler
/// revisits them more often, while low-priority processes get longer
/// slices to reduce switching overhead once they do run.
pub const BASE_TIME_SLICE: u32 = 2;

pub fn time_slice_for(priority: u8) -> u32 {
    BASE_TIME_SLICE * (PRIORITY_LEVELS - priority.min(PRIORITY_LEVELS - 1)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_priority_gets_shorter_slice() {
        assert!(time_slice_for(0) > time_slice_for(15));
    }

    #[test]
    fn time_slice_for_lowest_priority_is_base() {
        assert_eq!(time_slice_for(15), BASE_TIME_SLICE);
    }
}
