//! Process creation: allocate a PID, build an address space, set up the
//! initial register frame, and enqueue the new process as `Ready`.

use alloc::sync::Arc;

use super::pcb::{Pcb, Pid, Privilege};
use super::{insert, ProcessState};
use crate::arch::x86::context;
use crate::error::KernelResult;
use crate::mm::vmm::{self, MemoryRegion, RegionKind};

/// Virtual address every user process's entry point and initial stack are
/// placed at. A real loader would place these according to an executable's
/// own layout; this kernel has no ELF loader (out of scope), so every user
/// process is handed the same fixed layout and a pointer to its code.
const USER_ENTRY_BASE: u32 = 0x0040_0000;
const USER_STACK_TOP: u32 = 0x0080_0000;
const USER_STACK_PAGES: u32 = 4;

/// Create a new process whose user code lives at `entry`, owned by `parent`
/// at the given priority. Builds a fresh address space, maps a stack, and
/// leaves the process `Ready` for the scheduler to pick up.
pub fn create_process(parent: Option<Pid>, entry: u32, priority: u8) -> KernelResult<Pid> {
    let address_space = Arc::new(vmm::create_address_space()?);

    // The stack is recorded as a region, not eagerly mapped: the first
    // touch (by the user program, or by the initial `iretd` itself) takes
    // a not-present fault that `page_fault::try_demand_page` services by
    // zero-filling a fresh frame, per the stack MemoryRegion the creation
    // contract requires.
    address_space.regions.lock().push(MemoryRegion {
        base: USER_STACK_TOP - USER_STACK_PAGES * crate::mm::PAGE_SIZE,
        length: USER_STACK_PAGES * crate::mm::PAGE_SIZE,
        kind: RegionKind::Anonymous,
        writable: true,
        user: true,
    });

    let mut pcb = Pcb::new(Pid(0), parent, priority, Privilege::User, address_space);
    pcb.saved_esp = context::prepare_initial_frame(pcb.kernel_stack_top, entry, USER_STACK_TOP);
    pcb.state = ProcessState::Ready;

    let pid = insert(pcb)?;
    crate::sched::enqueue(pid);
    Ok(pid)
}

extern "C" fn init_task_entry() -> ! {
    loop {
        crate::sched::yield_now();
    }
}

/// Bring up the first process (PID 0): a ring-0 task that simply yields
/// forever, giving the scheduler something runnable as soon as interrupts
/// are enabled. Later processes are created by syscalls a real init
/// program would issue (`fork`/`execve`); those remain ABI stubs (§4.6),
/// so this is also, for now, the only process that ever exists.
pub fn spawn_init_process() -> KernelResult<()> {
    let address_space = Arc::new(vmm::create_address_space()?);
    let mut pcb = Pcb::new(Pid(0), None, 0, Privilege::Kernel, address_space);
    pcb.saved_esp = context::prepare_initial_kernel_frame(pcb.kernel_stack_top, init_task_entry);
    pcb.state = ProcessState::Ready;

    let pid = insert(pcb)?;
    crate::sched::enqueue(pid);
    Ok(())
}
