//! Process table: a fixed-size arena of [`pcb::Pcb`] slots addressed by
//! [`pcb::Pid`], plus the handful of free functions the scheduler, syscall
//! layer, and page-fault handler use to reach "the currently running
//! process" without threading a reference through every call site.
//!
//! Processes are stored by index rather than behind individual allocations
//! (§9's arena-plus-index recommendation): ready queues link entries by
//! `Pid` through [`pcb::Pcb::next_in_queue`] instead of boxing an
//! intrusive list.

pub mod creation;
pub mod pcb;

use alloc::vec::Vec;

use spin::Mutex;

use crate::error::{KernelError, KernelResult, SchedError};
use crate::mm::vmm::AddressSpace;
use crate::sync::once_lock::GlobalState;
use pcb::{Pcb, Pid, Privilege, ProcessState};

/// Upper bound on simultaneously live processes. Sized generously for a
/// single-CPU teaching kernel; raising it only costs static memory.
pub const MAX_PROCESSES: usize = 256;

struct ProcessTable {
    slots: [Option<Pcb>; MAX_PROCESSES],
    next_pid: u32,
}

impl ProcessTable {
    fn empty() -> Self {
        Self { slots: [const { None }; MAX_PROCESSES], next_pid: 0 }
    }

    /// Find a free slot and assign it the next unused PID, wrapping search
    /// only within the table's fixed capacity.
    fn allocate(&mut self) -> KernelResult<usize> {
        for offset in 0..MAX_PROCESSES {
            let idx = (self.next_pid as usize + offset) % MAX_PROCESSES;
            if self.slots[idx].is_none() {
                self.next_pid = (idx as u32 + 1) % MAX_PROCESSES as u32;
                return Ok(idx);
            }
        }
        Err(KernelError::Sched(SchedError::TooManyProcesses))
    }
}

static TABLE: GlobalState<Mutex<ProcessTable>> = GlobalState::new();
static CURRENT: GlobalState<Mutex<Pid>> = GlobalState::new();

pub fn init() -> KernelResult<()> {
    TABLE
        .init(Mutex::new(ProcessTable::empty()))
        .map_err(|_| KernelError::NotInitialized { subsystem: "process" })?;
    let _ = CURRENT.init(Mutex::new(Pid(0)));
    Ok(())
}

/// Insert an already-built PCB into the table at the slot matching its PID.
/// Used by [`creation`], which picks the PID before building the PCB (the
/// kernel stack allocation needs to happen before the table lock is held).
fn insert(pcb: Pcb) -> KernelResult<Pid> {
    TABLE
        .with_mut(|t| {
            let mut table = t.lock();
            let idx = table.allocate()?;
            let pid = Pid(idx as u32);
            let mut pcb = pcb;
            pcb.pid = pid;
            table.slots[idx] = Some(pcb);
            Ok(pid)
        })
        .unwrap_or(Err(KernelError::NotInitialized { subsystem: "process" }))
}

/// Run `f` with exclusive access to `pid`'s PCB, if it still exists.
pub fn with_pcb<R>(pid: Pid, f: impl FnOnce(&mut Pcb) -> R) -> Option<R> {
    TABLE.with_mut(|t| {
        let mut table = t.lock();
        table.slots[pid.0 as usize % MAX_PROCESSES].as_mut().map(f)
    })?
}

/// Raw pointer to `pid`'s saved-stack-pointer slot. The process table never
/// moves a live slot's storage, so this pointer stays valid for as long as
/// `pid` remains in the table -- used by the scheduler to hand
/// [`crate::arch::x86::context::switch_to`] a stable save target without
/// holding the table's lock across the actual context switch.
pub fn saved_esp_slot(pid: Pid) -> Option<*mut u32> {
    TABLE.with_mut(|t| {
        let mut table = t.lock();
        table.slots[pid.0 as usize % MAX_PROCESSES]
            .as_mut()
            .map(|pcb| &mut pcb.saved_esp as *mut u32)
    })?
}

pub fn current_pid() -> Pid {
    CURRENT.with(|c| *c.lock()).unwrap_or(Pid(0))
}

pub fn set_current_pid(pid: Pid) {
    CURRENT.with_mut(|c| *c.lock() = pid);
}

/// Run `f` against the currently running process's PCB.
pub fn with_current<R>(f: impl FnOnce(&mut Pcb) -> R) -> Option<R> {
    with_pcb(current_pid(), f)
}

/// Run `f` against the currently running process's address space.
pub fn with_current_address_space<R>(f: impl FnOnce(&AddressSpace) -> R) -> Option<R> {
    with_current(|pcb| f(&pcb.address_space))
}

/// Mark the current process a zombie with the given exit code and force a
/// reschedule. Resource teardown (address space, kernel stack) happens
/// later, in [`reap`], once a parent has had a chance to observe the exit
/// code via a future `waitpid`.
pub fn terminate_current(exit_code: i32) -> ! {
    let pid = current_pid();
    with_pcb(pid, |pcb| {
        pcb.state = ProcessState::Zombie;
        pcb.exit_code = exit_code;
    });
    crate::sched::reschedule();
}

/// Release a zombie's address space and kernel stack and free its table
/// slot. Called periodically by [`crate::sched::timer_tick`] rather than
/// inline at exit time, so exit itself never has to wait on a lock a
/// parent might be holding.
pub fn reap() {
    TABLE.with_mut(|t| {
        let mut table = t.lock();
        for slot in table.slots.iter_mut() {
            let is_zombie = matches!(slot, Some(pcb) if pcb.state == ProcessState::Zombie);
            if is_zombie {
                if let Some(pcb) = slot.take() {
                    crate::mm::vmm::destroy_address_space(&pcb.address_space);
                }
            }
        }
    });
}

/// Snapshot of every live PID, used by the scheduler's sleeper-wakeup scan.
pub fn all_pids() -> Vec<Pid> {
    TABLE
        .with(|t| {
            t.lock()
                .slots
                .iter()
                .enumerate()
                .filter_map(|(i, s)| s.as_ref().map(|_| Pid(i as u32)))
                .collect()
        })
        .unwrap_or_default()
}

/// Count of processes in a `Ready` or `Running` state, used by the
/// scheduler's idle detection.
pub fn runnable_count() -> usize {
    TABLE
        .with(|t| {
            t.lock()
                .slots
                .iter()
                .filter(|s| matches!(s, Some(p) if p.state != ProcessState::Zombie))
                .count()
        })
        .unwrap_or(0)
}
