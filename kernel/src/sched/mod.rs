//! Preemptive scheduler: 16 priority-ordered FIFO ready queues feeding a
//! single-CPU kernel-stack-pointer context switch.
//!
//! The actual switch primitive ([`crate::arch::x86::context::switch_to`])
//! is a coroutine-style stack swap, not a literal saved-frame-pointer
//! handoff, so [`reschedule`] (the diverging path [`crate::process::terminate_current`]
//! needs) is kept distinct from the ordinary, returning reschedule done by
//! [`yield_now`] and [`timer_tick`] -- a context switch does not inherently
//! diverge; it returns right here once this call site's process is chosen
//! again.

mod queue;
mod scheduler;

use crate::error::KernelResult;
use crate::process::{self, pcb::Pid, pcb::ProcessState};

pub use scheduler::TICK_HZ;

pub fn init() -> KernelResult<()> {
    Ok(())
}

/// Place `pid` onto its priority's ready queue.
pub fn enqueue(pid: Pid) {
    let priority = process::with_pcb(pid, |p| p.priority).unwrap_or(0);
    queue::push_back(pid, priority);
}

/// Voluntarily give up the CPU without being charged for the rest of the
/// current time slice. Priority aging only happens when a slice is fully
/// consumed by [`timer_tick`], so a process that yields keeps its priority.
pub fn yield_now() {
    scheduler::schedule_now();
}

/// Called once per timer interrupt, after [`crate::arch::timer::tick`] has
/// advanced the tick counter: charges the running process's slice, wakes
/// any timed-out sleepers, periodically reaps zombies, and re-runs the
/// scheduling algorithm.
pub fn timer_tick() {
    scheduler::on_timer_tick();
}

/// Abandon the calling process's kernel stack and switch to the next ready
/// process. Used only by [`crate::process::terminate_current`], which has
/// already marked the caller `Zombie` (so it is never re-enqueued) before
/// calling this. Never returns: if no other process is ready either, the
/// CPU just idles until one becomes so.
pub fn reschedule() -> ! {
    scheduler::schedule_now();
    loop {
        crate::arch::halt_once();
    }
}

/// Remove `pid` from scheduling consideration until [`unblock`] is called
/// or `wait_ticks` elapse (`0` means wait indefinitely for an explicit
/// unblock). Triggers an immediate reschedule if `pid` is the process
/// calling this.
///
/// If `pid` is currently sitting on a ready queue (not the one running),
/// it is unlinked from that queue here -- otherwise a later `pop_front`
/// would hand it back out and set it `Running` while it is `Blocked`.
pub fn block(pid: Pid, wait_ticks: u64) {
    let now = crate::arch::timer::get_ticks();
    let readiness = process::with_pcb(pid, |p| {
        let was_ready = p.state == ProcessState::Ready;
        p.state = ProcessState::Blocked;
        p.wakeup_tick = if wait_ticks == 0 { 0 } else { now + wait_ticks };
        (was_ready, p.priority)
    });
    if let Some((true, priority)) = readiness {
        queue::remove(pid, priority);
    }
    if pid == process::current_pid() {
        yield_now();
    }
}

/// Move a `Blocked` process back onto its priority's ready queue. A no-op
/// if `pid` is not currently blocked.
pub fn unblock(pid: Pid) {
    let woke = process::with_pcb(pid, |p| {
        if p.state == ProcessState::Blocked {
            p.state = ProcessState::Ready;
            p.wakeup_tick = 0;
            true
        } else {
            false
        }
    })
    .unwrap_or(false);
    if woke {
        enqueue(pid);
    }
}

/// Idle loop entered once boot completes. All real scheduling happens
/// inside the timer interrupt; this just halts between ticks waiting for
/// one to fire.
pub fn run() -> ! {
    loop {
        crate::arch::halt_once();
    }
}
