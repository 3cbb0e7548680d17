//! The scheduling algorithm itself: picking the next ready process and
//! driving the actual context switch. [`super`] is the public, policy-free
//! API the rest of the kernel calls; this module is where the 16-level
//! priority queue, time-slice accounting, and sleeper wakeup actually live.

use crate::arch::x86::context;
use crate::process::{
    self,
    pcb::{ProcessState, PRIORITY_LEVELS},
};

/// Timer interrupt rate, in Hz. Also the unit [`crate::process::pcb::Pcb::time_slice`]
/// and [`crate::process::pcb::Pcb::wakeup_tick`] are counted in: one tick is
/// one 1/TICK_HZ-second timer interrupt.
pub const TICK_HZ: u32 = 100;

/// How often (in ticks) [`on_timer_tick`] runs a reaper pass over zombie
/// processes, rather than reaping inline at exit time.
const REAP_INTERVAL_TICKS: u64 = 100;

/// Pick the next ready process and switch to it, persisting the caller's own
/// `saved_esp` first. If nothing is ready and the caller is still runnable,
/// this is a no-op: the caller just keeps running.
///
/// Called both for an ordinary, returning reschedule ([`super::yield_now`],
/// [`super::timer_tick`]) and for the diverging one ([`super::reschedule`])
/// -- in the diverging case the caller has already marked itself `Zombie`,
/// so it is never chosen again and this call simply never returns to that
/// call site.
pub fn schedule_now() {
    let current = process::current_pid();

    let next = match super::queue::pop_front() {
        Some(pid) => pid,
        None => return,
    };

    if next == current {
        process::with_pcb(current, |p| p.state = ProcessState::Running);
        return;
    }

    let old_esp_slot = match process::saved_esp_slot(current) {
        Some(slot) => slot,
        None => return,
    };

    process::with_pcb(current, |p| {
        if p.state == ProcessState::Running {
            p.state = ProcessState::Ready;
            requeue_priority_and_slice(&mut p.priority, &mut p.time_slice);
            super::queue::push_back(current, p.priority);
        }
    });

    let next_info = process::with_pcb(next, |p| {
        p.state = ProcessState::Running;
        (p.saved_esp, p.kernel_stack_top, p.address_space.clone())
    });
    let (new_esp, kernel_stack_top, address_space) = match next_info {
        Some(v) => v,
        None => return,
    };

    process::set_current_pid(next);
    crate::arch::x86::gdt::set_kernel_stack(kernel_stack_top);
    crate::mm::vmm::switch_to(&address_space);

    // SAFETY: `old_esp_slot` points at `current`'s still-live PCB (the
    // process table never frees a slot out from under a running process),
    // and `new_esp` was saved by a previous call to this same primitive (or
    // built by `context::prepare_initial_frame`/`prepare_initial_kernel_frame`
    // for a process that has never run yet).
    unsafe {
        context::switch_to(old_esp_slot, new_esp);
    }
}

/// Run once per timer interrupt, after [`crate::arch::timer::tick`] has
/// already advanced the global tick counter.
///
/// Charges the running process's time slice, wakes any sleepers whose
/// `wakeup_tick` has passed, periodically reaps zombies, and reschedules if
/// the running process's slice just ran out.
pub fn on_timer_tick() {
    let now = crate::arch::timer::get_ticks();

    wake_sleepers(now);

    if now % REAP_INTERVAL_TICKS == 0 {
        process::reap();
    }

    let current = process::current_pid();
    let slice_exhausted = process::with_pcb(current, |p| {
        if p.state == ProcessState::Running && p.time_slice > 0 {
            p.time_slice -= 1;
        }
        p.state == ProcessState::Running && p.time_slice == 0
    })
    .unwrap_or(false);

    if slice_exhausted {
        schedule_now();
    }
}

/// Decide how a process re-enters its ready queue once it stops running,
/// per SPEC_FULL.md §4.4 step 1: a slice fully consumed (`*time_slice == 0`)
/// ages `*priority` one level down (never past the lowest level) and
/// refills `*time_slice` for the new level; a slice interrupted mid-way
/// (e.g. by `yield_now`, which never decrements it) leaves both untouched,
/// so the process picks up again at the same priority with whatever slice
/// it had left.
fn requeue_priority_and_slice(priority: &mut u8, time_slice: &mut u32) {
    if *time_slice == 0 {
        if *priority < PRIORITY_LEVELS - 1 {
            *priority += 1;
        }
        *time_slice = crate::process::pcb::time_slice_for(*priority);
    }
}

/// Move every `Blocked` process whose timed wait has expired back onto its
/// ready queue. `wakeup_tick == 0` means "blocked indefinitely" (waiting on
/// an explicit [`super::unblock`], not a timeout) and is never woken here.
fn wake_sleepers(now: u64) {
    for pid in process::all_pids() {
        let should_wake = process::with_pcb(pid, |p| {
            p.state == ProcessState::Blocked && p.wakeup_tick != 0 && p.wakeup_tick <= now
        })
        .unwrap_or(false);

        if should_wake {
            super::unblock(pid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_hz_is_positive() {
        assert!(TICK_HZ > 0);
    }

    #[test]
    fn reap_interval_matches_tick_hz() {
        // Documents the intended cadence: a reaper pass roughly once a
        // second.
        assert_eq!(REAP_INTERVAL_TICKS, TICK_HZ as u64);
    }

    #[test]
    fn e4_exhausted_slice_demotes_and_refills() {
        // A priority-8 process whose `8*BASE` slice just ran out is
        // demoted to priority 9 with a fresh `7*BASE` slice.
        let mut priority = 8u8;
        let mut time_slice = 0u32;
        requeue_priority_and_slice(&mut priority, &mut time_slice);
        assert_eq!(priority, 9);
        assert_eq!(time_slice, crate::process::pcb::time_slice_for(9));
    }

    #[test]
    fn mid_slice_preemption_preserves_priority_and_remainder() {
        let mut priority = 8u8;
        let mut time_slice = 3u32;
        requeue_priority_and_slice(&mut priority, &mut time_slice);
        assert_eq!(priority, 8);
        assert_eq!(time_slice, 3);
    }

    #[test]
    fn lowest_priority_never_ages_past_fifteen() {
        let mut priority = PRIORITY_LEVELS - 1;
        let mut time_slice = 0u32;
        requeue_priority_and_slice(&mut priority, &mut time_slice);
        assert_eq!(priority, PRIORITY_LEVELS - 1);
    }
}
