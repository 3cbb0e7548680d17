//! Timer tick accounting, independent of the PIT programming in [`super::x86::pit`].

use core::sync::atomic::{AtomicU64, Ordering};

static TICKS: AtomicU64 = AtomicU64::new(0);

/// Current tick count since the PIT was programmed in [`super::x86::pit::init`].
pub fn get_ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Advance the tick counter and drive the scheduler's time-slice accounting.
///
/// Called once per timer IRQ (vector 32) with interrupts disabled.
pub fn tick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
    crate::sched::timer_tick();
}
