//! 8253/8254 Programmable Interval Timer, driving the scheduler tick.

use crate::arch::x86::port::outb;

const PIT_BASE_FREQUENCY_HZ: u32 = 1_193_182;
const PIT_COMMAND_PORT: u16 = 0x43;
const PIT_CHANNEL0_PORT: u16 = 0x40;
const PIT_MODE_SQUARE_WAVE: u8 = 0x36;

/// Program channel 0 for periodic interrupts at `frequency_hz` (IRQ0, vector
/// 32). The divisor is truncated toward the nearest achievable rate, as the
/// PIT's base frequency does not evenly divide most requested rates.
pub fn init(frequency_hz: u32) {
    let divisor = (PIT_BASE_FREQUENCY_HZ / frequency_hz).clamp(1, u16::MAX as u32) as u16;
    // SAFETY: ports 0x43/0x40 are the PIT command and channel-0 data ports;
    // this is the documented mode-3 programming sequence.
    unsafe {
        outb(PIT_COMMAND_PORT, PIT_MODE_SQUARE_WAVE);
        outb(PIT_CHANNEL0_PORT, (divisor & 0xFF) as u8);
        outb(PIT_CHANNEL0_PORT, (divisor >> 8) as u8);
    }
}
