//! Device drivers: VGA/serial console output and the PS/2 keyboard.
//!
//! Both devices are exposed to the rest of the kernel exclusively through
//! `/dev` nodes (see [`crate::fs::devfs`]); this module only brings up the
//! hardware itself.

pub mod console;
pub mod keyboard;

use crate::error::KernelResult;

/// Unmask the keyboard's IRQ line. The console needs no initialization
/// beyond what [`crate::arch::x86::vga`]/`serial` already do at link time.
pub fn init() -> KernelResult<()> {
    crate::arch::x86::pic::unmask(1);
    kprintln!("[DRIVERS] keyboard IRQ unmasked");
    Ok(())
}
