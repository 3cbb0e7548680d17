//! Architecture support.
//!
//! This kernel targets 32-bit protected-mode x86 only; there is a single
//! backing module instead of the usual `#[cfg(target_arch = ...)]` fan-out.
//! Hardware access (segment descriptors, the PIC, the PIT, port I/O) is
//! hand-rolled with `core::arch::asm!` rather than pulled from a crate, since
//! the available crates in this ecosystem target long mode.

pub mod x86;
pub use x86::*;

pub mod timer;
