//! Binary entry shim.
//!
//! All kernel code lives in the library crate; this pulls it in so the
//! linker keeps `arch::x86::entry::_start`, the `#[no_mangle]` symbol the
//! linker script points the ELF entry point at.

#![no_std]
#![no_main]

extern crate jarvis_kernel as _kernel;
