//! 16550 UART driver for COM1 (0x3F8), hand-rolled over raw port I/O.
//!
//! Used as the serial-log sink (feature `serial-log`) and by the bare-metal
//! test harness, which writes results to the serial line before exiting
//! QEMU via the ISA debug-exit device.

use lazy_static::lazy_static;
use spin::Mutex;

use crate::arch::x86::port::{inb, outb};

const COM1: u16 = 0x3F8;

pub struct SerialPort {
    base: u16,
}

impl SerialPort {
    /// # Safety
    /// `base` must be a valid, unshared 16550-compatible UART I/O base.
    unsafe fn new(base: u16) -> Self {
        SerialPort { base }
    }

    fn init(&mut self) {
        // SAFETY: standard 16550 initialization sequence: disable interrupts,
        // set baud divisor, select 8N1, enable and test the FIFO, then put
        // the port in normal operating mode.
        unsafe {
            outb(self.base + 1, 0x00); // disable interrupts
            outb(self.base + 3, 0x80); // enable DLAB
            outb(self.base, 0x03); // divisor low: 38400 baud
            outb(self.base + 1, 0x00); // divisor high
            outb(self.base + 3, 0x03); // 8 bits, no parity, one stop bit
            outb(self.base + 2, 0xC7); // enable FIFO, clear, 14-byte threshold
            outb(self.base + 4, 0x0B); // IRQs enabled, RTS/DSR set
        }
    }

    fn line_status(&self) -> u8 {
        // SAFETY: reading the line status register has no side effects.
        unsafe { inb(self.base + 5) }
    }

    fn write_byte(&mut self, byte: u8) {
        while self.line_status() & 0x20 == 0 {
            core::hint::spin_loop();
        }
        // SAFETY: we just confirmed the transmit holding register is empty.
        unsafe {
            outb(self.base, byte);
        }
    }
}

impl core::fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for byte in s.bytes() {
            self.write_byte(byte);
        }
        Ok(())
    }
}

lazy_static! {
    pub static ref SERIAL1: Mutex<SerialPort> = {
        // SAFETY: 0x3F8 is the standard COM1 I/O base.
        let mut port = unsafe { SerialPort::new(COM1) };
        port.init();
        Mutex::new(port)
    };
}

#[doc(hidden)]
pub fn _print(args: core::fmt::Arguments) {
    use core::fmt::Write;
    crate::arch::x86::without_interrupts(|| {
        SERIAL1.lock().write_fmt(args).expect("serial write_fmt failed");
    });
}
