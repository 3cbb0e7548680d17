//! Console device glue between [`crate::fs::devfs`]'s `/dev/console` node
//! and the VGA text writer.

/// Write one byte to the screen, mirroring it to the serial port so boot
/// logs survive even when nothing is attached to the VGA output.
pub fn write_byte(byte: u8) {
    crate::arch::x86::vga::_print(format_args!("{}", byte as char));
    crate::arch::x86::serial::_print(format_args!("{}", byte as char));
}
