//! PS/2 keyboard driver, IRQ1, vector 33.
//!
//! Reads a single scancode byte from port 0x60 per interrupt, decodes it
//! with `pc_keyboard` (ScancodeSet1, US 104-key layout), and pushes decoded
//! ASCII bytes into a ring buffer that [`crate::fs::devfs`]'s console
//! device drains on `read`.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

use lazy_static::lazy_static;
use pc_keyboard::{layouts, DecodedKey, HandleControl, Keyboard, ScancodeSet1};
use spin::Mutex;

use crate::arch::x86::port::inb;

const DATA_PORT: u16 = 0x60;
const BUFFER_SIZE: usize = 256;

struct KeyBuffer {
    buf: UnsafeCell<[u8; BUFFER_SIZE]>,
    head: AtomicUsize,
    tail: AtomicUsize,
}

impl KeyBuffer {
    const fn new() -> Self {
        Self {
            buf: UnsafeCell::new([0; BUFFER_SIZE]),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// # Safety
    /// Caller guarantees no other caller is concurrently pushing (this
    /// kernel only ever calls `push` from IRQ1, which cannot nest).
    unsafe fn push(&self, byte: u8) {
        let head = self.head.load(Ordering::Relaxed);
        let next = (head + 1) & (BUFFER_SIZE - 1);
        if next == self.tail.load(Ordering::Acquire) {
            return;
        }
        // SAFETY: single producer (IRQ1), writing a slot the consumer has
        // already advanced past.
        unsafe {
            (*self.buf.get())[head] = byte;
        }
        self.head.store(next, Ordering::Release);
    }

    fn pop(&self) -> Option<u8> {
        let tail = self.tail.load(Ordering::Relaxed);
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: single consumer, reading a slot the producer has already
        // published via the `head` release-store.
        let byte = unsafe { (*self.buf.get())[tail] };
        self.tail.store((tail + 1) & (BUFFER_SIZE - 1), Ordering::Release);
        Some(byte)
    }
}

// SAFETY: access is disciplined to a single producer (IRQ1) and single
// consumer (task context), synchronized through the atomic head/tail
// indices as in any SPSC ring buffer.
unsafe impl Sync for KeyBuffer {}

static BUFFER: KeyBuffer = KeyBuffer::new();

lazy_static! {
    static ref DECODER: Mutex<Keyboard<layouts::Us104Key, ScancodeSet1>> = Mutex::new(Keyboard::new(
        ScancodeSet1::new(),
        layouts::Us104Key,
        HandleControl::Ignore,
    ));
}

/// Handle IRQ1: read the pending scancode and decode it. Called from
/// [`crate::arch::x86::idt::common_interrupt_entry`] before the PIC is
/// sent EOI.
pub fn handle_irq() {
    // SAFETY: 0x60 is the PS/2 controller's data port; reading it here
    // acknowledges the byte to the controller, as required on every IRQ1.
    let scancode = unsafe { inb(DATA_PORT) };

    let mut decoder = DECODER.lock();
    if let Ok(Some(event)) = decoder.add_byte(scancode) {
        if let Some(DecodedKey::Unicode(ch)) = decoder.process_keyevent(event) {
            if ch.is_ascii() {
                // SAFETY: called only from IRQ1, which cannot nest with
                // itself.
                unsafe {
                    BUFFER.push(ch as u8);
                }
            }
        }
    }
}

/// Pop one decoded byte, or `None` if the buffer is empty.
pub fn read_byte() -> Option<u8> {
    BUFFER.pop()
}
