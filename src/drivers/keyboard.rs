//! PS/2 keyboard on IRQ1.
//!
//! The interrupt handler only moves raw scancodes into [`SCANCODES`];
//! decoding into characters happens in task context via [`ScancodeDecoder`].

use alloc::boxed::Box;
use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use super::ps2::{Ps2Controller, CMD_DISABLE_KEYBOARD, CMD_ENABLE_KEYBOARD, DEVICE_ENABLE_REPORTING};
use super::Driver;
use crate::interrupts::{CpuState, InterruptHandler, IrqLine};

const BUFFER_SIZE: usize = 256;

/// Scancodes waiting to be decoded.
pub static SCANCODES: ScancodeQueue = ScancodeQueue::new();

/// Single-producer single-consumer ring of raw scancodes.
pub struct ScancodeQueue {
    buffer: [AtomicU8; BUFFER_SIZE],
    head: AtomicUsize,
    tail: AtomicUsize,
}

impl ScancodeQueue {
    pub const fn new() -> Self {
        const EMPTY: AtomicU8 = AtomicU8::new(0);
        Self {
            buffer: [EMPTY; BUFFER_SIZE],
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Queues `scancode`; `false` when the ring is full and it was dropped.
    pub fn push(&self, scancode: u8) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let next = (head + 1) % BUFFER_SIZE;
        if next == self.tail.load(Ordering::Acquire) {
            return false;
        }
        self.buffer[head].store(scancode, Ordering::Relaxed);
        self.head.store(next, Ordering::Release);
        true
    }

    pub fn pop(&self) -> Option<u8> {
        let tail = self.tail.load(Ordering::Relaxed);
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }
        let scancode = self.buffer[tail].load(Ordering::Relaxed);
        self.tail.store((tail + 1) % BUFFER_SIZE, Ordering::Release);
        Some(scancode)
    }

    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }
}

impl Default for ScancodeQueue {
    fn default() -> Self {
        Self::new()
    }
}

pub struct KeyboardDriver<C> {
    vector: u8,
    controller: C,
    queue: &'static ScancodeQueue,
    dropped: u64,
}

impl<C: Ps2Controller> KeyboardDriver<C> {
    pub fn new(irq_offset: u8, controller: C, queue: &'static ScancodeQueue) -> Self {
        Self {
            vector: IrqLine::Keyboard.vector(irq_offset),
            controller,
            queue,
            dropped: 0,
        }
    }
}

impl<C: Ps2Controller> InterruptHandler for KeyboardDriver<C> {
    fn vector(&self) -> u8 {
        self.vector
    }

    fn handle(&mut self, state: CpuState) -> CpuState {
        let scancode = self.controller.read_data();
        if !self.queue.push(scancode) {
            self.dropped += 1;
            log::trace!("keyboard: queue full, {} scancodes dropped", self.dropped);
        }
        state
    }
}

impl<C: Ps2Controller + 'static> Driver for KeyboardDriver<C> {
    fn name(&self) -> &'static str {
        "ps2-keyboard"
    }

    /// Drains stale output, enables the first port's clock and interrupt
    /// (config bits 4 and 0), then turns on scanning. Translation (bit 6) is
    /// left as the firmware set it; the decoder expects set-1 codes.
    fn activate(&mut self) -> Result<(), &'static str> {
        self.controller.flush_output();
        self.controller.send_command(CMD_ENABLE_KEYBOARD)?;
        self.controller.update_config(|config| (config | 0x01) & !0x10)?;
        self.controller.send_data(DEVICE_ENABLE_REPORTING)
    }

    fn reset(&mut self) -> Result<(), &'static str> {
        self.controller.flush_output();
        while self.queue.pop().is_some() {}
        Ok(())
    }

    fn deactivate(&mut self) {
        if let Err(err) = self.controller.send_command(CMD_DISABLE_KEYBOARD) {
            log::warn!("keyboard: {}", err);
        }
    }

    fn into_handler(self: Box<Self>) -> Box<dyn InterruptHandler> {
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub character: char,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

/// Scancode set 1 to characters, US layout. Tracks modifier state across calls.
pub struct ScancodeDecoder {
    extended: bool,
    shift: bool,
    ctrl: bool,
    alt: bool,
}

// Unshifted / shifted characters for scancodes 0x00..=0x39.
const PLAIN: &[u8; 0x3A] = b"\0\x1b1234567890-=\x08\tqwertyuiop[]\n\0asdfghjkl;'`\0\\zxcvbnm,./\0*\0 ";
const SHIFTED: &[u8; 0x3A] = b"\0\x1b!@#$%^&*()_+\x08\tQWERTYUIOP{}\n\0ASDFGHJKL:\"~\0|ZXCVBNM<>?\0*\0 ";

impl ScancodeDecoder {
    pub const fn new() -> Self {
        Self { extended: false, shift: false, ctrl: false, alt: false }
    }

    pub fn process_scancode(&mut self, scancode: u8) -> Option<KeyEvent> {
        if scancode == 0xE0 {
            self.extended = true;
            return None;
        }
        let extended = core::mem::take(&mut self.extended);
        let released = scancode & 0x80 != 0;
        let code = scancode & 0x7F;

        match code {
            0x2A | 0x36 => self.shift = !released,
            0x1D => self.ctrl = !released,
            0x38 => self.alt = !released,
            _ if released || extended => {}
            _ => return self.character(code).map(|character| self.event(character)),
        }
        None
    }

    fn character(&self, code: u8) -> Option<char> {
        let table = if self.shift { SHIFTED } else { PLAIN };
        match table.get(usize::from(code)) {
            Some(0) | None => None,
            Some(&byte) => Some(char::from(byte)),
        }
    }

    fn event(&self, character: char) -> KeyEvent {
        KeyEvent { character, ctrl: self.ctrl, alt: self.alt, shift: self.shift }
    }
}

impl Default for ScancodeDecoder {
    fn default() -> Self {
        Self::new()
    }
}
