//! PS/2 mouse on IRQ12.
//!
//! Movement packets are folded into a text-mode cursor position that tasks
//! can poll through [`MouseCursor`].

use alloc::boxed::Box;
use core::sync::atomic::{AtomicU16, AtomicU8, Ordering};

use super::ps2::{
    Ps2Controller, CMD_DISABLE_AUX, CMD_ENABLE_AUX, CMD_WRITE_AUX, DEVICE_ACK, DEVICE_ENABLE_REPORTING,
    STATUS_AUX_DATA,
};
use super::Driver;
use crate::interrupts::{CpuState, InterruptHandler, IrqLine};

pub const SCREEN_COLUMNS: u16 = 80;
pub const SCREEN_ROWS: u16 = 25;

/// Cursor fed by the mouse driver.
pub static CURSOR: MouseCursor = MouseCursor::new(SCREEN_COLUMNS, SCREEN_ROWS);

/// Mouse event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    pub x: i16,
    /// Positive is down the screen.
    pub y: i16,
    /// Bit 0 = left, bit 1 = right, bit 2 = middle
    pub buttons: u8,
}

impl MouseEvent {
    pub fn is_left_pressed(&self) -> bool {
        (self.buttons & 0x01) != 0
    }

    pub fn is_right_pressed(&self) -> bool {
        (self.buttons & 0x02) != 0
    }

    pub fn is_middle_pressed(&self) -> bool {
        (self.buttons & 0x04) != 0
    }
}

/// Reassembles 3-byte PS/2 packets.
pub struct MouseDecoder {
    packet: [u8; 3],
    index: usize,
}

impl MouseDecoder {
    pub const fn new() -> Self {
        Self { packet: [0; 3], index: 0 }
    }

    /// Feeds one byte; yields an event once a packet is complete.
    pub fn process_byte(&mut self, byte: u8) -> Option<MouseEvent> {
        // Bit 3 is always set in the first byte; anything else means we lost sync.
        if self.index == 0 && byte & 0x08 == 0 {
            return None;
        }

        self.packet[self.index] = byte;
        self.index += 1;
        if self.index < self.packet.len() {
            return None;
        }
        self.index = 0;

        let [status, dx, dy] = self.packet;
        Some(MouseEvent {
            x: i16::from(dx as i8),
            y: -i16::from(dy as i8),
            buttons: status & 0x07,
        })
    }
}

impl Default for MouseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Cursor position on a `columns` x `rows` grid, clamped to its edges.
pub struct MouseCursor {
    columns: u16,
    rows: u16,
    x: AtomicU16,
    y: AtomicU16,
    buttons: AtomicU8,
}

impl MouseCursor {
    /// Starts centered.
    pub const fn new(columns: u16, rows: u16) -> Self {
        Self {
            columns,
            rows,
            x: AtomicU16::new(columns / 2),
            y: AtomicU16::new(rows / 2),
            buttons: AtomicU8::new(0),
        }
    }

    pub fn apply(&self, event: &MouseEvent) {
        let x = clamp_step(self.x.load(Ordering::Relaxed), event.x, self.columns);
        let y = clamp_step(self.y.load(Ordering::Relaxed), event.y, self.rows);
        self.x.store(x, Ordering::Relaxed);
        self.y.store(y, Ordering::Relaxed);
        self.buttons.store(event.buttons, Ordering::Release);
    }

    pub fn position(&self) -> (u16, u16) {
        (self.x.load(Ordering::Relaxed), self.y.load(Ordering::Relaxed))
    }

    pub fn buttons(&self) -> u8 {
        self.buttons.load(Ordering::Acquire)
    }
}

fn clamp_step(position: u16, delta: i16, limit: u16) -> u16 {
    let moved = i32::from(position) + i32::from(delta);
    moved.clamp(0, i32::from(limit) - 1) as u16
}

pub struct MouseDriver<C> {
    vector: u8,
    controller: C,
    decoder: MouseDecoder,
    cursor: &'static MouseCursor,
}

impl<C: Ps2Controller> MouseDriver<C> {
    pub fn new(irq_offset: u8, controller: C, cursor: &'static MouseCursor) -> Self {
        Self {
            vector: IrqLine::Mouse.vector(irq_offset),
            controller,
            decoder: MouseDecoder::new(),
            cursor,
        }
    }
}

impl<C: Ps2Controller> InterruptHandler for MouseDriver<C> {
    fn vector(&self) -> u8 {
        self.vector
    }

    fn handle(&mut self, state: CpuState) -> CpuState {
        if self.controller.status() & STATUS_AUX_DATA == 0 {
            return state;
        }
        let byte = self.controller.read_data();
        if let Some(event) = self.decoder.process_byte(byte) {
            self.cursor.apply(&event);
        }
        state
    }
}

impl<C: Ps2Controller + 'static> Driver for MouseDriver<C> {
    fn name(&self) -> &'static str {
        "ps2-mouse"
    }

    /// Enables the auxiliary port and its interrupt, then asks the mouse to
    /// start streaming packets.
    fn activate(&mut self) -> Result<(), &'static str> {
        self.controller.send_command(CMD_ENABLE_AUX)?;
        self.controller.update_config(|config| (config | 0x02) & !0x20)?;
        self.controller.send_command(CMD_WRITE_AUX)?;
        self.controller.send_data(DEVICE_ENABLE_REPORTING)?;
        let answer = self.controller.receive()?;
        if answer != DEVICE_ACK {
            log::warn!("mouse: enable answered {:#04x}", answer);
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<(), &'static str> {
        self.decoder = MouseDecoder::new();
        Ok(())
    }

    fn deactivate(&mut self) {
        if let Err(err) = self.controller.send_command(CMD_DISABLE_AUX) {
            log::warn!("mouse: {}", err);
        }
    }

    fn into_handler(self: Box<Self>) -> Box<dyn InterruptHandler> {
        self
    }
}
