//! # Programmable Interrupt Controller (8259 PIC)
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐
//! │   PIC 1     │     │   PIC 2     │
//! │  (Primary)  │◀────│ (Secondary) │
//! │ IRQ 0-7     │     │ IRQ 8-15    │
//! └─────────────┘     └─────────────┘
//!       │ cascade on IRQ2
//!       ▼
//!     CPU
//! ```
//!
//! The pair is remapped so IRQ 0-15 land on `offset..offset + 16`, clear of
//! the exception vectors.
//!
//! | IRQ | Vector (offset 0x20) | Device   |
//! |-----|----------------------|----------|
//! | 0   | 0x20                 | Timer    |
//! | 1   | 0x21                 | Keyboard |
//! | 12  | 0x2C                 | Mouse    |

use pic8259::ChainedPics;
use x86_64::instructions::port::Port;

pub const PIC_1_COMMAND: u16 = 0x20;
pub const PIC_2_COMMAND: u16 = 0xA0;

/// Non-specific end of interrupt.
pub const PIC_EOI: u8 = 0x20;

/// IRQ lines across both chips.
pub const IRQ_LINES: u8 = 16;

/// Lines per chip. Lines at or above this are on the secondary.
pub const LINES_PER_CHIP: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chip {
    Primary,
    Secondary,
}

/// IRQ lines the kernel cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IrqLine {
    Timer = 0,
    Keyboard = 1,
    Mouse = 12,
}

impl IrqLine {
    /// Vector this line arrives on once the PICs are remapped to `offset`.
    pub const fn vector(self, offset: u8) -> u8 {
        offset + self as u8
    }
}

/// The two cascaded controllers.
pub trait PicPair: Send {
    /// Remaps the pair to `offset` / `offset + 8`, wires the cascade and
    /// unmasks every line.
    ///
    /// # Safety
    ///
    /// Talks to the hardware; callers must hold interrupts masked.
    unsafe fn initialize(&mut self, offset: u8);

    /// Writes `command` to the command port of `chip`.
    fn send_command(&mut self, chip: Chip, command: u8);
}

/// The legacy PIC pair at its fixed ports.
pub struct Pic8259Pair {
    primary_command: Port<u8>,
    secondary_command: Port<u8>,
}

impl Pic8259Pair {
    pub const fn new() -> Self {
        Self {
            primary_command: Port::new(PIC_1_COMMAND),
            secondary_command: Port::new(PIC_2_COMMAND),
        }
    }
}

impl Default for Pic8259Pair {
    fn default() -> Self {
        Self::new()
    }
}

impl PicPair for Pic8259Pair {
    unsafe fn initialize(&mut self, offset: u8) {
        let mut pics = ChainedPics::new(offset, offset + LINES_PER_CHIP);
        pics.initialize();
        pics.write_masks(0, 0);
    }

    fn send_command(&mut self, chip: Chip, command: u8) {
        // SAFETY: both ports belong to the PIC pair and accept any command byte.
        unsafe {
            match chip {
                Chip::Primary => self.primary_command.write(command),
                Chip::Secondary => self.secondary_command.write(command),
            }
        }
    }
}
