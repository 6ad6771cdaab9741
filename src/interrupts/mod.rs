//! # Interrupts
//!
//! ```text
//!  device ─▶ PIC pair ─▶ gate table ─▶ entry stub ─▶ INTERRUPTS.dispatch
//!                                                     │
//!                       handler registry ◀────────────┤
//!                       scheduler (timer vector) ◀────┤
//!                       EOI to the PIC pair ◀─────────┘
//! ```
//!
//! Exceptions 0x00..0x13 and the sixteen remapped IRQ lines get entry stubs;
//! all other vectors return immediately through the ignore stub.

pub mod frame;
pub mod gdt;
pub mod idt;
pub mod live;
pub mod manager;
pub mod pic;

#[cfg(target_os = "none")]
mod entry;

pub use frame::CpuState;
pub use live::{LiveSlot, Registration};
pub use manager::{DispatchStats, HandlerToken, InterruptError, InterruptHandler, InterruptManager};
pub use pic::{Chip, IrqLine, Pic8259Pair, PicPair};

pub type KernelInterruptManager = InterruptManager<Pic8259Pair>;

/// The manager every entry stub dispatches to.
pub static INTERRUPTS: LiveSlot<KernelInterruptManager> = LiveSlot::new();
