//! Compile-time kernel configuration.

use log::LevelFilter;

/// First vector used by remapped hardware IRQs. IRQ0 (the PIT) lands here and
/// doubles as the scheduler tick.
pub const HARDWARE_INTERRUPT_OFFSET: u8 = 0x20;

/// Size of the static heap arena handed to the memory manager.
pub const HEAP_SIZE: usize = 4 * 1024 * 1024;

/// Stack size of every kernel task.
pub const TASK_STACK_SIZE: usize = 16 * 1024;

/// Maximum number of tasks the scheduler accepts.
pub const MAX_TASKS: usize = 256;

/// Maximum number of drivers the driver manager accepts.
pub const MAX_DRIVERS: usize = 256;

/// Stack handed to `kernel_main` by the bootloader.
pub const BOOT_STACK_SIZE: u64 = 128 * 1024;

/// I/O base of the serial port used for the console and log output (COM1).
pub const SERIAL_PORT_BASE: u16 = 0x3F8;

/// Maximum level emitted by the serial logger.
pub const LOG_LEVEL: LevelFilter = LevelFilter::Info;
