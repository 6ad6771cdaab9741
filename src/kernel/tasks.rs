//! Tasks started at boot.

use crate::arch;
use crate::drivers::keyboard::{ScancodeDecoder, SCANCODES};
use crate::drivers::mouse::CURSOR;
use crate::interrupts::INTERRUPTS;
use crate::task::{SegmentSelectors, Task, TaskManager};

/// Timer interrupts between two heartbeat lines.
const HEARTBEAT_PERIOD: u32 = 500;

pub fn spawn_demo_tasks(selectors: SegmentSelectors) -> Result<TaskManager, &'static str> {
    let mut tasks = TaskManager::new();
    tasks
        .add_task(Task::new("console", console_task, selectors))
        .map_err(|_| "cannot add console task")?;
    tasks
        .add_task(Task::new("heartbeat", heartbeat_task, selectors))
        .map_err(|_| "cannot add heartbeat task")?;
    Ok(tasks)
}

/// Echoes typed characters and reports mouse movement.
extern "C" fn console_task() -> ! {
    let mut decoder = ScancodeDecoder::new();
    let mut last_position = CURSOR.position();
    loop {
        while let Some(scancode) = SCANCODES.pop() {
            if let Some(key) = decoder.process_scancode(scancode) {
                crate::serial_print!("{}", key.character);
            }
        }

        let position = CURSOR.position();
        if position != last_position {
            log::debug!("mouse at {:?}, buttons {:#05b}", position, CURSOR.buttons());
            last_position = position;
        }
        arch::halt();
    }
}

extern "C" fn heartbeat_task() -> ! {
    let mut beats: u64 = 0;
    loop {
        for _ in 0..HEARTBEAT_PERIOD {
            arch::halt();
        }
        beats += 1;
        if let Some(stats) = INTERRUPTS.with(|manager| manager.stats()) {
            log::info!(
                "heartbeat {}: {} ticks, {} unhandled interrupts",
                beats,
                stats.ticks,
                stats.unhandled
            );
        }
    }
}
