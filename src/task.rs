//! Preemptive Task Scheduling
//!
//! Every task owns a kernel stack and a saved [`CpuState`]. The timer
//! interrupt hands the interrupted state to [`TaskManager::schedule`], which
//! parks it in the running task and returns the next task's state for the
//! entry stub to resume.
//!
//! # Rotation
//! 1. Before the first tick nothing is "current"; the interrupted boot
//!    context is parked in a separate slot and never resumed.
//! 2. The first tick resumes task 1 (task 0 when it is alone).
//! 3. Each later tick advances by one, wrapping: T1, T2, ..., Tn-1, T0, T1, ...

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use crate::config::{MAX_TASKS, TASK_STACK_SIZE};
use crate::interrupts::frame::{CpuState, RFLAGS_IF, RFLAGS_RESERVED};
use crate::memory::allocators::align_down;

/// Task entry point. Tasks never return.
pub type TaskEntry = extern "C" fn() -> !;

/// Segments a task runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSelectors {
    pub code: u16,
    pub stack: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    CapacityExceeded,
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::CapacityExceeded => f.write_str("task table is full"),
        }
    }
}

pub struct Task {
    name: &'static str,
    // Only ever touched by the processor while the task runs.
    stack: Box<[u8]>,
    state: CpuState,
}

impl Task {
    pub fn new(name: &'static str, entry: TaskEntry, selectors: SegmentSelectors) -> Self {
        Self::with_stack_size(name, entry, selectors, TASK_STACK_SIZE)
    }

    /// A task that starts at `entry` with zeroed registers, interrupts
    /// enabled and `rsp` just below the 16-byte aligned top of a fresh stack,
    /// as if `entry` had been called.
    pub fn with_stack_size(
        name: &'static str,
        entry: TaskEntry,
        selectors: SegmentSelectors,
        stack_size: usize,
    ) -> Self {
        let stack = vec![0u8; stack_size].into_boxed_slice();
        let top = stack.as_ptr() as usize + stack.len();

        let state = CpuState {
            rip: entry as usize as u64,
            cs: u64::from(selectors.code),
            rflags: RFLAGS_IF | RFLAGS_RESERVED,
            rsp: (align_down(top, 16) - 8) as u64,
            ss: u64::from(selectors.stack),
            ..CpuState::zeroed()
        };

        Self { name, stack, state }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// State the task resumes with.
    pub fn cpu_state(&self) -> &CpuState {
        &self.state
    }

    fn save_state(&mut self, state: CpuState) {
        self.state = state;
    }

    /// Lowest and one-past-highest address of the task stack.
    pub fn stack_bounds(&self) -> (u64, u64) {
        let bottom = self.stack.as_ptr() as u64;
        (bottom, bottom + self.stack.len() as u64)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("rip", &format_args!("{:#x}", self.state.rip))
            .field("rsp", &format_args!("{:#x}", self.state.rsp))
            .finish()
    }
}

/// Round-robin schedule over a bounded table of tasks.
pub struct TaskManager {
    tasks: Vec<Task>,
    capacity: usize,
    /// `None` until the first switch.
    current: Option<usize>,
    boot_state: Option<CpuState>,
}

impl TaskManager {
    pub const fn new() -> Self {
        Self::with_capacity(MAX_TASKS)
    }

    pub const fn with_capacity(capacity: usize) -> Self {
        Self {
            tasks: Vec::new(),
            capacity,
            current: None,
            boot_state: None,
        }
    }

    /// Appends `task` and returns its index.
    pub fn add_task(&mut self, task: Task) -> Result<usize, TaskError> {
        if self.tasks.len() >= self.capacity {
            log::warn!("task table full ({}), '{}' rejected", self.capacity, task.name());
            return Err(TaskError::CapacityExceeded);
        }
        log::info!("task {} '{}' added", self.tasks.len(), task.name());
        self.tasks.push(task);
        Ok(self.tasks.len() - 1)
    }

    /// Saves `current` into the running task (or the boot slot before the
    /// first switch) and returns the state of the next task in turn.
    ///
    /// Without tasks `current` comes straight back.
    pub fn schedule(&mut self, current: CpuState) -> CpuState {
        let count = self.tasks.len();
        if count == 0 {
            return current;
        }

        let position = match self.current {
            Some(index) => {
                self.tasks[index].save_state(current);
                index
            }
            None => {
                self.boot_state = Some(current);
                0
            }
        };

        let next = (position + 1) % count;
        self.current = Some(next);
        self.tasks[next].state
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub fn task(&self, index: usize) -> Option<&Task> {
        self.tasks.get(index)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Context that was running when the first switch happened.
    pub fn boot_state(&self) -> Option<&CpuState> {
        self.boot_state.as_ref()
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}
