//! Per-vector handler registry and the dispatch routine.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use super::frame::CpuState;
use super::idt::{EXCEPTION_COUNT, VECTOR_COUNT};
use super::pic::{Chip, PicPair, IRQ_LINES, LINES_PER_CHIP, PIC_EOI};
use crate::task::TaskManager;

/// Lowest remapped IRQ offset: everything below belongs to exceptions.
pub const MIN_IRQ_OFFSET: u8 = 0x20;

/// Highest remapped IRQ offset that still fits all sixteen lines.
pub const MAX_IRQ_OFFSET: u8 = (VECTOR_COUNT - IRQ_LINES as usize) as u8;

/// Something that services one interrupt vector.
///
/// `handle` gets the interrupted context and returns the context to resume,
/// usually the same one.
pub trait InterruptHandler: Send {
    fn vector(&self) -> u8;
    fn handle(&mut self, state: CpuState) -> CpuState;
}

/// Proof of one registration, needed to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerToken {
    vector: u8,
    id: u64,
}

impl HandlerToken {
    pub fn vector(&self) -> u8 {
        self.vector
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptError {
    /// The IRQ offset overlaps exceptions or runs past vector 0xFF.
    InvalidOffset(u8),
}

impl fmt::Display for InterruptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterruptError::InvalidOffset(offset) => write!(
                f,
                "irq offset {:#04x} outside {:#04x}..={:#04x}",
                offset, MIN_IRQ_OFFSET, MAX_IRQ_OFFSET
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub ticks: u64,
    pub unhandled: u64,
    pub last_unhandled: Option<u8>,
}

struct Registered {
    id: u64,
    handler: Box<dyn InterruptHandler>,
}

// Tokens stay unique across manager instances so a stale token can never
// remove a handler that belongs to a newer manager.
static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Routes every vector to its registered handler, drives the scheduler from
/// the timer vector and acknowledges IRQs at the PIC pair.
pub struct InterruptManager<P: PicPair> {
    offset: u8,
    handlers: Box<[Option<Registered>]>,
    pics: P,
    tasks: TaskManager,
    stats: DispatchStats,
}

impl<P: PicPair> InterruptManager<P> {
    pub fn new(offset: u8, pics: P, tasks: TaskManager) -> Result<Self, InterruptError> {
        if !(MIN_IRQ_OFFSET..=MAX_IRQ_OFFSET).contains(&offset) {
            return Err(InterruptError::InvalidOffset(offset));
        }
        let handlers: Vec<Option<Registered>> = (0..VECTOR_COUNT).map(|_| None).collect();
        Ok(Self {
            offset,
            handlers: handlers.into_boxed_slice(),
            pics,
            tasks,
            stats: DispatchStats::default(),
        })
    }

    pub fn offset(&self) -> u8 {
        self.offset
    }

    /// IRQ0, the scheduler tick.
    pub fn timer_vector(&self) -> u8 {
        self.offset
    }

    /// Builds and loads the gate table and remaps the PIC pair.
    ///
    /// # Safety
    ///
    /// Interrupts must be masked and `code_selector` must name the loaded
    /// kernel code segment.
    #[cfg(target_os = "none")]
    pub unsafe fn install(&mut self, code_selector: u16) {
        let table = super::idt::build(self.offset, code_selector, &super::entry::StubEntryPoints);
        self.pics.initialize(self.offset);
        super::idt::load(table);
        log::info!(
            "gate table loaded, irqs at {:#04x}..={:#04x}",
            self.offset,
            self.offset + (IRQ_LINES - 1)
        );
    }

    /// Routes `handler.vector()` to `handler`. A previous handler for the
    /// same vector is dropped.
    pub fn register(&mut self, handler: Box<dyn InterruptHandler>) -> HandlerToken {
        let vector = handler.vector();
        let id = NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed);
        let previous = self.handlers[usize::from(vector)].replace(Registered { id, handler });
        if previous.is_some() {
            log::warn!("interrupt {:#04x}: replacing existing handler", vector);
        } else {
            log::debug!("interrupt {:#04x}: handler registered", vector);
        }
        HandlerToken { vector, id }
    }

    /// Removes the registration behind `token`. Does nothing when the vector
    /// has since been taken over by another handler.
    pub fn deregister(&mut self, token: HandlerToken) -> Option<Box<dyn InterruptHandler>> {
        let slot = &mut self.handlers[usize::from(token.vector)];
        if slot.as_ref().is_some_and(|registered| registered.id == token.id) {
            slot.take().map(|registered| registered.handler)
        } else {
            None
        }
    }

    pub fn is_registered(&self, vector: u8) -> bool {
        self.handlers[usize::from(vector)].is_some()
    }

    pub fn tasks(&self) -> &TaskManager {
        &self.tasks
    }

    pub fn tasks_mut(&mut self) -> &mut TaskManager {
        &mut self.tasks
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Services `vector` for the interrupted context `state` and returns the
    /// context to resume.
    pub fn dispatch(&mut self, vector: u8, mut state: CpuState) -> CpuState {
        let timer = vector == self.timer_vector();

        match self.handlers[usize::from(vector)].as_mut() {
            Some(registered) => state = registered.handler.handle(state),
            None if !timer => self.record_unhandled(vector, &state),
            None => {}
        }

        if timer {
            self.stats.ticks += 1;
            state = self.tasks.schedule(state);
        }

        if let Some(line) = vector.checked_sub(self.offset).filter(|line| *line < IRQ_LINES) {
            self.pics.send_command(Chip::Primary, PIC_EOI);
            if line >= LINES_PER_CHIP {
                self.pics.send_command(Chip::Secondary, PIC_EOI);
            }
        }

        state
    }

    fn record_unhandled(&mut self, vector: u8, state: &CpuState) {
        self.stats.unhandled += 1;
        self.stats.last_unhandled = Some(vector);
        match exception_name(vector) {
            Some(name) => log::error!(
                "unhandled exception {:#04x} ({}), error code {:#x}, rip {:#x}",
                vector,
                name,
                state.error_code,
                state.rip
            ),
            None => log::warn!("unhandled interrupt {:#04x}", vector),
        }
    }
}

pub fn exception_name(vector: u8) -> Option<&'static str> {
    const NAMES: [&str; EXCEPTION_COUNT as usize] = [
        "divide error",
        "debug",
        "non-maskable interrupt",
        "breakpoint",
        "overflow",
        "bound range exceeded",
        "invalid opcode",
        "device not available",
        "double fault",
        "coprocessor segment overrun",
        "invalid tss",
        "segment not present",
        "stack-segment fault",
        "general protection fault",
        "page fault",
        "reserved",
        "x87 floating-point exception",
        "alignment check",
        "machine check",
        "simd floating-point exception",
    ];
    NAMES.get(usize::from(vector)).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupts::pic::testing::RecordingPics;
    use crate::task::{SegmentSelectors, Task};
    use alloc::sync::Arc;
    use spin::Mutex;

    const OFFSET: u8 = 0x20;

    struct Marker {
        vector: u8,
        rax: u64,
        calls: Arc<Mutex<u32>>,
    }

    impl Marker {
        fn new(vector: u8, rax: u64) -> (Box<Self>, Arc<Mutex<u32>>) {
            let calls = Arc::new(Mutex::new(0));
            (Box::new(Self { vector, rax, calls: calls.clone() }), calls)
        }
    }

    impl InterruptHandler for Marker {
        fn vector(&self) -> u8 {
            self.vector
        }

        fn handle(&mut self, mut state: CpuState) -> CpuState {
            *self.calls.lock() += 1;
            state.rax = self.rax;
            state
        }
    }

    extern "C" fn spin() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    fn manager() -> (InterruptManager<RecordingPics>, RecordingPics) {
        let pics = RecordingPics::default();
        let manager = InterruptManager::new(OFFSET, pics.clone(), TaskManager::new()).unwrap();
        (manager, pics)
    }

    fn snapshot(rax: u64) -> CpuState {
        CpuState { rax, ..CpuState::zeroed() }
    }

    #[test]
    fn offset_must_clear_exceptions_and_fit_sixteen_lines() {
        for offset in [0x00, 0x13, 0x1F, 0xF1, 0xFF] {
            let result = InterruptManager::new(offset, RecordingPics::default(), TaskManager::new());
            assert_eq!(result.err(), Some(InterruptError::InvalidOffset(offset)));
        }
        for offset in [0x20, 0x80, 0xF0] {
            assert!(InterruptManager::new(offset, RecordingPics::default(), TaskManager::new()).is_ok());
        }
    }

    #[test]
    fn registered_handler_sees_and_rewrites_the_state() {
        let (mut manager, pics) = manager();
        let (handler, calls) = Marker::new(0x21, 7);
        manager.register(handler);

        let out = manager.dispatch(0x21, snapshot(1));
        assert_eq!(out.rax, 7);
        assert_eq!(*calls.lock(), 1);
        assert_eq!(pics.take(), [(Chip::Primary, PIC_EOI)]);
    }

    #[test]
    fn unhandled_vectors_are_counted_and_returned_unchanged() {
        let (mut manager, pics) = manager();
        let state = snapshot(5);

        assert_eq!(manager.dispatch(0x80, state), state);
        assert_eq!(manager.dispatch(0x0D, state), state);
        let stats = manager.stats();
        assert_eq!(stats.unhandled, 2);
        assert_eq!(stats.last_unhandled, Some(0x0D));
        assert!(pics.take().is_empty(), "only remapped irqs are acknowledged");
    }

    #[test]
    fn secondary_lines_acknowledge_both_chips() {
        let (mut manager, pics) = manager();
        manager.dispatch(OFFSET + 7, snapshot(0));
        assert_eq!(pics.take(), [(Chip::Primary, PIC_EOI)]);

        manager.dispatch(OFFSET + 8, snapshot(0));
        assert_eq!(pics.take(), [(Chip::Primary, PIC_EOI), (Chip::Secondary, PIC_EOI)]);

        manager.dispatch(OFFSET + 15, snapshot(0));
        assert_eq!(pics.take(), [(Chip::Primary, PIC_EOI), (Chip::Secondary, PIC_EOI)]);

        manager.dispatch(OFFSET + 16, snapshot(0));
        assert!(pics.take().is_empty());
    }

    #[test]
    fn timer_without_tasks_is_a_quiet_no_op() {
        let (mut manager, pics) = manager();
        let state = snapshot(9);
        assert_eq!(manager.dispatch(OFFSET, state), state);
        assert_eq!(manager.stats().ticks, 1);
        assert_eq!(manager.stats().unhandled, 0);
        assert_eq!(pics.take(), [(Chip::Primary, PIC_EOI)]);
    }

    #[test]
    fn timer_switches_tasks_after_the_handler_ran() {
        let (mut manager, _pics) = manager();
        let selectors = SegmentSelectors { code: 0x08, stack: 0x10 };
        manager.tasks_mut().add_task(Task::with_stack_size("t0", spin, selectors, 512)).unwrap();
        manager.tasks_mut().add_task(Task::with_stack_size("t1", spin, selectors, 512)).unwrap();
        let t1 = *manager.tasks().task(1).unwrap().cpu_state();

        let (handler, calls) = Marker::new(OFFSET, 42);
        manager.register(handler);

        let out = manager.dispatch(OFFSET, snapshot(1));
        assert_eq!(out, t1);
        assert_eq!(*calls.lock(), 1);
        assert_eq!(manager.tasks().boot_state().map(|s| s.rax), Some(42));
    }

    #[test]
    fn last_registration_wins() {
        let (mut manager, _pics) = manager();
        let (first, first_calls) = Marker::new(0x2C, 1);
        let (second, second_calls) = Marker::new(0x2C, 2);
        let stale = manager.register(first);
        manager.register(second);

        assert_eq!(manager.dispatch(0x2C, snapshot(0)).rax, 2);
        assert_eq!(*first_calls.lock(), 0);
        assert_eq!(*second_calls.lock(), 1);

        assert!(manager.deregister(stale).is_none(), "stale token must not clear the slot");
        assert!(manager.is_registered(0x2C));
    }

    #[test]
    fn deregistered_vector_falls_back_to_unhandled() {
        let (mut manager, _pics) = manager();
        let (handler, calls) = Marker::new(0x21, 3);
        let token = manager.register(handler);

        assert_eq!(manager.deregister(token).map(|h| h.vector()), Some(0x21));
        assert!(manager.deregister(token).is_none());

        let state = snapshot(0);
        assert_eq!(manager.dispatch(0x21, state), state);
        assert_eq!(*calls.lock(), 0);
        assert_eq!(manager.stats().last_unhandled, Some(0x21));
    }

    #[test]
    fn exception_names_cover_the_exception_range() {
        assert_eq!(exception_name(0x0E), Some("page fault"));
        assert_eq!(exception_name(0x13), Some("simd floating-point exception"));
        assert_eq!(exception_name(0x14), None);
    }
}
