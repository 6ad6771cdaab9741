//! The single interrupt manager the entry stubs dispatch to.

use alloc::boxed::Box;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

use super::frame::CpuState;
use super::manager::{HandlerToken, InterruptHandler, InterruptManager};
use super::pic::PicPair;
use crate::arch;

/// Holds at most one live instance. Activating a new one retires the old.
pub struct LiveSlot<T> {
    inner: Mutex<Option<T>>,
    missed: AtomicU64,
}

impl<T> LiveSlot<T> {
    pub const fn new() -> Self {
        Self { inner: Mutex::new(None), missed: AtomicU64::new(0) }
    }

    /// Makes `instance` live and unmasks interrupts. The previously live
    /// instance, if any, is deactivated and handed back.
    pub fn activate(&self, instance: T) -> Option<T> {
        let previous = self.deactivate();
        *self.inner.lock() = Some(instance);
        arch::enable_interrupts();
        previous
    }

    /// Masks interrupts and takes the live instance out.
    pub fn deactivate(&self) -> Option<T> {
        arch::disable_interrupts();
        self.inner.lock().take()
    }

    pub fn is_live(&self) -> bool {
        arch::without_interrupts(|| self.inner.lock().is_some())
    }

    /// Runs `f` on the live instance with interrupts masked.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        arch::without_interrupts(|| self.inner.lock().as_mut().map(f))
    }

    /// Dispatches that found the slot locked, see [`LiveSlot::dispatch`].
    pub fn missed_dispatches(&self) -> u64 {
        self.missed.load(Ordering::Relaxed)
    }
}

impl<T> Default for LiveSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PicPair> LiveSlot<InterruptManager<P>> {
    /// Entry point for the stubs. Without a live manager the interrupted
    /// context resumes untouched.
    ///
    /// The slot is only ever locked here when an exception fires inside
    /// dispatch itself. Such a vector is counted, logged and resumed without
    /// service: no EOI is sent, so an IRQ line caught this way stays blocked
    /// at the PIC, and a faulting instruction faults again. Same gap as an
    /// unhandled exception.
    pub fn dispatch(&self, vector: u8, state: CpuState) -> CpuState {
        match self.inner.try_lock() {
            Some(mut live) => match live.as_mut() {
                Some(manager) => manager.dispatch(vector, state),
                None => state,
            },
            None => {
                self.missed.fetch_add(1, Ordering::Relaxed);
                log::error!("interrupt {:#04x} raised during dispatch, resuming unserviced", vector);
                state
            }
        }
    }

    /// Registers `handler` with the live manager. The returned guard removes
    /// it again when dropped.
    pub fn register(&self, handler: Box<dyn InterruptHandler>) -> Option<Registration<'_, P>> {
        let token = self.with(|manager| manager.register(handler))?;
        Some(Registration { slot: self, token })
    }
}

/// Scoped handler registration, see [`LiveSlot::register`].
#[must_use = "dropping the registration removes the handler"]
pub struct Registration<'a, P: PicPair> {
    slot: &'a LiveSlot<InterruptManager<P>>,
    token: HandlerToken,
}

impl<P: PicPair> Registration<'_, P> {
    pub fn vector(&self) -> u8 {
        self.token.vector()
    }
}

impl<P: PicPair> Drop for Registration<'_, P> {
    fn drop(&mut self) {
        let token = self.token;
        self.slot.with(|manager| manager.deregister(token));
    }
}
