//! Processor control used by the rest of the kernel.
//!
//! On bare metal these are the real instructions. Hosted builds (unit tests)
//! get no-op stand-ins so the dispatch and scheduling logic can run in a
//! normal process.

/// Unmasks maskable interrupts (`sti`).
#[inline]
pub fn enable_interrupts() {
    #[cfg(target_os = "none")]
    x86_64::instructions::interrupts::enable();
}

/// Masks maskable interrupts (`cli`).
#[inline]
pub fn disable_interrupts() {
    #[cfg(target_os = "none")]
    x86_64::instructions::interrupts::disable();
}

/// Runs `f` with interrupts masked, restoring the previous state afterwards.
#[inline]
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    #[cfg(target_os = "none")]
    {
        x86_64::instructions::interrupts::without_interrupts(f)
    }
    #[cfg(not(target_os = "none"))]
    {
        f()
    }
}

/// Parks the processor until the next interrupt.
#[inline]
pub fn halt() {
    #[cfg(target_os = "none")]
    x86_64::instructions::hlt();
    #[cfg(not(target_os = "none"))]
    core::hint::spin_loop();
}

pub fn halt_loop() -> ! {
    loop {
        halt();
    }
}
