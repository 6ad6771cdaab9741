/// Kernel initialization phases
use crate::kernel::status::{register_component, update_component_status, InitStatus};

/// Runs one boot phase, recording its progress and outcome.
pub fn init_phase<T>(
    name: &'static str,
    init_fn: impl FnOnce() -> Result<T, &'static str>,
) -> Result<T, &'static str> {
    register_component(name);
    update_component_status(name, InitStatus::InProgress);
    log::info!("initializing {}", name);

    match init_fn() {
        Ok(value) => {
            update_component_status(name, InitStatus::Completed);
            log::info!("{} ready", name);
            Ok(value)
        }
        Err(e) => {
            update_component_status(name, InitStatus::Failed(e));
            log::error!("{} failed: {}", name, e);
            Err(e)
        }
    }
}

/// Initialize kernel in proper order with error handling.
///
/// On success interrupts are live and the first timer tick switches to the
/// first task; the caller only has to idle.
#[cfg(target_os = "none")]
pub fn init_kernel() -> Result<(), &'static str> {
    use crate::config::HARDWARE_INTERRUPT_OFFSET;
    use crate::drivers::keyboard::{KeyboardDriver, SCANCODES};
    use crate::drivers::mouse::{MouseDriver, CURSOR};
    use crate::drivers::pci::PortConfigSpace;
    use crate::drivers::ps2::PortController;
    use crate::drivers::DriverManager;
    use crate::interrupts::{gdt, InterruptManager, Pic8259Pair, INTERRUPTS};
    use alloc::boxed::Box;

    crate::arch::disable_interrupts();

    init_phase("Heap", || crate::memory::init_heap().map_err(|e| e.as_str()))?;
    let selectors = init_phase("Descriptor Tables", || Ok(gdt::init()))?;
    let tasks = init_phase("Tasks", || super::tasks::spawn_demo_tasks(selectors))?;

    let drivers = init_phase("Drivers", || {
        let mut drivers = DriverManager::new();
        let found = drivers.enumerate_pci(&mut PortConfigSpace::new());
        log::info!("{} pci functions found", found);
        drivers.add_driver(Box::new(KeyboardDriver::new(
            HARDWARE_INTERRUPT_OFFSET,
            PortController::new(),
            &SCANCODES,
        )))?;
        drivers.add_driver(Box::new(MouseDriver::new(
            HARDWARE_INTERRUPT_OFFSET,
            PortController::new(),
            &CURSOR,
        )))?;
        drivers.reset_all()?;
        drivers.activate_all();
        Ok(drivers)
    })?;

    let manager = init_phase("Interrupts", move || {
        let mut manager = InterruptManager::new(HARDWARE_INTERRUPT_OFFSET, Pic8259Pair::new(), tasks)
            .map_err(|_| "invalid irq offset")?;
        // SAFETY: interrupts are masked and the GDT above is loaded.
        unsafe { manager.install(selectors.code) };
        let tokens = drivers.register_all(&mut manager);
        log::debug!("{} driver handlers registered", tokens.len());
        Ok(manager)
    })?;

    let heap = crate::memory::heap_stats();
    log::info!("heap: {} of {} bytes free in {} chunks", heap.free, heap.arena_size, heap.chunks);
    crate::kernel::status::log_summary();

    // Nothing below may take a lock the tasks or handlers also take.
    if INTERRUPTS.activate(manager).is_some() {
        log::warn!("replaced a previously live interrupt manager");
    }
    Ok(())
}
