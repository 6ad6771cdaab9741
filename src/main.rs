#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
extern crate rlibc;

#[cfg(target_os = "none")]
mod boot {
    use bootloader_api::config::BootloaderConfig;
    use bootloader_api::{entry_point, BootInfo};
    use core::panic::PanicInfo;

    use tinykern::config::{BOOT_STACK_SIZE, LOG_LEVEL};
    use tinykern::{arch, kernel, logging, memory, serial, serial_println};

    pub static BOOTLOADER_CONFIG: BootloaderConfig = {
        let mut config = BootloaderConfig::new_default();
        config.kernel_stack_size = BOOT_STACK_SIZE;
        config
    };

    entry_point!(kernel_main, config = &BOOTLOADER_CONFIG);

    fn kernel_main(boot_info: &'static mut BootInfo) -> ! {
        serial::init();
        if let Err(e) = logging::init(LOG_LEVEL) {
            serial_println!("logger: {}", e);
        }
        log::info!(
            "tinykern booting, {} KiB usable memory",
            memory::usable_memory(&boot_info.memory_regions) / 1024
        );

        if let Err(e) = kernel::init_kernel() {
            log::error!("kernel initialization failed: {}", e);
            arch::halt_loop();
        }

        // The first timer tick parks this context for good.
        arch::halt_loop()
    }

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        arch::disable_interrupts();
        log::error!("{}", info);
        arch::halt_loop()
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    eprintln!("tinykern runs on bare metal; build it for x86_64-unknown-none");
}
