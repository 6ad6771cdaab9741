//! Serial console on COM1.

use core::fmt;

#[cfg(target_os = "none")]
use spin::Mutex;
#[cfg(target_os = "none")]
use uart_16550::SerialPort;

#[cfg(target_os = "none")]
use crate::config::SERIAL_PORT_BASE;

#[cfg(target_os = "none")]
pub static SERIAL: Mutex<SerialPort> = Mutex::new(unsafe { SerialPort::new(SERIAL_PORT_BASE) });

/// Programs the UART (baud rate, FIFO, line control).
pub fn init() {
    #[cfg(target_os = "none")]
    SERIAL.lock().init();
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    #[cfg(target_os = "none")]
    {
        use core::fmt::Write;
        // Tasks print too; masking keeps the timer from preempting a holder
        // of the port lock and deadlocking the dispatch path.
        crate::arch::without_interrupts(|| {
            let _ = SERIAL.lock().write_fmt(args);
        });
    }
    #[cfg(not(target_os = "none"))]
    {
        ::std::eprint!("{}", args);
    }
}

#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::serial::_print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($($arg:tt)*) => {
        $crate::serial::_print(format_args!("{}\n", format_args!($($arg)*)))
    };
}
