//! 8042 PS/2 controller access shared by the keyboard and mouse drivers.

use x86_64::instructions::port::Port;

pub const DATA_PORT: u16 = 0x60;
pub const COMMAND_PORT: u16 = 0x64;

/// Output buffer holds a byte for us.
pub const STATUS_OUTPUT_FULL: u8 = 0x01;
/// Input buffer still holds our previous byte.
pub const STATUS_INPUT_FULL: u8 = 0x02;
/// The byte in the output buffer came from the auxiliary (mouse) port.
pub const STATUS_AUX_DATA: u8 = 0x20;

pub const CMD_READ_CONFIG: u8 = 0x20;
pub const CMD_WRITE_CONFIG: u8 = 0x60;
pub const CMD_DISABLE_AUX: u8 = 0xA7;
pub const CMD_ENABLE_AUX: u8 = 0xA8;
pub const CMD_DISABLE_KEYBOARD: u8 = 0xAD;
pub const CMD_ENABLE_KEYBOARD: u8 = 0xAE;
pub const CMD_WRITE_AUX: u8 = 0xD4;

/// Device command: start sending data (scancodes or movement packets).
pub const DEVICE_ENABLE_REPORTING: u8 = 0xF4;
pub const DEVICE_ACK: u8 = 0xFA;

const SPIN_LIMIT: u32 = 100_000;

/// Raw access to the controller ports, plus the handshakes built on it.
pub trait Ps2Controller: Send {
    fn status(&mut self) -> u8;
    fn read_data(&mut self) -> u8;
    fn write_command(&mut self, command: u8);
    fn write_data(&mut self, data: u8);

    fn wait_writable(&mut self) -> Result<(), &'static str> {
        for _ in 0..SPIN_LIMIT {
            if self.status() & STATUS_INPUT_FULL == 0 {
                return Ok(());
            }
            core::hint::spin_loop();
        }
        Err("PS/2 controller input buffer stuck full")
    }

    fn wait_readable(&mut self) -> Result<(), &'static str> {
        for _ in 0..SPIN_LIMIT {
            if self.status() & STATUS_OUTPUT_FULL != 0 {
                return Ok(());
            }
            core::hint::spin_loop();
        }
        Err("PS/2 controller did not answer")
    }

    fn send_command(&mut self, command: u8) -> Result<(), &'static str> {
        self.wait_writable()?;
        self.write_command(command);
        Ok(())
    }

    fn send_data(&mut self, data: u8) -> Result<(), &'static str> {
        self.wait_writable()?;
        self.write_data(data);
        Ok(())
    }

    fn receive(&mut self) -> Result<u8, &'static str> {
        self.wait_readable()?;
        Ok(self.read_data())
    }

    /// Discards whatever is pending in the output buffer.
    fn flush_output(&mut self) {
        for _ in 0..SPIN_LIMIT {
            if self.status() & STATUS_OUTPUT_FULL == 0 {
                return;
            }
            self.read_data();
        }
    }

    /// Rewrites the controller configuration byte through `update` and
    /// returns the value written.
    fn update_config(&mut self, update: fn(u8) -> u8) -> Result<u8, &'static str> {
        self.send_command(CMD_READ_CONFIG)?;
        let config = update(self.receive()?);
        self.send_command(CMD_WRITE_CONFIG)?;
        self.send_data(config)?;
        Ok(config)
    }
}

/// The controller behind ports 0x60 and 0x64.
pub struct PortController {
    data: Port<u8>,
    command: Port<u8>,
}

impl PortController {
    pub const fn new() -> Self {
        Self {
            data: Port::new(DATA_PORT),
            command: Port::new(COMMAND_PORT),
        }
    }
}

impl Default for PortController {
    fn default() -> Self {
        Self::new()
    }
}

impl Ps2Controller for PortController {
    fn status(&mut self) -> u8 {
        // SAFETY: reading the status register has no side effects.
        unsafe { self.command.read() }
    }

    fn read_data(&mut self) -> u8 {
        // SAFETY: 0x60 is owned by the PS/2 drivers.
        unsafe { self.data.read() }
    }

    fn write_command(&mut self, command: u8) {
        // SAFETY: as above.
        unsafe { self.command.write(command) }
    }

    fn write_data(&mut self, data: u8) {
        // SAFETY: as above.
        unsafe { self.data.write(data) }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use alloc::collections::VecDeque;
    use alloc::sync::Arc;
    use alloc::vec::Vec;
    use spin::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum Write {
        Command(u8),
        Data(u8),
    }

    #[derive(Default)]
    pub(crate) struct State {
        pub output: VecDeque<u8>,
        pub aux: bool,
        pub writes: Vec<Write>,
    }

    /// Scripted controller: serves queued output bytes, records writes.
    /// Reading the config byte answers with `config` at that point.
    #[derive(Clone, Default)]
    pub(crate) struct FakeController {
        pub state: Arc<Mutex<State>>,
        pub config: u8,
    }

    impl FakeController {
        pub(crate) fn with_config(config: u8) -> Self {
            Self { config, ..Self::default() }
        }

        pub(crate) fn push_output(&self, byte: u8, aux: bool) {
            let mut state = self.state.lock();
            state.output.push_back(byte);
            state.aux = aux;
        }

        pub(crate) fn writes(&self) -> Vec<Write> {
            self.state.lock().writes.clone()
        }
    }

    impl Ps2Controller for FakeController {
        fn status(&mut self) -> u8 {
            let state = self.state.lock();
            let mut status = 0;
            if !state.output.is_empty() {
                status |= STATUS_OUTPUT_FULL;
                if state.aux {
                    status |= STATUS_AUX_DATA;
                }
            }
            status
        }

        fn read_data(&mut self) -> u8 {
            self.state.lock().output.pop_front().unwrap_or(0)
        }

        fn write_command(&mut self, command: u8) {
            let mut state = self.state.lock();
            state.writes.push(Write::Command(command));
            if command == CMD_READ_CONFIG {
                state.output.push_back(self.config);
            }
        }

        fn write_data(&mut self, data: u8) {
            let mut state = self.state.lock();
            state.writes.push(Write::Data(data));
            if data == DEVICE_ENABLE_REPORTING {
                state.output.push_back(DEVICE_ACK);
            }
        }
    }
}
