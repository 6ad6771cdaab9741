//! # Device Drivers
//!
//! A driver brings its device up in [`Driver::activate`] and then lives on as
//! the interrupt handler for its IRQ vector.
//!
//! | Driver   | IRQ | Module       |
//! |----------|-----|--------------|
//! | Keyboard | 1   | [`keyboard`] |
//! | Mouse    | 12  | [`mouse`]    |
//!
//! Devices on the PCI bus are enumerated by [`pci`] and recorded here; none
//! of them has a driver yet.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::config::MAX_DRIVERS;
use crate::interrupts::{HandlerToken, InterruptHandler, InterruptManager, PicPair};
use pci::{ConfigSpace, PciDevice};

pub mod keyboard;
pub mod mouse;
pub mod pci;
pub mod ps2;

pub trait Driver: Send {
    fn name(&self) -> &'static str;

    /// Brings the device up.
    fn activate(&mut self) -> Result<(), &'static str>;

    /// Returns the device to a known state.
    fn reset(&mut self) -> Result<(), &'static str> {
        Ok(())
    }

    /// Stops the device from raising interrupts.
    fn deactivate(&mut self) {}

    /// Turns the driver into the handler for its vector.
    fn into_handler(self: Box<Self>) -> Box<dyn InterruptHandler>;
}

/// Ordered set of drivers brought up together at boot.
pub struct DriverManager {
    drivers: Vec<Box<dyn Driver>>,
    pci_devices: Vec<PciDevice>,
}

impl DriverManager {
    pub const fn new() -> Self {
        Self { drivers: Vec::new(), pci_devices: Vec::new() }
    }

    pub fn add_driver(&mut self, driver: Box<dyn Driver>) -> Result<(), &'static str> {
        if self.drivers.len() >= MAX_DRIVERS {
            return Err("driver table is full");
        }
        self.drivers.push(driver);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Scans the PCI bus and records every function found. Returns how many
    /// there are.
    pub fn enumerate_pci(&mut self, config: &mut impl ConfigSpace) -> usize {
        self.pci_devices = pci::scan(config);
        for device in &self.pci_devices {
            log::info!("pci {}", device);
        }
        self.pci_devices.len()
    }

    pub fn pci_devices(&self) -> &[PciDevice] {
        &self.pci_devices
    }

    /// Activates every driver in insertion order. Drivers that fail are
    /// deactivated and dropped; the number still present is returned.
    pub fn activate_all(&mut self) -> usize {
        self.drivers.retain_mut(|driver| match driver.activate() {
            Ok(()) => {
                log::info!("driver '{}' active", driver.name());
                true
            }
            Err(err) => {
                log::error!("driver '{}' failed to activate: {}", driver.name(), err);
                driver.deactivate();
                false
            }
        });
        self.drivers.len()
    }

    /// Resets every driver, stopping at the first failure.
    pub fn reset_all(&mut self) -> Result<(), &'static str> {
        self.drivers.iter_mut().try_for_each(|driver| driver.reset())
    }

    /// Hands every driver to `manager` as the handler for its vector.
    pub fn register_all<P: PicPair>(self, manager: &mut InterruptManager<P>) -> Vec<HandlerToken> {
        self.drivers
            .into_iter()
            .map(|driver| manager.register(driver.into_handler()))
            .collect()
    }
}

impl Default for DriverManager {
    fn default() -> Self {
        Self::new()
    }
}
