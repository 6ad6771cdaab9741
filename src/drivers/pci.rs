//! PCI bus enumeration through configuration mechanism #1.
//!
//! ```text
//!  0xCF8  ◀── 1 << 31 | bus << 16 | device << 11 | function << 8 | offset
//!  0xCFC  ──▶ the addressed configuration dword
//! ```

use alloc::vec::Vec;
use core::fmt;

use x86_64::instructions::port::Port;

pub const CONFIG_ADDRESS_PORT: u16 = 0xCF8;
pub const CONFIG_DATA_PORT: u16 = 0xCFC;

const ENABLE: u32 = 1 << 31;

pub const DEVICES_PER_BUS: u8 = 32;
pub const FUNCTIONS_PER_DEVICE: u8 = 8;

// Configuration header offsets.
const VENDOR_ID: u8 = 0x00;
const DEVICE_ID: u8 = 0x02;
const REVISION: u8 = 0x08;
const PROG_IF: u8 = 0x09;
const SUBCLASS: u8 = 0x0A;
const CLASS: u8 = 0x0B;
const HEADER_TYPE: u8 = 0x0E;
const FIRST_BAR: u8 = 0x10;
const INTERRUPT_LINE: u8 = 0x3C;
const INTERRUPT_PIN: u8 = 0x3D;

const MULTI_FUNCTION: u8 = 0x80;
const NO_VENDOR: u16 = 0xFFFF;

/// Location of one function on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PciAddress {
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

impl PciAddress {
    pub const fn new(bus: u8, device: u8, function: u8) -> Self {
        Self { bus, device, function }
    }

    /// Value for the address port selecting the dword holding `offset`.
    pub const fn config_address(self, offset: u8) -> u32 {
        ENABLE
            | (self.bus as u32) << 16
            | ((self.device & 0x1F) as u32) << 11
            | ((self.function & 0x07) as u32) << 8
            | (offset & 0xFC) as u32
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}:{:02x}.{}", self.bus, self.device, self.function)
    }
}

/// Dword access to configuration space, with narrower reads on top.
pub trait ConfigSpace: Send {
    fn read_dword(&mut self, address: PciAddress, offset: u8) -> u32;

    fn read_word(&mut self, address: PciAddress, offset: u8) -> u16 {
        (self.read_dword(address, offset) >> (8 * u32::from(offset & 0x2))) as u16
    }

    fn read_byte(&mut self, address: PciAddress, offset: u8) -> u8 {
        (self.read_dword(address, offset) >> (8 * u32::from(offset & 0x3))) as u8
    }
}

/// Configuration space behind ports 0xCF8 / 0xCFC.
pub struct PortConfigSpace {
    address: Port<u32>,
    data: Port<u32>,
}

impl PortConfigSpace {
    pub const fn new() -> Self {
        Self {
            address: Port::new(CONFIG_ADDRESS_PORT),
            data: Port::new(CONFIG_DATA_PORT),
        }
    }
}

impl Default for PortConfigSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigSpace for PortConfigSpace {
    fn read_dword(&mut self, address: PciAddress, offset: u8) -> u32 {
        // SAFETY: selecting and reading a configuration dword has no side
        // effects on the addressed function.
        unsafe {
            self.address.write(address.config_address(offset));
            self.data.read()
        }
    }
}

/// Decoded base address register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bar {
    Io { port: u32 },
    Memory { address: u32, prefetchable: bool },
}

impl Bar {
    /// `None` for an unimplemented (all zero) register.
    pub fn decode(raw: u32) -> Option<Self> {
        if raw & 0x1 != 0 {
            let port = raw & !0x3;
            (port != 0).then_some(Bar::Io { port })
        } else {
            let address = raw & !0xF;
            (address != 0).then_some(Bar::Memory { address, prefetchable: raw & 0x8 != 0 })
        }
    }
}

/// One present function, as found by [`scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PciDevice {
    pub address: PciAddress,
    pub vendor_id: u16,
    pub device_id: u16,
    pub class: u8,
    pub subclass: u8,
    pub prog_if: u8,
    pub revision: u8,
    pub interrupt_line: u8,
    pub interrupt_pin: u8,
    pub bars: Vec<Bar>,
}

impl PciDevice {
    /// First I/O port range, where port-driven devices expect their registers.
    pub fn port_base(&self) -> Option<u32> {
        self.bars.iter().find_map(|bar| match bar {
            Bar::Io { port } => Some(*port),
            Bar::Memory { .. } => None,
        })
    }

    pub fn class_name(&self) -> &'static str {
        class_name(self.class, self.subclass)
    }
}

impl fmt::Display for PciDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:04x}:{:04x} {} (class {:02x}.{:02x}), irq {}",
            self.address,
            self.vendor_id,
            self.device_id,
            self.class_name(),
            self.class,
            self.subclass,
            self.interrupt_line
        )
    }
}

pub fn class_name(class: u8, subclass: u8) -> &'static str {
    match (class, subclass) {
        (0x01, 0x01) => "IDE controller",
        (0x01, 0x06) => "SATA controller",
        (0x01, _) => "mass storage controller",
        (0x02, 0x00) => "ethernet controller",
        (0x02, _) => "network controller",
        (0x03, 0x00) => "VGA controller",
        (0x03, _) => "display controller",
        (0x04, _) => "multimedia controller",
        (0x06, 0x00) => "host bridge",
        (0x06, 0x01) => "ISA bridge",
        (0x06, 0x04) => "PCI-to-PCI bridge",
        (0x06, _) => "bridge",
        (0x0C, 0x03) => "USB controller",
        (0x0C, _) => "serial bus controller",
        _ => "unknown device",
    }
}

fn is_multi_function(config: &mut impl ConfigSpace, bus: u8, device: u8) -> bool {
    config.read_byte(PciAddress::new(bus, device, 0), HEADER_TYPE) & MULTI_FUNCTION != 0
}

/// Base address registers the header layout carries: six for devices, two
/// for PCI-to-PCI bridges, none otherwise.
fn bar_count(header_type: u8) -> u8 {
    match header_type & !MULTI_FUNCTION {
        0x00 => 6,
        0x01 => 2,
        _ => 0,
    }
}

/// Reads the header of `address`. `None` when no function answers there.
pub fn read_device(config: &mut impl ConfigSpace, address: PciAddress) -> Option<PciDevice> {
    let vendor_id = config.read_word(address, VENDOR_ID);
    if vendor_id == 0 || vendor_id == NO_VENDOR {
        return None;
    }

    let header_type = config.read_byte(address, HEADER_TYPE);
    let bars = (0..bar_count(header_type))
        .filter_map(|n| Bar::decode(config.read_dword(address, FIRST_BAR + 4 * n)))
        .collect();

    Some(PciDevice {
        address,
        vendor_id,
        device_id: config.read_word(address, DEVICE_ID),
        class: config.read_byte(address, CLASS),
        subclass: config.read_byte(address, SUBCLASS),
        prog_if: config.read_byte(address, PROG_IF),
        revision: config.read_byte(address, REVISION),
        interrupt_line: config.read_byte(address, INTERRUPT_LINE),
        interrupt_pin: config.read_byte(address, INTERRUPT_PIN),
        bars,
    })
}

/// Walks every bus and device slot. Functions 1..7 are only looked at when
/// function 0 reports a multi-function device.
pub fn scan(config: &mut impl ConfigSpace) -> Vec<PciDevice> {
    let mut devices = Vec::new();
    for bus in 0..=u8::MAX {
        for device in 0..DEVICES_PER_BUS {
            let functions = if is_multi_function(config, bus, device) { FUNCTIONS_PER_DEVICE } else { 1 };
            for function in 0..functions {
                if let Some(found) = read_device(config, PciAddress::new(bus, device, function)) {
                    devices.push(found);
                }
            }
        }
    }
    devices
}
