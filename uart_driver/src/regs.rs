//! Register map and typed register access.
//!
//! Offsets and field masks follow the PL011 block as the driver uses it:
//! one data slot, one polled flag register, one control register. All
//! other registers in the block exist but are never touched.

use crate::bus::RegisterBus;
use bitflags::bitflags;
use static_assertions::const_assert;

/// Data register: low 8 bits carry the byte, both directions
pub const UART_DR: usize = 0x00;
/// Flag register, read-only, polled for readiness
pub const UART_FR: usize = 0x18;
/// Control register, written only during reset and initialization
pub const UART_CR: usize = 0x30;
/// Length of the register block in bytes
pub const REG_BLOCK_LEN: usize = 0x48;

/// Mask isolating the data byte in the data register
pub const DATA_MASK: u32 = 0xFF;

// The mapped block must cover every register the driver touches.
const_assert!(UART_DR + 4 <= REG_BLOCK_LEN);
const_assert!(UART_FR + 4 <= REG_BLOCK_LEN);
const_assert!(UART_CR + 4 <= REG_BLOCK_LEN);

bitflags! {
    /// Flag register bits, as the driver interprets them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FlagRegister: u32 {
        /// Receive data available
        const RX_READY = 1 << 4;
        /// Transmit busy
        const TX_BUSY = 1 << 5;
    }
}

bitflags! {
    /// Control register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ControlRegister: u32 {
        /// Device enable
        const ENABLE = 1 << 0;
        /// Transmit path enable
        const TX_ENABLE = 1 << 8;
        /// Receive path enable
        const RX_ENABLE = 1 << 9;
    }
}

impl ControlRegister {
    /// Fully active: device enabled with transmit and receive paths on
    pub const ACTIVE: ControlRegister = ControlRegister::ENABLE
        .union(ControlRegister::TX_ENABLE)
        .union(ControlRegister::RX_ENABLE);
}

/// Typed view of the register block.
///
/// Only constructed inside the held critical section, while the mapping is
/// active; the borrow ties every access to that span.
pub struct RegisterBlock<'a> {
    bus: &'a dyn RegisterBus,
}

impl<'a> RegisterBlock<'a> {
    /// Wrap a bus for the duration of one transaction.
    pub(crate) fn new(bus: &'a dyn RegisterBus) -> Self {
        Self { bus }
    }

    /// Read the flag register.
    pub fn read_status(&self) -> FlagRegister {
        FlagRegister::from_bits_truncate(self.bus.read(UART_FR))
    }

    /// Read one byte from the data register.
    pub fn read_data(&self) -> u8 {
        (self.bus.read(UART_DR) & DATA_MASK) as u8
    }

    /// Write one byte to the data register.
    pub fn write_data(&self, byte: u8) {
        self.bus.write(UART_DR, byte as u32);
    }

    /// Write the control register.
    pub fn write_control(&self, value: ControlRegister) {
        self.bus.write(UART_CR, value.bits());
    }
}
