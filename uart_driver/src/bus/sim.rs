//! Loopback register simulation.
//!
//! Models the register block the way the driver observes it: a byte
//! written to the data register is latched into a small receive FIFO and
//! becomes readable with "receive data available" set; reading the data
//! register pops it. Disabling the device through the control register
//! flushes the FIFO. Test controls can force the transmit-busy flag or
//! stall the receive path to exercise the timeout paths.

use crate::bus::RegisterBus;
use crate::regs::{ControlRegister, DATA_MASK, FlagRegister, REG_BLOCK_LEN, UART_CR, UART_DR, UART_FR};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Receive FIFO depth, matching the hardware's
const RX_FIFO_DEPTH: usize = 16;

#[derive(Default)]
struct SimState {
    rx_fifo: Mutex<VecDeque<u8>>,
    control: AtomicU32,
    tx_busy: AtomicBool,
    rx_stalled: AtomicBool,
}

/// Shared simulated register block. Clones access the same state.
#[derive(Clone, Default)]
pub struct SimBus {
    inner: Arc<SimState>,
}

impl SimBus {
    /// Create a fresh simulated block: FIFO empty, device disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a byte on the receive path without going through loopback,
    /// as if a remote peer transmitted it.
    pub fn inject_rx(&self, byte: u8) {
        let mut fifo = self.inner.rx_fifo.lock();
        if fifo.len() < RX_FIFO_DEPTH {
            fifo.push_back(byte);
        }
    }

    /// Force the transmit-busy flag, stalling writers.
    pub fn set_tx_busy(&self, busy: bool) {
        self.inner.tx_busy.store(busy, Ordering::SeqCst);
    }

    /// Hide receive data from the flag register, stalling readers.
    pub fn stall_rx(&self, stalled: bool) {
        self.inner.rx_stalled.store(stalled, Ordering::SeqCst);
    }

    /// Current control register value.
    pub fn control_value(&self) -> u32 {
        self.inner.control.load(Ordering::SeqCst)
    }

    /// Number of bytes waiting on the receive path.
    pub fn rx_pending(&self) -> usize {
        self.inner.rx_fifo.lock().len()
    }
}

impl RegisterBus for SimBus {
    fn read(&self, offset: usize) -> u32 {
        match offset {
            UART_DR => {
                let byte = self.inner.rx_fifo.lock().pop_front().unwrap_or(0);
                byte as u32
            }
            UART_FR => {
                let mut flags = FlagRegister::empty();
                let rx_visible = !self.inner.rx_stalled.load(Ordering::SeqCst)
                    && !self.inner.rx_fifo.lock().is_empty();
                if rx_visible {
                    flags |= FlagRegister::RX_READY;
                }
                if self.inner.tx_busy.load(Ordering::SeqCst) {
                    flags |= FlagRegister::TX_BUSY;
                }
                flags.bits()
            }
            UART_CR => self.inner.control.load(Ordering::SeqCst),
            _ => 0,
        }
    }

    fn write(&self, offset: usize, value: u32) {
        match offset {
            UART_DR => {
                // Loopback: transmitted bytes appear on the receive path.
                let mut fifo = self.inner.rx_fifo.lock();
                if fifo.len() < RX_FIFO_DEPTH {
                    fifo.push_back((value & DATA_MASK) as u8);
                }
            }
            UART_CR => {
                self.inner.control.store(value, Ordering::SeqCst);
                if !ControlRegister::from_bits_truncate(value).contains(ControlRegister::ENABLE) {
                    // Disabling the device flushes pending receive data.
                    self.inner.rx_fifo.lock().clear();
                }
            }
            // The flag register is read-only; other offsets are unused.
            _ => {}
        }
    }

    fn size(&self) -> usize {
        REG_BLOCK_LEN
    }
}
