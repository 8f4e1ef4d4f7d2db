//! The UART device: transfer operations and the control channel.
//!
//! Every operation follows the same path: enter through the caller-facing
//! surface, take the exclusion guard, run one register-level transaction
//! (hardware-ready poll + data or control access), release, then update the
//! diagnostic record. Caller-buffer copies happen outside the held span.

use crate::bus::RegisterBus;
use crate::config::{TransferPolicy, UartConfig};
use crate::diag::DiagnosticLog;
use crate::error::{UartError, UartResult};
use crate::host::CharDevice;
use crate::lock::HwLock;
use crate::regs::{ControlRegister, FlagRegister, RegisterBlock};
use parking_lot::RwLock;
use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::debug;

/// Command namespace byte, `'u'`
const CMD_NAMESPACE: u32 = b'u' as u32;

/// Reset opcode: namespace `'u'`, sequence 0
pub const CMD_RESET: u32 = CMD_NAMESPACE << 8;

/// Control channel state. Transitions happen entirely inside the exclusive
/// section, so `Resetting` is never observable while the token is free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlState {
    /// No control transition in progress
    Idle = 0,
    /// Reset sequence running
    Resetting = 1,
}

/// One UART device instance.
///
/// The register bus is installed by the lifecycle manager once the mapping
/// exists and removed at teardown; operations take shared access to it, so
/// the unmap waits for in-flight transactions.
pub struct UartDevice {
    bus: RwLock<Option<Box<dyn RegisterBus>>>,
    lock: HwLock,
    diag: DiagnosticLog,
    policy: TransferPolicy,
    poll_budget: u32,
    state: AtomicU8,
}

impl UartDevice {
    /// Create a device with no bus installed. The exclusion token starts
    /// unlocked.
    pub fn new(config: &UartConfig) -> Self {
        Self {
            bus: RwLock::new(None),
            lock: HwLock::new(),
            diag: DiagnosticLog::new(),
            policy: config.transfer_policy,
            poll_budget: config.poll_budget,
            state: AtomicU8::new(ControlState::Idle as u8),
        }
    }

    /// Install the register bus. Operations fail with `NotActive` until
    /// this has happened.
    pub fn attach_bus(&self, bus: Box<dyn RegisterBus>) {
        *self.bus.write() = Some(bus);
    }

    /// Remove and return the register bus, waiting for in-flight
    /// operations to drain. Idempotent.
    pub fn detach_bus(&self) -> Option<Box<dyn RegisterBus>> {
        self.bus.write().take()
    }

    /// Whether a bus is currently installed.
    pub fn is_active(&self) -> bool {
        self.bus.read().is_some()
    }

    /// Program the control field to a known state: disable, then enable
    /// with transmit and receive active. Used at bring-up; does not touch
    /// the diagnostic record.
    pub fn enable_hardware(&self) -> UartResult<()> {
        self.with_bus(|bus| {
            self.lock.with_exclusive(bus, |regs| {
                regs.write_control(ControlRegister::empty());
                regs.write_control(ControlRegister::ACTIVE);
                Ok(())
            })
        })
    }

    /// Read into `buf`. Yields exactly one byte under the default policy,
    /// up to `buf.len()` under fill-buffer.
    pub fn read(&self, buf: &mut [u8]) -> UartResult<usize> {
        let max = buf.len();
        let mut cursor = io::Cursor::new(buf);
        self.read_to(&mut cursor, max)
    }

    /// Read up to `max` bytes into a caller-provided sink.
    ///
    /// The hardware byte is consumed before the sink is written, so a
    /// faulting sink loses that byte: the copy-fault is reported and the
    /// diagnostic record stays untouched.
    pub fn read_to(&self, dst: &mut dyn io::Write, max: usize) -> UartResult<usize> {
        if max == 0 {
            return Err(UartError::InvalidArgument {
                reason: "zero-length read",
            });
        }
        let want = match self.policy {
            TransferPolicy::SingleByte => 1,
            TransferPolicy::FillBuffer => max,
        };

        let mut staged = Vec::with_capacity(want);
        self.with_bus(|bus| {
            self.lock.with_exclusive(bus, |regs| {
                wait_ready(regs, self.poll_budget, "read", |f| {
                    f.contains(FlagRegister::RX_READY)
                })?;
                staged.push(regs.read_data());
                // Burst continues only while data is immediately ready;
                // underrun ends the transfer without error.
                while staged.len() < want && regs.read_status().contains(FlagRegister::RX_READY) {
                    staged.push(regs.read_data());
                }
                Ok(())
            })
        })?;

        dst.write_all(&staged)
            .map_err(|e| UartError::CopyFault { source: e })?;

        if let Some(&last) = staged.last() {
            self.diag.record_read(last);
        }
        debug!("read {} byte(s)", staged.len());
        Ok(staged.len())
    }

    /// Write from `buf`. Consumes exactly one byte under the default
    /// policy, up to `buf.len()` under fill-buffer.
    pub fn write(&self, mut buf: &[u8]) -> UartResult<usize> {
        let max = buf.len();
        self.write_from(&mut buf, max)
    }

    /// Write up to `max` bytes from a caller-provided source.
    ///
    /// The caller copy happens first: a faulting source is reported before
    /// any hardware access, leaving hardware state unchanged.
    pub fn write_from(&self, src: &mut dyn io::Read, max: usize) -> UartResult<usize> {
        if max == 0 {
            return Err(UartError::InvalidArgument {
                reason: "zero-length write",
            });
        }
        let want = match self.policy {
            TransferPolicy::SingleByte => 1,
            TransferPolicy::FillBuffer => max,
        };

        let mut staged = vec![0u8; want];
        src.read_exact(&mut staged[..1])
            .map_err(|e| UartError::CopyFault { source: e })?;
        let mut got = 1;
        if want > 1 {
            got += src
                .read(&mut staged[1..])
                .map_err(|e| UartError::CopyFault { source: e })?;
        }
        staged.truncate(got);

        let mut sent = 0usize;
        self.with_bus(|bus| {
            self.lock.with_exclusive(bus, |regs| {
                for (index, &byte) in staged.iter().enumerate() {
                    let ready = wait_ready(regs, self.poll_budget, "write", |f| {
                        !f.contains(FlagRegister::TX_BUSY)
                    });
                    match ready {
                        Ok(()) => {}
                        // Sustained busy mid-burst ends the transfer; a
                        // timeout on the first byte is the caller's error.
                        Err(e) if index == 0 => return Err(e),
                        Err(_) => break,
                    }
                    regs.write_data(byte);
                    sent += 1;
                }
                Ok(())
            })
        })?;

        if sent > 0 {
            self.diag.record_write(staged[sent - 1]);
        }
        debug!("wrote {sent} byte(s)");
        Ok(sent)
    }

    /// Dispatch a control command.
    ///
    /// `CMD_RESET` disables the device, then re-enables it with transmit
    /// and receive active, under the same exclusion guard as transfers.
    /// Unknown opcodes are rejected with no side effect.
    pub fn command(&self, opcode: u32) -> UartResult<()> {
        match opcode {
            CMD_RESET => {
                self.with_bus(|bus| {
                    self.lock.with_exclusive(bus, |regs| {
                        self.state
                            .store(ControlState::Resetting as u8, Ordering::Release);
                        regs.write_control(ControlRegister::empty());
                        regs.write_control(ControlRegister::ACTIVE);
                        self.state.store(ControlState::Idle as u8, Ordering::Release);
                        Ok(())
                    })
                })?;
                self.diag.record_reset();
                debug!("hardware reset completed");
                Ok(())
            }
            other => Err(UartError::InvalidCommand { opcode: other }),
        }
    }

    /// Current control channel state.
    pub fn control_state(&self) -> ControlState {
        match self.state.load(Ordering::Acquire) {
            0 => ControlState::Idle,
            _ => ControlState::Resetting,
        }
    }

    /// The last-operation description, with a trailing newline.
    pub fn last_message(&self) -> String {
        self.diag.show()
    }

    /// `(acquisitions, contentions)` of the exclusion token.
    pub fn lock_stats(&self) -> (u64, u64) {
        self.lock.stats()
    }

    /// Run `f` with the installed bus, or fail with `NotActive`.
    fn with_bus<T>(&self, f: impl FnOnce(&dyn RegisterBus) -> UartResult<T>) -> UartResult<T> {
        let guard = self.bus.read();
        let bus = guard.as_deref().ok_or(UartError::NotActive)?;
        f(bus)
    }
}

impl CharDevice for UartDevice {
    fn read(&self, buf: &mut [u8]) -> UartResult<usize> {
        UartDevice::read(self, buf)
    }

    fn write(&self, buf: &[u8]) -> UartResult<usize> {
        UartDevice::write(self, buf)
    }

    fn command(&self, opcode: u32) -> UartResult<()> {
        UartDevice::command(self, opcode)
    }
}

/// Poll the flag register until `ready` holds, bounded by `budget`.
fn wait_ready(
    regs: &RegisterBlock<'_>,
    budget: u32,
    operation: &'static str,
    ready: impl Fn(FlagRegister) -> bool,
) -> UartResult<()> {
    for _ in 0..budget {
        if ready(regs.read_status()) {
            return Ok(());
        }
        core::hint::spin_loop();
    }
    Err(UartError::NotReady {
        operation,
        polls: budget,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SimBus;

    fn sim_device() -> (UartDevice, SimBus) {
        let device = UartDevice::new(&UartConfig::default());
        let bus = SimBus::new();
        device.attach_bus(Box::new(bus.clone()));
        device.enable_hardware().expect("enable");
        (device, bus)
    }

    #[test]
    fn test_operations_require_active_mapping() {
        let device = UartDevice::new(&UartConfig::default());
        assert!(!device.is_active());
        assert!(matches!(
            device.write(b"x"),
            Err(UartError::NotActive)
        ));
        assert!(matches!(
            device.read(&mut [0u8; 1]),
            Err(UartError::NotActive)
        ));
        assert!(matches!(device.command(CMD_RESET), Err(UartError::NotActive)));
    }

    #[test]
    fn test_zero_length_requests_rejected() {
        let (device, _bus) = sim_device();
        assert!(matches!(
            device.read(&mut []),
            Err(UartError::InvalidArgument { .. })
        ));
        assert!(matches!(
            device.write(&[]),
            Err(UartError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_unknown_opcode_rejected_without_side_effect() {
        let (device, bus) = sim_device();
        let before = bus.control_value();
        let result = device.command(0xBEEF);
        assert!(matches!(
            result,
            Err(UartError::InvalidCommand { opcode: 0xBEEF })
        ));
        assert_eq!(bus.control_value(), before);
        assert_eq!(device.last_message(), "No messages.\n");
    }

    #[test]
    fn test_control_state_idle_after_reset() {
        let (device, _bus) = sim_device();
        device.command(CMD_RESET).expect("reset");
        assert_eq!(device.control_state(), ControlState::Idle);
    }
}
