//! # UART Character Driver
//!
//! A character-oriented driver for a memory-mapped PL011-style UART:
//! byte-granular read/write, a reset control command, and a read-only
//! diagnostic attribute describing the last operation.
//!
//! # Module Structure
//!
//! - [`device`] - transfer operations and the control channel
//! - [`lock`] - busy-wait exclusion with signal masking
//! - [`regs`] - register map and typed access
//! - [`bus`] - register backends (MMIO over `/dev/mem`, loopback sim)
//! - [`diag`] - last-operation diagnostic record
//! - [`lifecycle`] - ordered bring-up/teardown against a host
//! - [`host`] - the `DeviceHost` boundary and a filesystem dev host
//! - [`config`] / [`error`] - configuration and error types
//!
//! # Architecture
//!
//! ```text
//! caller ──► CharDevice (read / write / command)
//!                │
//!                ▼
//!            UartDevice ──► HwLock ──► RegisterBlock ──► RegisterBus
//!                │                                        (mmio | sim)
//!                └──► DiagnosticLog ◄── status attribute reader
//!
//! UartModule: DeviceHost registration ▸ node ▸ attribute ▸ mapping
//! ```

pub mod bus;
pub mod config;
pub mod device;
pub mod diag;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod lock;
pub mod regs;

// Re-export key types for convenience
pub use crate::bus::{MmioBus, RegisterBus, SimBus};
pub use crate::config::{TransferPolicy, UartConfig};
pub use crate::device::{CMD_RESET, ControlState, UartDevice};
pub use crate::diag::DiagnosticLog;
pub use crate::error::{UartError, UartResult};
pub use crate::host::{AttrReader, CharDevice, DeviceHost, DeviceId, FsHost, NodeHandle};
pub use crate::lifecycle::UartModule;
