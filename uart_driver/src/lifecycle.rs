//! Module lifecycle: ordered bring-up with unwind, unconditional teardown.
//!
//! Activation runs a fixed sequence against the host; any failing step
//! aborts activation and unwinds every prior successful step before the
//! error is reported. Shutdown releases whatever is held, attribute first
//! and mapping last, best-effort and idempotent.

use crate::config::UartConfig;
use crate::device::UartDevice;
use crate::error::{UartError, UartResult};
use crate::host::{DeviceHost, DeviceId, NodeHandle};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One activated driver instance and everything it holds.
///
/// Startup sequence (each step fatal, prior steps unwound on failure):
/// 1. register a device identity
/// 2. register the operation surface against it
/// 3. create the user-visible node
/// 4. attach the read-only diagnostic attribute
/// 5. map the register block and install the bus
/// 6. the exclusion token starts unlocked (created with the device)
/// 7. program the control field: disable, then enable transmit/receive
pub struct UartModule {
    host: Arc<dyn DeviceHost>,
    device: Arc<UartDevice>,
    config: UartConfig,
    id: Option<DeviceId>,
    ops_registered: bool,
    node: Option<NodeHandle>,
    attr_attached: bool,
    active: bool,
}

impl UartModule {
    /// Bring the driver online against `host`.
    ///
    /// # Errors
    /// Any step failure is returned as-is after all previously acquired
    /// resources have been released.
    pub fn activate(host: Arc<dyn DeviceHost>, config: UartConfig) -> UartResult<Self> {
        config.validate()?;

        let device = Arc::new(UartDevice::new(&config));
        let mut module = Self {
            host,
            device,
            config,
            id: None,
            ops_registered: false,
            node: None,
            attr_attached: false,
            active: false,
        };

        match module.bring_up() {
            Ok(()) => {
                module.active = true;
                info!(
                    "uart driver loaded: device {}, {:#x}+{:#x}",
                    module.config.device_name, module.config.base_addr, module.config.reg_size
                );
                Ok(module)
            }
            Err(e) => {
                warn!("activation failed ({e}); unwinding");
                module.shutdown();
                Err(e)
            }
        }
    }

    fn bring_up(&mut self) -> UartResult<()> {
        let id = self.host.register_device(&self.config.device_name)?;
        self.id = Some(id.clone());

        self.host.register_operations(&id, self.device.clone())?;
        self.ops_registered = true;

        let node = self.host.create_node(&id, &self.config.device_name)?;
        self.node = Some(node.clone());

        let device = self.device.clone();
        self.host.attach_status_attr(
            &node,
            &self.config.status_attr,
            Arc::new(move || device.last_message()),
        )?;
        self.attr_attached = true;

        let bus = self
            .host
            .map_registers(self.config.base_addr, self.config.reg_size)?;
        if bus.size() < self.config.reg_size {
            return Err(UartError::ResourceUnavailable {
                what: format!(
                    "mapping covers {:#x} of {:#x} requested bytes",
                    bus.size(),
                    self.config.reg_size
                ),
            });
        }
        self.device.attach_bus(bus);

        // Bring hardware to a known state before the first transfer.
        self.device.enable_hardware()?;
        Ok(())
    }

    /// Tear everything down: diagnostic attribute, node, operation
    /// surface, identity, then the register mapping. Best-effort, every
    /// step unconditional; a second call is a no-op.
    pub fn shutdown(&mut self) {
        if self.attr_attached {
            if let Some(node) = &self.node {
                self.host.detach_status_attr(node, &self.config.status_attr);
            }
            self.attr_attached = false;
        }

        if let Some(node) = self.node.take() {
            self.host.destroy_node(&node);
        }

        if self.ops_registered {
            if let Some(id) = &self.id {
                self.host.unregister_operations(id);
            }
            self.ops_registered = false;
        }

        if let Some(id) = self.id.take() {
            self.host.unregister_device(&id);
        }

        if let Some(bus) = self.device.detach_bus() {
            // Dropping the bus releases the mapping; detach waited for
            // in-flight transactions to drain.
            drop(bus);
            debug!("register mapping released");
        }

        if self.active {
            info!("uart driver unloaded");
            self.active = false;
        }
    }

    /// The device instance, for in-process callers and tests.
    pub fn device(&self) -> Arc<UartDevice> {
        self.device.clone()
    }

    /// Whether activation completed and shutdown has not run.
    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for UartModule {
    fn drop(&mut self) {
        self.shutdown();
    }
}
