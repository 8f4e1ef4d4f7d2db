//! Host-environment boundary.
//!
//! The driver consumes the host through the [`DeviceHost`] trait: identity
//! registration, node creation, attribute attachment, and register mapping.
//! [`FsHost`] is a concrete development host rooted at a directory, so the
//! driver can be exercised end to end without kernel privileges; a real
//! registration framework would provide its own implementation.

use crate::bus::{MmioBus, RegisterBus, SimBus};
use crate::error::{UartError, UartResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info, warn};

/// First major number handed out (experimental/local range)
const FIRST_MAJOR: u32 = 240;

/// Caller-facing operation surface registered against a device identity.
pub trait CharDevice: Send + Sync {
    /// Read up to `buf.len()` bytes.
    fn read(&self, buf: &mut [u8]) -> UartResult<usize>;

    /// Write up to `buf.len()` bytes.
    fn write(&self, buf: &[u8]) -> UartResult<usize>;

    /// Dispatch a control opcode.
    fn command(&self, opcode: u32) -> UartResult<()>;
}

/// Reader callback backing a read-only status attribute.
pub type AttrReader = Arc<dyn Fn() -> String + Send + Sync>;

/// Device identity allocated by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceId {
    name: String,
    major: u32,
}

impl DeviceId {
    /// Construct an identity; normally only hosts do this.
    pub fn new(name: impl Into<String>, major: u32) -> Self {
        Self {
            name: name.into(),
            major,
        }
    }

    /// Registered device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Allocated major number.
    pub fn major(&self) -> u32 {
        self.major
    }
}

/// Handle to a user-visible node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeHandle {
    name: String,
}

impl NodeHandle {
    /// Construct a handle; normally only hosts do this.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Node name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The registration framework the lifecycle manager runs against.
///
/// Acquire calls return a handle or an error; teardown counterparts are
/// best-effort and never fail (shutdown must always complete). The
/// teardown counterpart of `map_registers` is dropping the returned bus.
pub trait DeviceHost: Send + Sync {
    /// Allocate a device identity.
    fn register_device(&self, name: &str) -> UartResult<DeviceId>;

    /// Release a device identity.
    fn unregister_device(&self, id: &DeviceId);

    /// Register the operation surface for an identity.
    fn register_operations(&self, id: &DeviceId, ops: Arc<dyn CharDevice>) -> UartResult<()>;

    /// Remove the operation surface for an identity.
    fn unregister_operations(&self, id: &DeviceId);

    /// Create the user-visible node for an identity.
    fn create_node(&self, id: &DeviceId, name: &str) -> UartResult<NodeHandle>;

    /// Remove a node.
    fn destroy_node(&self, node: &NodeHandle);

    /// Attach a read-only status attribute to a node.
    fn attach_status_attr(
        &self,
        node: &NodeHandle,
        name: &str,
        reader: AttrReader,
    ) -> UartResult<()>;

    /// Detach a status attribute.
    fn detach_status_attr(&self, node: &NodeHandle, name: &str);

    /// Map the register block and return a bus over it.
    fn map_registers(&self, phys_addr: u64, len: usize) -> UartResult<Box<dyn RegisterBus>>;
}

/// Register backend handed out by `FsHost::map_registers`.
enum Backend {
    /// Real mapping over `/dev/mem`
    Mmio,
    /// Shared loopback simulation
    Sim(SimBus),
}

/// Filesystem-backed development host.
///
/// Nodes are marker files under `<root>/dev/`, attributes are files under
/// `<root>/class/<node>/` refreshed from the registered reader on every
/// [`FsHost::read_attribute`] call, and `open` hands in-process clients the
/// registered operation surface.
pub struct FsHost {
    root: PathBuf,
    backend: Backend,
    next_major: AtomicU32,
    devices: RwLock<HashMap<String, u32>>,
    ops: RwLock<HashMap<u32, Arc<dyn CharDevice>>>,
    nodes: RwLock<HashMap<String, u32>>,
    attrs: RwLock<HashMap<(String, String), AttrReader>>,
}

impl FsHost {
    /// Host with the real MMIO backend.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_backend(root, Backend::Mmio)
    }

    /// Host whose mappings resolve to a shared loopback simulation.
    /// Returns the bus so callers can drive or inspect the simulated
    /// hardware.
    pub fn with_simulated_bus(root: impl Into<PathBuf>) -> (Self, SimBus) {
        let bus = SimBus::new();
        let host = Self::with_backend(root, Backend::Sim(bus.clone()));
        (host, bus)
    }

    fn with_backend(root: impl Into<PathBuf>, backend: Backend) -> Self {
        Self {
            root: root.into(),
            backend,
            next_major: AtomicU32::new(FIRST_MAJOR),
            devices: RwLock::new(HashMap::new()),
            ops: RwLock::new(HashMap::new()),
            nodes: RwLock::new(HashMap::new()),
            attrs: RwLock::new(HashMap::new()),
        }
    }

    /// Path of a node's marker file.
    pub fn node_path(&self, name: &str) -> PathBuf {
        self.root.join("dev").join(name)
    }

    /// Path of an attribute file.
    pub fn attr_path(&self, node: &str, attr: &str) -> PathBuf {
        self.root.join("class").join(node).join(attr)
    }

    /// Open a node: returns the operation surface registered for it.
    pub fn open(&self, name: &str) -> UartResult<Arc<dyn CharDevice>> {
        let major = *self
            .nodes
            .read()
            .get(name)
            .ok_or_else(|| UartError::ResourceUnavailable {
                what: format!("node {name}"),
            })?;
        self.ops
            .read()
            .get(&major)
            .cloned()
            .ok_or_else(|| UartError::ResourceUnavailable {
                what: format!("operations for node {name}"),
            })
    }

    /// Evaluate an attribute's reader, refresh its file, return the text.
    pub fn read_attribute(&self, node: &str, attr: &str) -> UartResult<String> {
        let reader = self
            .attrs
            .read()
            .get(&(node.to_string(), attr.to_string()))
            .cloned()
            .ok_or_else(|| UartError::ResourceUnavailable {
                what: format!("attribute {node}/{attr}"),
            })?;
        let content = reader();
        if let Err(e) = fs::write(self.attr_path(node, attr), &content) {
            warn!("failed to refresh attribute file {node}/{attr}: {e}");
        }
        Ok(content)
    }

    /// Whether a device name is currently registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.devices.read().contains_key(name)
    }

    /// Count of live host resources `(devices, ops, nodes, attrs)`.
    pub fn resource_counts(&self) -> (usize, usize, usize, usize) {
        (
            self.devices.read().len(),
            self.ops.read().len(),
            self.nodes.read().len(),
            self.attrs.read().len(),
        )
    }
}

impl DeviceHost for FsHost {
    fn register_device(&self, name: &str) -> UartResult<DeviceId> {
        let mut devices = self.devices.write();
        if devices.contains_key(name) {
            return Err(UartError::ResourceUnavailable {
                what: format!("device name {name} already registered"),
            });
        }
        let major = self.next_major.fetch_add(1, Ordering::SeqCst);
        devices.insert(name.to_string(), major);
        info!("registered device {name} with major {major}");
        Ok(DeviceId::new(name, major))
    }

    fn unregister_device(&self, id: &DeviceId) {
        if self.devices.write().remove(id.name()).is_some() {
            debug!("unregistered device {}", id.name());
        }
    }

    fn register_operations(&self, id: &DeviceId, ops: Arc<dyn CharDevice>) -> UartResult<()> {
        if self.devices.read().get(id.name()) != Some(&id.major()) {
            return Err(UartError::ResourceUnavailable {
                what: format!("identity {} not registered", id.name()),
            });
        }
        let mut table = self.ops.write();
        if table.contains_key(&id.major()) {
            return Err(UartError::ResourceUnavailable {
                what: format!("operations already registered for major {}", id.major()),
            });
        }
        table.insert(id.major(), ops);
        Ok(())
    }

    fn unregister_operations(&self, id: &DeviceId) {
        self.ops.write().remove(&id.major());
    }

    fn create_node(&self, id: &DeviceId, name: &str) -> UartResult<NodeHandle> {
        let path = self.node_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, format!("c {} 0\n", id.major()))?;
        self.nodes.write().insert(name.to_string(), id.major());
        debug!("created node {path:?}");
        Ok(NodeHandle::new(name))
    }

    fn destroy_node(&self, node: &NodeHandle) {
        self.nodes.write().remove(node.name());
        let path = self.node_path(node.name());
        if let Err(e) = fs::remove_file(&path) {
            warn!("failed to remove node {path:?}: {e}");
        }
    }

    fn attach_status_attr(
        &self,
        node: &NodeHandle,
        name: &str,
        reader: AttrReader,
    ) -> UartResult<()> {
        if !self.nodes.read().contains_key(node.name()) {
            return Err(UartError::ResourceUnavailable {
                what: format!("node {} for attribute {name}", node.name()),
            });
        }
        let key = (node.name().to_string(), name.to_string());
        if self.attrs.read().contains_key(&key) {
            return Err(UartError::ResourceUnavailable {
                what: format!("attribute {}/{name} already attached", node.name()),
            });
        }
        let path = self.attr_path(node.name(), name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, reader())?;
        self.attrs.write().insert(key, reader);
        Ok(())
    }

    fn detach_status_attr(&self, node: &NodeHandle, name: &str) {
        self.attrs
            .write()
            .remove(&(node.name().to_string(), name.to_string()));
        let path = self.attr_path(node.name(), name);
        if let Err(e) = fs::remove_file(&path) {
            warn!("failed to remove attribute {path:?}: {e}");
        }
        if let Some(parent) = path.parent() {
            // Drop the per-node class directory once its last attribute
            // is gone; non-empty directories are left alone.
            let _ = fs::remove_dir(parent);
        }
    }

    fn map_registers(&self, phys_addr: u64, len: usize) -> UartResult<Box<dyn RegisterBus>> {
        match &self.backend {
            Backend::Mmio => Ok(Box::new(MmioBus::map(phys_addr, len)?)),
            Backend::Sim(bus) => {
                debug!("handing out simulated register block");
                Ok(Box::new(bus.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullDevice;

    impl CharDevice for NullDevice {
        fn read(&self, _buf: &mut [u8]) -> UartResult<usize> {
            Ok(0)
        }

        fn write(&self, _buf: &[u8]) -> UartResult<usize> {
            Ok(0)
        }

        fn command(&self, opcode: u32) -> UartResult<()> {
            Err(UartError::InvalidCommand { opcode })
        }
    }

    fn sim_host() -> (FsHost, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let (host, _bus) = FsHost::with_simulated_bus(dir.path());
        (host, dir)
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let (host, _dir) = sim_host();
        host.register_device("uart").expect("first");
        assert!(host.register_device("uart").is_err());
    }

    #[test]
    fn test_majors_are_sequential() {
        let (host, _dir) = sim_host();
        let a = host.register_device("uart0").expect("a");
        let b = host.register_device("uart1").expect("b");
        assert_eq!(b.major(), a.major() + 1);
    }

    #[test]
    fn test_open_unknown_node_fails() {
        let (host, _dir) = sim_host();
        assert!(host.open("nope").is_err());
    }

    #[test]
    fn test_attach_attr_requires_node() {
        let (host, _dir) = sim_host();
        let ghost = NodeHandle::new("ghost");
        let reader: AttrReader = Arc::new(|| "text\n".to_string());
        assert!(host.attach_status_attr(&ghost, "log", reader).is_err());
    }

    #[test]
    fn test_operations_require_registered_identity() {
        let (host, _dir) = sim_host();
        let stale = DeviceId::new("stale", 999);
        assert!(host.register_operations(&stale, Arc::new(NullDevice)).is_err());
    }
}
