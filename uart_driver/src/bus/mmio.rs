//! Physical register mapping over `/dev/mem`.

use crate::bus::RegisterBus;
use crate::error::{UartError, UartResult};
use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use tracing::debug;

/// Memory device exposing physical address space
const MEM_DEVICE: &str = "/dev/mem";

/// A register block mapped from physical address space.
///
/// The mapping is created once and released exactly once, when the bus is
/// dropped. All word accesses are volatile: register state changes
/// independently of program order and must never be reordered or cached.
pub struct MmioBus {
    /// Keeps the mapping alive; accesses go through `base`
    _map: MmapMut,
    /// First byte of the register block inside the mapping
    base: *mut u8,
    /// Accessible length in bytes
    len: usize,
    /// Physical address, for teardown logging
    phys_addr: u64,
}

// SAFETY: the raw pointer targets device registers that live for as long as
// `_map` does, and every access through it is a volatile word access.
// Transaction-level consistency is the exclusion guard's job, not the bus's.
unsafe impl Send for MmioBus {}
unsafe impl Sync for MmioBus {}

impl MmioBus {
    /// Map `len` bytes of physical address space starting at `phys_addr`.
    ///
    /// The mapping is page-granular; a base address inside a page is
    /// handled by mapping from the page boundary and offsetting accesses.
    ///
    /// # Errors
    /// Returns `ResourceUnavailable` if `/dev/mem` cannot be opened or the
    /// mapping fails (typically missing privileges).
    pub fn map(phys_addr: u64, len: usize) -> UartResult<Self> {
        if len == 0 {
            return Err(UartError::InvalidArgument {
                reason: "mapping length must be non-zero",
            });
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(MEM_DEVICE)
            .map_err(|e| UartError::ResourceUnavailable {
                what: format!("{MEM_DEVICE}: {e}"),
            })?;

        let page_size = page_size();
        let delta = (phys_addr % page_size as u64) as usize;
        let map_base = phys_addr - delta as u64;

        let mut map = unsafe {
            MmapOptions::new()
                .offset(map_base)
                .len(len + delta)
                .map_mut(&file)
        }
        .map_err(|e| UartError::ResourceUnavailable {
            what: format!("register mapping at {phys_addr:#x}: {e}"),
        })?;

        // SAFETY: delta < page size <= mapping length.
        let base = unsafe { map.as_mut_ptr().add(delta) };

        debug!("mapped {len:#x} register bytes at {phys_addr:#x}");
        Ok(Self {
            _map: map,
            base,
            len,
            phys_addr,
        })
    }
}

impl RegisterBus for MmioBus {
    fn read(&self, offset: usize) -> u32 {
        debug_assert!(offset % 4 == 0 && offset + 4 <= self.len);
        // SAFETY: offset is in bounds and word-aligned; the mapping is
        // alive for the lifetime of self.
        unsafe { (self.base.add(offset) as *const u32).read_volatile() }
    }

    fn write(&self, offset: usize, value: u32) {
        debug_assert!(offset % 4 == 0 && offset + 4 <= self.len);
        // SAFETY: as above.
        unsafe { (self.base.add(offset) as *mut u32).write_volatile(value) }
    }

    fn size(&self) -> usize {
        self.len
    }
}

impl Drop for MmioBus {
    fn drop(&mut self) {
        // The mapping itself is released by MmapMut.
        debug!("unmapped register block at {:#x}", self.phys_addr);
    }
}

/// System page size.
fn page_size() -> usize {
    // SAFETY: sysconf with a valid name has no side effects.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as usize } else { 4096 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_length_mapping_rejected() {
        assert!(matches!(
            MmioBus::map(0xFE20_1000, 0),
            Err(UartError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_page_size_sane() {
        let size = page_size();
        assert!(size >= 4096);
        assert!(size.is_power_of_two());
    }
}
