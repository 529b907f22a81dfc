//! Read-only mapping of a VM's shared-memory framebuffer.
//!
//! The shim creates one POSIX shared-memory object per VM, named
//! `/{vm_id}.rdpmux`, and writes pixel data into it in the format advertised
//! by the most recent `DisplaySwitch`. The multiplexer opens the object
//! read-only and maps it shared; peers read pixels straight out of the
//! mapping during encoding.
//!
//! The mapping size is a fixed upper bound, not the current mode's size:
//! the shim allocates the region once and the listener never remaps it.
//! Switches that would not fit the bound are rejected upstream.

use std::fs::File;

use memmap2::{Mmap, MmapOptions};
use nix::fcntl::OFlag;
use nix::sys::mman::shm_open;
use nix::sys::stat::Mode;
use thiserror::Error;

/// Size of the shared framebuffer region in bytes (4096 × 2048 pixels at
/// 4 bytes each). Upper bound, not tight.
pub const FRAMEBUFFER_BYTES: usize = 4096 * 2048 * 4;

/// Returns the shared-memory object name the shim uses for `vm_id`.
pub fn shm_name(vm_id: u32) -> String {
    format!("/{vm_id}.rdpmux")
}

/// Errors from opening or mapping the framebuffer.
///
/// Both are recoverable from the listener's perspective: the mapping attempt
/// is retried on the shim's next `DisplaySwitch`.
#[derive(Debug, Error)]
pub enum FramebufferError {
    #[error("shm_open({name}) failed: {source}")]
    OpenFailed {
        name: String,
        #[source]
        source: nix::Error,
    },

    #[error("mmap of {name} failed: {source}")]
    MapFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// A mapped framebuffer. The mapping is immutable once created and is
/// released when this value drops.
pub struct Framebuffer {
    map: Mmap,
}

impl Framebuffer {
    /// Opens `/{vm_id}.rdpmux` read-only and maps [`FRAMEBUFFER_BYTES`]
    /// read-shared.
    ///
    /// # Errors
    ///
    /// [`FramebufferError::OpenFailed`] if the shared-memory object does not
    /// exist or is not readable, [`FramebufferError::MapFailed`] if the
    /// mapping itself fails.
    pub fn open(vm_id: u32) -> Result<Self, FramebufferError> {
        let name = shm_name(vm_id);

        let fd = shm_open(name.as_str(), OFlag::O_RDONLY, Mode::empty()).map_err(|source| {
            FramebufferError::OpenFailed {
                name: name.clone(),
                source,
            }
        })?;
        let file = File::from(fd);

        // SAFETY: the mapping is read-only and shared; the shim owns the
        // object's lifetime and never shrinks it below FRAMEBUFFER_BYTES.
        let map = unsafe { MmapOptions::new().len(FRAMEBUFFER_BYTES).map(&file) }
            .map_err(|source| FramebufferError::MapFailed { name, source })?;

        Ok(Self { map })
    }

    /// The raw pixel bytes. Layout and stride are described by the
    /// listener's current `(width, height, format)`.
    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl std::fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framebuffer")
            .field("len", &self.map.len())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
