//! Named-device binding.
//!
//! `spec.md` §1/§6 names exactly two devices the core talks to, `FS` and
//! `SWAP`. Mirrors `fs/simple_fs`'s pattern of resolving a device by a
//! fixed slot index (`abyss::dev::get_bdev(self.0)`), generalized to a
//! global registry with explicit `bind`/`unbind` rather than a
//! lazily-constructed global (§9: "Global mutable tables... singleton with
//! explicit init/teardown called from mount/unmount, never constructed on
//! first use").
use crate::BlockDevice;
use alloc::sync::Arc;
use oscore::{sync::RwLock, KernelError};

/// One of the two devices the core is allowed to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceName {
    /// The filesystem device backing inodes, directories and file data.
    Fs,
    /// The swap device backing evicted pages.
    Swap,
}

struct Devices {
    fs: Option<Arc<dyn BlockDevice>>,
    swap: Option<Arc<dyn BlockDevice>>,
}

static DEVICES: RwLock<Devices> = RwLock::new(Devices {
    fs: None,
    swap: None,
});

/// Binds a device under `name`, replacing any previous binding.
///
/// Called once from `filesys::mount`/the swap allocator's setup, never from
/// inside a hot path.
pub fn bind(name: DeviceName, device: Arc<dyn BlockDevice>) {
    let mut devices = DEVICES.write();
    match name {
        DeviceName::Fs => devices.fs = Some(device),
        DeviceName::Swap => devices.swap = Some(device),
    }
}

/// Unbinds the device under `name`, if any.
pub fn unbind(name: DeviceName) {
    let mut devices = DEVICES.write();
    match name {
        DeviceName::Fs => devices.fs = None,
        DeviceName::Swap => devices.swap = None,
    }
}

/// Returns the currently bound `FS` device.
pub fn fs_device() -> Result<Arc<dyn BlockDevice>, KernelError> {
    DEVICES
        .read()
        .fs
        .clone()
        .ok_or(KernelError::IoError)
}

/// Returns the currently bound `SWAP` device.
pub fn swap_device() -> Result<Arc<dyn BlockDevice>, KernelError> {
    DEVICES
        .read()
        .swap
        .clone()
        .ok_or(KernelError::IoError)
}
