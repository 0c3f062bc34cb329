// src/drm/device.rs
//
// Defines the `KmsDevice` trait, the seam between the modesetting logic and
// the kernel control protocol.

use crate::drm::sys::{
    DrmGetCap, DrmModeCardRes, DrmModeCreateDumb, DrmModeCrtc, DrmModeDestroyDumb,
    DrmModeFbCmd, DrmModeGetConnector, DrmModeGetEncoder, DrmModeMapDumb, DRM_CAP_DUMB_BUFFER,
};
use crate::error::{ModesetError, Result};
use log::{debug, warn};
use nix::errno::Errno;
use std::ptr::NonNull;

/// Raw access to one DRM device.
///
/// Each method issues exactly one request of the legacy modesetting
/// interface, passing the request struct through unchanged so the kernel (or
/// a fake standing in for it) can fill in the response fields. Errors are the
/// raw errno reported for the request.
pub trait KmsDevice {
    fn set_master(&self) -> nix::Result<()>;
    fn drop_master(&self) -> nix::Result<()>;
    fn get_cap(&self, cap: &mut DrmGetCap) -> nix::Result<()>;

    fn get_resources(&self, res: &mut DrmModeCardRes) -> nix::Result<()>;
    fn get_connector(&self, conn: &mut DrmModeGetConnector) -> nix::Result<()>;
    fn get_encoder(&self, enc: &mut DrmModeGetEncoder) -> nix::Result<()>;
    fn get_crtc(&self, crtc: &mut DrmModeCrtc) -> nix::Result<()>;
    fn set_crtc(&self, crtc: &mut DrmModeCrtc) -> nix::Result<()>;

    fn create_dumb(&self, req: &mut DrmModeCreateDumb) -> nix::Result<()>;
    fn map_dumb(&self, req: &mut DrmModeMapDumb) -> nix::Result<()>;
    fn destroy_dumb(&self, req: &mut DrmModeDestroyDumb) -> nix::Result<()>;
    fn add_fb(&self, cmd: &mut DrmModeFbCmd) -> nix::Result<()>;
    fn rm_fb(&self, fb_id: u32) -> nix::Result<()>;

    /// Maps `len` bytes of device memory at the fake offset obtained from
    /// `map_dumb`, readable and writable, shared with the device.
    fn map_memory(&self, offset: u64, len: usize) -> nix::Result<Mapping>;

    /// Releases a mapping previously returned by `map_memory` on this device.
    fn unmap_memory(&self, mapping: Mapping) -> nix::Result<()>;
}

/// A region of device memory mapped into this process.
///
/// The mapping is not released on drop; it has to be handed back to
/// [`KmsDevice::unmap_memory`] of the device that created it.
#[derive(Debug)]
pub struct Mapping {
    ptr: NonNull<u8>,
    len: usize,
}

impl Mapping {
    /// # Safety
    ///
    /// `ptr` must point to `len` bytes that stay valid and exclusively owned by
    /// this value until it is passed to `unmap_memory`.
    pub unsafe fn from_raw(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }

    pub fn into_raw(self) -> (NonNull<u8>, usize) {
        (self.ptr, self.len)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

/// Tries to become display master and checks for dumb-buffer support.
///
/// Failing to become master is not an error: the device may already have
/// granted this client master by default. Returns whether master was acquired.
pub fn acquire<D: KmsDevice + ?Sized>(dev: &D) -> Result<bool> {
    let is_master = match dev.set_master() {
        Ok(()) => true,
        Err(errno) => {
            warn!("Could not become DRM master ({}), continuing anyway", errno);
            false
        }
    };

    let mut cap = DrmGetCap {
        capability: DRM_CAP_DUMB_BUFFER,
        value: 0,
    };
    if let Err(errno) = dev.get_cap(&mut cap) {
        release_master(dev, is_master);
        return Err(ModesetError::UnsupportedDevice { errno });
    }
    if cap.value == 0 {
        release_master(dev, is_master);
        return Err(ModesetError::UnsupportedDevice {
            errno: Errno::EOPNOTSUPP,
        });
    }
    debug!("Device supports dumb buffers (master: {})", is_master);
    Ok(is_master)
}

/// Gives up master acquired by [`acquire`]. Failures are only logged.
pub fn release_master<D: KmsDevice + ?Sized>(dev: &D, is_master: bool) {
    if !is_master {
        return;
    }
    if let Err(errno) = dev.drop_master() {
        warn!("Failed to drop DRM master: {}", errno);
    }
}
