// src/drm/card.rs

//! The real DRM device handle, backed by an open `/dev/dri/card*` node.

use crate::drm::device::{self, KmsDevice, Mapping};
use crate::drm::sys::{
    self, DrmGetCap, DrmModeCardRes, DrmModeCreateDumb, DrmModeCrtc, DrmModeDestroyDumb,
    DrmModeFbCmd, DrmModeGetConnector, DrmModeGetEncoder, DrmModeMapDumb,
};
use crate::error::{ModesetError, Result};
use log::{debug, trace};
use nix::errno::Errno;
use nix::sys::mman::{self, MapFlags, ProtFlags};
use std::fs::OpenOptions;
use std::num::NonZeroUsize;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// An open DRM device. Master is dropped and the descriptor closed on drop.
#[derive(Debug)]
pub struct Card {
    fd: OwnedFd,
    path: PathBuf,
    is_master: bool,
}

impl Card {
    /// Opens `path` read/write and verifies it can serve dumb buffers.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(path)
            .map_err(|source| ModesetError::DeviceOpen {
                path: path.to_path_buf(),
                source,
            })?;

        let mut card = Card {
            fd: OwnedFd::from(file),
            path: path.to_path_buf(),
            is_master: false,
        };
        debug!("Opened DRM device '{}' (fd {})", path.display(), card.raw_fd());

        // On failure `card` drops here and closes the descriptor.
        card.is_master = device::acquire(&card)?;
        Ok(card)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl KmsDevice for Card {
    fn set_master(&self) -> nix::Result<()> {
        unsafe { sys::drm_set_master(self.raw_fd()) }.map(drop)
    }

    fn drop_master(&self) -> nix::Result<()> {
        unsafe { sys::drm_drop_master(self.raw_fd()) }.map(drop)
    }

    fn get_cap(&self, cap: &mut DrmGetCap) -> nix::Result<()> {
        unsafe { sys::drm_get_cap(self.raw_fd(), cap) }.map(drop)
    }

    fn get_resources(&self, res: &mut DrmModeCardRes) -> nix::Result<()> {
        trace!("GETRESOURCES on fd {}", self.raw_fd());
        unsafe { sys::drm_mode_get_resources(self.raw_fd(), res) }.map(drop)
    }

    fn get_connector(&self, conn: &mut DrmModeGetConnector) -> nix::Result<()> {
        trace!("GETCONNECTOR {} on fd {}", conn.connector_id, self.raw_fd());
        unsafe { sys::drm_mode_get_connector(self.raw_fd(), conn) }.map(drop)
    }

    fn get_encoder(&self, enc: &mut DrmModeGetEncoder) -> nix::Result<()> {
        trace!("GETENCODER {} on fd {}", enc.encoder_id, self.raw_fd());
        unsafe { sys::drm_mode_get_encoder(self.raw_fd(), enc) }.map(drop)
    }

    fn get_crtc(&self, crtc: &mut DrmModeCrtc) -> nix::Result<()> {
        trace!("GETCRTC {} on fd {}", crtc.crtc_id, self.raw_fd());
        unsafe { sys::drm_mode_get_crtc(self.raw_fd(), crtc) }.map(drop)
    }

    fn set_crtc(&self, crtc: &mut DrmModeCrtc) -> nix::Result<()> {
        trace!(
            "SETCRTC {} fb {} connectors {} on fd {}",
            crtc.crtc_id,
            crtc.fb_id,
            crtc.count_connectors,
            self.raw_fd()
        );
        unsafe { sys::drm_mode_set_crtc(self.raw_fd(), crtc) }.map(drop)
    }

    fn create_dumb(&self, req: &mut DrmModeCreateDumb) -> nix::Result<()> {
        unsafe { sys::drm_mode_create_dumb(self.raw_fd(), req) }.map(drop)
    }

    fn map_dumb(&self, req: &mut DrmModeMapDumb) -> nix::Result<()> {
        unsafe { sys::drm_mode_map_dumb(self.raw_fd(), req) }.map(drop)
    }

    fn destroy_dumb(&self, req: &mut DrmModeDestroyDumb) -> nix::Result<()> {
        unsafe { sys::drm_mode_destroy_dumb(self.raw_fd(), req) }.map(drop)
    }

    fn add_fb(&self, cmd: &mut DrmModeFbCmd) -> nix::Result<()> {
        unsafe { sys::drm_mode_add_fb(self.raw_fd(), cmd) }.map(drop)
    }

    fn rm_fb(&self, fb_id: u32) -> nix::Result<()> {
        let mut id: libc::c_uint = fb_id;
        unsafe { sys::drm_mode_rm_fb(self.raw_fd(), &mut id) }.map(drop)
    }

    fn map_memory(&self, offset: u64, len: usize) -> nix::Result<Mapping> {
        let length = NonZeroUsize::new(len).ok_or(Errno::EINVAL)?;
        let offset = libc::off_t::try_from(offset).map_err(|_| Errno::EOVERFLOW)?;
        let ptr = unsafe {
            mman::mmap(
                None,
                length,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                &self.fd,
                offset,
            )?
        };
        trace!("Mapped {} bytes at {:p} (offset {:#x})", len, ptr, offset);
        Ok(unsafe { Mapping::from_raw(ptr.cast(), len) })
    }

    fn unmap_memory(&self, mapping: Mapping) -> nix::Result<()> {
        let (ptr, len) = mapping.into_raw();
        unsafe { mman::munmap(ptr.cast(), len) }
    }
}

impl Drop for Card {
    fn drop(&mut self) {
        device::release_master(&*self, self.is_master);
        debug!(
            "Closing DRM device '{}' (fd {})",
            self.path.display(),
            self.raw_fd()
        );
    }
}
