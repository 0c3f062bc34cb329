// src/drm/sys.rs

//! Fixed-layout request structures and ioctl request codes of the legacy DRM
//! modesetting interface (`drm.h` / `drm_mode.h`).
//!
//! Field names, order and widths mirror the kernel headers exactly; these
//! structs are handed to the kernel by pointer.

use bitflags::bitflags;

/// DRM ioctl type byte (`DRM_IOCTL_BASE`).
const DRM_IOCTL_BASE: u8 = b'd';

pub const DRM_CAP_DUMB_BUFFER: u64 = 0x1;
pub const DRM_DISPLAY_MODE_LEN: usize = 32;

pub const DRM_MODE_CONNECTED: u32 = 1;
pub const DRM_MODE_DISCONNECTED: u32 = 2;

bitflags! {
    /// `drm_mode_modeinfo::type_` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModeType: u32 {
        const BUILTIN = 1 << 0;
        const CLOCK_C = (1 << 1) | Self::BUILTIN.bits();
        const CRTC_C = (1 << 2) | Self::BUILTIN.bits();
        const PREFERRED = 1 << 3;
        const DEFAULT = 1 << 4;
        const USERDEF = 1 << 5;
        const DRIVER = 1 << 6;
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrmGetCap {
    pub capability: u64,
    pub value: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrmModeCardRes {
    pub fb_id_ptr: u64,
    pub crtc_id_ptr: u64,
    pub connector_id_ptr: u64,
    pub encoder_id_ptr: u64,
    pub count_fbs: u32,
    pub count_crtcs: u32,
    pub count_connectors: u32,
    pub count_encoders: u32,
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

/// A display mode (`struct drm_mode_modeinfo`). Copied by value.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeInfo {
    pub clock: u32,
    pub hdisplay: u16,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub hskew: u16,
    pub vdisplay: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    pub vscan: u16,
    pub vrefresh: u32,
    pub flags: u32,
    pub type_: u32,
    pub name: [u8; DRM_DISPLAY_MODE_LEN],
}

impl ModeInfo {
    pub fn width(&self) -> u32 {
        u32::from(self.hdisplay)
    }

    pub fn height(&self) -> u32 {
        u32::from(self.vdisplay)
    }

    pub fn mode_type(&self) -> ModeType {
        ModeType::from_bits_truncate(self.type_)
    }

    /// The mode name up to the first NUL, lossily decoded.
    pub fn name(&self) -> String {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(DRM_DISPLAY_MODE_LEN);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrmModeCrtc {
    pub set_connectors_ptr: u64,
    pub count_connectors: u32,
    pub crtc_id: u32,
    pub fb_id: u32,
    pub x: u32,
    pub y: u32,
    pub gamma_size: u32,
    pub mode_valid: u32,
    pub mode: ModeInfo,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrmModeGetEncoder {
    pub encoder_id: u32,
    pub encoder_type: u32,
    pub crtc_id: u32,
    pub possible_crtcs: u32,
    pub possible_clones: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrmModeGetConnector {
    pub encoders_ptr: u64,
    pub modes_ptr: u64,
    pub props_ptr: u64,
    pub prop_values_ptr: u64,
    pub count_modes: u32,
    pub count_props: u32,
    pub count_encoders: u32,
    pub encoder_id: u32,
    pub connector_id: u32,
    pub connector_type: u32,
    pub connector_type_id: u32,
    pub connection: u32,
    pub mm_width: u32,
    pub mm_height: u32,
    pub subpixel: u32,
    pub pad: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrmModeFbCmd {
    pub fb_id: u32,
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub bpp: u32,
    pub depth: u32,
    pub handle: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrmModeCreateDumb {
    pub height: u32,
    pub width: u32,
    pub bpp: u32,
    pub flags: u32,
    pub handle: u32,
    pub pitch: u32,
    pub size: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrmModeMapDumb {
    pub handle: u32,
    pub pad: u32,
    pub offset: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrmModeDestroyDumb {
    pub handle: u32,
}

nix::ioctl_none!(drm_set_master, DRM_IOCTL_BASE, 0x1e);
nix::ioctl_none!(drm_drop_master, DRM_IOCTL_BASE, 0x1f);
nix::ioctl_readwrite!(drm_get_cap, DRM_IOCTL_BASE, 0x0c, DrmGetCap);
nix::ioctl_readwrite!(drm_mode_get_resources, DRM_IOCTL_BASE, 0xa0, DrmModeCardRes);
nix::ioctl_readwrite!(drm_mode_get_crtc, DRM_IOCTL_BASE, 0xa1, DrmModeCrtc);
nix::ioctl_readwrite!(drm_mode_set_crtc, DRM_IOCTL_BASE, 0xa2, DrmModeCrtc);
nix::ioctl_readwrite!(drm_mode_get_encoder, DRM_IOCTL_BASE, 0xa6, DrmModeGetEncoder);
nix::ioctl_readwrite!(drm_mode_get_connector, DRM_IOCTL_BASE, 0xa7, DrmModeGetConnector);
nix::ioctl_readwrite!(drm_mode_add_fb, DRM_IOCTL_BASE, 0xae, DrmModeFbCmd);
nix::ioctl_readwrite!(drm_mode_rm_fb, DRM_IOCTL_BASE, 0xaf, libc::c_uint);
nix::ioctl_readwrite!(drm_mode_create_dumb, DRM_IOCTL_BASE, 0xb2, DrmModeCreateDumb);
nix::ioctl_readwrite!(drm_mode_map_dumb, DRM_IOCTL_BASE, 0xb3, DrmModeMapDumb);
nix::ioctl_readwrite!(drm_mode_destroy_dumb, DRM_IOCTL_BASE, 0xb4, DrmModeDestroyDumb);
