// src/error.rs

//! Error taxonomy for device acquisition and per-output configuration.
//!
//! `DeviceOpen` and `UnsupportedDevice` are fatal: nothing can be configured
//! without a usable device. Everything else is scoped to a single connector
//! and only causes that connector to be skipped.

use nix::errno::Errno;
use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ModesetError {
    #[error("cannot open '{}': {source}", path.display())]
    DeviceOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("drm device does not support dumb buffers ({errno})")]
    UnsupportedDevice { errno: Errno },

    #[error("cannot retrieve {what}: {errno}")]
    ResourceQuery { what: String, errno: Errno },

    #[error("connector {connector} is not connected")]
    NotConnected { connector: u32 },

    #[error("no valid mode for connector {connector}")]
    NoMode { connector: u32 },

    #[error("cannot find a suitable CRTC for connector {connector}")]
    NoCrtc { connector: u32 },

    #[error("cannot create {width}x{height} dumb buffer: {errno}")]
    BufferAlloc { width: u32, height: u32, errno: Errno },

    #[error("cannot create framebuffer for dumb buffer {handle}: {errno}")]
    FramebufferRegister { handle: u32, errno: Errno },

    #[error("cannot map dumb buffer {handle}: {errno}")]
    Map { handle: u32, errno: Errno },

    #[error("cannot set CRTC {crtc}: {errno}")]
    CrtcConfig { crtc: u32, errno: Errno },

    #[error("CRTC {crtc} is already claimed by another output")]
    CrtcClaimed { crtc: u32 },
}

pub type Result<T> = std::result::Result<T, ModesetError>;

impl ModesetError {
    /// Underlying OS error code, when the failure came from the kernel.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            ModesetError::DeviceOpen { source, .. } => source.raw_os_error().map(Errno::from_raw),
            ModesetError::UnsupportedDevice { errno }
            | ModesetError::ResourceQuery { errno, .. }
            | ModesetError::BufferAlloc { errno, .. }
            | ModesetError::FramebufferRegister { errno, .. }
            | ModesetError::Map { errno, .. }
            | ModesetError::CrtcConfig { errno, .. } => Some(*errno),
            ModesetError::NotConnected { .. }
            | ModesetError::NoMode { .. }
            | ModesetError::NoCrtc { .. }
            | ModesetError::CrtcClaimed { .. } => None,
        }
    }

    /// Whether the whole run must be aborted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ModesetError::DeviceOpen { .. } | ModesetError::UnsupportedDevice { .. }
        )
    }

    /// Process exit status for this error. Never zero.
    pub fn exit_code(&self) -> u8 {
        match self.errno() {
            Some(errno) => u8::try_from(errno as i32)
                .ok()
                .filter(|code| *code != 0)
                .unwrap_or(1),
            None => 1,
        }
    }
}
