// src/modeset/framebuffer.rs

//! Dumb-buffer allocation, framebuffer registration and CPU mapping.
//!
//! The three steps form a chain: each one depends on the previous one's
//! kernel object. [`Framebuffer::allocate`] records an undo step for every
//! object it commits and, if a later step fails, unwinds exactly those
//! objects newest-first before returning the error.

use crate::drm::device::{KmsDevice, Mapping};
use crate::drm::sys::{DrmModeCreateDumb, DrmModeDestroyDumb, DrmModeFbCmd, DrmModeMapDumb};
use crate::error::{ModesetError, Result};
use log::{debug, warn};
use nix::errno::Errno;
use serde::{Deserialize, Serialize};

/// Pixel layout requested for new buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PixelFormat {
    pub bpp: u32,
    pub depth: u32,
}

impl Default for PixelFormat {
    fn default() -> Self {
        // XRGB8888
        PixelFormat { bpp: 32, depth: 24 }
    }
}

/// A kernel-allocated dumb buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumbBuffer {
    pub handle: u32,
    pub width: u32,
    pub height: u32,
    pub bpp: u32,
    /// Row pitch in bytes; may exceed `width * bpp / 8`.
    pub stride: u32,
    pub size: u64,
}

pub fn create_dumb_buffer<D: KmsDevice + ?Sized>(
    dev: &D,
    width: u32,
    height: u32,
    bpp: u32,
) -> Result<DumbBuffer> {
    let mut req = DrmModeCreateDumb {
        width,
        height,
        bpp,
        ..Default::default()
    };
    dev.create_dumb(&mut req)
        .map_err(|errno| ModesetError::BufferAlloc {
            width,
            height,
            errno,
        })?;
    debug!(
        "Created {}x{} dumb buffer {} (pitch {}, {} bytes)",
        width, height, req.handle, req.pitch, req.size
    );
    Ok(DumbBuffer {
        handle: req.handle,
        width,
        height,
        bpp,
        stride: req.pitch,
        size: req.size,
    })
}

/// Registers `buffer` as a scanout framebuffer and returns its id.
pub fn register_framebuffer<D: KmsDevice + ?Sized>(
    dev: &D,
    buffer: &DumbBuffer,
    depth: u32,
) -> Result<u32> {
    let mut cmd = DrmModeFbCmd {
        width: buffer.width,
        height: buffer.height,
        pitch: buffer.stride,
        bpp: buffer.bpp,
        depth,
        handle: buffer.handle,
        ..Default::default()
    };
    dev.add_fb(&mut cmd)
        .map_err(|errno| ModesetError::FramebufferRegister {
            handle: buffer.handle,
            errno,
        })?;
    debug!("Registered framebuffer {} for dumb buffer {}", cmd.fb_id, buffer.handle);
    Ok(cmd.fb_id)
}

/// Maps `size` bytes of the dumb buffer `handle` and zero-fills them.
pub fn map_buffer<D: KmsDevice + ?Sized>(dev: &D, handle: u32, size: u64) -> Result<Mapping> {
    let map_err = |errno| ModesetError::Map { handle, errno };

    let len = usize::try_from(size).map_err(|_| map_err(Errno::EOVERFLOW))?;
    if len == 0 {
        return Err(map_err(Errno::EINVAL));
    }

    let mut req = DrmModeMapDumb {
        handle,
        ..Default::default()
    };
    dev.map_dumb(&mut req).map_err(map_err)?;
    let mut mapping = dev.map_memory(req.offset, len).map_err(map_err)?;
    mapping.as_mut_slice().fill(0);
    Ok(mapping)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Undo {
    DestroyDumb(u32),
    RemoveFramebuffer(u32),
}

/// Undo steps for a partially built buffer chain, run newest-first on drop
/// unless disarmed.
struct Rollback<'a, D: KmsDevice + ?Sized> {
    dev: &'a D,
    steps: Vec<Undo>,
}

impl<'a, D: KmsDevice + ?Sized> Rollback<'a, D> {
    fn new(dev: &'a D) -> Self {
        Self {
            dev,
            steps: Vec::new(),
        }
    }

    fn push(&mut self, step: Undo) {
        self.steps.push(step);
    }

    fn disarm(&mut self) {
        self.steps.clear();
    }
}

impl<D: KmsDevice + ?Sized> Drop for Rollback<'_, D> {
    fn drop(&mut self) {
        while let Some(step) = self.steps.pop() {
            debug!("Rolling back {:?}", step);
            let result = match step {
                Undo::RemoveFramebuffer(fb_id) => self.dev.rm_fb(fb_id),
                Undo::DestroyDumb(handle) => self
                    .dev
                    .destroy_dumb(&mut DrmModeDestroyDumb { handle }),
            };
            if let Err(errno) = result {
                warn!("Rollback step {:?} failed: {}", step, errno);
            }
        }
    }
}

/// A mapped, registered dumb buffer ready for scanout.
#[derive(Debug)]
pub struct Framebuffer {
    buffer: DumbBuffer,
    fb_id: u32,
    map: Mapping,
}

impl Framebuffer {
    /// Allocates, registers and maps a `width`x`height` buffer.
    ///
    /// Either all three kernel objects exist afterwards or none do.
    pub fn allocate<D: KmsDevice + ?Sized>(
        dev: &D,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Self> {
        let mut rollback = Rollback::new(dev);

        let buffer = create_dumb_buffer(dev, width, height, format.bpp)?;
        rollback.push(Undo::DestroyDumb(buffer.handle));

        let fb_id = register_framebuffer(dev, &buffer, format.depth)?;
        rollback.push(Undo::RemoveFramebuffer(fb_id));

        let map = map_buffer(dev, buffer.handle, buffer.size)?;

        rollback.disarm();
        Ok(Framebuffer { buffer, fb_id, map })
    }

    pub fn id(&self) -> u32 {
        self.fb_id
    }

    pub fn handle(&self) -> u32 {
        self.buffer.handle
    }

    pub fn width(&self) -> u32 {
        self.buffer.width
    }

    pub fn height(&self) -> u32 {
        self.buffer.height
    }

    pub fn stride(&self) -> u32 {
        self.buffer.stride
    }

    pub fn bpp(&self) -> u32 {
        self.buffer.bpp
    }

    pub fn size(&self) -> u64 {
        self.buffer.size
    }

    pub fn pixels(&self) -> &[u8] {
        self.map.as_slice()
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        self.map.as_mut_slice()
    }

    /// Unmaps, unregisters and destroys the buffer, in that order.
    ///
    /// Every step is attempted even if an earlier one fails; failures are
    /// logged. Returns whether all steps succeeded.
    pub fn release<D: KmsDevice + ?Sized>(self, dev: &D) -> bool {
        let Framebuffer { buffer, fb_id, map } = self;
        let mut clean = true;

        if let Err(errno) = dev.unmap_memory(map) {
            warn!("Failed to unmap dumb buffer {}: {}", buffer.handle, errno);
            clean = false;
        }
        if let Err(errno) = dev.rm_fb(fb_id) {
            warn!("Failed to remove framebuffer {}: {}", fb_id, errno);
            clean = false;
        }
        if let Err(errno) = dev.destroy_dumb(&mut DrmModeDestroyDumb {
            handle: buffer.handle,
        }) {
            warn!("Failed to destroy dumb buffer {}: {}", buffer.handle, errno);
            clean = false;
        }
        clean
    }
}
