// src/modeset/registry.rs

//! The set of configured outputs and the CRTCs they hold.

use crate::drm::sys::{DrmModeCrtc, ModeInfo};
use crate::modeset::framebuffer::Framebuffer;
use std::collections::HashSet;

/// One fully configured output: a connector driven by a CRTC scanning out a
/// mapped framebuffer.
#[derive(Debug)]
pub struct OutputRecord {
    pub connector_id: u32,
    pub crtc_id: u32,
    pub mode: ModeInfo,
    pub framebuffer: Framebuffer,
    /// CRTC configuration captured right before this output was activated.
    pub saved_crtc: Option<DrmModeCrtc>,
    /// Connectors the CRTC was driving when the device was enumerated.
    pub prior_connectors: Vec<u32>,
}

impl OutputRecord {
    pub fn new(connector_id: u32, crtc_id: u32, mode: ModeInfo, framebuffer: Framebuffer) -> Self {
        Self {
            connector_id,
            crtc_id,
            mode,
            framebuffer,
            saved_crtc: None,
            prior_connectors: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.framebuffer.width()
    }

    pub fn height(&self) -> u32 {
        self.framebuffer.height()
    }
}

/// Configured outputs, newest first, plus the CRTC ids they claim.
///
/// No two records ever share a CRTC: `register` checks and claims in the same
/// exclusive borrow, so a claim can never be observed half-made.
#[derive(Debug, Default)]
pub struct OutputRegistry {
    // Discovery order; iteration reverses it.
    outputs: Vec<OutputRecord>,
    claimed: HashSet<u32>,
}

impl OutputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_claimed(&self, crtc_id: u32) -> bool {
        self.claimed.contains(&crtc_id)
    }

    /// Adds `record` and claims its CRTC. If the CRTC is already claimed the
    /// record is handed back untouched.
    pub fn register(&mut self, record: OutputRecord) -> Result<(), OutputRecord> {
        if !self.claimed.insert(record.crtc_id) {
            return Err(record);
        }
        self.outputs.push(record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Records, most recently discovered first.
    pub fn iter(&self) -> impl Iterator<Item = &OutputRecord> {
        self.outputs.iter().rev()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut OutputRecord> {
        self.outputs.iter_mut().rev()
    }

    /// Removes every record, most recently discovered first, and releases all
    /// CRTC claims.
    pub fn drain(&mut self) -> impl Iterator<Item = OutputRecord> + '_ {
        self.claimed.clear();
        self.outputs.drain(..).rev()
    }
}
