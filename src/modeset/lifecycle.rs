// src/modeset/lifecycle.rs

//! Putting configured outputs on screen and restoring what was there before.

use crate::drm::device::KmsDevice;
use crate::drm::resources;
use crate::modeset::registry::{OutputRecord, OutputRegistry};
use log::{debug, info, warn};

/// Saves each output's current CRTC state, then binds its framebuffer.
///
/// Best effort: a failing output is logged and the rest are still activated.
/// An output whose CRTC state cannot be saved is left off, since it could
/// never be restored. Returns how many outputs are now scanning out their
/// framebuffer.
pub fn activate<D: KmsDevice + ?Sized>(dev: &D, registry: &mut OutputRegistry) -> usize {
    let mut active = 0;
    for output in registry.iter_mut() {
        match resources::get_crtc(dev, output.crtc_id) {
            Ok(saved) => output.saved_crtc = Some(saved),
            Err(e) => {
                warn!(
                    "Cannot save CRTC state for connector {}, leaving it inactive: {}",
                    output.connector_id, e
                );
                continue;
            }
        }

        match resources::set_crtc(
            dev,
            output.crtc_id,
            output.framebuffer.id(),
            (0, 0),
            &[output.connector_id],
            Some(&output.mode),
        ) {
            Ok(()) => {
                info!(
                    "Connector {} active on CRTC {} with framebuffer {}",
                    output.connector_id,
                    output.crtc_id,
                    output.framebuffer.id()
                );
                active += 1;
            }
            Err(e) => warn!("Cannot set CRTC for connector {}: {}", output.connector_id, e),
        }
    }
    active
}

/// Puts the CRTC back the way `activate` found it, driving the connectors it
/// drove before. Falls back to the output's own connector when no connector
/// was seen bound to the CRTC.
fn restore<D: KmsDevice + ?Sized>(dev: &D, output: &OutputRecord) {
    let Some(saved) = output.saved_crtc.as_ref() else {
        debug!("No saved state for CRTC {}, leaving it as is", output.crtc_id);
        return;
    };
    let connectors = if output.prior_connectors.is_empty() {
        std::slice::from_ref(&output.connector_id)
    } else {
        output.prior_connectors.as_slice()
    };
    let mode = (saved.mode_valid != 0).then_some(&saved.mode);
    let result = resources::set_crtc(
        dev,
        saved.crtc_id,
        saved.fb_id,
        (saved.x, saved.y),
        connectors,
        mode,
    );
    match result {
        Ok(()) => debug!(
            "Restored CRTC {} to framebuffer {}",
            saved.crtc_id, saved.fb_id
        ),
        Err(e) => warn!("Cannot restore CRTC {}: {}", saved.crtc_id, e),
    }
}

/// Restores every output's CRTC and releases its buffers, emptying the
/// registry. Each record is visited once; failures are logged and do not stop
/// the pass. Returns the number of records released.
pub fn cleanup<D: KmsDevice + ?Sized>(dev: &D, registry: &mut OutputRegistry) -> usize {
    let mut released = 0;
    for output in registry.drain() {
        // Scanout must stop using the buffer before its memory goes away.
        restore(dev, &output);
        let OutputRecord {
            connector_id,
            framebuffer,
            ..
        } = output;
        if !framebuffer.release(dev) {
            warn!("Buffers of connector {} were not fully released", connector_id);
        }
        released += 1;
    }
    if released > 0 {
        info!("Released {} outputs", released);
    }
    released
}
