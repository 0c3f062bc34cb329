// src/modeset/mod.rs

//! Building the set of outputs: for every connector, pick a mode and CRTC,
//! allocate a framebuffer, and register the result.

pub mod framebuffer;
pub mod lifecycle;
pub mod pipeline;
pub mod registry;


pub use framebuffer::{Framebuffer, PixelFormat};
pub use lifecycle::{activate, cleanup};
pub use registry::{OutputRecord, OutputRegistry};

use crate::drm::device::KmsDevice;
use crate::drm::resources::{self, Connector, Resources};
use crate::error::{ModesetError, Result};
use log::{debug, info, warn};
use std::collections::HashMap;

/// Enumerates the device and configures every connector that can be driven.
///
/// Only a failure to list the device's resources is returned; problems with a
/// single connector are logged and that connector is skipped.
pub fn prepare<D: KmsDevice + ?Sized>(dev: &D, format: PixelFormat) -> Result<OutputRegistry> {
    let res = resources::get_resources(dev)?;
    let mut registry = OutputRegistry::new();
    // (connector, bound encoder) as found before anything is changed.
    let mut bindings = Vec::new();

    for (index, &connector_id) in res.connectors.iter().enumerate() {
        let conn = match resources::get_connector(dev, connector_id) {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Skipping connector {} ({}): {}", index, connector_id, e);
                continue;
            }
        };
        if let Some(encoder_id) = conn.encoder_id {
            bindings.push((conn.id, encoder_id));
        }

        match setup_output(dev, &res, &conn, &registry, format) {
            Ok(output) => {
                info!(
                    "Connector {} configured: CRTC {}, {}x{} framebuffer {}",
                    output.connector_id,
                    output.crtc_id,
                    output.width(),
                    output.height(),
                    output.framebuffer.id()
                );
                if let Err(rejected) = registry.register(output) {
                    warn!(
                        "{}",
                        ModesetError::CrtcClaimed {
                            crtc: rejected.crtc_id
                        }
                    );
                    rejected.framebuffer.release(dev);
                }
            }
            Err(e @ (ModesetError::NotConnected { .. } | ModesetError::NoMode { .. })) => {
                info!("Skipping connector {}: {}", connector_id, e);
            }
            Err(e) => {
                warn!(
                    "Cannot set up device for connector {} ({}): {}",
                    index, connector_id, e
                );
            }
        }
    }

    record_prior_connectors(dev, &bindings, &mut registry);

    info!(
        "{} of {} connectors configured",
        registry.len(),
        res.connectors.len()
    );
    Ok(registry)
}

fn setup_output<D: KmsDevice + ?Sized>(
    dev: &D,
    res: &Resources,
    conn: &Connector,
    registry: &OutputRegistry,
    format: PixelFormat,
) -> Result<OutputRecord> {
    let pipeline = pipeline::match_pipeline(dev, res, conn, registry)?;
    let framebuffer = Framebuffer::allocate(
        dev,
        pipeline.mode.width(),
        pipeline.mode.height(),
        format,
    )?;
    Ok(OutputRecord::new(
        pipeline.connector_id,
        pipeline.crtc_id,
        pipeline.mode,
        framebuffer,
    ))
}

/// Notes on every output which connectors its CRTC was driving before this
/// program touched it. An encoder that cannot be queried counts as unbound.
fn record_prior_connectors<D: KmsDevice + ?Sized>(
    dev: &D,
    bindings: &[(u32, u32)],
    registry: &mut OutputRegistry,
) {
    if registry.is_empty() {
        return;
    }
    let mut crtc_of: HashMap<u32, Option<u32>> = HashMap::new();
    for &(_, encoder_id) in bindings {
        crtc_of.entry(encoder_id).or_insert_with(|| {
            match resources::get_encoder(dev, encoder_id) {
                Ok(encoder) => encoder.crtc_id,
                Err(e) => {
                    debug!("Cannot read binding of encoder {}: {}", encoder_id, e);
                    None
                }
            }
        });
    }
    for output in registry.iter_mut() {
        output.prior_connectors = bindings
            .iter()
            .filter(|(_, encoder_id)| {
                crtc_of.get(encoder_id).copied().flatten() == Some(output.crtc_id)
            })
            .map(|&(connector_id, _)| connector_id)
            .collect();
        if !output.prior_connectors.is_empty() {
            debug!(
                "CRTC {} was driving connectors {:?}",
                output.crtc_id, output.prior_connectors
            );
        }
    }
}
