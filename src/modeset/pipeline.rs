// src/modeset/pipeline.rs

//! Matching a connector to a mode and a free CRTC.

use crate::drm::device::KmsDevice;
use crate::drm::resources::{self, Connection, Connector, Resources};
use crate::drm::sys::{ModeInfo, ModeType};
use crate::error::{ModesetError, Result};
use crate::modeset::registry::OutputRegistry;
use log::{debug, info, warn};

/// A connector paired with the mode and CRTC it will be driven with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pipeline {
    pub connector_id: u32,
    pub crtc_id: u32,
    pub mode: ModeInfo,
}

/// Picks the first mode the connector reports.
pub fn select_mode(conn: &Connector) -> Result<ModeInfo> {
    let mode = *conn
        .modes
        .first()
        .ok_or(ModesetError::NoMode { connector: conn.id })?;
    info!(
        "Mode for connector {} is {}x{} \"{}\" @ {} Hz{}",
        conn.id,
        mode.width(),
        mode.height(),
        mode.name(),
        mode.vrefresh,
        if mode.mode_type().contains(ModeType::PREFERRED) {
            " (preferred)"
        } else {
            ""
        }
    );
    Ok(mode)
}

/// Finds a CRTC for `conn` that no registered output holds.
///
/// The CRTC already driving the connector is kept when it is free. Otherwise
/// every candidate encoder is asked which CRTCs it can drive; bit `i` of its
/// mask names the `i`-th entry of the global CRTC list. The first free one
/// wins.
pub fn find_crtc<D: KmsDevice + ?Sized>(
    dev: &D,
    res: &Resources,
    conn: &Connector,
    registry: &OutputRegistry,
) -> Result<u32> {
    if let Some(encoder_id) = conn.encoder_id {
        match resources::get_encoder(dev, encoder_id) {
            Ok(encoder) => match encoder.crtc_id {
                Some(crtc_id) if !registry.is_claimed(crtc_id) => {
                    debug!(
                        "Connector {} keeps CRTC {} via encoder {}",
                        conn.id, crtc_id, encoder_id
                    );
                    return Ok(crtc_id);
                }
                Some(crtc_id) => debug!(
                    "CRTC {} of encoder {} is already claimed",
                    crtc_id, encoder_id
                ),
                None => debug!("Encoder {} is not driving any CRTC", encoder_id),
            },
            Err(e) => warn!("{}", e),
        }
    }

    for (index, &encoder_id) in conn.encoders.iter().enumerate() {
        let encoder = match resources::get_encoder(dev, encoder_id) {
            Ok(encoder) => encoder,
            Err(e) => {
                warn!("Skipping encoder {} ({}) of connector {}: {}", index, encoder_id, conn.id, e);
                continue;
            }
        };
        for bit in encoder.possible_crtc_indices(res.crtcs.len()) {
            let Some(crtc_id) = res.crtc_at(bit) else {
                continue;
            };
            if registry.is_claimed(crtc_id) {
                continue;
            }
            debug!(
                "Connector {} gets CRTC {} (index {}) via encoder {}",
                conn.id, crtc_id, bit, encoder_id
            );
            return Ok(crtc_id);
        }
    }

    Err(ModesetError::NoCrtc { connector: conn.id })
}

/// Mode selection and CRTC search for one connector.
pub fn match_pipeline<D: KmsDevice + ?Sized>(
    dev: &D,
    res: &Resources,
    conn: &Connector,
    registry: &OutputRegistry,
) -> Result<Pipeline> {
    if conn.connection == Connection::Disconnected {
        return Err(ModesetError::NotConnected { connector: conn.id });
    }
    let mode = select_mode(conn)?;
    let crtc_id = find_crtc(dev, res, conn, registry)?;
    Ok(Pipeline {
        connector_id: conn.id,
        crtc_id,
        mode,
    })
}
