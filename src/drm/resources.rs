// src/drm/resources.rs

//! Resource enumeration: device-wide object lists and per-object details.

use crate::drm::device::KmsDevice;
use crate::drm::query::{query_arrays, ConnectorArrays, ResourceArrays};
use crate::drm::sys::{
    DrmModeCardRes, DrmModeCrtc, DrmModeGetConnector, DrmModeGetEncoder, ModeInfo,
    DRM_MODE_CONNECTED, DRM_MODE_DISCONNECTED,
};
use crate::error::{ModesetError, Result};
use log::debug;

/// Device-wide object id lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resources {
    /// Fetched for completeness; nothing downstream uses it.
    pub fbs: Vec<u32>,
    pub crtcs: Vec<u32>,
    pub connectors: Vec<u32>,
    pub encoders: Vec<u32>,
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

impl Resources {
    /// Global CRTC id at `index`, the position a `possible_crtcs` bit refers to.
    pub fn crtc_at(&self, index: usize) -> Option<u32> {
        self.crtcs.get(index).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connection {
    Connected,
    Disconnected,
    Unknown,
}

impl From<u32> for Connection {
    fn from(raw: u32) -> Self {
        match raw {
            DRM_MODE_CONNECTED => Connection::Connected,
            DRM_MODE_DISCONNECTED => Connection::Disconnected,
            _ => Connection::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connector {
    pub id: u32,
    /// Currently bound encoder, if any.
    pub encoder_id: Option<u32>,
    pub connector_type: u32,
    pub connector_type_id: u32,
    pub connection: Connection,
    pub mm_width: u32,
    pub mm_height: u32,
    pub modes: Vec<ModeInfo>,
    /// Candidate encoders.
    pub encoders: Vec<u32>,
    pub props: Vec<u32>,
    pub prop_values: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoder {
    pub id: u32,
    pub encoder_type: u32,
    /// Currently bound CRTC, if any.
    pub crtc_id: Option<u32>,
    /// Bit `i` set means the `i`-th global CRTC can be driven.
    pub possible_crtcs: u32,
}

impl Encoder {
    /// Indices into the global CRTC list this encoder can drive, ascending.
    pub fn possible_crtc_indices(&self, crtc_count: usize) -> impl Iterator<Item = usize> + '_ {
        (0..crtc_count.min(32)).filter(move |&bit| self.possible_crtcs & (1 << bit) != 0)
    }
}

fn nonzero(id: u32) -> Option<u32> {
    (id != 0).then_some(id)
}

pub fn get_resources<D: KmsDevice + ?Sized>(dev: &D) -> Result<Resources> {
    let (res, arrays) = query_arrays(DrmModeCardRes::default(), |res| dev.get_resources(res))
        .map_err(|errno| ModesetError::ResourceQuery {
            what: "DRM resources".to_string(),
            errno,
        })?;
    let ResourceArrays {
        fbs,
        crtcs,
        connectors,
        encoders,
    } = arrays;
    debug!(
        "Resources: {} connectors, {} encoders, {} CRTCs, {} framebuffers",
        connectors.len(),
        encoders.len(),
        crtcs.len(),
        fbs.len()
    );
    Ok(Resources {
        fbs,
        crtcs,
        connectors,
        encoders,
        min_width: res.min_width,
        max_width: res.max_width,
        min_height: res.min_height,
        max_height: res.max_height,
    })
}

pub fn get_connector<D: KmsDevice + ?Sized>(dev: &D, connector_id: u32) -> Result<Connector> {
    let request = DrmModeGetConnector {
        connector_id,
        ..Default::default()
    };
    let (conn, arrays) = query_arrays(request, |conn| dev.get_connector(conn)).map_err(|errno| {
        ModesetError::ResourceQuery {
            what: format!("connector {}", connector_id),
            errno,
        }
    })?;
    let ConnectorArrays {
        modes,
        encoders,
        props,
        prop_values,
    } = arrays;
    Ok(Connector {
        id: connector_id,
        encoder_id: nonzero(conn.encoder_id),
        connector_type: conn.connector_type,
        connector_type_id: conn.connector_type_id,
        connection: Connection::from(conn.connection),
        mm_width: conn.mm_width,
        mm_height: conn.mm_height,
        modes,
        encoders,
        props,
        prop_values,
    })
}

pub fn get_encoder<D: KmsDevice + ?Sized>(dev: &D, encoder_id: u32) -> Result<Encoder> {
    let mut enc = DrmModeGetEncoder {
        encoder_id,
        ..Default::default()
    };
    dev.get_encoder(&mut enc)
        .map_err(|errno| ModesetError::ResourceQuery {
            what: format!("encoder {}", encoder_id),
            errno,
        })?;
    Ok(Encoder {
        id: encoder_id,
        encoder_type: enc.encoder_type,
        crtc_id: nonzero(enc.crtc_id),
        possible_crtcs: enc.possible_crtcs,
    })
}

/// Current configuration of a CRTC, in the form SETCRTC accepts back.
pub fn get_crtc<D: KmsDevice + ?Sized>(dev: &D, crtc_id: u32) -> Result<DrmModeCrtc> {
    let mut crtc = DrmModeCrtc {
        crtc_id,
        ..Default::default()
    };
    dev.get_crtc(&mut crtc)
        .map_err(|errno| ModesetError::ResourceQuery {
            what: format!("CRTC {}", crtc_id),
            errno,
        })?;
    Ok(crtc)
}

/// Binds `crtc_id` to `fb_id` scanning out to `connectors` with `mode`.
///
/// `mode == None` disables the CRTC; `fb_id` and `connectors` are then ignored.
pub fn set_crtc<D: KmsDevice + ?Sized>(
    dev: &D,
    crtc_id: u32,
    fb_id: u32,
    (x, y): (u32, u32),
    connectors: &[u32],
    mode: Option<&ModeInfo>,
) -> Result<()> {
    let mut connector_ids = connectors.to_vec();
    let mut req = DrmModeCrtc {
        crtc_id,
        ..Default::default()
    };
    if let Some(mode) = mode {
        req.fb_id = fb_id;
        req.x = x;
        req.y = y;
        req.mode = *mode;
        req.mode_valid = 1;
        req.count_connectors = connector_ids.len() as u32;
        req.set_connectors_ptr = connector_ids.as_mut_ptr() as u64;
    }
    dev.set_crtc(&mut req)
        .map_err(|errno| ModesetError::CrtcConfig {
            crtc: crtc_id,
            errno,
        })
}
