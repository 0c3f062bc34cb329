// src/drm/query.rs

//! The "ask size, then ask data" protocol shared by every variable-length
//! DRM query.
//!
//! A request describes its arrays as count/pointer pairs. The first call is
//! made with every pair zeroed so the kernel only reports counts; buffers of
//! exactly those counts are allocated and attached; the second call fills
//! them.

use crate::drm::sys::{DrmModeCardRes, DrmModeGetConnector, ModeInfo};
use log::{trace, warn};
use nix::errno::Errno;

/// A request struct carrying count/pointer pairs for one or more arrays.
pub trait ArrayQuery {
    /// Owned buffers backing the request's arrays.
    type Arrays;

    /// Zeroes every count and pointer field.
    fn clear_arrays(&mut self);

    /// Allocates buffers sized from the counts currently in the request.
    fn allocate(&self) -> Self::Arrays;

    /// Points the request at `arrays`. The buffers must outlive the next call.
    fn attach(&mut self, arrays: &mut Self::Arrays);

    /// Shrinks `arrays` to the counts reported by the data call. Returns
    /// `false` if any reported count exceeds what was allocated.
    fn fit(&self, arrays: &mut Self::Arrays) -> bool;
}

/// Runs the two-call protocol for `request` using `call` to reach the device.
///
/// Both calls are checked independently. A count that grew between the calls
/// means the data call could not be served and is reported as `EAGAIN`.
pub fn query_arrays<Q, F>(mut request: Q, mut call: F) -> nix::Result<(Q, Q::Arrays)>
where
    Q: ArrayQuery,
    F: FnMut(&mut Q) -> nix::Result<()>,
{
    request.clear_arrays();
    call(&mut request)?;

    let mut arrays = request.allocate();
    request.attach(&mut arrays);
    call(&mut request)?;

    if !request.fit(&mut arrays) {
        warn!("Object counts changed between size and data queries");
        return Err(Errno::EAGAIN);
    }
    trace!("Two-phase query completed");
    Ok((request, arrays))
}

fn alloc<T: Default + Clone>(count: u32) -> Vec<T> {
    vec![T::default(); count as usize]
}

fn ptr_of<T>(buf: &mut [T]) -> u64 {
    if buf.is_empty() {
        0
    } else {
        buf.as_mut_ptr() as u64
    }
}

fn fit_one<T>(buf: &mut Vec<T>, reported: u32) -> bool {
    let reported = reported as usize;
    if reported > buf.len() {
        return false;
    }
    buf.truncate(reported);
    true
}

/// Buffers for `DRM_IOCTL_MODE_GETRESOURCES`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResourceArrays {
    pub fbs: Vec<u32>,
    pub crtcs: Vec<u32>,
    pub connectors: Vec<u32>,
    pub encoders: Vec<u32>,
}

impl ArrayQuery for DrmModeCardRes {
    type Arrays = ResourceArrays;

    fn clear_arrays(&mut self) {
        self.fb_id_ptr = 0;
        self.crtc_id_ptr = 0;
        self.connector_id_ptr = 0;
        self.encoder_id_ptr = 0;
        self.count_fbs = 0;
        self.count_crtcs = 0;
        self.count_connectors = 0;
        self.count_encoders = 0;
    }

    fn allocate(&self) -> ResourceArrays {
        ResourceArrays {
            fbs: alloc(self.count_fbs),
            crtcs: alloc(self.count_crtcs),
            connectors: alloc(self.count_connectors),
            encoders: alloc(self.count_encoders),
        }
    }

    fn attach(&mut self, arrays: &mut ResourceArrays) {
        self.fb_id_ptr = ptr_of(&mut arrays.fbs);
        self.crtc_id_ptr = ptr_of(&mut arrays.crtcs);
        self.connector_id_ptr = ptr_of(&mut arrays.connectors);
        self.encoder_id_ptr = ptr_of(&mut arrays.encoders);
    }

    fn fit(&self, arrays: &mut ResourceArrays) -> bool {
        fit_one(&mut arrays.fbs, self.count_fbs)
            & fit_one(&mut arrays.crtcs, self.count_crtcs)
            & fit_one(&mut arrays.connectors, self.count_connectors)
            & fit_one(&mut arrays.encoders, self.count_encoders)
    }
}

/// Buffers for `DRM_IOCTL_MODE_GETCONNECTOR`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConnectorArrays {
    pub modes: Vec<ModeInfo>,
    pub encoders: Vec<u32>,
    pub props: Vec<u32>,
    pub prop_values: Vec<u64>,
}

impl ArrayQuery for DrmModeGetConnector {
    type Arrays = ConnectorArrays;

    fn clear_arrays(&mut self) {
        self.encoders_ptr = 0;
        self.modes_ptr = 0;
        self.props_ptr = 0;
        self.prop_values_ptr = 0;
        self.count_modes = 0;
        self.count_props = 0;
        self.count_encoders = 0;
    }

    fn allocate(&self) -> ConnectorArrays {
        ConnectorArrays {
            modes: alloc(self.count_modes),
            encoders: alloc(self.count_encoders),
            props: alloc(self.count_props),
            prop_values: alloc(self.count_props),
        }
    }

    fn attach(&mut self, arrays: &mut ConnectorArrays) {
        self.modes_ptr = ptr_of(&mut arrays.modes);
        self.encoders_ptr = ptr_of(&mut arrays.encoders);
        self.props_ptr = ptr_of(&mut arrays.props);
        self.prop_values_ptr = ptr_of(&mut arrays.prop_values);
    }

    fn fit(&self, arrays: &mut ConnectorArrays) -> bool {
        fit_one(&mut arrays.modes, self.count_modes)
            & fit_one(&mut arrays.encoders, self.count_encoders)
            & fit_one(&mut arrays.props, self.count_props)
            & fit_one(&mut arrays.prop_values, self.count_props)
    }
}
