// src/drm/fake.rs

//! In-memory stand-in for a DRM device, used by tests to drive enumeration,
//! allocation and restoration without hardware.
//!
//! It follows the kernel's contracts closely enough to catch protocol misuse
//! (arrays are only filled when the caller provided room for them, SETCRTC
//! with a mode needs connectors, objects must exist) and keeps an ordered log
//! of every request plus live-object accounting.

use crate::drm::device::{KmsDevice, Mapping};
use crate::drm::sys::{
    DrmGetCap, DrmModeCardRes, DrmModeCreateDumb, DrmModeCrtc, DrmModeDestroyDumb,
    DrmModeFbCmd, DrmModeGetConnector, DrmModeGetEncoder, DrmModeMapDumb, ModeInfo,
    DRM_CAP_DUMB_BUFFER, DRM_MODE_CONNECTED,
};
use nix::errno::Errno;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::ptr::NonNull;

const PITCH_ALIGN: u32 = 64;
const MAP_OFFSET_SHIFT: u32 = 12;
const MAP_POISON: u8 = 0xa5;
/// Framebuffers at or above this id belong to whoever configured the CRTCs
/// before the test started.
const PREEXISTING_FB_BASE: u32 = 900;

/// Requests that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    SetMaster,
    GetCap,
    NoDumbCap,
    GetResources,
    GetConnector(u32),
    GetEncoder(u32),
    GetCrtc(u32),
    SetCrtc(u32),
    CreateDumb,
    AddFb,
    MapDumb,
    Mmap,
}

/// One request as observed by the fake, in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SetMaster,
    DropMaster,
    GetCap,
    GetResources,
    GetConnector(u32),
    GetEncoder(u32),
    GetCrtc(u32),
    SetCrtc {
        crtc: u32,
        fb: u32,
        connectors: Vec<u32>,
    },
    CreateDumb {
        handle: u32,
    },
    AddFb {
        fb: u32,
        handle: u32,
    },
    MapDumb {
        handle: u32,
    },
    Mmap {
        handle: u32,
    },
    Munmap {
        len: usize,
    },
    RmFb {
        fb: u32,
    },
    DestroyDumb {
        handle: u32,
    },
}

impl Call {
    /// Whether this request allocates or releases a buffer-chain object.
    pub fn is_buffer_call(&self) -> bool {
        matches!(
            self,
            Call::CreateDumb { .. }
                | Call::AddFb { .. }
                | Call::MapDumb { .. }
                | Call::Mmap { .. }
                | Call::Munmap { .. }
                | Call::RmFb { .. }
                | Call::DestroyDumb { .. }
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    pub id: u32,
    pub encoder_id: u32,
    pub connection: u32,
    pub modes: Vec<ModeInfo>,
    pub encoders: Vec<u32>,
    pub props: Vec<(u32, u64)>,
}

impl FakeConnector {
    /// A connected connector offering `modes` through `encoders`.
    pub fn new(id: u32, modes: &[(u16, u16)], encoders: &[u32]) -> Self {
        Self {
            id,
            encoder_id: 0,
            connection: DRM_MODE_CONNECTED,
            modes: modes.iter().map(|&(w, h)| mode(w, h)).collect(),
            encoders: encoders.to_vec(),
            props: vec![(1, 0), (2, 3)],
        }
    }

    pub fn bound_to(mut self, encoder_id: u32) -> Self {
        self.encoder_id = encoder_id;
        self
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FakeEncoder {
    pub id: u32,
    pub crtc_id: u32,
    pub possible_crtcs: u32,
}

/// A 60 Hz mode of the given size named like the kernel names them.
pub fn mode(width: u16, height: u16) -> ModeInfo {
    let mut mode = ModeInfo {
        hdisplay: width,
        vdisplay: height,
        htotal: width + 160,
        vtotal: height + 45,
        vrefresh: 60,
        ..Default::default()
    };
    let name = format!("{}x{}", width, height);
    mode.name[..name.len()].copy_from_slice(name.as_bytes());
    mode
}

#[derive(Debug, Default)]
struct State {
    connectors: Vec<FakeConnector>,
    encoders: Vec<FakeEncoder>,
    crtcs: Vec<u32>,
    crtc_state: HashMap<u32, DrmModeCrtc>,
    faults: HashSet<Fault>,
    calls: Vec<Call>,
    next_handle: u32,
    next_fb: u32,
    dumbs: HashMap<u32, u64>,
    fbs: HashMap<u32, u32>,
    mappings: usize,
    dumbs_created: usize,
    dumbs_destroyed: usize,
}

impl State {
    fn check(&self, fault: Fault) -> nix::Result<()> {
        if self.faults.contains(&fault) {
            Err(Errno::EIO)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeDevice {
    state: RefCell<State>,
}

unsafe fn write_array<T: Copy>(ptr: u64, items: &[T]) {
    if items.is_empty() {
        return;
    }
    let out = std::slice::from_raw_parts_mut(ptr as *mut T, items.len());
    out.copy_from_slice(items);
}

impl FakeDevice {
    pub fn new() -> Self {
        let dev = Self::default();
        {
            let mut state = dev.state.borrow_mut();
            state.next_handle = 1;
            state.next_fb = 100;
        }
        dev
    }

    /// Adds CRTCs in global list order. Each starts out scanning out a
    /// pre-existing framebuffer so restoration can be observed.
    pub fn with_crtcs(self, ids: &[u32]) -> Self {
        {
            let mut state = self.state.borrow_mut();
            for (index, &id) in ids.iter().enumerate() {
                state.crtcs.push(id);
                state.crtc_state.insert(
                    id,
                    DrmModeCrtc {
                        crtc_id: id,
                        fb_id: PREEXISTING_FB_BASE + index as u32,
                        mode_valid: 1,
                        mode: mode(1024, 768),
                        ..Default::default()
                    },
                );
            }
        }
        self
    }

    pub fn with_encoder(self, id: u32, crtc_id: u32, possible_crtcs: u32) -> Self {
        self.state.borrow_mut().encoders.push(FakeEncoder {
            id,
            crtc_id,
            possible_crtcs,
        });
        self
    }

    pub fn with_connector(self, connector: FakeConnector) -> Self {
        self.state.borrow_mut().connectors.push(connector);
        self
    }

    pub fn fail(self, fault: Fault) -> Self {
        self.state.borrow_mut().faults.insert(fault);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn live_dumb_buffers(&self) -> usize {
        self.state.borrow().dumbs.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.state.borrow().fbs.len()
    }

    pub fn live_mappings(&self) -> usize {
        self.state.borrow().mappings
    }

    /// (created, destroyed) dumb buffer counts over the device's lifetime.
    pub fn dumb_balance(&self) -> (usize, usize) {
        let state = self.state.borrow();
        (state.dumbs_created, state.dumbs_destroyed)
    }

    pub fn crtc_state(&self, crtc_id: u32) -> Option<DrmModeCrtc> {
        self.state.borrow().crtc_state.get(&crtc_id).copied()
    }

    fn log(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl KmsDevice for FakeDevice {
    fn set_master(&self) -> nix::Result<()> {
        self.log(Call::SetMaster);
        if self.state.borrow().faults.contains(&Fault::SetMaster) {
            return Err(Errno::EACCES);
        }
        Ok(())
    }

    fn drop_master(&self) -> nix::Result<()> {
        self.log(Call::DropMaster);
        Ok(())
    }

    fn get_cap(&self, cap: &mut DrmGetCap) -> nix::Result<()> {
        self.log(Call::GetCap);
        let state = self.state.borrow();
        state.check(Fault::GetCap)?;
        cap.value = match cap.capability {
            DRM_CAP_DUMB_BUFFER if !state.faults.contains(&Fault::NoDumbCap) => 1,
            _ => 0,
        };
        Ok(())
    }

    fn get_resources(&self, res: &mut DrmModeCardRes) -> nix::Result<()> {
        self.log(Call::GetResources);
        let state = self.state.borrow();
        state.check(Fault::GetResources)?;

        let connectors: Vec<u32> = state.connectors.iter().map(|c| c.id).collect();
        let encoders: Vec<u32> = state.encoders.iter().map(|e| e.id).collect();
        let fbs: Vec<u32> = state.fbs.keys().copied().collect();

        unsafe {
            if res.count_fbs as usize >= fbs.len() && res.fb_id_ptr != 0 {
                write_array(res.fb_id_ptr, &fbs);
            }
            if res.count_crtcs as usize >= state.crtcs.len() && res.crtc_id_ptr != 0 {
                write_array(res.crtc_id_ptr, &state.crtcs);
            }
            if res.count_connectors as usize >= connectors.len() && res.connector_id_ptr != 0 {
                write_array(res.connector_id_ptr, &connectors);
            }
            if res.count_encoders as usize >= encoders.len() && res.encoder_id_ptr != 0 {
                write_array(res.encoder_id_ptr, &encoders);
            }
        }
        res.count_fbs = fbs.len() as u32;
        res.count_crtcs = state.crtcs.len() as u32;
        res.count_connectors = connectors.len() as u32;
        res.count_encoders = encoders.len() as u32;
        res.min_width = 1;
        res.max_width = 8192;
        res.min_height = 1;
        res.max_height = 8192;
        Ok(())
    }

    fn get_connector(&self, conn: &mut DrmModeGetConnector) -> nix::Result<()> {
        self.log(Call::GetConnector(conn.connector_id));
        let state = self.state.borrow();
        state.check(Fault::GetConnector(conn.connector_id))?;
        let fake = state
            .connectors
            .iter()
            .find(|c| c.id == conn.connector_id)
            .ok_or(Errno::ENOENT)?;

        let props: Vec<u32> = fake.props.iter().map(|p| p.0).collect();
        let values: Vec<u64> = fake.props.iter().map(|p| p.1).collect();
        unsafe {
            if conn.count_modes as usize >= fake.modes.len() && conn.modes_ptr != 0 {
                write_array(conn.modes_ptr, &fake.modes);
            }
            if conn.count_encoders as usize >= fake.encoders.len() && conn.encoders_ptr != 0 {
                write_array(conn.encoders_ptr, &fake.encoders);
            }
            if conn.count_props as usize >= props.len() && conn.props_ptr != 0 {
                write_array(conn.props_ptr, &props);
                write_array(conn.prop_values_ptr, &values);
            }
        }
        conn.count_modes = fake.modes.len() as u32;
        conn.count_encoders = fake.encoders.len() as u32;
        conn.count_props = props.len() as u32;
        conn.encoder_id = fake.encoder_id;
        conn.connection = fake.connection;
        conn.connector_type = 11; // HDMI-A
        conn.connector_type_id = 1;
        conn.mm_width = 520;
        conn.mm_height = 290;
        Ok(())
    }

    fn get_encoder(&self, enc: &mut DrmModeGetEncoder) -> nix::Result<()> {
        self.log(Call::GetEncoder(enc.encoder_id));
        let state = self.state.borrow();
        state.check(Fault::GetEncoder(enc.encoder_id))?;
        let fake = state
            .encoders
            .iter()
            .find(|e| e.id == enc.encoder_id)
            .ok_or(Errno::ENOENT)?;
        enc.encoder_type = 2; // TMDS
        enc.crtc_id = fake.crtc_id;
        enc.possible_crtcs = fake.possible_crtcs;
        enc.possible_clones = 0;
        Ok(())
    }

    fn get_crtc(&self, crtc: &mut DrmModeCrtc) -> nix::Result<()> {
        self.log(Call::GetCrtc(crtc.crtc_id));
        let state = self.state.borrow();
        state.check(Fault::GetCrtc(crtc.crtc_id))?;
        let current = state.crtc_state.get(&crtc.crtc_id).ok_or(Errno::ENOENT)?;
        *crtc = *current;
        Ok(())
    }

    fn set_crtc(&self, crtc: &mut DrmModeCrtc) -> nix::Result<()> {
        let connectors: Vec<u32> = if crtc.count_connectors > 0 && crtc.set_connectors_ptr != 0 {
            unsafe {
                std::slice::from_raw_parts(
                    crtc.set_connectors_ptr as *const u32,
                    crtc.count_connectors as usize,
                )
            }
            .to_vec()
        } else {
            Vec::new()
        };
        self.log(Call::SetCrtc {
            crtc: crtc.crtc_id,
            fb: crtc.fb_id,
            connectors: connectors.clone(),
        });

        let mut state = self.state.borrow_mut();
        state.check(Fault::SetCrtc(crtc.crtc_id))?;
        if !state.crtc_state.contains_key(&crtc.crtc_id) {
            return Err(Errno::ENOENT);
        }
        if crtc.mode_valid != 0 && connectors.is_empty() {
            return Err(Errno::EINVAL);
        }
        if connectors
            .iter()
            .any(|id| !state.connectors.iter().any(|c| c.id == *id))
        {
            return Err(Errno::ENOENT);
        }
        if crtc.mode_valid != 0 && crtc.fb_id < PREEXISTING_FB_BASE && !state.fbs.contains_key(&crtc.fb_id) {
            return Err(Errno::ENOENT);
        }

        let mut stored = *crtc;
        stored.set_connectors_ptr = 0;
        stored.count_connectors = 0;
        if stored.mode_valid == 0 {
            stored.fb_id = 0;
            stored.mode = ModeInfo::default();
        }
        state.crtc_state.insert(crtc.crtc_id, stored);
        Ok(())
    }

    fn create_dumb(&self, req: &mut DrmModeCreateDumb) -> nix::Result<()> {
        let mut state = self.state.borrow_mut();
        if let Err(errno) = state.check(Fault::CreateDumb) {
            state.calls.push(Call::CreateDumb { handle: 0 });
            return Err(errno);
        }
        if req.width == 0 || req.height == 0 || req.bpp == 0 {
            state.calls.push(Call::CreateDumb { handle: 0 });
            return Err(Errno::EINVAL);
        }
        let row = req.width * req.bpp.div_ceil(8);
        req.pitch = row.div_ceil(PITCH_ALIGN) * PITCH_ALIGN;
        req.size = u64::from(req.pitch) * u64::from(req.height);
        req.handle = state.next_handle;
        state.next_handle += 1;
        state.dumbs.insert(req.handle, req.size);
        state.dumbs_created += 1;
        state.calls.push(Call::CreateDumb { handle: req.handle });
        Ok(())
    }

    fn map_dumb(&self, req: &mut DrmModeMapDumb) -> nix::Result<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::MapDumb { handle: req.handle });
        state.check(Fault::MapDumb)?;
        if !state.dumbs.contains_key(&req.handle) {
            return Err(Errno::ENOENT);
        }
        req.offset = u64::from(req.handle) << MAP_OFFSET_SHIFT;
        Ok(())
    }

    fn destroy_dumb(&self, req: &mut DrmModeDestroyDumb) -> nix::Result<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::DestroyDumb { handle: req.handle });
        if state.dumbs.remove(&req.handle).is_none() {
            return Err(Errno::ENOENT);
        }
        state.dumbs_destroyed += 1;
        Ok(())
    }

    fn add_fb(&self, cmd: &mut DrmModeFbCmd) -> nix::Result<()> {
        let mut state = self.state.borrow_mut();
        let failed = Call::AddFb {
            fb: 0,
            handle: cmd.handle,
        };
        if let Err(errno) = state.check(Fault::AddFb) {
            state.calls.push(failed);
            return Err(errno);
        }
        if !state.dumbs.contains_key(&cmd.handle) {
            state.calls.push(failed);
            return Err(Errno::ENOENT);
        }
        if cmd.pitch < cmd.width * cmd.bpp.div_ceil(8) {
            state.calls.push(failed);
            return Err(Errno::EINVAL);
        }
        cmd.fb_id = state.next_fb;
        state.next_fb += 1;
        state.fbs.insert(cmd.fb_id, cmd.handle);
        state.calls.push(Call::AddFb {
            fb: cmd.fb_id,
            handle: cmd.handle,
        });
        Ok(())
    }

    fn rm_fb(&self, fb_id: u32) -> nix::Result<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::RmFb { fb: fb_id });
        state.fbs.remove(&fb_id).map(drop).ok_or(Errno::ENOENT)
    }

    fn map_memory(&self, offset: u64, len: usize) -> nix::Result<Mapping> {
        let mut state = self.state.borrow_mut();
        let handle = (offset >> MAP_OFFSET_SHIFT) as u32;
        state.calls.push(Call::Mmap { handle });
        state.check(Fault::Mmap)?;
        let size = *state.dumbs.get(&handle).ok_or(Errno::EINVAL)?;
        if len == 0 || len as u64 > size {
            return Err(Errno::EINVAL);
        }
        let memory: Box<[u8]> = vec![MAP_POISON; len].into_boxed_slice();
        let ptr = NonNull::from(Box::leak(memory)).cast::<u8>();
        state.mappings += 1;
        Ok(unsafe { Mapping::from_raw(ptr, len) })
    }

    fn unmap_memory(&self, mapping: Mapping) -> nix::Result<()> {
        let (ptr, len) = mapping.into_raw();
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Munmap { len });
        drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr.as_ptr(), len)) });
        state.mappings -= 1;
        Ok(())
    }
}
