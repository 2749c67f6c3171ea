//! In-memory KMS driver
//!
//! Behaves like a small DRM card: resource ids are unique across object
//! types, dumb buffers get a driver-chosen stride, framebuffers must refer to
//! a live allocation and CRTCs can only be set to live framebuffers.
//!
//! Any operation can be made to fail, either always, once, or on its n-th
//! call from now. Every successful mutating call is recorded in order so
//! tests can check release ordering.

use std::collections::HashMap;
use std::io;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use crate::driver::{
    AllocationHandle, ConnectionStatus, ConnectorId, ConnectorInfo, ControllerState, CrtcId,
    DisplayMode, EncoderId, EncoderInfo, FramebufferId, KmsDriver, ResourceIds,
    SurfaceAllocation,
};

/// Scanline alignment the mock driver applies to dumb buffers.
pub const STRIDE_ALIGN: u32 = 256;

/// Byte written to fresh mappings, so zero-filling is observable.
pub const POISON: u8 = 0xA5;

/// Driver operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverOp {
    SupportsDumbBuffers,
    EnumerateResources,
    AllocatePixelSurface,
    FreePixelSurface,
    BindFramebuffer,
    UnbindFramebuffer,
    MapOffset,
    MapMemory,
    UnmapMemory,
    GetControllerState,
    SetControllerState,
}

/// A successful mutating driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Allocate(AllocationHandle),
    Free(AllocationHandle),
    Bind(FramebufferId, AllocationHandle),
    Unbind(FramebufferId),
    MapOffset(AllocationHandle),
    Map(u64),
    Unmap,
    SetCrtc {
        crtc: CrtcId,
        fb: Option<FramebufferId>,
    },
}

#[derive(Debug, Clone, Copy)]
struct Failure {
    errno: i32,
    /// Calls to let through before failing
    skip: usize,
    /// Fail only once
    once: bool,
}

/// Mapped dumb buffer memory owned by the mock.
#[derive(Debug)]
pub struct MockMapping {
    offset: u64,
    bytes: Vec<u8>,
}

impl Deref for MockMapping {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl DerefMut for MockMapping {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

pub struct MockDriver {
    path: PathBuf,
    dumb_buffers: bool,
    next_id: u32,
    connectors: Vec<ConnectorInfo>,
    encoders: Vec<EncoderInfo>,
    crtcs: Vec<ControllerState>,
    failures: HashMap<DriverOp, Failure>,
    connector_failures: HashMap<ConnectorId, i32>,
    encoder_failures: HashMap<EncoderId, i32>,
    crtc_failures: HashMap<CrtcId, i32>,
    allocations: HashMap<AllocationHandle, SurfaceAllocation>,
    framebuffers: HashMap<FramebufferId, AllocationHandle>,
    offsets: HashMap<u64, AllocationHandle>,
    live_mappings: usize,
    calls: Vec<DriverCall>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    /// Empty card that supports dumb buffers.
    pub fn new() -> Self {
        Self {
            path: PathBuf::from("/dev/dri/mock0"),
            dumb_buffers: true,
            next_id: 30,
            connectors: Vec::new(),
            encoders: Vec::new(),
            crtcs: Vec::new(),
            failures: HashMap::new(),
            connector_failures: HashMap::new(),
            encoder_failures: HashMap::new(),
            crtc_failures: HashMap::new(),
            allocations: HashMap::new(),
            framebuffers: HashMap::new(),
            offsets: HashMap::new(),
            live_mappings: 0,
            calls: Vec::new(),
        }
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn set_dumb_buffer_support(&mut self, supported: bool) {
        self.dumb_buffers = supported;
    }

    /// Add an idle CRTC.
    pub fn add_crtc(&mut self) -> CrtcId {
        let crtc = CrtcId(self.next_id());
        self.crtcs.push(ControllerState {
            crtc,
            framebuffer: None,
            position: (0, 0),
            mode: None,
        });
        crtc
    }

    /// Add an encoder. Bit `j` of `possible_crtcs` refers to the `j`-th CRTC
    /// added.
    pub fn add_encoder(&mut self, crtc: Option<CrtcId>, possible_crtcs: u32) -> EncoderId {
        let id = EncoderId(self.next_id());
        self.encoders.push(EncoderInfo {
            id,
            crtc,
            possible_crtcs,
        });
        id
    }

    pub fn add_connector(
        &mut self,
        status: ConnectionStatus,
        modes: Vec<DisplayMode>,
        encoder: Option<EncoderId>,
        encoders: Vec<EncoderId>,
    ) -> ConnectorId {
        let id = ConnectorId(self.next_id());
        self.connectors.push(ConnectorInfo {
            id,
            status,
            modes,
            encoder,
            encoders,
        });
        id
    }

    pub fn connector_ids(&self) -> Vec<ConnectorId> {
        self.connectors.iter().map(|c| c.id).collect()
    }

    pub fn encoder_ids(&self) -> Vec<EncoderId> {
        self.encoders.iter().map(|e| e.id).collect()
    }

    pub fn crtc_ids(&self) -> Vec<CrtcId> {
        self.crtcs.iter().map(|c| c.crtc).collect()
    }

    /// Make every call of `op` fail with `errno`.
    pub fn fail_on(&mut self, op: DriverOp, errno: i32) {
        self.failures.insert(
            op,
            Failure {
                errno,
                skip: 0,
                once: false,
            },
        );
    }

    /// Make only the next call of `op` fail.
    pub fn fail_once(&mut self, op: DriverOp, errno: i32) {
        self.fail_nth(op, 0, errno);
    }

    /// Let `n` calls of `op` through, then fail the next one once.
    pub fn fail_nth(&mut self, op: DriverOp, n: usize, errno: i32) {
        self.failures.insert(
            op,
            Failure {
                errno,
                skip: n,
                once: true,
            },
        );
    }

    pub fn fail_connector(&mut self, id: ConnectorId, errno: i32) {
        self.connector_failures.insert(id, errno);
    }

    pub fn fail_encoder(&mut self, id: EncoderId, errno: i32) {
        self.encoder_failures.insert(id, errno);
    }

    /// Make programming one particular CRTC fail.
    pub fn fail_crtc(&mut self, crtc: CrtcId, errno: i32) {
        self.crtc_failures.insert(crtc, errno);
    }

    pub fn clear_failures(&mut self) {
        self.failures.clear();
        self.connector_failures.clear();
        self.encoder_failures.clear();
        self.crtc_failures.clear();
    }

    pub fn live_allocations(&self) -> usize {
        self.allocations.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn live_mappings(&self) -> usize {
        self.live_mappings
    }

    pub fn calls(&self) -> &[DriverCall] {
        &self.calls
    }

    pub fn crtc_state(&self, crtc: CrtcId) -> Option<&ControllerState> {
        self.crtcs.iter().find(|c| c.crtc == crtc)
    }

    fn check(&mut self, op: DriverOp) -> io::Result<()> {
        let Some(failure) = self.failures.get_mut(&op) else {
            return Ok(());
        };
        if failure.skip > 0 {
            failure.skip -= 1;
            return Ok(());
        }
        let errno = failure.errno;
        if failure.once {
            self.failures.remove(&op);
        }
        Err(io::Error::from_raw_os_error(errno))
    }
}

fn enoent() -> io::Error {
    io::Error::from_raw_os_error(libc::ENOENT)
}

impl KmsDriver for MockDriver {
    type Mapping = MockMapping;

    fn path(&self) -> &Path {
        &self.path
    }

    fn supports_dumb_buffers(&self) -> io::Result<bool> {
        match self.failures.get(&DriverOp::SupportsDumbBuffers) {
            Some(failure) => Err(io::Error::from_raw_os_error(failure.errno)),
            None => Ok(self.dumb_buffers),
        }
    }

    fn enumerate_resources(&mut self) -> io::Result<ResourceIds> {
        self.check(DriverOp::EnumerateResources)?;
        Ok(ResourceIds {
            connectors: self.connector_ids(),
            encoders: self.encoder_ids(),
            crtcs: self.crtc_ids(),
        })
    }

    fn get_connector(&self, id: ConnectorId) -> io::Result<ConnectorInfo> {
        if let Some(&errno) = self.connector_failures.get(&id) {
            return Err(io::Error::from_raw_os_error(errno));
        }
        self.connectors
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(enoent)
    }

    fn get_encoder(&self, id: EncoderId) -> io::Result<EncoderInfo> {
        if let Some(&errno) = self.encoder_failures.get(&id) {
            return Err(io::Error::from_raw_os_error(errno));
        }
        self.encoders
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or_else(enoent)
    }

    fn allocate_pixel_surface(
        &mut self,
        width: u32,
        height: u32,
        bpp: u32,
    ) -> io::Result<SurfaceAllocation> {
        self.check(DriverOp::AllocatePixelSurface)?;
        if width == 0 || height == 0 {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        let stride = (width * bpp / 8).div_ceil(STRIDE_ALIGN) * STRIDE_ALIGN;
        let allocation = SurfaceAllocation {
            handle: AllocationHandle(self.next_id()),
            stride,
            size: u64::from(stride) * u64::from(height),
        };
        self.allocations.insert(allocation.handle, allocation);
        self.calls.push(DriverCall::Allocate(allocation.handle));
        Ok(allocation)
    }

    fn free_pixel_surface(&mut self, handle: AllocationHandle) -> io::Result<()> {
        self.check(DriverOp::FreePixelSurface)?;
        self.allocations.remove(&handle).ok_or_else(enoent)?;
        self.offsets.retain(|_, h| *h != handle);
        self.calls.push(DriverCall::Free(handle));
        Ok(())
    }

    fn bind_framebuffer(
        &mut self,
        width: u32,
        height: u32,
        _depth: u32,
        bpp: u32,
        stride: u32,
        handle: AllocationHandle,
    ) -> io::Result<FramebufferId> {
        self.check(DriverOp::BindFramebuffer)?;
        let allocation = self.allocations.get(&handle).ok_or_else(enoent)?;
        if allocation.stride != stride
            || width * bpp / 8 > stride
            || u64::from(stride) * u64::from(height) > allocation.size
        {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        let fb = FramebufferId(self.next_id());
        self.framebuffers.insert(fb, handle);
        self.calls.push(DriverCall::Bind(fb, handle));
        Ok(fb)
    }

    fn unbind_framebuffer(&mut self, fb: FramebufferId) -> io::Result<()> {
        self.check(DriverOp::UnbindFramebuffer)?;
        self.framebuffers.remove(&fb).ok_or_else(enoent)?;
        self.calls.push(DriverCall::Unbind(fb));
        Ok(())
    }

    fn map_offset(&mut self, handle: AllocationHandle) -> io::Result<u64> {
        self.check(DriverOp::MapOffset)?;
        if !self.allocations.contains_key(&handle) {
            return Err(enoent());
        }
        let offset = u64::from(handle.0) << 12;
        self.offsets.insert(offset, handle);
        self.calls.push(DriverCall::MapOffset(handle));
        Ok(offset)
    }

    fn map_memory(&mut self, offset: u64, size: u64) -> io::Result<MockMapping> {
        self.check(DriverOp::MapMemory)?;
        let handle = self
            .offsets
            .get(&offset)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EINVAL))?;
        if self.allocations[handle].size < size {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        let len = usize::try_from(size).map_err(|_| io::Error::from_raw_os_error(libc::ENOMEM))?;
        self.live_mappings += 1;
        self.calls.push(DriverCall::Map(offset));
        Ok(MockMapping {
            offset,
            bytes: vec![POISON; len],
        })
    }

    fn unmap_memory(&mut self, mapping: MockMapping) -> io::Result<()> {
        self.check(DriverOp::UnmapMemory)?;
        if !self.offsets.contains_key(&mapping.offset) {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        self.live_mappings -= 1;
        self.calls.push(DriverCall::Unmap);
        Ok(())
    }

    fn get_controller_state(&self, crtc: CrtcId) -> io::Result<ControllerState> {
        if let Some(failure) = self.failures.get(&DriverOp::GetControllerState) {
            return Err(io::Error::from_raw_os_error(failure.errno));
        }
        self.crtc_state(crtc).cloned().ok_or_else(enoent)
    }

    fn set_controller_state(
        &mut self,
        crtc: CrtcId,
        fb: Option<FramebufferId>,
        position: (u32, u32),
        connectors: &[ConnectorId],
        mode: Option<&DisplayMode>,
    ) -> io::Result<()> {
        self.check(DriverOp::SetControllerState)?;
        if let Some(&errno) = self.crtc_failures.get(&crtc) {
            return Err(io::Error::from_raw_os_error(errno));
        }
        if let Some(fb) = fb {
            if !self.framebuffers.contains_key(&fb) {
                return Err(enoent());
            }
        }
        if connectors.iter().any(|c| !self.connectors.iter().any(|k| k.id == *c)) {
            return Err(enoent());
        }
        let state = self
            .crtcs
            .iter_mut()
            .find(|c| c.crtc == crtc)
            .ok_or_else(enoent)?;
        state.framebuffer = fb;
        state.position = position;
        state.mode = mode.cloned();
        self.calls.push(DriverCall::SetCrtc { crtc, fb });
        Ok(())
    }
}
