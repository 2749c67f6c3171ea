//! DRM card driver
//!
//! Talks to a `/dev/dri/cardN` node through the `drm` crate re-exported by
//! smithay. Dumb buffers go through `drm_ffi` so the kernel's pitch and size
//! reach the core, and their mappings are `memmap2` regions over the card fd.
//!
//! # Design Invariants
//!
//! 1. **Buffers live in the card**: dumb buffer geometry is recorded in
//!    `DrmCard::buffers`, keyed by handle. The core only ever sees the
//!    handle and the kernel-reported size.
//!
//! 2. **Resource order**: the CRTC list cached at enumeration is the one
//!    encoder bitmasks are computed against. Re-enumerating replaces it.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsFd, BorrowedFd};
use std::path::{Path, PathBuf};

use drm_ffi::mode::dumbbuffer;
use memmap2::{MmapMut, MmapOptions};
use smithay::reexports::drm::{
    control::{
        connector, crtc, encoder, framebuffer, from_u32, Device as ControlDevice,
        Mode as DrmMode, ResourceHandles,
    },
    Device as BasicDevice, DriverCapability,
};
use tracing::{debug, info, trace, warn};

use super::{
    AllocationHandle, ConnectionStatus, ConnectorId, ConnectorInfo, ControllerState, CrtcId,
    DisplayMode, EncoderId, EncoderInfo, FramebufferId, KmsDriver, ModeTimings, ResourceIds,
    SurfaceAllocation,
};
use crate::error::KmsError;

/// Geometry of a dumb buffer as the kernel created it.
#[derive(Debug, Clone, Copy)]
struct DumbGeometry {
    width: u32,
    height: u32,
    pitch: u32,
}

/// Card nodes tried when no device is given, highest first.
pub fn card_candidates() -> Vec<PathBuf> {
    (0..4)
        .rev()
        .map(|n| PathBuf::from(format!("/dev/dri/card{n}")))
        .collect()
}

/// Open the first candidate that supports dumb buffers.
pub fn find_card(candidates: &[PathBuf]) -> Option<DrmCard> {
    for path in candidates {
        debug!("Trying card {:?}", path);
        let card = match DrmCard::open(path) {
            Ok(card) => card,
            Err(err) => {
                debug!("Skipping {:?}: {}", path, err);
                continue;
            }
        };
        match card.supports_dumb_buffers() {
            Ok(true) => {
                info!("Using card {:?}", path);
                return Some(card);
            }
            Ok(false) => debug!("Skipping {:?}: no dumb buffer support", path),
            Err(err) => debug!("Skipping {:?}: capability query failed: {}", path, err),
        }
    }
    None
}

/// An open DRM card node.
pub struct DrmCard {
    file: File,
    path: PathBuf,
    resources: Option<ResourceHandles>,
    buffers: HashMap<AllocationHandle, DumbGeometry>,
}

impl AsFd for DrmCard {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl BasicDevice for DrmCard {}
impl ControlDevice for DrmCard {}

impl DrmCard {
    /// Open a card node read/write. The descriptor is close-on-exec.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KmsError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| KmsError::DeviceOpen {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            file,
            path,
            resources: None,
            buffers: HashMap::new(),
        })
    }

    fn crtc_mask(&self, info: &encoder::Info) -> u32 {
        let Some(resources) = &self.resources else {
            return 0;
        };
        let usable = resources.filter_crtcs(info.possible_crtcs());
        resources
            .crtcs()
            .iter()
            .enumerate()
            .filter(|(_, crtc)| usable.contains(crtc))
            .fold(0, |mask, (index, _)| mask | 1 << index)
    }
}

fn handle<T: From<smithay::reexports::drm::control::RawResourceHandle>>(
    raw: u32,
) -> io::Result<T> {
    from_u32(raw).ok_or_else(|| io::Error::from_raw_os_error(libc::EINVAL))
}

fn display_mode(mode: &DrmMode) -> DisplayMode {
    let raw: drm_ffi::drm_mode_modeinfo = (*mode).into();
    DisplayMode {
        name: mode.name().to_string_lossy().into_owned(),
        width: raw.hdisplay,
        height: raw.vdisplay,
        refresh: raw.vrefresh,
        timings: ModeTimings {
            clock: raw.clock,
            hsync_start: raw.hsync_start,
            hsync_end: raw.hsync_end,
            htotal: raw.htotal,
            hskew: raw.hskew,
            vsync_start: raw.vsync_start,
            vsync_end: raw.vsync_end,
            vtotal: raw.vtotal,
            vscan: raw.vscan,
            flags: raw.flags,
            mode_type: raw.type_,
        },
    }
}

fn drm_mode(mode: &DisplayMode) -> DrmMode {
    // SAFETY: drm_mode_modeinfo is a plain C struct; all-zero is a valid value.
    let mut raw: drm_ffi::drm_mode_modeinfo = unsafe { std::mem::zeroed() };
    let t = &mode.timings;
    raw.clock = t.clock;
    raw.hdisplay = mode.width;
    raw.hsync_start = t.hsync_start;
    raw.hsync_end = t.hsync_end;
    raw.htotal = t.htotal;
    raw.hskew = t.hskew;
    raw.vdisplay = mode.height;
    raw.vsync_start = t.vsync_start;
    raw.vsync_end = t.vsync_end;
    raw.vtotal = t.vtotal;
    raw.vscan = t.vscan;
    raw.vrefresh = mode.refresh;
    raw.flags = t.flags;
    raw.type_ = t.mode_type;
    // Keep the trailing NUL.
    for (dst, src) in raw.name.iter_mut().zip(mode.name.bytes().take(31)) {
        *dst = src as libc::c_char;
    }
    DrmMode::from(raw)
}

impl KmsDriver for DrmCard {
    type Mapping = MmapMut;

    fn path(&self) -> &Path {
        &self.path
    }

    fn supports_dumb_buffers(&self) -> io::Result<bool> {
        Ok(self.get_driver_capability(DriverCapability::DumbBuffer)? != 0)
    }

    fn enumerate_resources(&mut self) -> io::Result<ResourceIds> {
        let resources = self.resource_handles()?;
        let ids = ResourceIds {
            connectors: resources
                .connectors()
                .iter()
                .map(|&h| ConnectorId(h.into()))
                .collect(),
            encoders: resources
                .encoders()
                .iter()
                .map(|&h| EncoderId(h.into()))
                .collect(),
            crtcs: resources.crtcs().iter().map(|&h| CrtcId(h.into())).collect(),
        };
        self.resources = Some(resources);
        Ok(ids)
    }

    fn get_connector(&self, id: ConnectorId) -> io::Result<ConnectorInfo> {
        let info = ControlDevice::get_connector(self, handle::<connector::Handle>(id.0)?, false)?;
        let status = match info.state() {
            connector::State::Connected => ConnectionStatus::Connected,
            connector::State::Disconnected => ConnectionStatus::Disconnected,
            _ => ConnectionStatus::Unknown,
        };
        Ok(ConnectorInfo {
            id,
            status,
            modes: info.modes().iter().map(display_mode).collect(),
            encoder: info.current_encoder().map(|h| EncoderId(h.into())),
            encoders: info.encoders().iter().map(|&h| EncoderId(h.into())).collect(),
        })
    }

    fn get_encoder(&self, id: EncoderId) -> io::Result<EncoderInfo> {
        let info = ControlDevice::get_encoder(self, handle::<encoder::Handle>(id.0)?)?;
        Ok(EncoderInfo {
            id,
            crtc: info.crtc().map(|h| CrtcId(h.into())),
            possible_crtcs: self.crtc_mask(&info),
        })
    }

    fn allocate_pixel_surface(
        &mut self,
        width: u32,
        height: u32,
        bpp: u32,
    ) -> io::Result<SurfaceAllocation> {
        let created = dumbbuffer::create(self.as_fd(), width, height, bpp, 0)?;
        let allocation = SurfaceAllocation {
            handle: AllocationHandle(created.handle),
            stride: created.pitch,
            size: created.size,
        };
        trace!(
            handle = %allocation.handle,
            stride = allocation.stride,
            size = allocation.size,
            "Created dumb buffer"
        );
        self.buffers.insert(
            allocation.handle,
            DumbGeometry {
                width,
                height,
                pitch: created.pitch,
            },
        );
        Ok(allocation)
    }

    fn free_pixel_surface(&mut self, handle: AllocationHandle) -> io::Result<()> {
        self.buffers
            .remove(&handle)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ENOENT))?;
        dumbbuffer::destroy(self.as_fd(), handle.0)?;
        Ok(())
    }

    fn bind_framebuffer(
        &mut self,
        width: u32,
        height: u32,
        depth: u32,
        bpp: u32,
        stride: u32,
        handle: AllocationHandle,
    ) -> io::Result<FramebufferId> {
        let geometry = self
            .buffers
            .get(&handle)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ENOENT))?;
        if (geometry.width, geometry.height, geometry.pitch) != (width, height, stride) {
            warn!(
                %handle,
                "Framebuffer geometry {}x{} stride {} differs from dumb buffer",
                width,
                height,
                stride
            );
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        let fb = drm_ffi::mode::add_fb(self.as_fd(), width, height, stride, bpp, depth, handle.0)?;
        Ok(FramebufferId(fb.fb_id))
    }

    fn unbind_framebuffer(&mut self, fb: FramebufferId) -> io::Result<()> {
        self.destroy_framebuffer(handle::<framebuffer::Handle>(fb.0)?)
    }

    fn map_offset(&mut self, handle: AllocationHandle) -> io::Result<u64> {
        Ok(dumbbuffer::map(self.as_fd(), handle.0, 0, 0)?.offset)
    }

    fn map_memory(&mut self, offset: u64, size: u64) -> io::Result<MmapMut> {
        let len = usize::try_from(size).map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?;
        // SAFETY: the region is a shared mapping of the card fd at an offset
        // handed out by the kernel; nothing else in the process aliases it.
        unsafe { MmapOptions::new().offset(offset).len(len).map_mut(&self.file) }
    }

    fn unmap_memory(&mut self, mapping: MmapMut) -> io::Result<()> {
        drop(mapping);
        Ok(())
    }

    fn get_controller_state(&self, crtc: CrtcId) -> io::Result<ControllerState> {
        let info = self.get_crtc(handle::<crtc::Handle>(crtc.0)?)?;
        Ok(ControllerState {
            crtc,
            framebuffer: info.framebuffer().map(|h| FramebufferId(h.into())),
            position: info.position(),
            mode: info.mode().as_ref().map(display_mode),
        })
    }

    fn set_controller_state(
        &mut self,
        crtc: CrtcId,
        fb: Option<FramebufferId>,
        position: (u32, u32),
        connectors: &[ConnectorId],
        mode: Option<&DisplayMode>,
    ) -> io::Result<()> {
        let fb = fb.map(|fb| handle::<framebuffer::Handle>(fb.0)).transpose()?;
        let connectors = connectors
            .iter()
            .map(|c| handle::<connector::Handle>(c.0))
            .collect::<io::Result<Vec<_>>>()?;
        self.set_crtc(
            handle::<crtc::Handle>(crtc.0)?,
            fb,
            position,
            &connectors,
            mode.map(drm_mode),
        )
    }
}
