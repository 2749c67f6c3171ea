//! Kernel mode-setting driver boundary
//!
//! Everything the allocator and buffer manager need from the kernel goes
//! through [`KmsDriver`]. Two implementations exist:
//!
//! - **DRM card** (`drm`): a real `/dev/dri/cardN` node, used by the binary.
//! - **Mock driver** (`crate::testing::MockDriver`): in-memory resources with
//!   failure injection, used by tests.
//!
//! # Design Invariants
//!
//! 1. **Plain identifiers**: resources cross the boundary as `u32` newtypes.
//!    Driver-specific handle types never leak into the core.
//!
//! 2. **OS errors preserved**: every call returns `io::Result` so diagnostics
//!    can report the kernel's error code.
//!
//! 3. **Explicit release**: nothing allocated through the driver is released
//!    implicitly. Callers pair every `allocate_*`, `bind_*` and `map_*` call
//!    with its release call.

pub mod drm;

use std::fmt;
use std::io;
use std::ops::DerefMut;
use std::path::Path;

use serde::Serialize;

pub use self::drm::{find_card, DrmCard};

/// Bits per pixel of every buffer (XRGB8888).
pub const BITS_PER_PIXEL: u32 = 32;
/// Significant color bits of every framebuffer.
pub const COLOR_DEPTH: u32 = 24;
/// Bytes per pixel of every buffer.
pub const BYTES_PER_PIXEL: u32 = BITS_PER_PIXEL / 8;

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

resource_id!(
    /// Physical output port
    ConnectorId
);
resource_id!(
    /// Signal encoder between a CRTC and a connector
    EncoderId
);
resource_id!(
    /// Scan-out controller
    CrtcId
);
resource_id!(
    /// Framebuffer object wrapping a dumb buffer
    FramebufferId
);
resource_id!(
    /// Dumb buffer allocation handle
    AllocationHandle
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Unknown,
}

/// Raw timing parameters of a mode, as the kernel reports them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModeTimings {
    pub clock: u32,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub hskew: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    pub vscan: u16,
    pub flags: u32,
    pub mode_type: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayMode {
    pub name: String,
    pub width: u16,
    pub height: u16,
    /// Vertical refresh in Hz
    pub refresh: u32,
    #[serde(skip)]
    pub timings: ModeTimings,
}

impl DisplayMode {
    /// Mode with only a name, resolution and refresh rate set.
    pub fn new(name: impl Into<String>, width: u16, height: u16, refresh: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            refresh,
            timings: ModeTimings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectorInfo {
    pub id: ConnectorId,
    pub status: ConnectionStatus,
    pub modes: Vec<DisplayMode>,
    pub encoder: Option<EncoderId>,
    pub encoders: Vec<EncoderId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncoderInfo {
    pub id: EncoderId,
    pub crtc: Option<CrtcId>,
    /// Bit `j` set means the encoder can drive the CRTC at index `j` of the
    /// resource list.
    pub possible_crtcs: u32,
}

impl EncoderInfo {
    pub fn can_drive(&self, crtc_index: usize) -> bool {
        crtc_index < 32 && self.possible_crtcs & (1 << crtc_index) != 0
    }
}

/// Identifiers returned by one resource enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceIds {
    pub connectors: Vec<ConnectorId>,
    pub encoders: Vec<EncoderId>,
    pub crtcs: Vec<CrtcId>,
}

/// Result of a dumb buffer allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceAllocation {
    pub handle: AllocationHandle,
    /// Bytes per scanline, chosen by the driver
    pub stride: u32,
    /// Total bytes
    pub size: u64,
}

/// CRTC configuration, saved before taking a CRTC over and restored on exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerState {
    pub crtc: CrtcId,
    pub framebuffer: Option<FramebufferId>,
    pub position: (u32, u32),
    pub mode: Option<DisplayMode>,
}

/// Kernel mode-setting operations consumed by the core.
pub trait KmsDriver {
    /// Writable view of a mapped dumb buffer.
    type Mapping: DerefMut<Target = [u8]>;

    /// Device node this driver was opened from, for diagnostics.
    fn path(&self) -> &Path;

    fn supports_dumb_buffers(&self) -> io::Result<bool>;

    fn enumerate_resources(&mut self) -> io::Result<ResourceIds>;

    fn get_connector(&self, id: ConnectorId) -> io::Result<ConnectorInfo>;

    fn get_encoder(&self, id: EncoderId) -> io::Result<EncoderInfo>;

    fn allocate_pixel_surface(
        &mut self,
        width: u32,
        height: u32,
        bpp: u32,
    ) -> io::Result<SurfaceAllocation>;

    fn free_pixel_surface(&mut self, handle: AllocationHandle) -> io::Result<()>;

    #[allow(clippy::too_many_arguments)]
    fn bind_framebuffer(
        &mut self,
        width: u32,
        height: u32,
        depth: u32,
        bpp: u32,
        stride: u32,
        handle: AllocationHandle,
    ) -> io::Result<FramebufferId>;

    fn unbind_framebuffer(&mut self, fb: FramebufferId) -> io::Result<()>;

    /// Fake offset to pass to [`KmsDriver::map_memory`].
    fn map_offset(&mut self, handle: AllocationHandle) -> io::Result<u64>;

    fn map_memory(&mut self, offset: u64, size: u64) -> io::Result<Self::Mapping>;

    fn unmap_memory(&mut self, mapping: Self::Mapping) -> io::Result<()>;

    fn get_controller_state(&self, crtc: CrtcId) -> io::Result<ControllerState>;

    fn set_controller_state(
        &mut self,
        crtc: CrtcId,
        fb: Option<FramebufferId>,
        position: (u32, u32),
        connectors: &[ConnectorId],
        mode: Option<&DisplayMode>,
    ) -> io::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_drive() {
        let encoder = EncoderInfo {
            id: EncoderId(1),
            crtc: None,
            possible_crtcs: 0b101,
        };
        assert!(encoder.can_drive(0));
        assert!(!encoder.can_drive(1));
        assert!(encoder.can_drive(2));
        assert!(!encoder.can_drive(40));
    }

    #[test]
    fn test_ids_serialize_as_numbers() {
        let json = serde_json::to_string(&(ConnectorId(31), CrtcId(40))).unwrap();
        assert_eq!(json, "[31,40]");
    }
}
