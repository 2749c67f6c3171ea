//! kmsflip - double-buffered output on bare KMS
//!
//! Pairs every connected connector with a free CRTC, gives it two dumb
//! buffers and flips between them. Drawing happens in the buffer that is not
//! on screen.
pub mod allocator;
pub mod buffer;
pub mod config;
pub mod demo;
pub mod device;
pub mod driver;
pub mod error;
pub mod logging;
pub mod raster;
pub mod registry;
pub mod session;
pub mod snapshot;
pub mod testing;
pub mod tracy;

pub use allocator::{find_crtc, CrtcAssignment};
pub use buffer::{allocate_buffer, destroy_buffer, PixelBuffer};
pub use device::{Device, DeviceState};
pub use driver::{DrmCard, KmsDriver};
pub use error::{ErrorScope, KmsError};
pub use registry::DeviceRegistry;
pub use session::{ConnectorReport, ModeSelection, Session};
pub use snapshot::ResourceSnapshot;
