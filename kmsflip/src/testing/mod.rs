//! Testing infrastructure for kmsflip
//!
//! Provides a mock KMS driver so the allocator, buffer manager and session can
//! be exercised without a DRM card or DRM master.
//!
//! # Example
//!
//! ```ignore
//! use kmsflip_core::testing::{DriverOp, MockDriver};
//!
//! let mut driver = MockDriver::new();
//! let crtc = driver.add_crtc();
//! let encoder = driver.add_encoder(Some(crtc), 0b1);
//! driver.fail_once(DriverOp::MapMemory, libc::ENOMEM);
//! ```

mod mock;

pub use mock::{DriverCall, DriverOp, MockDriver, MockMapping, POISON, STRIDE_ALIGN};
