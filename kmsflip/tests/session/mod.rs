//! Session-level behavior across several outputs
//!
//! # Test Organization
//!
//! - `allocation.rs` - CRTC assignment and buffer failures during configuration
//! - `presentation.rs` - Modeset and flips across devices
//! - `teardown.rs` - Restoring CRTCs and releasing buffers

mod allocation;
mod presentation;
mod teardown;

use kmsflip_core::driver::{ConnectionStatus, CrtcId, DisplayMode};
use kmsflip_core::testing::MockDriver;

/// Three CRTCs and four connectors.
///
/// | connector | encoder (bound, mask) | expected CRTC     |
/// |-----------|-----------------------|-------------------|
/// | 36        | 33 (30, 0b111)        | 30 via fast path  |
/// | 37        | 34 (-, 0b110)         | 31                |
/// | 38        | 35 (-, 0b100)         | 32                |
/// | 39        | 35                    | disconnected      |
pub fn three_outputs() -> MockDriver {
    let mut driver = MockDriver::new();
    let c0 = driver.add_crtc();
    driver.add_crtc();
    driver.add_crtc();
    let e0 = driver.add_encoder(Some(c0), 0b111);
    let e1 = driver.add_encoder(None, 0b110);
    let e2 = driver.add_encoder(None, 0b100);
    driver.add_connector(
        ConnectionStatus::Connected,
        vec![DisplayMode::new("320x240", 320, 240, 60)],
        Some(e0),
        vec![e0],
    );
    driver.add_connector(
        ConnectionStatus::Connected,
        vec![
            DisplayMode::new("160x120", 160, 120, 75),
            DisplayMode::new("320x240", 320, 240, 60),
        ],
        None,
        vec![e1],
    );
    driver.add_connector(
        ConnectionStatus::Connected,
        vec![DisplayMode::new("128x96", 128, 96, 60)],
        None,
        vec![e2],
    );
    driver.add_connector(ConnectionStatus::Disconnected, vec![], None, vec![e2]);
    driver
}

pub fn crtc(n: u32) -> CrtcId {
    CrtcId(30 + n)
}
