//! Restoring CRTC state and releasing buffers at exit

use kmsflip_core::testing::{DriverCall, DriverOp};
use kmsflip_core::{ModeSelection, Session};

use super::{crtc, three_outputs};

/// Test that a failed restore on the first device still tears down the rest
#[test]
fn test_restore_failure_does_not_stop_teardown() {
    let mut session = Session::open(three_outputs()).expect("Failed to open session");
    session.configure_all(&ModeSelection::First);
    session.present_all();
    session.render_frame(|_, canvas| canvas.clear());

    session.driver_mut().fail_crtc(crtc(0), libc::EIO);
    session.teardown();

    let driver = session.driver();
    assert!(session.registry().is_empty());
    assert!(session.registry().claimed().is_empty());
    assert_eq!(driver.live_allocations(), 0);
    assert_eq!(driver.live_framebuffers(), 0);
    assert_eq!(driver.live_mappings(), 0);
    for n in [1, 2] {
        assert_eq!(driver.crtc_state(crtc(n)).unwrap().framebuffer, None);
    }
}

/// Test that buffer release errors do not stop teardown either
#[test]
fn test_unbind_failure_does_not_stop_teardown() {
    let mut session = Session::open(three_outputs()).expect("Failed to open session");
    session.configure_all(&ModeSelection::First);
    session.present_all();

    session
        .driver_mut()
        .fail_once(DriverOp::UnbindFramebuffer, libc::EBUSY);
    session.teardown();

    let driver = session.driver();
    assert_eq!(driver.live_allocations(), 0);
    assert_eq!(driver.live_mappings(), 0);
    // Only the framebuffer whose removal failed is left.
    assert_eq!(driver.live_framebuffers(), 1);
}

/// Test that devices are torn down in configuration order
#[test]
fn test_teardown_order() {
    let mut session = Session::open(three_outputs()).expect("Failed to open session");
    session.configure_all(&ModeSelection::First);
    session.present_all();
    let start = session.driver().calls().len();
    session.teardown();

    let restored: Vec<_> = session.driver().calls()[start..]
        .iter()
        .filter_map(|call| match call {
            DriverCall::SetCrtc { crtc, .. } => Some(*crtc),
            _ => None,
        })
        .collect();
    assert_eq!(restored, [crtc(0), crtc(1), crtc(2)]);
}

/// Test that a device whose modeset failed is still released
#[test]
fn test_configured_device_is_released() {
    let mut session = Session::open(three_outputs()).expect("Failed to open session");
    session.configure_all(&ModeSelection::First);
    session
        .driver_mut()
        .fail_once(DriverOp::SetControllerState, libc::EACCES);
    assert_eq!(session.present_all(), 2);

    session.teardown();
    assert_eq!(session.driver().live_allocations(), 0);
}
