//! Modeset and flips across several devices

use kmsflip_core::driver::ConnectorId;
use kmsflip_core::raster::Color;
use kmsflip_core::testing::DriverOp;
use kmsflip_core::{DeviceState, KmsError, ModeSelection, Session};

use super::{crtc, three_outputs};

const RED: Color = Color::rgb(0xff, 0, 0);

/// Test that presenting programs every CRTC with its device's first buffer
#[test]
fn test_present_programs_each_crtc() {
    let mut session = Session::open(three_outputs()).expect("Failed to open session");
    session.configure_all(&ModeSelection::First);
    assert_eq!(session.present_all(), 3);

    for device in session.registry().iter() {
        let state = session.driver().crtc_state(device.crtc()).unwrap();
        assert_eq!(state.framebuffer, device.buffers()[0].framebuffer());
        assert_eq!(state.mode.as_ref(), Some(device.mode()));
        assert_eq!(state.position, (0, 0));
    }
}

/// Test that one failed modeset does not stop the others
#[test]
fn test_failed_modeset_is_isolated() {
    let mut session = Session::open(three_outputs()).expect("Failed to open session");
    session.configure_all(&ModeSelection::First);
    session.driver_mut().fail_crtc(crtc(1), libc::EINVAL);
    assert_eq!(session.present_all(), 2);

    let states: Vec<_> = session.registry().iter().map(|d| d.state()).collect();
    assert_eq!(
        states,
        [
            DeviceState::Presenting,
            DeviceState::Configured,
            DeviceState::Presenting
        ]
    );
    session.driver_mut().clear_failures();
    assert_eq!(session.render_frame(|_, canvas| canvas.fill(RED)), 2);
}

/// Test that flipping one device leaves the others alone
#[test]
fn test_flip_does_not_disturb_other_devices() {
    let mut session = Session::open(three_outputs()).expect("Failed to open session");
    session.configure_all(&ModeSelection::First);
    session.present_all();

    let before: Vec<_> = [crtc(1), crtc(2)]
        .iter()
        .map(|&c| session.driver().crtc_state(c).cloned())
        .collect();

    session.flip(ConnectorId(36)).unwrap();
    session.flip(ConnectorId(36)).unwrap();
    session.flip(ConnectorId(36)).unwrap();

    let after: Vec<_> = [crtc(1), crtc(2)]
        .iter()
        .map(|&c| session.driver().crtc_state(c).cloned())
        .collect();
    assert_eq!(before, after);
    assert_eq!(session.device(ConnectorId(36)).unwrap().visible_index(), 1);
    assert_eq!(session.device(ConnectorId(37)).unwrap().visible_index(), 0);
}

/// Test that drawing lands in the buffer that goes on screen next
#[test]
fn test_drawing_goes_to_the_back_buffer() {
    let mut session = Session::open(three_outputs()).expect("Failed to open session");
    session.configure_all(&ModeSelection::First);
    session.present_all();

    for frame in 0..4u8 {
        let color = Color::rgb(frame + 1, 0, 0);
        let visible_before: Vec<_> = session
            .registry()
            .iter()
            .map(|d| d.visible_index())
            .collect();

        assert_eq!(session.render_frame(|_, canvas| canvas.fill(color)), 3);

        for (device, before) in session.registry().iter().zip(visible_before) {
            let now = device.visible_index();
            assert_ne!(now, before);
            let on_screen = device.buffers()[now].pixels();
            assert_eq!(&on_screen[..4], &color.to_xrgb().to_ne_bytes());
            let state = session.driver().crtc_state(device.crtc()).unwrap();
            assert_eq!(state.framebuffer, device.buffers()[now].framebuffer());
        }
    }
}

/// Test that a failed flip keeps the old buffer on screen
#[test]
fn test_failed_flip_keeps_front_buffer() {
    let mut session = Session::open(three_outputs()).expect("Failed to open session");
    session.configure_all(&ModeSelection::First);
    session.present_all();

    session
        .driver_mut()
        .fail_once(DriverOp::SetControllerState, libc::EBUSY);
    let err = session.flip(ConnectorId(38)).unwrap_err();
    assert!(matches!(err, KmsError::FlipFailed { .. }));
    assert!(!err.is_fatal());
    assert_eq!(session.device(ConnectorId(38)).unwrap().visible_index(), 0);
}

/// Test that a connector without a device cannot be flipped
#[test]
fn test_flip_unknown_connector() {
    let mut session = Session::open(three_outputs()).expect("Failed to open session");
    session.configure_all(&ModeSelection::First);
    session.present_all();
    let err = session.flip(ConnectorId(39)).unwrap_err();
    assert!(matches!(err, KmsError::NotPresenting(ConnectorId(39))));
}
