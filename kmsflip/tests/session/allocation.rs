//! CRTC assignment and per-connector failure handling

use std::collections::HashSet;

use kmsflip_core::driver::{ConnectionStatus, ConnectorId, DisplayMode};
use kmsflip_core::testing::{DriverOp, MockDriver};
use kmsflip_core::{KmsError, ModeSelection, Session};

use super::{crtc, three_outputs};

fn report_table(session: &mut Session<MockDriver>) -> String {
    session
        .configure_all(&ModeSelection::First)
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Test the assignment of every connector in snapshot order
#[test]
fn test_assignment_table() {
    let mut session = Session::open(three_outputs()).expect("Failed to open session");
    insta::assert_snapshot!(report_table(&mut session), @r"
    connector 36: encoder 33 -> crtc 30
    connector 37: encoder 34 -> crtc 31
    connector 38: encoder 35 -> crtc 32
    connector 39: skipped (connector 39 is not connected)
    ");
}

/// Test that no CRTC ends up claimed by two devices
#[test]
fn test_crtcs_are_exclusive() {
    let mut session = Session::open(three_outputs()).expect("Failed to open session");
    session.configure_all(&ModeSelection::First);

    let crtcs: Vec<_> = session.registry().iter().map(|d| d.crtc()).collect();
    let unique: HashSet<_> = crtcs.iter().copied().collect();
    assert_eq!(crtcs.len(), 3);
    assert_eq!(unique.len(), crtcs.len());
    assert_eq!(session.registry().claimed(), &unique);
}

/// Test that the currently bound encoder and CRTC are kept
#[test]
fn test_fast_path_keeps_bound_crtc() {
    let mut driver = MockDriver::new();
    let c0 = driver.add_crtc();
    let c1 = driver.add_crtc();
    let e0 = driver.add_encoder(None, 0b11);
    let e1 = driver.add_encoder(Some(c1), 0b11);
    let connector = driver.add_connector(
        ConnectionStatus::Connected,
        vec![DisplayMode::new("64x64", 64, 64, 60)],
        Some(e1),
        vec![e0, e1],
    );

    let mut session = Session::open(driver).expect("Failed to open session");
    session.configure_all(&ModeSelection::First);
    let device = session.device(connector).unwrap();
    assert_eq!(device.encoder(), e1);
    assert_eq!(device.crtc(), c1);
    assert_ne!(device.crtc(), c0);
}

/// Test two connectors that can only be driven by the same CRTC
#[test]
fn test_contention_for_single_crtc() {
    let mut driver = MockDriver::new();
    driver.add_crtc();
    let only = driver.add_crtc();
    let e0 = driver.add_encoder(None, 0b10);
    let e1 = driver.add_encoder(None, 0b10);
    let modes = vec![DisplayMode::new("64x64", 64, 64, 60)];
    let first = driver.add_connector(ConnectionStatus::Connected, modes.clone(), None, vec![e0]);
    let second = driver.add_connector(ConnectionStatus::Connected, modes, None, vec![e1]);

    let mut session = Session::open(driver).expect("Failed to open session");
    let reports = session.configure_all(&ModeSelection::First);

    assert_eq!(session.device(first).map(|d| d.crtc()), Some(only));
    assert_eq!(reports[1].connector, second);
    assert!(matches!(
        reports[1].result,
        Err(KmsError::NoSuitableController(ConnectorId(id))) if id == second.0
    ));
    assert_eq!(session.driver().live_allocations(), 2);
}

/// Test that a framebuffer failure leaves no resources behind
#[test]
fn test_bind_failure_releases_everything() {
    let mut driver = three_outputs();
    driver.fail_once(DriverOp::BindFramebuffer, libc::EINVAL);
    let mut session = Session::open(driver).expect("Failed to open session");
    let reports = session.configure_all(&ModeSelection::First);

    assert!(matches!(reports[0].result, Err(KmsError::BindFailed { .. })));
    assert!(!session.registry().claimed().contains(&crtc(0)));
    // The other two connectors are unaffected.
    assert_eq!(session.registry().len(), 2);
    assert_eq!(session.driver().live_allocations(), 4);
    assert_eq!(session.driver().live_framebuffers(), 4);
}

/// Test that a mapping failure only undoes the failing connector's work
#[test]
fn test_map_failure_restores_counts() {
    let mut session = Session::open(three_outputs()).expect("Failed to open session");
    // Both buffers of connector 36 map, connector 37's front buffer fails.
    session
        .driver_mut()
        .fail_nth(DriverOp::MapMemory, 2, libc::ENOMEM);
    let reports = session.configure_all(&ModeSelection::First);

    assert!(reports[0].result.is_ok());
    assert!(matches!(reports[1].result, Err(KmsError::MapFailed { .. })));
    assert!(reports[2].result.is_ok());

    let driver = session.driver();
    assert_eq!(driver.live_allocations(), 4);
    assert_eq!(driver.live_framebuffers(), 4);
    assert_eq!(driver.live_mappings(), 4);
}

/// Test that a missing mode name skips every connector
#[test]
fn test_named_mode_missing_everywhere() {
    let mut session = Session::open(three_outputs()).expect("Failed to open session");
    let reports = session.configure_all(&ModeSelection::Named("1x1".into()));
    assert!(reports
        .iter()
        .take(3)
        .all(|r| matches!(r.result, Err(KmsError::ModeNotFound { .. }))));
    assert!(session.registry().is_empty());
    assert_eq!(session.driver().live_allocations(), 0);
}
