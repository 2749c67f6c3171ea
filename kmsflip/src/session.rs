//! Display session: one driver, one snapshot, every configured device
//!
//! ```text
//! Session::open ─► configure_all ─► present_all ─► render_frame ... ─► teardown
//!      │                │                │                                 │
//!  dumb buffer      find_crtc +      save CRTC +                      restore CRTC,
//!  check, snapshot  2 buffers        first modeset                    free buffers
//! ```
//!
//! # Design Invariants
//!
//! 1. **Snapshot taken once**: resources are enumerated when the session is
//!    opened and never again. Later hotplug is not seen.
//!
//! 2. **Claims live in the registry**: a CRTC counts as taken exactly while a
//!    device holding it is registered. Nothing else tracks assignments.
//!
//! 3. **Per-connector isolation**: a connector that cannot be configured
//!    releases whatever it allocated before the next connector is tried.
//!
//! 4. **Full teardown**: every registered device is torn down, whatever
//!    happened to the previous ones. Dropping the session tears down too.

use std::fmt;

use tracing::{debug, error, info, warn};

use crate::allocator::{find_crtc, CrtcAssignment};
use crate::buffer::{allocate_buffer, destroy_buffer};
use crate::device::Device;
use crate::driver::{ConnectorId, ConnectorInfo, DisplayMode, KmsDriver};
use crate::error::KmsError;
use crate::raster::Canvas;
use crate::registry::DeviceRegistry;
use crate::snapshot::ResourceSnapshot;
use crate::{tracy_frame_mark, tracy_plot, tracy_span};

/// Which of a connector's modes to program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ModeSelection {
    /// The first mode the connector lists, normally its preferred one
    #[default]
    First,
    /// The mode with this exact name, e.g. `1920x1080`
    Named(String),
}

impl ModeSelection {
    fn select<'a>(&self, connector: &'a ConnectorInfo) -> Result<&'a DisplayMode, KmsError> {
        match self {
            ModeSelection::First => connector
                .modes
                .first()
                .ok_or(KmsError::NoValidMode(connector.id)),
            ModeSelection::Named(name) => connector
                .modes
                .iter()
                .find(|m| &m.name == name)
                .ok_or_else(|| KmsError::ModeNotFound {
                    connector: connector.id,
                    name: name.clone(),
                }),
        }
    }
}

/// Outcome of configuring one connector.
#[derive(Debug)]
pub struct ConnectorReport {
    pub connector: ConnectorId,
    pub result: Result<CrtcAssignment, KmsError>,
}

impl fmt::Display for ConnectorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            Ok(a) => write!(
                f,
                "connector {}: encoder {} -> crtc {}",
                self.connector, a.encoder, a.crtc
            ),
            Err(err) => write!(f, "connector {}: skipped ({})", self.connector, err.chain()),
        }
    }
}

pub struct Session<D: KmsDriver> {
    driver: D,
    snapshot: ResourceSnapshot,
    registry: DeviceRegistry<D::Mapping>,
}

impl<D: KmsDriver> Session<D> {
    /// Check dumb buffer support and take the resource snapshot.
    pub fn open(mut driver: D) -> Result<Self, KmsError> {
        match driver.supports_dumb_buffers() {
            Ok(true) => {}
            Ok(false) => {
                return Err(KmsError::DumbBuffersUnsupported {
                    path: driver.path().to_path_buf(),
                })
            }
            Err(err) => {
                warn!("Cannot query dumb buffer capability: {}", err);
                return Err(KmsError::DumbBuffersUnsupported {
                    path: driver.path().to_path_buf(),
                });
            }
        }

        let snapshot = ResourceSnapshot::capture(&mut driver)?;
        info!(path = ?driver.path(), "Opened display session");
        Ok(Self {
            driver,
            snapshot,
            registry: DeviceRegistry::new(),
        })
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn snapshot(&self) -> &ResourceSnapshot {
        &self.snapshot
    }

    pub fn registry(&self) -> &DeviceRegistry<D::Mapping> {
        &self.registry
    }

    pub fn device(&self, connector: ConnectorId) -> Option<&Device<D::Mapping>> {
        self.registry.get(connector)
    }

    /// Try every connector in snapshot order and register the ones that work.
    pub fn configure_all(&mut self, selection: &ModeSelection) -> Vec<ConnectorReport> {
        tracy_span!("Session::configure_all");

        let mut reports = Vec::with_capacity(self.snapshot.connectors.len());
        for connector in &self.snapshot.connectors {
            let result = configure_connector(
                &mut self.driver,
                &self.snapshot,
                &self.registry,
                connector,
                selection,
            );
            let result = match result {
                Ok(device) => {
                    let assignment = CrtcAssignment {
                        encoder: device.encoder(),
                        crtc: device.crtc(),
                    };
                    info!(
                        connector = %connector.id,
                        encoder = %assignment.encoder,
                        crtc = %assignment.crtc,
                        "Configured {} @ {}Hz",
                        device.mode().name,
                        device.mode().refresh
                    );
                    self.registry.push(device);
                    Ok(assignment)
                }
                Err(err) => {
                    match &err {
                        KmsError::ConnectorNotConnected(_) => {
                            debug!(connector = %connector.id, "Ignoring unused connector")
                        }
                        other => warn!(
                            connector = %connector.id,
                            "Skipping connector: {}",
                            other.chain()
                        ),
                    }
                    Err(err)
                }
            };
            reports.push(ConnectorReport {
                connector: connector.id,
                result,
            });
        }
        reports
    }

    /// Program every configured device. Returns how many are presenting.
    pub fn present_all(&mut self) -> usize {
        let mut presenting = 0;
        for device in self.registry.iter_mut() {
            match device.present(&mut self.driver) {
                Ok(()) => presenting += 1,
                Err(err) => error!(connector = %device.connector(), "{}", err.chain()),
            }
        }
        tracy_plot!("presenting devices", presenting);
        presenting
    }

    /// Flip one device.
    pub fn flip(&mut self, connector: ConnectorId) -> Result<(), KmsError> {
        let device = self
            .registry
            .get_mut(connector)
            .ok_or(KmsError::NotPresenting(connector))?;
        device.flip(&mut self.driver)
    }

    /// Draw into the back buffer of every presenting device, then flip it.
    ///
    /// Returns the number of successful flips. Failed flips are logged.
    pub fn render_frame<F>(&mut self, mut draw: F) -> usize
    where
        F: FnMut(ConnectorId, &mut Canvas<'_>),
    {
        tracy_span!("Session::render_frame");

        let mut flipped = 0;
        for device in self.registry.iter_mut().filter(|d| d.is_presenting()) {
            let connector = device.connector();
            match device.back_buffer() {
                Ok(mut canvas) => draw(connector, &mut canvas),
                Err(err) => {
                    warn!(%connector, "{}", err.chain());
                    continue;
                }
            }
            match device.flip(&mut self.driver) {
                Ok(()) => flipped += 1,
                Err(err) => warn!(%connector, "{}", err.chain()),
            }
        }
        tracy_plot!("flips per frame", flipped);
        tracy_frame_mark!();
        flipped
    }

    /// Snapshot as pretty-printed JSON.
    pub fn probe_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.snapshot)
    }

    /// Tear down every device, oldest first.
    pub fn teardown(&mut self) {
        if self.registry.is_empty() {
            return;
        }
        debug!(devices = self.registry.len(), "Tearing down display session");
        while let Some(mut device) = self.registry.take_next() {
            device.teardown(&mut self.driver);
        }
    }
}

impl<D: KmsDriver> Drop for Session<D> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn configure_connector<D: KmsDriver>(
    driver: &mut D,
    snapshot: &ResourceSnapshot,
    registry: &DeviceRegistry<D::Mapping>,
    connector: &ConnectorInfo,
    selection: &ModeSelection,
) -> Result<Device<D::Mapping>, KmsError> {
    let assignment = find_crtc(connector, snapshot, registry.claimed())?;
    let mode = selection.select(connector)?;
    let (width, height) = (u32::from(mode.width), u32::from(mode.height));

    let front = allocate_buffer(driver, width, height)?;
    let back = match allocate_buffer(driver, width, height) {
        Ok(buffer) => buffer,
        Err(err) => {
            destroy_buffer(driver, front);
            return Err(err);
        }
    };

    Ok(Device::new(
        connector.id,
        assignment,
        mode.clone(),
        [front, back],
    ))
}
