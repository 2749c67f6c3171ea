//! Point-in-time view of the card's connectors, encoders and CRTCs.

use serde::Serialize;
use tracing::{debug, warn};

use crate::driver::{ConnectorInfo, CrtcId, EncoderId, EncoderInfo, KmsDriver};
use crate::error::KmsError;
use crate::tracy_span;

/// Resources known to the driver at capture time. Never refreshed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceSnapshot {
    pub connectors: Vec<ConnectorInfo>,
    pub encoders: Vec<EncoderInfo>,
    /// CRTCs in driver order; encoder bitmasks index into this list.
    pub crtcs: Vec<CrtcId>,
}

impl ResourceSnapshot {
    /// Enumerate resources and query every connector and encoder.
    ///
    /// Only a failed enumeration is an error. Connectors or encoders that
    /// cannot be queried are logged and left out.
    pub fn capture<D: KmsDriver>(driver: &mut D) -> Result<Self, KmsError> {
        tracy_span!("ResourceSnapshot::capture");

        let ids = driver
            .enumerate_resources()
            .map_err(KmsError::ResourceUnavailable)?;

        let connectors = ids
            .connectors
            .iter()
            .filter_map(|&id| match driver.get_connector(id) {
                Ok(info) => Some(info),
                Err(err) => {
                    warn!(connector = %id, "Cannot retrieve connector: {}", err);
                    None
                }
            })
            .collect();

        let encoders = ids
            .encoders
            .iter()
            .filter_map(|&id| match driver.get_encoder(id) {
                Ok(info) => Some(info),
                Err(err) => {
                    warn!(encoder = %id, "Cannot retrieve encoder: {}", err);
                    None
                }
            })
            .collect();

        let snapshot = Self {
            connectors,
            encoders,
            crtcs: ids.crtcs,
        };
        debug!(
            connectors = snapshot.connectors.len(),
            encoders = snapshot.encoders.len(),
            crtcs = snapshot.crtcs.len(),
            "Captured DRM resources"
        );
        Ok(snapshot)
    }

    pub fn encoder(&self, id: EncoderId) -> Option<&EncoderInfo> {
        self.encoders.iter().find(|e| e.id == id)
    }
}
