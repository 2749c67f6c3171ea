//! Connector → encoder → CRTC matching
//!
//! Greedy and first-match: connectors are matched one at a time in the order
//! the caller presents them, and a CRTC taken by an earlier connector is never
//! given back. A poor early choice can leave a later connector without any
//! CRTC even when another global assignment would have served both.
//!
//! The currently bound encoder/CRTC pair is preferred when still free. It is
//! not re-checked against the mode that will be programmed.

use std::collections::HashSet;

use tracing::trace;

use crate::driver::{ConnectionStatus, ConnectorInfo, CrtcId, EncoderId};
use crate::error::KmsError;
use crate::snapshot::ResourceSnapshot;

/// Encoder and CRTC chosen for a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrtcAssignment {
    pub encoder: EncoderId,
    pub crtc: CrtcId,
}

/// Pick a CRTC for `connector` that is not in `claimed`.
pub fn find_crtc(
    connector: &ConnectorInfo,
    snapshot: &ResourceSnapshot,
    claimed: &HashSet<CrtcId>,
) -> Result<CrtcAssignment, KmsError> {
    if connector.status != ConnectionStatus::Connected {
        return Err(KmsError::ConnectorNotConnected(connector.id));
    }
    if connector.modes.is_empty() {
        return Err(KmsError::NoValidMode(connector.id));
    }

    // Keep whatever is already driving this connector.
    if let Some(encoder) = connector.encoder.and_then(|id| snapshot.encoder(id)) {
        if let Some(crtc) = encoder.crtc {
            if !claimed.contains(&crtc) {
                trace!(connector = %connector.id, %crtc, "Reusing bound CRTC");
                return Ok(CrtcAssignment {
                    encoder: encoder.id,
                    crtc,
                });
            }
        }
    }

    for encoder in connector.encoders.iter().filter_map(|&id| snapshot.encoder(id)) {
        for (index, &crtc) in snapshot.crtcs.iter().enumerate() {
            if encoder.can_drive(index) && !claimed.contains(&crtc) {
                trace!(connector = %connector.id, encoder = %encoder.id, %crtc, "Found free CRTC");
                return Ok(CrtcAssignment {
                    encoder: encoder.id,
                    crtc,
                });
            }
        }
    }

    Err(KmsError::NoSuitableController(connector.id))
}
