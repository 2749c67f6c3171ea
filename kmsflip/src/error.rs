//! Error taxonomy for display setup and presentation.
//!
//! Errors fall in three scopes, see [`KmsError::scope`]:
//!
//! - **Session**: the device cannot be used at all. Setup stops.
//! - **Connector**: one connector cannot be configured. Its partially built
//!   resources are released and the next connector is tried.
//! - **Device**: a configured device failed to program its CRTC or to flip.
//!   The failure is logged and the session keeps going.

use std::error::Error as _;
use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::driver::{ConnectorId, CrtcId};

/// How far an error reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    Session,
    Connector,
    Device,
}

#[derive(Error, Debug)]
pub enum KmsError {
    #[error("cannot open DRM device {path:?}")]
    DeviceOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("DRM device {path:?} does not support dumb buffers")]
    DumbBuffersUnsupported { path: PathBuf },

    #[error("cannot retrieve DRM resources")]
    ResourceUnavailable(#[source] io::Error),

    #[error("connector {0} is not connected")]
    ConnectorNotConnected(ConnectorId),

    #[error("no valid mode for connector {0}")]
    NoValidMode(ConnectorId),

    #[error("connector {connector} has no mode named {name:?}")]
    ModeNotFound { connector: ConnectorId, name: String },

    #[error("cannot find a suitable CRTC for connector {0}")]
    NoSuitableController(ConnectorId),

    #[error("cannot create dumb buffer {width}x{height}")]
    AllocationFailed {
        width: u32,
        height: u32,
        #[source]
        source: io::Error,
    },

    #[error("cannot create framebuffer for dumb buffer {handle}")]
    BindFailed {
        handle: u32,
        #[source]
        source: io::Error,
    },

    #[error("cannot map dumb buffer {handle}")]
    MapFailed {
        handle: u32,
        #[source]
        source: io::Error,
    },

    #[error("cannot set CRTC {crtc} for connector {connector}")]
    ModesetFailed {
        connector: ConnectorId,
        crtc: CrtcId,
        #[source]
        source: io::Error,
    },

    #[error("cannot flip CRTC {crtc} for connector {connector}")]
    FlipFailed {
        connector: ConnectorId,
        crtc: CrtcId,
        #[source]
        source: io::Error,
    },

    #[error("device on connector {0} is not presenting")]
    NotPresenting(ConnectorId),
}

impl KmsError {
    pub fn scope(&self) -> ErrorScope {
        match self {
            KmsError::DeviceOpen { .. }
            | KmsError::DumbBuffersUnsupported { .. }
            | KmsError::ResourceUnavailable(_) => ErrorScope::Session,
            KmsError::ConnectorNotConnected(_)
            | KmsError::NoValidMode(_)
            | KmsError::ModeNotFound { .. }
            | KmsError::NoSuitableController(_)
            | KmsError::AllocationFailed { .. }
            | KmsError::BindFailed { .. }
            | KmsError::MapFailed { .. } => ErrorScope::Connector,
            KmsError::ModesetFailed { .. }
            | KmsError::FlipFailed { .. }
            | KmsError::NotPresenting(_) => ErrorScope::Device,
        }
    }

    /// Whether this error ends the whole session.
    pub fn is_fatal(&self) -> bool {
        self.scope() == ErrorScope::Session
    }

    /// Underlying OS error code, if the driver reported one.
    pub fn os_error(&self) -> Option<i32> {
        match self {
            KmsError::DeviceOpen { source, .. }
            | KmsError::ResourceUnavailable(source)
            | KmsError::AllocationFailed { source, .. }
            | KmsError::BindFailed { source, .. }
            | KmsError::MapFailed { source, .. }
            | KmsError::ModesetFailed { source, .. }
            | KmsError::FlipFailed { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// Display adapter that appends every source, so log lines carry the
    /// driver's errno text.
    pub fn chain(&self) -> ErrorChain<'_> {
        ErrorChain(self)
    }
}

/// `outer: inner: ...`, see [`KmsError::chain`].
pub struct ErrorChain<'a>(&'a KmsError);

impl fmt::Display for ErrorChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(err) = source {
            write!(f, ": {err}")?;
            source = err.source();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scopes() {
        let err = KmsError::ResourceUnavailable(io::Error::from_raw_os_error(libc::EACCES));
        assert!(err.is_fatal());
        assert_eq!(err.os_error(), Some(libc::EACCES));

        let err = KmsError::NoSuitableController(ConnectorId(31));
        assert_eq!(err.scope(), ErrorScope::Connector);
        assert!(!err.is_fatal());
        assert_eq!(err.os_error(), None);

        let err = KmsError::FlipFailed {
            connector: ConnectorId(31),
            crtc: CrtcId(40),
            source: io::Error::from_raw_os_error(libc::EBUSY),
        };
        assert_eq!(err.scope(), ErrorScope::Device);
    }

    #[test]
    fn test_messages_name_resources() {
        let err = KmsError::ModesetFailed {
            connector: ConnectorId(31),
            crtc: CrtcId(40),
            source: io::Error::from_raw_os_error(libc::EINVAL),
        };
        assert_eq!(err.to_string(), "cannot set CRTC 40 for connector 31");
    }

    #[test]
    fn test_chain_appends_source() {
        let err = KmsError::AllocationFailed {
            width: 640,
            height: 480,
            source: io::Error::from_raw_os_error(libc::ENOMEM),
        };
        let text = err.chain().to_string();
        assert!(text.starts_with("cannot create dumb buffer 640x480: "));
        assert!(text.ends_with(&format!("(os error {})", libc::ENOMEM)));

        let err = KmsError::NoValidMode(ConnectorId(31));
        assert_eq!(err.chain().to_string(), err.to_string());
    }
}
