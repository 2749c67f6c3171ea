//! Log output setup
//!
//! Filter controlled by RUST_LOG (default: kmsflip=debug,kmsflip_core=debug).
//! With `--journald`, view logs with: journalctl -t kmsflip -f

use std::sync::Once;

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "kmsflip=debug,kmsflip_core=debug";

/// Install the global subscriber. Later calls do nothing.
///
/// Journald is used when requested and reachable; otherwise logs go to stderr.
pub fn init_logging(journald: bool) {
    static INIT_LOG: Once = Once::new();
    INIT_LOG.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        let journald = if journald {
            match tracing_journald::layer() {
                Ok(layer) => Some(layer.with_syslog_identifier("kmsflip".to_string())),
                Err(err) => {
                    eprintln!("kmsflip: journald unavailable, logging to stderr: {err}");
                    None
                }
            }
        } else {
            None
        };

        match journald {
            Some(layer) => tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .init(),
            None => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init(),
        }
    });
}
