//! kmsflip binary entry point
//!
//! Must be run from a TTY (not inside a compositor), usually as a user that
//! can become DRM master.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use kmsflip_core::config::{Config, USAGE};
use kmsflip_core::demo::TimesTable;
use kmsflip_core::driver::drm::card_candidates;
use kmsflip_core::driver::{find_card, DrmCard};
use kmsflip_core::logging::init_logging;
use kmsflip_core::session::Session;
use kmsflip_core::tracy::start_profiler;
use tracing::{error, info, warn};

/// Points on the times-table circle.
const POINTS: u32 = 200;

fn main() {
    let config = match Config::from_args(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("kmsflip: {err:#}");
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    };
    if config.help {
        println!("{USAGE}");
        return;
    }

    init_logging(config.journald);
    if start_profiler() {
        info!("Profiling with Tracy");
    }

    if let Err(e) = run(&config) {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(config: &Config) -> Result<()> {
    let card = match &config.device {
        Some(path) => DrmCard::open(path)?,
        None => {
            let candidates = card_candidates();
            find_card(&candidates)
                .with_context(|| format!("no usable DRM card among {candidates:?}"))?
        }
    };

    let mut session = Session::open(card)?;

    if config.probe {
        let json = session.probe_json().context("cannot serialize resources")?;
        println!("{json}");
        return Ok(());
    }

    session.configure_all(&config.mode);
    if session.registry().is_empty() {
        warn!("No connector could be configured");
        return Ok(());
    }

    let presenting = session.present_all();
    info!("{} of {} devices presenting", presenting, session.registry().len());

    let refresh = session
        .registry()
        .iter()
        .filter(|d| d.is_presenting())
        .map(|d| d.mode().refresh)
        .max()
        .unwrap_or(60)
        .max(1);
    let frame_time = Duration::from_secs_f64(1.0 / f64::from(refresh));
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(1);

    let mut tables = HashMap::new();
    if presenting > 0 {
        for _ in 0..config.frames {
            session.render_frame(|connector, canvas| {
                tables
                    .entry(connector)
                    .or_insert_with(|| TimesTable::new(POINTS, seed))
                    .draw_frame(canvas);
            });
            std::thread::sleep(frame_time);
        }
    }

    session.teardown();
    info!("Exiting");
    Ok(())
}
