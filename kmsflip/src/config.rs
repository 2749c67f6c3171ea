//! Command line configuration

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::session::ModeSelection;

pub const DEFAULT_FRAMES: u32 = 600;

pub const USAGE: &str = "\
Usage: kmsflip [OPTIONS] [DEVICE]

Draw an animated times table on every connected display, directly through
kernel mode setting. Must be run from a TTY with no compositor active.

Arguments:
  [DEVICE]        DRM card node, e.g. /dev/dri/card0
                  (default: first usable of /dev/dri/card3 .. card0)

Options:
  --mode NAME     Use the mode named NAME (e.g. 1920x1080) on every connector
  --frames N      Number of frames to render (default: 600)
  --probe         Print the DRM resources as JSON and exit
  --journald      Log to journald instead of stderr
  -h, --help      Show this help";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub device: Option<PathBuf>,
    pub mode: ModeSelection,
    pub frames: u32,
    pub probe: bool,
    pub journald: bool,
    pub help: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: None,
            mode: ModeSelection::First,
            frames: DEFAULT_FRAMES,
            probe: false,
            journald: false,
            help: false,
        }
    }
}

impl Config {
    /// Parse arguments, program name excluded.
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config = Config::default();
        let mut args = args.into_iter().map(Into::into);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => config.help = true,
                "--probe" => config.probe = true,
                "--journald" => config.journald = true,
                "--mode" => {
                    let name = args.next().context("--mode needs a mode name")?;
                    config.mode = ModeSelection::Named(name);
                }
                "--frames" => {
                    let value = args.next().context("--frames needs a number")?;
                    config.frames = value
                        .parse()
                        .with_context(|| format!("invalid frame count {value:?}"))?;
                }
                flag if flag.starts_with('-') => bail!("unknown option {flag:?}"),
                path => {
                    if config.device.is_some() {
                        bail!("more than one device given: {path:?}");
                    }
                    config.device = Some(PathBuf::from(path));
                }
            }
        }

        Ok(config)
    }
}
