use clap::Parser;
use std::path::PathBuf;

use crate::config::{Overrides, DEFAULT_CONFIG_PATH};

/// Photo booth kiosk: waits for a token, takes the photos, prints the sheet.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file
    #[arg(long, env = "PHOTOBOOTH_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Application name shown in the window title
    #[arg(short, long)]
    pub name: Option<String>,

    /// Run mode: 1 normal, 2 debug (keyboard overrides enabled)
    #[arg(short, long)]
    pub mode: Option<u8>,

    /// Ask the kiosk page to go fullscreen
    #[arg(short, long)]
    pub fullscreen: bool,

    /// Start the display on the first screen instead of at startup
    #[arg(short, long)]
    pub deferred: bool,

    /// Camera index, falls back to 0 when it cannot be opened
    #[arg(short = 'c', long)]
    pub camera: Option<u32>,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            name: self.name.clone(),
            mode: self.mode,
            fullscreen: self.fullscreen,
            deferred: self.deferred,
            camera: self.camera,
        }
    }
}
