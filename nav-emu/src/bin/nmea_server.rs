//! nmea-server - NMEA 0183 receiver emulator
//!
//! Pushes RMC/GSA sentences to every connected client once per interval.
//!
//! ```text
//! nmea-server -p 5007 -r -g -s A -i GP
//! ```

use clap::Parser;
use nav_emu::cli::NmeaArgs;
use nav_emu::{Result, control, logging, server};

fn main() -> Result<()> {
    let args = NmeaArgs::parse();
    let config = args.config()?;
    logging::init(&config.logging)?;

    log::info!("nmea-server v{} starting...", env!("CARGO_PKG_VERSION"));

    let listener = server::nmea_listener(&config)?;
    control::run(listener, args.common.hotkeys())?;

    log::info!("nmea-server stopped");
    Ok(())
}
