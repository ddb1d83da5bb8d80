//! usv2-server - USV2 time source emulator
//!
//! Replies to every read containing the trigger byte (`s`) with one
//! 12-byte BCD time frame.
//!
//! ```text
//! usv2-server -p 5008 -s clear
//! ```

use clap::Parser;
use nav_emu::cli::Usv2Args;
use nav_emu::{Result, control, logging, server};

fn main() -> Result<()> {
    let args = Usv2Args::parse();
    let config = args.config()?;
    logging::init(&config.logging)?;

    log::info!("usv2-server v{} starting...", env!("CARGO_PKG_VERSION"));

    let listener = server::usv2_listener(&config)?;
    control::run(listener, args.common.hotkeys())?;

    log::info!("usv2-server stopped");
    Ok(())
}
