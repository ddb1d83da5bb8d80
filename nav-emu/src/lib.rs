//! nav-emu - TCP emulators for navigation telemetry devices
//!
//! Two servers share one session engine:
//!
//! - **NMEA** (`nmea-server`, port 5007): pushes RMC and/or GSA sentences to
//!   every client at a fixed interval
//! - **USV2** (`usv2-server`, port 5008): answers each request containing the
//!   trigger byte with one 12-byte BCD time frame
//!
//! Each client gets its own session thread and status flag. The operator can
//! flip the status of all live sessions at once (hotkey or `SIGUSR1`).

pub mod cli;
pub mod config;
pub mod control;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod server;

// Re-export commonly used types
pub use config::EmulatorConfig;
pub use error::{Error, Result};
