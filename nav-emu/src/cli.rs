//! Command-line arguments for the two server binaries
//!
//! Flags override values loaded from the optional config file.

use crate::config::EmulatorConfig;
use crate::error::Result;
use crate::protocol::{ClockStatus, FixStatus, Talker};
use clap::{Args, Parser};
use std::path::PathBuf;

/// Flags shared by both servers
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind (default: 0.0.0.0)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Pending-connection queue length
    #[arg(long)]
    pub backlog: Option<i32>,

    /// Also write the log to this file (size-rotated)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long)]
    pub log_level: Option<String>,

    /// Do not read hotkeys from the terminal
    #[arg(long)]
    pub no_hotkeys: bool,
}

impl CommonArgs {
    /// Load the config file (if any) and apply the shared overrides
    fn load(&self) -> Result<EmulatorConfig> {
        let mut config = EmulatorConfig::load(self.config.as_deref())?;
        if let Some(ref host) = self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = Some(port);
        }
        if let Some(backlog) = self.backlog {
            config.server.backlog = backlog;
        }
        if let Some(ref file) = self.log_file {
            config.logging.file = Some(file.clone());
        }
        if let Some(ref level) = self.log_level {
            config.logging.level = level.clone();
        }
        Ok(config)
    }

    pub fn hotkeys(&self) -> bool {
        !self.no_hotkeys
    }
}

/// NMEA 0183 navigation receiver emulator
#[derive(Parser, Debug, Clone)]
#[command(name = "nmea-server", version, about, long_about = None)]
pub struct NmeaArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Emit RMC sentences
    #[arg(short, long)]
    pub rmc: bool,

    /// Emit GSA sentences
    #[arg(short, long)]
    pub gsa: bool,

    /// Initial RMC status
    #[arg(short, long, value_enum)]
    pub status: Option<FixStatus>,

    /// Talker ID
    #[arg(short = 'i', long = "id", value_enum)]
    pub talker: Option<Talker>,

    /// Interval between sentence groups in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,
}

impl NmeaArgs {
    /// Resolve the effective configuration
    ///
    /// Selecting `--rmc` and/or `--gsa` replaces the file's sentence
    /// selection; with neither selected anywhere, RMC is emitted.
    pub fn config(&self) -> Result<EmulatorConfig> {
        let mut config = self.common.load()?;
        if self.rmc || self.gsa {
            config.nmea.rmc = self.rmc;
            config.nmea.gsa = self.gsa;
        }
        if let Some(status) = self.status {
            config.nmea.status = status;
        }
        if let Some(talker) = self.talker {
            config.nmea.talker = talker;
        }
        if let Some(interval_ms) = self.interval_ms {
            config.server.interval_ms = interval_ms;
        }
        config.validate()?;
        Ok(config)
    }
}

/// USV2 time source emulator
#[derive(Parser, Debug, Clone)]
#[command(name = "usv2-server", version, about, long_about = None)]
pub struct Usv2Args {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Initial clock status byte
    #[arg(short, long, value_enum)]
    pub status: Option<ClockStatus>,
}

impl Usv2Args {
    /// Resolve the effective configuration
    pub fn config(&self) -> Result<EmulatorConfig> {
        let mut config = self.common.load()?;
        if let Some(status) = self.status {
            config.usv2.status = status;
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NMEA_PORT, USV2_PORT};
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_nmea_defaults() {
        let args = NmeaArgs::try_parse_from(["nmea-server"]).unwrap();
        let config = args.config().unwrap();
        assert_eq!(config.server.port(NMEA_PORT), 5007);
        assert_eq!(config.nmea.talker, Talker::Gps);
        assert_eq!(config.nmea.status, FixStatus::Valid);
        assert!(config.nmea.rmc);
        assert!(!config.nmea.gsa);
        assert!(args.common.hotkeys());
    }

    #[test]
    fn test_nmea_flags() {
        let args = NmeaArgs::try_parse_from([
            "nmea-server", "-p", "6000", "-g", "-s", "V", "-i", "GN", "--interval-ms", "200",
            "--host", "127.0.0.1", "--no-hotkeys",
        ])
        .unwrap();
        let config = args.config().unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port(NMEA_PORT), 6000);
        assert_eq!(config.server.interval(), Duration::from_millis(200));
        assert_eq!(config.nmea.status, FixStatus::Void);
        assert_eq!(config.nmea.talker, Talker::Multi);
        // GSA alone replaces the default RMC selection
        assert!(!config.nmea.rmc);
        assert!(config.nmea.gsa);
        assert!(!args.common.hotkeys());
    }

    #[test]
    fn test_nmea_invalid_values() {
        assert!(NmeaArgs::try_parse_from(["nmea-server", "-s", "X"]).is_err());
        assert!(NmeaArgs::try_parse_from(["nmea-server", "-i", "XX"]).is_err());
        assert!(NmeaArgs::try_parse_from(["nmea-server", "-p", "70000"]).is_err());

        let args = NmeaArgs::try_parse_from(["nmea-server", "--interval-ms", "0"]).unwrap();
        assert!(args.config().is_err());
    }

    #[test]
    fn test_flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nport = 7000\n\n[nmea]\ntalker = \"GL\"\ngsa = true\n\n[usv2]\nstatus = \"set\""
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let nmea = NmeaArgs::try_parse_from(["nmea-server", "-c", path, "-i", "BD"])
            .unwrap()
            .config()
            .unwrap();
        assert_eq!(nmea.server.port(NMEA_PORT), 7000);
        assert_eq!(nmea.nmea.talker, Talker::BeiDou);
        assert!(nmea.nmea.rmc);
        assert!(nmea.nmea.gsa);

        let usv2 = Usv2Args::try_parse_from(["usv2-server", "--config", path, "-s", "clear"])
            .unwrap()
            .config()
            .unwrap();
        assert_eq!(usv2.server.port(USV2_PORT), 7000);
        assert_eq!(usv2.usv2.status, ClockStatus::Clear);
    }

    #[test]
    fn test_usv2_flags() {
        let args = Usv2Args::try_parse_from([
            "usv2-server", "-s", "set", "-p", "6008", "--log-level", "debug",
        ])
        .unwrap();
        let config = args.config().unwrap();
        assert_eq!(config.server.port(USV2_PORT), 6008);
        assert_eq!(config.usv2.status, ClockStatus::Set);
        assert_eq!(config.logging.level, "debug");

        let defaults = Usv2Args::try_parse_from(["usv2-server"]).unwrap().config().unwrap();
        assert_eq!(defaults.server.port(USV2_PORT), 5008);
        assert_eq!(defaults.usv2.status, ClockStatus::Clear);
    }

    #[test]
    fn test_usv2_has_no_talker_flag() {
        assert!(Usv2Args::try_parse_from(["usv2-server", "-i", "GP"]).is_err());
    }
}
