//! Configuration for the emulator servers
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! file (or no file) is a valid configuration. Command-line flags are applied
//! on top by [`crate::cli`].
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 5007
//! backlog = 20
//! interval_ms = 1000
//!
//! [nmea]
//! talker = "GP"
//! status = "A"
//! rmc = true
//! gsa = false
//!
//! [usv2]
//! status = "clear"
//! trigger = "s"
//!
//! [logging]
//! level = "info"
//! file = "nmea-server.log"
//! ```

use crate::error::{Error, Result};
use crate::protocol::{ClockStatus, FixStatus, Talker};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default NMEA listening port
pub const NMEA_PORT: u16 = 5007;

/// Default USV2 listening port
pub const USV2_PORT: u16 = 5008;

/// Top-level configuration shared by both servers
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EmulatorConfig {
    pub server: ServerConfig,
    pub nmea: NmeaConfig,
    pub usv2: Usv2Config,
    pub logging: LoggingConfig,
}

/// Listening socket and pacing
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (default: all interfaces)
    pub host: String,
    /// Bind port; each server falls back to its own default when unset
    pub port: Option<u16>,
    /// Pending-connection queue length
    pub backlog: i32,
    /// NMEA transmit interval in milliseconds
    pub interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: None,
            backlog: 20,
            interval_ms: 1000,
        }
    }
}

impl ServerConfig {
    /// Configured port, or `default` when none was given
    pub fn port(&self, default: u16) -> u16 {
        self.port.unwrap_or(default)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// NMEA sentence selection and initial status
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NmeaConfig {
    pub talker: Talker,
    /// Status every new session starts with
    pub status: FixStatus,
    pub rmc: bool,
    pub gsa: bool,
}

impl Default for NmeaConfig {
    fn default() -> Self {
        Self {
            talker: Talker::Gps,
            status: FixStatus::Valid,
            rmc: true,
            gsa: false,
        }
    }
}

/// USV2 initial status and request byte
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Usv2Config {
    /// Status every new session starts with
    pub status: ClockStatus,
    /// Single ASCII character that requests a frame
    pub trigger: String,
}

impl Default for Usv2Config {
    fn default() -> Self {
        Self {
            status: ClockStatus::Clear,
            trigger: "s".to_string(),
        }
    }
}

impl Usv2Config {
    /// Trigger as a byte; `validate` guarantees exactly one ASCII byte
    pub fn trigger_byte(&self) -> Result<u8> {
        match self.trigger.as_bytes() {
            [byte] if byte.is_ascii() => Ok(*byte),
            _ => Err(Error::Config(format!(
                "usv2.trigger must be a single ASCII character, got {:?}",
                self.trigger
            ))),
        }
    }
}

/// Log filter and optional rotating log file
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Mirror log output into this file
    pub file: Option<PathBuf>,
    /// Size at which the log file is rotated
    pub max_bytes: u64,
    /// Rotated files kept (`nav-emu.1.log` newest); 0 truncates in place
    pub backups: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_bytes: 1024 * 1024,
            backups: 3,
        }
    }
}

impl EmulatorConfig {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use nav_emu::config::EmulatorConfig;
    ///
    /// let config = EmulatorConfig::from_file("nav-emu.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let config: EmulatorConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, otherwise use defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Reject values the servers cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.server.interval_ms == 0 {
            return Err(Error::Config("server.interval_ms must be positive".into()));
        }
        if self.server.backlog <= 0 {
            return Err(Error::Config("server.backlog must be positive".into()));
        }
        if self.logging.max_bytes == 0 {
            return Err(Error::Config("logging.max_bytes must be positive".into()));
        }
        self.usv2.trigger_byte()?;
        Ok(())
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = EmulatorConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port(NMEA_PORT), 5007);
        assert_eq!(config.server.port(USV2_PORT), 5008);
        assert_eq!(config.server.backlog, 20);
        assert_eq!(config.server.interval(), Duration::from_secs(1));
        assert_eq!(config.nmea.talker, Talker::Gps);
        assert_eq!(config.nmea.status, FixStatus::Valid);
        assert!(config.nmea.rmc);
        assert!(!config.nmea.gsa);
        assert_eq!(config.usv2.status, ClockStatus::Clear);
        assert_eq!(config.usv2.trigger_byte().unwrap(), b's');
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: EmulatorConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.backlog, 20);
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[server]
host = "127.0.0.1"
port = 6000
interval_ms = 250

[nmea]
talker = "GN"
status = "V"
gsa = true

[usv2]
status = "set"
trigger = "t"

[logging]
level = "debug"
file = "/tmp/nav-emu.log"
backups = 5
"#;

        let config: EmulatorConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port(NMEA_PORT), 6000);
        assert_eq!(config.server.interval(), Duration::from_millis(250));
        assert_eq!(config.server.backlog, 20);
        assert_eq!(config.nmea.talker, Talker::Multi);
        assert_eq!(config.nmea.status, FixStatus::Void);
        assert!(config.nmea.rmc);
        assert!(config.nmea.gsa);
        assert_eq!(config.usv2.status, ClockStatus::Set);
        assert_eq!(config.usv2.trigger_byte().unwrap(), b't');
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.backups, 5);
        assert_eq!(config.logging.max_bytes, 1024 * 1024);
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 7007\n\n[nmea]\ntalker = \"GL\"").unwrap();

        let config = EmulatorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.port(NMEA_PORT), 7007);
        assert_eq!(config.nmea.talker, Talker::Glonass);
    }

    #[test]
    fn test_from_file_missing() {
        let err = EmulatorConfig::from_file("/nonexistent/nav-emu.toml").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = EmulatorConfig::default();
        config.server.interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = EmulatorConfig::default();
        config.server.backlog = 0;
        assert!(config.validate().is_err());

        let mut config = EmulatorConfig::default();
        config.usv2.trigger = "st".to_string();
        assert!(config.validate().is_err());
        config.usv2.trigger = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_talker_rejected() {
        let result: std::result::Result<EmulatorConfig, _> =
            toml::from_str("[nmea]\ntalker = \"XX\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nav-emu.toml");

        let mut config = EmulatorConfig::default();
        config.server.port = Some(9000);
        config.nmea.gsa = true;
        config.to_file(&path).unwrap();

        let reloaded = EmulatorConfig::from_file(&path).unwrap();
        assert_eq!(reloaded.server.port, Some(9000));
        assert!(reloaded.nmea.gsa);
    }
}
