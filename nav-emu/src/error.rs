//! Error types for nav-emu

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// nav-emu error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Listener could not bind or listen on its address
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        /// Address the listener tried to bind
        addr: String,
        /// Underlying socket error
        source: std::io::Error,
    },

    /// Configuration file could not be parsed or holds invalid values
    #[error("Configuration error: {0}")]
    Config(String),

    /// Host/port pair does not resolve to a socket address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Log sink setup failed
    #[error("Logging setup failed: {0}")]
    Logging(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
