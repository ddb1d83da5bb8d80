//! TCP server side: accept loop, per-connection sessions, session registry
//!
//! ```text
//! Listener ──accept──► Session (one thread per client) ──frames──► client
//!    │                     │
//!    └──── SessionRegistry ◄┘ add on start, remove on teardown
//!                ▲
//!                └── control surface: broadcast_toggle / stop_all
//! ```

pub mod listener;
pub mod registry;
pub mod session;

pub use listener::{Listener, POLL_TIMEOUT, resolve};
pub use registry::{SessionControl, SessionRegistry};
pub use session::{OnRequest, Periodic, Session, SessionHandle, TransmitPolicy};

use crate::config::{EmulatorConfig, NMEA_PORT, USV2_PORT};
use crate::error::Result;
use crate::protocol::{NmeaEncoder, Usv2Encoder};
use log::info;

/// Listener pushing NMEA sentences at a fixed interval
pub type NmeaListener = Listener<NmeaEncoder, Periodic>;

/// Listener answering USV2 trigger bytes
pub type Usv2Listener = Listener<Usv2Encoder, OnRequest>;

/// Bind the NMEA server described by `config`
pub fn nmea_listener(config: &EmulatorConfig) -> Result<NmeaListener> {
    config.validate()?;
    let addr = resolve(&config.server.host, config.server.port(NMEA_PORT))?;
    let encoder = NmeaEncoder::new(config.nmea.talker, config.nmea.rmc, config.nmea.gsa);
    info!(
        "NMEA: talker {}, sentences {:?}, status {}, interval {:?}",
        encoder.talker(),
        encoder.sentence_kinds(),
        config.nmea.status,
        config.server.interval()
    );

    Listener::bind(
        addr,
        config.server.backlog,
        encoder,
        Periodic::new(config.server.interval()),
        config.nmea.status,
    )
}

/// Bind the USV2 server described by `config`
pub fn usv2_listener(config: &EmulatorConfig) -> Result<Usv2Listener> {
    config.validate()?;
    let addr = resolve(&config.server.host, config.server.port(USV2_PORT))?;
    let trigger = config.usv2.trigger_byte()?;
    info!(
        "USV2: trigger {:?}, status {}",
        trigger as char, config.usv2.status
    );

    Listener::bind(
        addr,
        config.server.backlog,
        Usv2Encoder,
        OnRequest::new(trigger),
        config.usv2.status,
    )
}
