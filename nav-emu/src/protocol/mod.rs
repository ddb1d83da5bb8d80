//! Frame encoders for the emulated devices
//!
//! Both protocols are rendered by pure functions: no I/O and no shared
//! state. A [`FrameEncoder`] turns the session's current status into the
//! exact bytes of one frame, computed fresh on every call.
//!
//! | Protocol | Frame | Checksum |
//! |----------|-------|----------|
//! | NMEA 0183 | `$<talker><type>,...*CS\r\n` lines | XOR of bytes between `$` and `*` |
//! | USV2 | fixed 12 bytes, BCD timestamp | low 8 bits of byte sum over offsets 2..=10 |

pub mod nmea;
pub mod usv2;

pub use nmea::{FixStatus, NmeaEncoder, Talker};
pub use usv2::{ClockStatus, Usv2Encoder, Usv2Frame};

use log::Level;
use std::fmt;

/// Two-valued status carried in every frame
///
/// Stored by sessions as a single byte so the transmit loop can read it
/// without taking the session lock.
pub trait StatusFlag: Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// The other legal value
    fn toggled(self) -> Self;

    /// Byte representation for atomic storage
    fn to_byte(self) -> u8;

    /// Inverse of [`StatusFlag::to_byte`]
    fn from_byte(byte: u8) -> Self;
}

/// Renders protocol state into wire bytes
pub trait FrameEncoder: Send + Sync + 'static {
    /// Status flag reflected in generated frames
    type Status: StatusFlag;

    /// Protocol name used in logs and thread names
    const NAME: &'static str;

    /// Build one frame from the current wall-clock time and `status`
    fn encode(&self, status: Self::Status) -> Vec<u8>;

    /// Human-readable rendering of a frame for the log
    fn render(&self, frame: &[u8]) -> String {
        hex_dump(frame)
    }

    /// Level at which per-frame traffic is logged
    fn log_level(&self) -> Level {
        Level::Debug
    }
}

/// Format bytes as underscore-separated uppercase hex (`73_0A_25`)
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join("_")
}
