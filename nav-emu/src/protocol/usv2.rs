//! USV2 binary time frame
//!
//! Fixed 12-byte frame sent in reply to a trigger byte:
//!
//! ```text
//! ┌──────┬──────┬────┬────┬────┬────┬────┬────┬──────┬──────┬────────┬─────┐
//! │ 0x73 │ 0x0A │ YY │ MM │ DD │ hh │ mm │ ss │ 0x00 │ 0x00 │ STATUS │ CRC │
//! └──────┴──────┴────┴────┴────┴────┴────┴────┴──────┴──────┴────────┴─────┘
//!   0      1      2    3    4    5    6    7    8      9      10       11
//! ```
//!
//! - Date/time bytes are packed BCD (23 → `0x23`) of the host's local time
//! - STATUS is `0x00` or `0x80`
//! - CRC is the low byte of the sum of offsets 2..=10 (markers excluded)

use super::{FrameEncoder, StatusFlag};
use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use log::Level;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Total frame length in bytes
pub const FRAME_LEN: usize = 12;

/// Leading marker bytes
pub const MARKER: [u8; 2] = [0x73, 0x0A];

/// Offset of the first BCD byte (start of the checksummed range)
const BODY_START: usize = 2;

/// Offset of the status byte
const STATUS_POS: usize = 10;

/// Offset of the checksum byte
const CRC_POS: usize = 11;

/// Clock status bit carried in byte 10
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ClockStatus {
    /// `0x00`
    #[default]
    Clear,
    /// `0x80`
    Set,
}

impl ClockStatus {
    pub fn as_byte(self) -> u8 {
        match self {
            ClockStatus::Clear => 0x00,
            ClockStatus::Set => 0x80,
        }
    }
}

impl fmt::Display for ClockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.as_byte())
    }
}

impl StatusFlag for ClockStatus {
    fn toggled(self) -> Self {
        match self {
            ClockStatus::Clear => ClockStatus::Set,
            ClockStatus::Set => ClockStatus::Clear,
        }
    }

    fn to_byte(self) -> u8 {
        self.as_byte()
    }

    fn from_byte(byte: u8) -> Self {
        if byte == 0x80 {
            ClockStatus::Set
        } else {
            ClockStatus::Clear
        }
    }
}

/// Pack a two-digit decimal value into BCD (`23` → `0x23`)
#[inline]
pub fn bcd(n: u8) -> u8 {
    debug_assert!(n < 100, "BCD input out of range: {}", n);
    ((n / 10) << 4) | (n % 10)
}

/// Unpack a BCD byte back to its decimal value
#[inline]
pub fn from_bcd(byte: u8) -> u8 {
    (byte >> 4) * 10 + (byte & 0x0F)
}

/// Summation checksum: low 8 bits of the byte sum
#[inline]
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// One USV2 frame, built in place and finalized with its checksum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Usv2Frame {
    data: [u8; FRAME_LEN],
}

impl Usv2Frame {
    /// Build a frame for `timestamp` with the given clock status
    pub fn new(timestamp: &NaiveDateTime, status: ClockStatus) -> Self {
        let mut data = [0u8; FRAME_LEN];
        data[..BODY_START].copy_from_slice(&MARKER);
        data[2] = bcd((timestamp.year().rem_euclid(100)) as u8);
        data[3] = bcd(timestamp.month() as u8);
        data[4] = bcd(timestamp.day() as u8);
        data[5] = bcd(timestamp.hour() as u8);
        data[6] = bcd(timestamp.minute() as u8);
        data[7] = bcd(timestamp.second() as u8);
        data[STATUS_POS] = status.as_byte();

        let mut frame = Self { data };
        frame.finalize();
        frame
    }

    /// Frame for the current local time
    pub fn now(status: ClockStatus) -> Self {
        Self::new(&Local::now().naive_local(), status)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The six BCD date/time bytes (YY MM DD hh mm ss)
    pub fn timestamp_bcd(&self) -> &[u8] {
        &self.data[BODY_START..8]
    }

    pub fn status(&self) -> ClockStatus {
        ClockStatus::from_byte(self.data[STATUS_POS])
    }

    pub fn crc(&self) -> u8 {
        self.data[CRC_POS]
    }

    fn finalize(&mut self) {
        self.data[CRC_POS] = checksum(&self.data[BODY_START..CRC_POS]);
    }
}

/// Encoder producing one [`Usv2Frame`] per request
#[derive(Debug, Clone, Copy, Default)]
pub struct Usv2Encoder;

impl FrameEncoder for Usv2Encoder {
    type Status = ClockStatus;

    const NAME: &'static str = "usv2";

    fn encode(&self, status: ClockStatus) -> Vec<u8> {
        Usv2Frame::now(status).as_bytes().to_vec()
    }

    // Request/reply traffic is sparse enough to log by default
    fn log_level(&self) -> Level {
        Level::Info
    }
}
