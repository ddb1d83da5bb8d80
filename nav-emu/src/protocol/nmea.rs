//! NMEA 0183 sentence encoder
//!
//! Emits RMC (recommended minimum) and GSA (DOP and active satellites)
//! sentences with fixed position data and the current UTC time:
//!
//! ```text
//! $GPRMC,123519.000,A,4916.45,N,12311.12,W,173.8,231.8,150326,005.2,W*6C
//! $GPGSA,A,3,10,16,18,20,26,27,,,,,,,4.8,2.0,4.3*37
//! ```
//!
//! The checksum is the XOR of every byte between `$` and `*`, written as
//! two uppercase hex digits. Each sentence ends with `\r\n`.

use super::{FrameEncoder, StatusFlag};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed position reported in RMC: latitude, hemisphere, longitude, hemisphere
const RMC_POSITION: [&str; 4] = ["4916.45", "N", "12311.12", "W"];

/// Fixed speed over ground (knots) and course (degrees)
const RMC_MOTION: [&str; 2] = ["173.8", "231.8"];

/// Fixed magnetic variation and its direction
const RMC_VARIATION: [&str; 2] = ["005.2", "W"];

/// GSA fields after the address: mode, fix type, 12 satellite slots, PDOP/HDOP/VDOP
const GSA_FIELDS: [&str; 17] = [
    "A", "3", "10", "16", "18", "20", "26", "27", "", "", "", "", "", "", "4.8", "2.0", "4.3",
];

/// Talker identity: which satellite system a sentence claims to come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum Talker {
    /// GPS only
    #[default]
    #[serde(rename = "GP")]
    #[value(name = "GP")]
    Gps,
    /// Multi-constellation solution
    #[serde(rename = "GN")]
    #[value(name = "GN")]
    Multi,
    /// GLONASS only
    #[serde(rename = "GL")]
    #[value(name = "GL")]
    Glonass,
    /// BeiDou only
    #[serde(rename = "BD")]
    #[value(name = "BD")]
    BeiDou,
    /// Galileo only
    #[serde(rename = "GA")]
    #[value(name = "GA")]
    Galileo,
}

impl Talker {
    /// Two-letter prefix placed before the sentence type
    pub fn as_str(self) -> &'static str {
        match self {
            Talker::Gps => "GP",
            Talker::Multi => "GN",
            Talker::Glonass => "GL",
            Talker::BeiDou => "BD",
            Talker::Galileo => "GA",
        }
    }
}

impl fmt::Display for Talker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RMC status field: `A` = data valid, `V` = navigation receiver warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum FixStatus {
    #[default]
    #[serde(rename = "A")]
    #[value(name = "A")]
    Valid,
    #[serde(rename = "V")]
    #[value(name = "V")]
    Void,
}

impl FixStatus {
    pub fn as_char(self) -> char {
        match self {
            FixStatus::Valid => 'A',
            FixStatus::Void => 'V',
        }
    }
}

impl fmt::Display for FixStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl StatusFlag for FixStatus {
    fn toggled(self) -> Self {
        match self {
            FixStatus::Valid => FixStatus::Void,
            FixStatus::Void => FixStatus::Valid,
        }
    }

    fn to_byte(self) -> u8 {
        self.as_char() as u8
    }

    fn from_byte(byte: u8) -> Self {
        if byte == b'V' {
            FixStatus::Void
        } else {
            FixStatus::Valid
        }
    }
}

/// NMEA checksum: XOR of all bytes between `$` and `*`
#[inline]
pub fn checksum(body: &[u8]) -> u8 {
    body.iter().fold(0, |acc, b| acc ^ b)
}

/// Assemble `$<talker><kind>,<fields...>*<CS>\r\n`
pub fn sentence(talker: Talker, kind: &str, fields: &[&str]) -> String {
    let mut body = String::with_capacity(80);
    body.push_str(talker.as_str());
    body.push_str(kind);
    for field in fields {
        body.push(',');
        body.push_str(field);
    }
    format!("${}*{:02X}\r\n", body, checksum(body.as_bytes()))
}

/// RMC sentence for the given UTC instant
///
/// Milliseconds are always rendered as `000`.
pub fn rmc(talker: Talker, status: FixStatus, now: &DateTime<Utc>) -> String {
    let time = now.format("%H%M%S.000").to_string();
    let date = now.format("%d%m%y").to_string();
    let status = status.to_string();

    let mut fields: Vec<&str> = Vec::with_capacity(11);
    fields.push(&time);
    fields.push(&status);
    fields.extend_from_slice(&RMC_POSITION);
    fields.extend_from_slice(&RMC_MOTION);
    fields.push(&date);
    fields.extend_from_slice(&RMC_VARIATION);

    sentence(talker, "RMC", &fields)
}

/// GSA sentence (all fields fixed)
pub fn gsa(talker: Talker) -> String {
    sentence(talker, "GSA", &GSA_FIELDS)
}

/// Encoder for one tick of NMEA output
///
/// Enabled sentences are concatenated RMC first, then GSA, so a tick is
/// delivered in a single write.
#[derive(Debug, Clone)]
pub struct NmeaEncoder {
    talker: Talker,
    rmc: bool,
    gsa: bool,
}

impl NmeaEncoder {
    /// Create an encoder; with no sentence kind enabled, RMC is emitted.
    pub fn new(talker: Talker, rmc: bool, gsa: bool) -> Self {
        Self {
            talker,
            rmc: rmc || !gsa,
            gsa,
        }
    }

    pub fn talker(&self) -> Talker {
        self.talker
    }

    /// Names of the enabled sentence types, in emission order
    pub fn sentence_kinds(&self) -> Vec<&'static str> {
        let mut kinds = Vec::with_capacity(2);
        if self.rmc {
            kinds.push("RMC");
        }
        if self.gsa {
            kinds.push("GSA");
        }
        kinds
    }

    /// Encode for an explicit instant
    pub fn encode_at(&self, status: FixStatus, now: &DateTime<Utc>) -> Vec<u8> {
        let mut out = String::with_capacity(160);
        if self.rmc {
            out.push_str(&rmc(self.talker, status, now));
        }
        if self.gsa {
            out.push_str(&gsa(self.talker));
        }
        out.into_bytes()
    }
}

impl FrameEncoder for NmeaEncoder {
    type Status = FixStatus;

    const NAME: &'static str = "nmea";

    fn encode(&self, status: FixStatus) -> Vec<u8> {
        self.encode_at(status, &Utc::now())
    }

    fn render(&self, frame: &[u8]) -> String {
        frame.escape_ascii().to_string()
    }
}
