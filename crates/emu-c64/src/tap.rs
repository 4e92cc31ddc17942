//! C64 TAP image parser.
//!
//! A TAP file stores the time between falling edges of the datasette read
//! signal, in CPU cycles.
//!
//! # Header (20 bytes)
//!
//! - Bytes 0-11: signature "C64-TAPE-RAW"
//! - Byte 12: version (0 or 1)
//! - Bytes 13-15: reserved
//! - Bytes 16-19: pulse data size (LE u32)
//!
//! # Pulse encoding
//!
//! Each non-zero byte is a pulse of `byte * 8` cycles. A zero byte is an
//! overflow: in version 0 it stands for a long silence (256 * 8 cycles),
//! in version 1 it is followed by a 24-bit little-endian exact cycle count.

use std::fmt;

const SIGNATURE: &[u8; 12] = b"C64-TAPE-RAW";
const HEADER_LEN: usize = 20;
/// Pulse length used for a version 0 overflow byte.
const OVERFLOW_CYCLES: u32 = 256 * 8;

/// A TAP image was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapError {
    /// Shorter than the 20-byte header.
    TooShort(usize),
    BadSignature,
    UnsupportedVersion(u8),
    /// Header declares more pulse data than the file holds.
    Truncated { declared: usize, available: usize },
}

impl fmt::Display for TapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort(len) => write!(f, "TAP file too short for header ({len} bytes)"),
            Self::BadSignature => write!(f, "missing C64-TAPE-RAW signature"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported TAP version {v}"),
            Self::Truncated {
                declared,
                available,
            } => write!(
                f,
                "TAP data truncated: header says {declared} bytes, file has {available}"
            ),
        }
    }
}

impl std::error::Error for TapError {}

/// A parsed tape: the pulse lengths in CPU cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapImage {
    version: u8,
    pulses: Vec<u32>,
}

impl TapImage {
    /// Parse a TAP file.
    pub fn parse(data: &[u8]) -> Result<Self, TapError> {
        if data.len() < HEADER_LEN {
            return Err(TapError::TooShort(data.len()));
        }
        if &data[..12] != SIGNATURE {
            return Err(TapError::BadSignature);
        }
        let version = data[12];
        if version > 1 {
            return Err(TapError::UnsupportedVersion(version));
        }
        let declared = u32::from_le_bytes([data[16], data[17], data[18], data[19]]) as usize;
        let available = data.len() - HEADER_LEN;
        if declared > available {
            return Err(TapError::Truncated {
                declared,
                available,
            });
        }
        let pulses = extract_pulses(&data[HEADER_LEN..HEADER_LEN + declared], version);
        Ok(Self { version, pulses })
    }

    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    #[must_use]
    pub fn pulses(&self) -> &[u32] {
        &self.pulses
    }

    /// Total playing time in CPU cycles.
    #[must_use]
    pub fn total_cycles(&self) -> u64 {
        self.pulses.iter().map(|&p| u64::from(p)).sum()
    }
}

fn extract_pulses(data: &[u8], version: u8) -> Vec<u32> {
    let mut pulses = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            0 if version == 1 => {
                // A cut-off long pulse at the end of the data is dropped
                let Some(bytes) = data.get(i + 1..i + 4) else {
                    break;
                };
                pulses.push(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]));
                i += 4;
            }
            0 => {
                pulses.push(OVERFLOW_CYCLES);
                i += 1;
            }
            b => {
                pulses.push(u32::from(b) * 8);
                i += 1;
            }
        }
    }
    pulses
}
