//! Snapshot container format.
//!
//! ```text
//! offset  size  field
//! 0       4     magic "C64S"
//! 4       2     format version (LE)
//! 6       8     cycle count (LE)
//! 14      ...   bincode body
//! ```
//!
//! The body is one bincode value (fixed-width little-endian integers)
//! holding the records in a fixed order: machine (model, frame count), CPU,
//! memory, VIC-II, SID, CIA1, CIA2, keyboard, control ports, IEC, the
//! optional cartridge banking, datasette, then the optional drive with its
//! inserted disk. Any change to a record layout bumps [`VERSION`].

use emu_core::StateError;

use crate::error::C64Error;

pub const MAGIC: &[u8; 4] = b"C64S";

/// Current snapshot format version.
pub const VERSION: u16 = 2;

/// Bytes before the first record.
pub const HEADER_LEN: usize = 14;

/// Fixed fields at the start of every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub version: u16,
    pub cycles: u64,
}

impl SnapshotHeader {
    pub(crate) fn encode(self) -> Result<Vec<u8>, StateError> {
        emu_core::encode(&(MAGIC, self.version, self.cycles))
    }

    /// Check magic and version and split off the record data. Nothing is
    /// decoded past the header.
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8]), C64Error> {
        if data.len() < MAGIC.len() {
            return Err(if MAGIC.starts_with(data) {
                C64Error::Truncated
            } else {
                C64Error::BadMagic
            });
        }
        if &data[..4] != MAGIC {
            return Err(C64Error::BadMagic);
        }
        if data.len() < HEADER_LEN {
            return Err(C64Error::Truncated);
        }
        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != VERSION {
            return Err(C64Error::UnsupportedVersion {
                found: version,
                supported: VERSION,
            });
        }
        let mut cycles = [0; 8];
        cycles.copy_from_slice(&data[6..HEADER_LEN]);
        let header = Self {
            version,
            cycles: u64::from_le_bytes(cycles),
        };
        Ok((header, &data[HEADER_LEN..]))
    }
}
